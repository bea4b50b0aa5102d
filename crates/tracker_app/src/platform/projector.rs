use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;

use chrono::Local;
use tracker_core::{JobId, JobRowView};
use tracker_engine::{Projector, TrackerError};
use tracker_logging::tracker_warn;

/// Prints one line per state change, followed by log lines not shown yet.
pub(crate) struct TerminalProjector<W: Write + Send> {
    out: W,
    timestamps: bool,
    last_log_line: HashMap<JobId, String>,
}

impl TerminalProjector<io::Stdout> {
    pub(crate) fn stdout() -> Self {
        Self::new(io::stdout(), true)
    }
}

impl<W: Write + Send> TerminalProjector<W> {
    pub(crate) fn new(out: W, timestamps: bool) -> Self {
        Self {
            out,
            timestamps,
            last_log_line: HashMap::new(),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(err) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracker_warn!("Failed to write job output: {}", err);
        }
    }

    fn prefix(&self, job_id: &JobId) -> String {
        if self.timestamps {
            format!("{} [{}]", Local::now().format("%H:%M:%S"), job_id)
        } else {
            format!("[{}]", job_id)
        }
    }
}

impl<W: Write + Send> Projector for TerminalProjector<W> {
    fn project(&mut self, row: &JobRowView) {
        let mut text = String::new();
        let _ = writeln!(
            text,
            "{} {}: {} / {} ({:.0}%) uploaded={}",
            self.prefix(&row.job_id),
            row.status,
            row.progress,
            row.total,
            row.percent,
            row.uploaded
        );

        let last_seen = self.last_log_line.get(&row.job_id).map(String::as_str);
        for line in fresh_lines(row.log_tail(), last_seen) {
            let _ = writeln!(text, "    {line}");
        }
        if let Some(line) = row.logs.last() {
            self.last_log_line.insert(row.job_id.clone(), line.clone());
        }

        if let Some(failure) = &row.failure {
            let _ = writeln!(text, "{} {}", self.prefix(&row.job_id), failure);
        }
        self.emit(&text);
    }

    fn artifact_saved(&mut self, job_id: &JobId, path: &Path) {
        let text = format!("{} archive saved to {}\n", self.prefix(job_id), path.display());
        self.emit(&text);
    }

    fn artifact_failed(&mut self, job_id: &JobId, error: &TrackerError) {
        let text = format!("{} archive not saved: {}\n", self.prefix(job_id), error);
        self.emit(&text);
    }
}

/// Lines of `tail` after the last one already printed, or all of it when
/// that line has scrolled out.
fn fresh_lines<'a>(tail: &'a [String], last_seen: Option<&str>) -> &'a [String] {
    match last_seen.and_then(|seen| tail.iter().rposition(|line| line == seen)) {
        Some(index) => &tail[index + 1..],
        None => tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_core::JobState;

    fn row(progress: u64, total: u64, logs: &[&str], error: Option<&str>) -> JobRowView {
        JobRowView::from_state(&JobState {
            id: JobId::from("j1"),
            status: "running".to_string(),
            progress,
            total,
            uploaded: 2,
            logs: logs.iter().map(|line| line.to_string()).collect(),
            error: error.map(ToOwned::to_owned),
            ..JobState::default()
        })
    }

    fn render(rows: &[JobRowView]) -> String {
        let mut projector = TerminalProjector::new(Vec::new(), false);
        for row in rows {
            projector.project(row);
        }
        String::from_utf8(projector.into_inner()).unwrap()
    }

    #[test]
    fn prints_progress_line() {
        let output = render(&[row(5, 10, &[], None)]);
        assert_eq!(output, "[j1] running: 5 / 10 (50%) uploaded=2\n");
    }

    #[test]
    fn log_lines_are_printed_once() {
        let output = render(&[row(1, 4, &["a"], None), row(2, 4, &["a", "b"], None)]);
        assert_eq!(
            output,
            "[j1] running: 1 / 4 (25%) uploaded=2\n    a\n\
             [j1] running: 2 / 4 (50%) uploaded=2\n    b\n"
        );
    }

    #[test]
    fn failure_message_is_shown() {
        let output = render(&[row(0, 4, &[], Some("disk full"))]);
        assert!(output.contains("[j1] Job failed: disk full"));
    }

    #[test]
    fn fresh_lines_fall_back_to_whole_tail() {
        let tail = vec!["c".to_string(), "d".to_string()];
        assert_eq!(fresh_lines(&tail, Some("d")), &[] as &[String]);
        assert_eq!(fresh_lines(&tail, Some("c")), &tail[1..]);
        assert_eq!(fresh_lines(&tail, Some("a")), &tail[..]);
        assert_eq!(fresh_lines(&tail, None), &tail[..]);
    }
}
