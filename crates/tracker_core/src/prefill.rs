/// Fragment parameter carrying a percent-encoded job payload.
pub const PREFILL_PARAM: &str = "jsonInput";

/// Extracts the job payload from a link of the form `...#?jsonInput=<encoded>`.
pub fn payload_from_link(link: &str) -> Option<String> {
    let (_, fragment) = link.split_once('#')?;
    let query = fragment.strip_prefix('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == PREFILL_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
