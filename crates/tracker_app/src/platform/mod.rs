mod app;
mod cli;
mod logging;
mod persistence;
mod projector;

pub use app::run_app;
