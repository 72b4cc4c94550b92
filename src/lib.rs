#![warn(clippy::all, rust_2018_idioms)]

pub mod app;
pub mod error;
pub mod metrics;
pub mod process;
pub mod report;
pub mod settings;

pub use app::MonitorApp;
pub use error::{Error, Result};
pub use settings::Settings;
