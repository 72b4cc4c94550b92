use std::io;
use std::path::PathBuf;
use std::time::Duration;

use plotters::drawing::DrawingAreaErrorKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write monitor log: {0}")]
    Log(#[source] io::Error),

    /// A counter or memory reading could not be taken for this tick.
    #[error("{what} unavailable for pid {pid}")]
    Unavailable { pid: u32, what: &'static str },

    #[error("`{program}` failed: {message}")]
    Command { program: String, message: String },

    #[error("sampler did not write {} within {waited:?}", pid_file.display())]
    StartupTimeout { pid_file: PathBuf, waited: Duration },

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("could not install termination handler: {0}")]
    Handler(#[from] ctrlc::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("chart rendering failed: {0}")]
    Chart(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn unavailable(pid: u32, what: &'static str) -> Self {
        Self::Unavailable { pid, what }
    }
}

impl<E> From<DrawingAreaErrorKind<E>> for Error
where
    E: std::error::Error + Send + Sync,
{
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        Self::Chart(err.to_string())
    }
}
