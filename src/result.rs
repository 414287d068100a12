use std::fmt::Display;

use miette::miette;

/// Error returned by the external collaborators.
///
/// Only the cases the caller must react to get their own variant,
/// everything else is carried as a report.
#[derive(Debug)]
pub enum Error {
    /// The source reported the clip as unavailable (deleted, private, ...)
    UnavailableStream,

    Miette(miette::Report),
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Miette(miette::Report::msg(err))
    }
}

impl From<Error> for miette::Report {
    fn from(err: Error) -> Self {
        match err {
            Error::UnavailableStream => miette!("Unavailable stream"),
            Error::Miette(err) => err,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnavailableStream => write!(f, "Unavailable stream"),
            Error::Miette(report) => write!(f, "{report:#}"),
        }
    }
}

impl Error {
    pub fn wrap_err_with<D, F>(self, f: F) -> Error
    where
        D: Display + Send + Sync + 'static,
        F: FnOnce() -> D,
    {
        match self {
            Error::Miette(report) => Error::Miette(report.wrap_err(f())),
            err => err,
        }
    }
}

/// Shortcut to return an error made out of a message
pub fn bail<T, D>(msg: D) -> Result<T>
where
    D: Display + std::fmt::Debug + Send + Sync + 'static,
{
    Err(Error::Miette(miette::Report::msg(msg)))
}

pub type Result<T> = std::result::Result<T, Error>;
