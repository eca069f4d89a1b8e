use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HOME environment variable not set")]
    Home,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed cache line: {0:?}")]
    Malformed(String),

    #[error(transparent)]
    Model(#[from] patchset::Error),

    #[error("cache member references unknown file {0:?}")]
    UnknownFile(String),
}
