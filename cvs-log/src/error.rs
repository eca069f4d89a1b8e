use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("empty revision number")]
    EmptyNum,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("'symbolic names' not found in log output; perhaps try --norc")]
    NoSymbolicNames,

    #[error(transparent)]
    ParseInt(#[from] ParseIntError),

    #[error("log ended in the middle of a file entry")]
    UnexpectedEof,
}
