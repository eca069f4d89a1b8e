use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("error spawning {command}: {err:?}")]
    Spawn { command: String, err: io::Error },

    #[error("cannot establish a stdout pipe to cvs log")]
    StdoutPipe,
}

impl Error {
    pub(crate) fn spawn(command: &str, err: io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            err,
        }
    }
}
