use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("two patch sets collapsed to the same time key at {date}; clustering bug")]
    DuplicatePatchSet { date: i64 },

    #[error("invalid revision format {0:?}")]
    InvalidRevision(String),

    #[error("revision event without a current file")]
    NoCurrentFile,

    #[error("request for non-existent revision {rev} in file {file}")]
    UnknownRevision { file: String, rev: String },
}
