//! Persistence for the reconstructed patch-set model.
//!
//! The cache is a text-delimited, line-oriented file: a header with the
//! cache timestamp, one section per file (revisions, branches, symbols), and
//! one section per patch set in time order. Reloading it rebuilds the full
//! in-memory model — including the member/revision cross-links the linker
//! would have produced — so a subsequent run only has to ask the server for
//! log entries newer than the cache date.

use std::{env, fs, path::PathBuf};

mod error;
mod loader;
mod writer;

pub use error::Error;
pub use loader::read_cache;
pub use writer::write_cache;

const CACHE_FILE: &str = "cvsps.cache";

/// The per-user cache directory, `$HOME/.cvsps`, created if absent.
pub fn cvsps_dir() -> Result<PathBuf, Error> {
    let home = env::var_os("HOME").ok_or(Error::Home)?;
    let dir = PathBuf::from(home).join(".cvsps");

    if !dir.is_dir() {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o777);
        }
        builder.create(&dir)?;
    }

    Ok(dir)
}

pub fn cache_file() -> Result<PathBuf, Error> {
    Ok(cvsps_dir()?.join(CACHE_FILE))
}
