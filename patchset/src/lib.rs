//! Patch-set reconstruction from per-file CVS revisions.
//!
//! CVS treats each file commit as an independent commit with its own
//! timestamp, author and log message; there is no repo-wide commit object.
//! The same logical change therefore shows up as a set of file revisions
//! spread over a short window of time. The [`Engine`] here folds the event
//! stream from `cvs-log` into an in-memory model — files, revisions, symbol
//! tables — and clusters revisions into patch sets when their (author, log,
//! branch) keys match and their timestamps fall within a fuzz window of each
//! other. It then links each member to its predecessor revision, wires up
//! branch-child edges, and resolves every symbolic tag to the patch set it
//! names, flagging the tags that don't correspond to a single point in time.
//!
//! All entities live in arenas owned by the engine and are addressed by id;
//! cross-references (`pre_psm`, `post_psm`, `branch_children`, ...) are ids,
//! never pointers, so the model has no reference cycles and the persistence
//! layer can walk it freely.

mod engine;
mod error;
mod interner;
mod linker;
mod model;
mod symbols;

pub use engine::Engine;
pub use error::Error;
pub use interner::Interner;
pub use model::{
    CvsFile, FileId, GlobalSymbol, Member, MemberId, PatchSet, PatchSetId, RevId, Revision,
    SymbolId, Tag, TagFlags, TagId, HEAD_BRANCH, NO_BRANCH,
};
