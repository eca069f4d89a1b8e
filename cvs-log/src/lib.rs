//! Streaming parser for `cvs log` output.
//!
//! The log is a line-oriented format: a header per RCS file (including the
//! symbolic name table), then one record per revision, delimited by runs of
//! hyphens within a file and a run of equals signs between files. The
//! [`Parser`] consumes the raw byte stream and yields [`Event`]s; callers are
//! expected to fold those events into whatever model they maintain.

mod date;
mod error;
mod num;
mod parser;
mod paths;
mod types;

pub use date::DateParser;
pub use error::Error;
pub use num::{str_branch_of, Num};
pub use parser::Parser;
pub use paths::strip_rcs_path;
pub use types::{Event, RevisionRecord};
