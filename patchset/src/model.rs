use std::{collections::HashMap, sync::Arc};

use bitflags::bitflags;
use derive_more::{Display, From, Into};

/// The trunk pseudo-branch. CVS calls it HEAD, not TRUNK.
pub const HEAD_BRANCH: &str = "HEAD";

/// Sentinel branch for revisions that sit on a branch with no symbolic name.
pub const NO_BRANCH: &str = "#CVSPS_NO_BRANCH";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct FileId(pub(crate) usize);

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct RevId(pub(crate) usize);

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct MemberId(pub(crate) usize);

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct PatchSetId(pub(crate) usize);

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct SymbolId(pub(crate) usize);

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct TagId(pub(crate) usize);

/// One file in the repository, with its revision and symbol tables.
#[derive(Debug)]
pub struct CvsFile {
    /// Repository-relative path, prefix- and Attic-stripped.
    pub path: Arc<str>,

    /// Revision string to revision.
    pub revisions: HashMap<Arc<str>, RevId>,

    /// Branch-point revision to branch name, and the inverse. Magic-branch
    /// symbols land here in their decoded `A.B.N` form.
    pub branches: HashMap<Arc<str>, Arc<str>>,
    pub branches_sym: HashMap<Arc<str>, Arc<str>>,

    /// Tag name to the revision it names in this file.
    pub symbols: HashMap<Arc<str>, RevId>,

    /// Set once the symbol table has been fully seen. Revisions added before
    /// this point (from symbol lines) get their branch resolved lazily when
    /// they reappear in the revision log proper.
    pub have_branches: bool,
}

impl CvsFile {
    pub(crate) fn new(path: Arc<str>) -> Self {
        Self {
            path,
            revisions: HashMap::new(),
            branches: HashMap::new(),
            branches_sym: HashMap::new(),
            symbols: HashMap::new(),
            have_branches: false,
        }
    }
}

/// One revision of one file.
#[derive(Debug)]
pub struct Revision {
    pub rev: Arc<str>,
    pub file: FileId,

    /// Branch the revision was committed on; `HEAD` for the trunk. `None`
    /// only for revisions that have been named by a symbol but never seen in
    /// the revision log.
    pub branch: Option<Arc<str>>,

    pub dead: bool,

    /// The member for which this revision is the predecessor.
    pub pre_psm: Option<MemberId>,

    /// The member for which this revision is the successor, i.e. the member
    /// that created it. At most one; a second sighting of the same revision
    /// means an incremental refresh is overlapping the cache.
    pub post_psm: Option<MemberId>,

    /// First revision of each branch rooted at this revision.
    pub branch_children: Vec<RevId>,

    /// Tags naming this revision.
    pub tags: Vec<TagId>,
}

/// One file revision inside a patch set: the transition `pre_rev ->
/// post_rev`. A `pre_rev` of `None` means INITIAL, the file-creation commit.
#[derive(Debug)]
pub struct Member {
    pub file: FileId,
    pub pre_rev: Option<RevId>,
    pub post_rev: RevId,
    pub ps: Option<PatchSetId>,
}

bitflags! {
    /// Tag anomaly flags, strongest wins when displayed.
    pub struct TagFlags: u8 {
        const FUNKY = 1;
        const INVALID = 2;
    }
}

impl TagFlags {
    pub fn describe(self) -> &'static str {
        if self.contains(TagFlags::INVALID) {
            "**INVALID**"
        } else if self.contains(TagFlags::FUNKY) {
            "**FUNKY**"
        } else {
            ""
        }
    }
}

/// A reconstructed logical commit.
#[derive(Debug)]
pub struct PatchSet {
    /// Commit time in signed epoch seconds.
    pub date: i64,
    pub author: Arc<str>,

    /// Full log body; shared, not interned (bodies are rarely equal).
    pub descr: Arc<str>,

    pub branch: Arc<str>,

    /// Insertion order is parse order.
    pub members: Vec<MemberId>,

    /// Resolved global tag, if any symbol resolved to this patch set.
    pub tag: Option<Arc<str>>,
    pub tag_flags: TagFlags,

    /// True for the synthetic "file initially added on branch" commit.
    pub branch_add: bool,

    /// Set on patch sets that fall before a `-r` endpoint chronologically
    /// but after it tag-wise: +1 forces inclusion, -1 forces exclusion.
    pub funk_factor: i32,
}

/// A symbolic tag across the whole repository.
#[derive(Debug)]
pub struct GlobalSymbol {
    pub tag: Arc<str>,
    pub tags: Vec<TagId>,
    pub ps: Option<PatchSetId>,
}

/// One file's sighting of a global symbol.
#[derive(Debug)]
pub struct Tag {
    pub tag: Arc<str>,
    pub rev: RevId,
    pub sym: SymbolId,
}
