use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use cvs_log::{str_branch_of, Event, Num};

use crate::{
    interner::Interner,
    model::{
        CvsFile, FileId, GlobalSymbol, Member, MemberId, PatchSet, PatchSetId, RevId, Revision,
        SymbolId, Tag, TagFlags, TagId, HEAD_BRANCH, NO_BRANCH,
    },
    Error,
};

/// Clustering key: all three strings must match exactly before the fuzzy
/// date dimension is even consulted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PsKey {
    author: Arc<str>,
    descr: Arc<str>,
    branch: Arc<str>,
}

/// Strict total order for the presentation index. Exact-equal tuples cannot
/// occur: the fuzzy dedup already collapsed them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TimeKey {
    date: i64,
    author: Arc<str>,
    descr: Arc<str>,
    branch: Arc<str>,
}

/// Owns the whole reconstructed model for one run: the arenas, the file and
/// symbol indexes, the interner, and the two patch-set indexes.
#[derive(Debug, Default)]
pub struct Engine {
    interner: Interner,

    files: Vec<CvsFile>,
    file_index: HashMap<Arc<str>, FileId>,

    revisions: Vec<Revision>,
    members: Vec<Member>,
    patchsets: Vec<PatchSet>,

    by_key: HashMap<PsKey, Vec<(i64, PatchSetId)>>,
    by_time: BTreeMap<TimeKey, PatchSetId>,

    symbols: Vec<GlobalSymbol>,
    symbol_index: HashMap<Arc<str>, SymbolId>,
    tags: Vec<Tag>,

    // Parse cursor: the file currently being read, and the previously
    // created member on it (the log is reverse chronological, so the
    // previous member's predecessor is the revision we're about to see).
    cur_file: Option<FileId>,
    prev_member: Option<MemberId>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> Arc<str> {
        self.interner.intern(s)
    }

    // Accessors. Ids are only ever minted by this engine, so plain indexing
    // is fine; an out-of-range id is a logic error.

    pub fn file(&self, id: FileId) -> &CvsFile {
        &self.files[id.0]
    }

    pub fn file_mut(&mut self, id: FileId) -> &mut CvsFile {
        &mut self.files[id.0]
    }

    pub fn revision(&self, id: RevId) -> &Revision {
        &self.revisions[id.0]
    }

    pub fn revision_mut(&mut self, id: RevId) -> &mut Revision {
        &mut self.revisions[id.0]
    }

    pub fn member(&self, id: MemberId) -> &Member {
        &self.members[id.0]
    }

    pub fn member_mut(&mut self, id: MemberId) -> &mut Member {
        &mut self.members[id.0]
    }

    pub fn patchset(&self, id: PatchSetId) -> &PatchSet {
        &self.patchsets[id.0]
    }

    pub fn patchset_mut(&mut self, id: PatchSetId) -> &mut PatchSet {
        &mut self.patchsets[id.0]
    }

    pub fn symbol(&self, id: SymbolId) -> &GlobalSymbol {
        &self.symbols[id.0]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut GlobalSymbol {
        &mut self.symbols[id.0]
    }

    pub fn tag(&self, id: TagId) -> &Tag {
        &self.tags[id.0]
    }

    pub fn files(&self) -> impl Iterator<Item = (FileId, &CvsFile)> {
        self.files.iter().enumerate().map(|(i, f)| (FileId(i), f))
    }

    pub fn patchsets(&self) -> impl Iterator<Item = (PatchSetId, &PatchSet)> {
        self.patchsets
            .iter()
            .enumerate()
            .map(|(i, ps)| (PatchSetId(i), ps))
    }

    /// Patch sets in presentation order: strictly ascending (date, author,
    /// descr, branch).
    pub fn patchsets_by_time(&self) -> impl Iterator<Item = PatchSetId> + '_ {
        self.by_time.values().copied()
    }

    pub fn global_symbols(&self) -> impl Iterator<Item = (SymbolId, &GlobalSymbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i), s))
    }

    pub fn interner_len(&self) -> usize {
        self.interner.len()
    }

    pub fn find_file(&self, path: &str) -> Option<FileId> {
        self.file_index.get(path).copied()
    }

    pub fn find_or_create_file(&mut self, path: &str) -> FileId {
        if let Some(id) = self.find_file(path) {
            log::trace!("existing file: {}", path);
            return id;
        }

        let path = self.interner.intern(path);
        let id = FileId(self.files.len());
        self.files.push(CvsFile::new(path.clone()));
        self.file_index.insert(path, id);
        log::trace!("new file: {:?}", id);
        id
    }

    /// Finds or creates a revision of `file`.
    ///
    /// Revisions are created twice over: once when the symbol table names
    /// them, and again when the revision log proper reaches them. The branch
    /// is resolved on whichever call happens after the symbol table is
    /// complete, since it needs the branch map.
    pub fn file_add_revision(&mut self, file: FileId, rev_str: &str) -> Result<RevId, Error> {
        let rev = match self.files[file.0].revisions.get(rev_str) {
            Some(&rev) => rev,
            None => {
                let rev_str = self.interner.intern(rev_str);
                let rev = RevId(self.revisions.len());
                self.revisions.push(Revision {
                    rev: rev_str.clone(),
                    file,
                    branch: None,
                    dead: false,
                    pre_psm: None,
                    post_psm: None,
                    branch_children: Vec::new(),
                    tags: Vec::new(),
                });
                self.files[file.0].revisions.insert(rev_str, rev);
                rev
            }
        };

        if self.revisions[rev.0].branch.is_none() && self.files[file.0].have_branches {
            let rev_string = self.revisions[rev.0].rev.clone();
            let branch_rev = str_branch_of(&rev_string)
                .ok_or_else(|| Error::InvalidRevision(rev_string.to_string()))?;

            let branch = match self.files[file.0].branches.get(branch_rev) {
                Some(branch) => branch.clone(),
                // No symbol for the branch: trunk revisions map to HEAD,
                // anything deeper is on an unnamed branch.
                None if str_branch_of(branch_rev).is_some() => self.interner.intern(NO_BRANCH),
                None => self.interner.intern(HEAD_BRANCH),
            };

            log::trace!(
                "revision {} of file {} on branch {}",
                rev_string,
                self.files[file.0].path,
                branch
            );
            self.revisions[rev.0].branch = Some(branch);
        }

        Ok(rev)
    }

    /// Looks up an existing revision; unknown revisions are an error (the
    /// model is inconsistent if a predecessor lookup misses).
    pub fn file_get_revision(&self, file: FileId, rev_str: &str) -> Result<RevId, Error> {
        self.files[file.0]
            .revisions
            .get(rev_str)
            .copied()
            .ok_or_else(|| Error::UnknownRevision {
                file: self.files[file.0].path.to_string(),
                rev: rev_str.to_string(),
            })
    }

    /// Classifies one symbol-table line and records it: magic-branch symbols
    /// and vendor-branch revisions become branches, everything else is a tag.
    pub fn add_symbol_line(&mut self, file: FileId, tag: &str, rev: &str) -> Result<(), Error> {
        let num: Num = rev
            .parse()
            .map_err(|_| Error::InvalidRevision(rev.to_string()))?;
        if num.branch().is_none() {
            return Err(Error::InvalidRevision(rev.to_string()));
        }

        if let Some(branch) = num.magic_branch() {
            log::trace!("got sym: {} for {}", tag, branch);
            self.add_file_branch(file, &branch.to_string(), tag);
        } else if num.is_vendor_branch() {
            // Vendor imports tag the branch revision directly instead of
            // using the magic encoding.
            self.add_file_branch(file, rev, tag);
        } else {
            self.add_file_symbol(file, tag, rev)?;
        }

        Ok(())
    }

    pub fn add_file_branch(&mut self, file: FileId, rev: &str, tag: &str) {
        if self.files[file.0].branches.contains_key(rev) {
            log::trace!(
                "attempt to add existing branch {}:{} to {}",
                rev,
                tag,
                self.files[file.0].path
            );
            return;
        }

        let rev = self.interner.intern(rev);
        let tag = self.interner.intern(tag);
        self.files[file.0].branches.insert(rev.clone(), tag.clone());
        self.files[file.0].branches_sym.insert(tag, rev);
    }

    pub fn add_file_symbol(&mut self, file: FileId, tag: &str, rev_str: &str) -> Result<(), Error> {
        let tag_name = self.interner.intern(tag);
        log::trace!(
            "adding symbol to file: {} {}->{}",
            self.files[file.0].path,
            tag_name,
            rev_str
        );

        let rev = self.file_add_revision(file, rev_str)?;
        self.files[file.0].symbols.insert(tag_name.clone(), rev);

        let sym = match self.symbol_index.get(&tag_name) {
            Some(&sym) => sym,
            None => {
                let sym = SymbolId(self.symbols.len());
                self.symbols.push(GlobalSymbol {
                    tag: tag_name.clone(),
                    tags: Vec::new(),
                    ps: None,
                });
                self.symbol_index.insert(tag_name.clone(), sym);
                sym
            }
        };

        // An incremental refresh can re-announce a symbol, possibly moved to
        // a newer revision; update the file's existing Tag in place rather
        // than accumulating stale sightings.
        let existing = self.symbols[sym.0]
            .tags
            .iter()
            .copied()
            .find(|&t| self.revisions[self.tags[t.0].rev.0].file == file);

        match existing {
            Some(t) => {
                let old_rev = self.tags[t.0].rev;
                if old_rev != rev {
                    self.revisions[old_rev.0].tags.retain(|&x| x != t);
                    self.tags[t.0].rev = rev;
                    self.revisions[rev.0].tags.push(t);
                }
            }
            None => {
                let t = TagId(self.tags.len());
                self.tags.push(Tag {
                    tag: tag_name,
                    rev,
                    sym,
                });
                self.symbols[sym.0].tags.push(t);
                self.revisions[rev.0].tags.push(t);
            }
        }

        Ok(())
    }

    /// Creates a member for a just-parsed revision and wires the
    /// revision-to-member back-reference.
    pub fn create_member(&mut self, file: FileId, post_rev: RevId) -> MemberId {
        let member = MemberId(self.members.len());
        self.members.push(Member {
            file,
            pre_rev: None,
            post_rev,
            ps: None,
        });
        self.revisions[post_rev.0].post_psm = Some(member);
        member
    }

    /// Find-or-insert against the fuzzy key index.
    ///
    /// Within a fixed (author, descr, branch) triple, an existing patch set
    /// whose date falls within `fuzz` of the candidate absorbs it; the
    /// earliest such patch set wins when several qualify. The comparator is
    /// not transitive across the fuzz window, so the clustering is sensitive
    /// to insertion order; that matches the original behaviour and is left
    /// as is.
    ///
    /// `fuzz` must be 0 when reloading from cache: cached patch sets are
    /// already canonical.
    pub fn find_or_insert_patch_set(
        &mut self,
        date: i64,
        author: &str,
        descr: &str,
        branch: &str,
        fuzz: i64,
    ) -> Result<PatchSetId, Error> {
        let author = self.interner.intern(author);
        let branch = self.interner.intern(branch);
        let descr: Arc<str> = Arc::from(descr);

        let key = PsKey {
            author: author.clone(),
            descr: descr.clone(),
            branch: branch.clone(),
        };

        if let Some(bucket) = self.by_key.get(&key) {
            let start = bucket.partition_point(|&(d, _)| d < date - fuzz);
            if let Some(&(d, id)) = bucket.get(start) {
                if d <= date + fuzz {
                    log::trace!("found existing patch set");
                    return Ok(id);
                }
            }
        }

        log::trace!("new patch set: {} {:?} {}", author, descr, date);
        let id = PatchSetId(self.patchsets.len());
        self.patchsets.push(PatchSet {
            date,
            author: author.clone(),
            descr: descr.clone(),
            branch: branch.clone(),
            members: Vec::new(),
            tag: None,
            tag_flags: TagFlags::empty(),
            branch_add: false,
            funk_factor: 0,
        });

        let bucket = self.by_key.entry(key).or_default();
        let at = bucket.partition_point(|&(d, _)| d < date);
        bucket.insert(at, (date, id));

        let time_key = TimeKey {
            date,
            author,
            descr,
            branch,
        };
        if self.by_time.insert(time_key, id).is_some() {
            return Err(Error::DuplicatePatchSet { date });
        }

        Ok(id)
    }

    pub fn patch_set_add_member(&mut self, ps: PatchSetId, member: MemberId) {
        self.members[member.0].ps = Some(ps);
        self.patchsets[ps.0].members.push(member);
    }

    /// Folds one parser event into the model. `fuzz` is the clustering
    /// window for any patch set this event creates.
    pub fn apply(&mut self, event: Event, fuzz: i64) -> Result<(), Error> {
        match event {
            Event::File { path } => {
                self.cur_file = Some(self.find_or_create_file(&path));
                self.prev_member = None;
            }
            Event::Symbol { tag, rev } => {
                let file = self.cur_file.ok_or(Error::NoCurrentFile)?;
                self.add_symbol_line(file, &tag, &rev)?;
            }
            Event::SymbolsEnd => {
                let file = self.cur_file.ok_or(Error::NoCurrentFile)?;
                self.files[file.0].have_branches = true;
            }
            Event::Revision(record) => {
                let file = self.cur_file.ok_or(Error::NoCurrentFile)?;
                let rev = self.file_add_revision(file, &record.rev)?;

                // The log is reverse chronological: this revision is the
                // predecessor of the member we created last time around.
                self.assign_pre_revision(self.prev_member, Some(rev))?;

                if self.revisions[rev.0].post_psm.is_some() {
                    // Incremental refresh overlap: the cache already has this
                    // revision and everything older.
                    self.prev_member = None;
                } else {
                    if record.dead {
                        self.revisions[rev.0].dead = true;
                    }

                    let member = self.create_member(file, rev);
                    let branch = match self.revisions[rev.0].branch.clone() {
                        Some(branch) => branch,
                        None => self.interner.intern(HEAD_BRANCH),
                    };
                    let ps = self.find_or_insert_patch_set(
                        record.date,
                        &record.author,
                        &record.log,
                        &branch,
                        fuzz,
                    )?;
                    self.patch_set_add_member(ps, member);
                    self.prev_member = Some(member);
                }
            }
            Event::FileEnd => {
                self.assign_pre_revision(self.prev_member, None)?;
                self.prev_member = None;
                self.cur_file = None;
            }
        }

        Ok(())
    }
}
