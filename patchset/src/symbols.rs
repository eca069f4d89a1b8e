//! Global symbol resolution.
//!
//! Tagging in CVS is per file, so a symbol doesn't necessarily name a state
//! the repository was ever in at a single point in time. Each symbol is
//! resolved to the most recent patch set containing one of its tagged
//! revisions; the other tagged revisions are then checked against that patch
//! set's date and the symbol is flagged funky or invalid when they disagree.

use std::sync::Arc;

use crate::{
    model::{PatchSetId, RevId, SymbolId, TagFlags, HEAD_BRANCH},
    Engine,
};

impl Engine {
    /// Resolves every global symbol to a patch set and validates it.
    ///
    /// `tag_start` and `tag_end` are the `-r` endpoints, if any: patch sets
    /// that are chronologically out of order with respect to those tags get
    /// their funk factor stamped so the presentation pass can include or
    /// exclude them explicitly.
    pub fn resolve_global_symbols(&mut self, tag_start: Option<&str>, tag_end: Option<&str>) {
        let sym_count = self.global_symbols().count();

        for i in 0..sym_count {
            let sym = SymbolId::from(i);
            let tag_ids = self.symbol(sym).tags.clone();
            let sym_tag = self.symbol(sym).tag.clone();
            log::trace!("resolving global symbol {}", sym_tag);

            // First pass: the most recent patch set containing a revision
            // tagged with the symbol is 'the' patch set with the tag.
            let mut resolved: Option<PatchSetId> = None;
            for &t in &tag_ids {
                let rev = self.tag(t).rev;
                let ps = match self.rev_patchset(rev) {
                    Some(ps) => ps,
                    None => {
                        log::debug!(
                            "tagged revision {} of {} is not in any patch set",
                            self.revision(rev).rev,
                            self.file(self.revision(rev).file).path
                        );
                        continue;
                    }
                };

                if resolved.map_or(true, |r| self.patchset(ps).date > self.patchset(r).date) {
                    resolved = Some(ps);
                }
            }

            let ps = match resolved {
                Some(ps) => ps,
                None => {
                    log::error!("no patchset for tag {}", sym_tag);
                    continue;
                }
            };

            self.symbol_mut(sym).ps = Some(ps);
            self.patchset_mut(ps).tag = Some(sym_tag.clone());

            // Second pass: a tagged revision must stay valid until the date
            // of the tagged patch set, or something funky is going on.
            for &t in &tag_ids {
                let rev = self.tag(t).rev;
                let branch = self.patchset(ps).branch.clone();

                let next_rev = match self.rev_follow_branch(rev, &branch) {
                    Some(next_rev) => next_rev,
                    None => continue,
                };
                let next_ps = match self.rev_patchset(next_rev) {
                    Some(next_ps) => next_ps,
                    None => continue,
                };

                if self.patchset(next_ps).date < self.patchset(ps).date {
                    let flag = self.check_rev_funk(ps, next_rev, tag_start, tag_end);
                    log::error!(
                        "file {} revision {} tag {}: TAG VIOLATION",
                        self.file(self.revision(rev).file).path,
                        self.revision(rev).rev,
                        sym_tag
                    );
                    self.patchset_mut(ps).tag_flags |= flag;
                }
            }
        }
    }

    /// Looks at all revisions from `rev` forward until the tagged patch
    /// set's date and decides whether the tag is merely funky or outright
    /// invalid. Also stamps the funk factor of visited patch sets when the
    /// tag is one of the `-r` endpoints: those patch sets fall before the
    /// tag chronologically but after it tag-wise (or vice versa), so the
    /// restriction filter needs an explicit override for them.
    fn check_rev_funk(
        &mut self,
        ps: PatchSetId,
        rev: RevId,
        tag_start: Option<&str>,
        tag_end: Option<&str>,
    ) -> TagFlags {
        let ps_date = self.patchset(ps).date;
        let branch = self.patchset(ps).branch.clone();
        let tag: Arc<str> = match self.patchset(ps).tag.clone() {
            Some(tag) => tag,
            None => return TagFlags::FUNKY,
        };

        let mut current = Some(rev);
        while let Some(rev) = current {
            let next_ps = match self.rev_patchset(rev) {
                Some(next_ps) => next_ps,
                None => break,
            };

            if self.patchset(next_ps).date > ps_date {
                break;
            }

            log::trace!(
                "ps date {} next_ps date {} rev {} branch {:?}",
                ps_date,
                self.patchset(next_ps).date,
                self.revision(rev).rev,
                self.revision(rev).branch
            );

            for &m in &self.patchset(next_ps).members.clone() {
                if self.before_tag(self.member(m).post_rev, &tag) {
                    return TagFlags::INVALID;
                }
            }

            if tag_start == Some(&*tag) {
                self.patchset_mut(next_ps).funk_factor = 1;
            }
            if tag_end == Some(&*tag) {
                self.patchset_mut(next_ps).funk_factor = -1;
            }

            current = self.rev_follow_branch(rev, &branch);
        }

        TagFlags::FUNKY
    }

    /// True when `rev` is an ancestor of the revision `tag` names in the
    /// same file, on a branch the tag is alive on, dated no later than the
    /// tagged revision.
    fn before_tag(&self, rev: RevId, tag: &str) -> bool {
        let file = self.revision(rev).file;
        let tagged = match self.file(file).symbols.get(tag) {
            Some(&tagged) => tagged,
            None => return false,
        };
        let tagged_branch = match self.revision(tagged).branch.clone() {
            Some(branch) => branch,
            None => return false,
        };

        let dates = match (self.rev_patchset(rev), self.rev_patchset(tagged)) {
            (Some(a), Some(b)) => (self.patchset(a).date, self.patchset(b).date),
            _ => return false,
        };

        self.revision_affects_branch(rev, &tagged_branch) && dates.0 <= dates.1
    }

    /// The next revision from `rev` following `branch`: the earlier
    /// revision on the same branch (the log is reverse chronological, so
    /// "following" walks towards the branch root), or the first revision of
    /// a matching child branch.
    fn rev_follow_branch(&self, rev: RevId, branch: &str) -> Option<RevId> {
        let r = self.revision(rev);

        if r.branch.as_deref() == Some(branch) {
            return r.pre_psm.map(|m| self.member(m).post_rev);
        }

        r.branch_children
            .iter()
            .copied()
            .find(|&child| self.revision(child).branch.as_deref() == Some(branch))
    }

    /// Whether a revision is part of the history of `branch`: on the branch
    /// itself, or on an ancestor branch at a point no later than where
    /// `branch` diverges.
    pub fn revision_affects_branch(&self, rev: RevId, branch: &str) -> bool {
        let rev_str = self.revision(rev).rev.clone();

        if branch == HEAD_BRANCH {
            return rev_str.matches('.').count() == 1;
        }

        let file = self.revision(rev).file;
        let branch_rev = match self.file(file).branches_sym.get(branch) {
            Some(branch_rev) => branch_rev.clone(),
            None => return false,
        };

        let (post_branch, file_leaf) = match rev_str.rsplit_once('.') {
            Some((head, leaf)) => match leaf.parse::<u32>() {
                Ok(leaf) => (head, leaf),
                Err(_) => return false,
            },
            None => return false,
        };

        // Walk the named branch and its ancestor branches until one matches
        // the revision's own branch, then compare leaves.
        let mut cursor: &str = &branch_rev;
        let mut branch_leaf = file_leaf;
        loop {
            log::trace!("check {} against {} for {}", cursor, post_branch, rev_str);
            if cursor == post_branch {
                return file_leaf <= branch_leaf;
            }

            match cursor.rsplit_once('.') {
                Some((head, leaf)) => {
                    branch_leaf = match leaf.parse() {
                        Ok(leaf) => leaf,
                        Err(_) => return false,
                    };
                    cursor = head;
                }
                None => return false,
            }
        }
    }

    pub fn patch_set_affects_branch(&self, ps: PatchSetId, branch: &str) -> bool {
        self.patchset(ps)
            .members
            .iter()
            .any(|&m| self.revision_affects_branch(self.member(m).post_rev, branch))
    }

    pub fn patch_set_contains_member(&self, ps: PatchSetId, file_substring: &str) -> bool {
        self.patchset(ps)
            .members
            .iter()
            .any(|&m| self.file(self.member(m).file).path.contains(file_substring))
    }

    /// The patch set a revision was created by, if it has been seen in the
    /// revision log (revisions known only from symbol tables haven't).
    fn rev_patchset(&self, rev: RevId) -> Option<PatchSetId> {
        self.revision(rev)
            .post_psm
            .and_then(|m| self.member(m).ps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{feed, file};
    use cvs_log::{Event, RevisionRecord};

    fn revision_with(rev: &str, date: i64, author: &str, log: &str) -> Event {
        Event::Revision(RevisionRecord {
            rev: rev.into(),
            date,
            author: author.into(),
            dead: false,
            log: log.into(),
        })
    }

    fn symbol(tag: &str, rev: &str) -> Event {
        Event::Symbol {
            tag: tag.into(),
            rev: rev.into(),
        }
    }

    #[test]
    fn test_clean_tag_resolves_to_latest_patchset() {
        let mut engine = Engine::new();
        feed(
            &mut engine,
            vec![
                file("a"),
                symbol("V1", "1.1"),
                Event::SymbolsEnd,
                revision_with("1.1", 100, "alice", "one\n"),
                Event::FileEnd,
                file("b"),
                symbol("V1", "1.1"),
                Event::SymbolsEnd,
                revision_with("1.1", 500, "alice", "two\n"),
                Event::FileEnd,
            ],
            0,
        );

        engine.resolve_global_symbols(None, None);

        let (_, sym) = engine.global_symbols().next().unwrap();
        let ps = sym.ps.unwrap();
        assert_eq!(engine.patchset(ps).date, 500);
        assert_eq!(engine.patchset(ps).tag.as_deref(), Some("V1"));
        assert!(engine.patchset(ps).tag_flags.is_empty());
    }

    #[test]
    fn test_funky_tag() {
        // V1 names a@1.2 (t=1000) and b@1.1 (t=1500), but a@1.3 lands in
        // between: the tagged a revision was already superseded when the
        // resolved patch set happened.
        let mut engine = Engine::new();
        feed(
            &mut engine,
            vec![
                file("a"),
                symbol("V1", "1.2"),
                Event::SymbolsEnd,
                revision_with("1.3", 1200, "alice", "later\n"),
                revision_with("1.2", 1000, "alice", "tagged\n"),
                revision_with("1.1", 500, "alice", "base\n"),
                Event::FileEnd,
                file("b"),
                symbol("V1", "1.1"),
                Event::SymbolsEnd,
                revision_with("1.2", 1600, "alice", "after\n"),
                revision_with("1.1", 1500, "alice", "tagged b\n"),
                Event::FileEnd,
            ],
            0,
        );

        engine.resolve_global_symbols(Some("V1"), None);

        let (_, sym) = engine.global_symbols().next().unwrap();
        let ps = sym.ps.unwrap();
        assert_eq!(engine.patchset(ps).date, 1500);
        assert_eq!(engine.patchset(ps).tag_flags, TagFlags::FUNKY);

        // The in-between patch set is tag-wise after the start tag, so it
        // gets pulled in despite falling before it chronologically.
        let file_a = engine.find_file("a").unwrap();
        let r13 = engine.file_get_revision(file_a, "1.3").unwrap();
        let funked = engine.rev_patchset(r13).unwrap();
        assert_eq!(engine.patchset(funked).date, 1200);
        assert_eq!(engine.patchset(funked).funk_factor, 1);
    }

    #[test]
    fn test_invalid_tag() {
        // Patch set P (t=250) touches both a and c. V names a@1.1 (before P)
        // and c@1.2 (after P), so P straddles the tag: invalid.
        let mut engine = Engine::new();
        feed(
            &mut engine,
            vec![
                file("a"),
                symbol("V", "1.1"),
                Event::SymbolsEnd,
                revision_with("1.2", 250, "alice", "both\n"),
                revision_with("1.1", 100, "alice", "a base\n"),
                Event::FileEnd,
                file("c"),
                symbol("V", "1.2"),
                Event::SymbolsEnd,
                revision_with("1.2", 280, "alice", "c top\n"),
                revision_with("1.1", 250, "alice", "both\n"),
                Event::FileEnd,
            ],
            0,
        );

        engine.resolve_global_symbols(None, None);

        let (_, sym) = engine.global_symbols().next().unwrap();
        let ps = sym.ps.unwrap();
        assert_eq!(engine.patchset(ps).date, 280);
        assert!(engine.patchset(ps).tag_flags.contains(TagFlags::INVALID));
    }

    #[test]
    fn test_vendor_branch_symbol() {
        // Vendor imports tag the branch revision directly; IMPORT must land
        // in the branch maps, not the symbol table, and resolution must not
        // trip over it.
        let mut engine = Engine::new();
        feed(
            &mut engine,
            vec![
                file("v"),
                symbol("IMPORT", "1.1.1"),
                Event::SymbolsEnd,
                revision_with("1.1", 90, "alice", "init\n"),
                revision_with("1.1.1.1", 100, "alice", "import\n"),
                Event::FileEnd,
            ],
            0,
        );

        let file_id = engine.find_file("v").unwrap();
        assert_eq!(
            engine.file(file_id).branches.get("1.1.1").map(|t| t.to_string()),
            Some(String::from("IMPORT"))
        );
        assert!(engine.file(file_id).symbols.is_empty());

        let import_rev = engine.file_get_revision(file_id, "1.1.1.1").unwrap();
        assert_eq!(
            engine.revision(import_rev).branch.as_deref(),
            Some("IMPORT")
        );

        engine.resolve_global_symbols(None, None);
        for (_, ps) in engine.patchsets() {
            assert!(ps.tag_flags.is_empty());
        }
    }

    #[test]
    fn test_revision_affects_branch() {
        let mut engine = Engine::new();
        feed(
            &mut engine,
            vec![
                file("a"),
                symbol("FEATURE", "1.2.0.4"),
                Event::SymbolsEnd,
                revision_with("1.3", 400, "alice", "top\n"),
                revision_with("1.2", 200, "alice", "mid\n"),
                revision_with("1.1", 100, "alice", "base\n"),
                revision_with("1.2.4.1", 300, "alice", "branch work\n"),
                Event::FileEnd,
            ],
            0,
        );

        let file_id = engine.find_file("a").unwrap();
        let rev = |r: &str| engine.file_get_revision(file_id, r).unwrap();

        // Trunk is HEAD; only single-dot revisions affect it.
        assert!(engine.revision_affects_branch(rev("1.3"), "HEAD"));
        assert!(!engine.revision_affects_branch(rev("1.2.4.1"), "HEAD"));

        // The branch contains its own revisions and its trunk ancestry up
        // to the branch point, but not later trunk work.
        assert!(engine.revision_affects_branch(rev("1.2.4.1"), "FEATURE"));
        assert!(engine.revision_affects_branch(rev("1.2"), "FEATURE"));
        assert!(engine.revision_affects_branch(rev("1.1"), "FEATURE"));
        assert!(!engine.revision_affects_branch(rev("1.3"), "FEATURE"));

        assert!(!engine.revision_affects_branch(rev("1.1"), "NOSUCH"));
    }
}
