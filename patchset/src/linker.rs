//! Predecessor assignment.
//!
//! The log is reverse chronological per file, so the revision being parsed
//! is usually the direct ancestor of the previously created member. Branch
//! points are where that breaks down: the first member of a branch has to
//! find its predecessor by chopping revision components instead.

use cvs_log::str_branch_of;

use crate::{
    model::{MemberId, RevId},
    Engine, Error,
};

impl Engine {
    /// Decides `pre_rev` for `psm`, the previously created member on the
    /// current file. `rev` is the just-parsed earlier revision, or `None` at
    /// the end of the file's log.
    pub fn assign_pre_revision(
        &mut self,
        psm: Option<MemberId>,
        rev: Option<RevId>,
    ) -> Result<(), Error> {
        let psm = match psm {
            Some(psm) => psm,
            None => return Ok(()),
        };

        let file = self.member(psm).file;
        let post_rev = self.member(psm).post_rev;
        let post_rev_str = self.revision(post_rev).rev.clone();

        let rev = match rev {
            Some(rev) => rev,
            None => {
                // psm was the file's last logged revision: either INITIAL,
                // or the first revision of a branch. Chopping two components
                // yields the branch point when it is the latter.
                if let Some(bp) = str_branch_of(&post_rev_str).and_then(str_branch_of) {
                    let pre = self.file_get_revision(file, bp)?;
                    self.member_mut(psm).pre_rev = Some(pre);
                    self.revision_mut(pre).branch_children.push(post_rev);
                } else {
                    self.set_initial(psm);
                }
                return Ok(());
            }
        };

        let rev_str = self.revision(rev).rev.clone();

        let pre = match str_branch_of(&rev_str) {
            Some(pre) => pre,
            None => {
                log::error!("malformed revision {} while linking", rev_str);
                return Ok(());
            }
        };
        let post = match str_branch_of(&post_rev_str) {
            Some(post) => post,
            None => {
                log::error!("malformed revision {} while linking", post_rev_str);
                return Ok(());
            }
        };

        if pre == post {
            // Simple linear ancestor on the same branch.
            self.member_mut(psm).pre_rev = Some(rev);
            self.revision_mut(rev).pre_psm = Some(psm);
            return Ok(());
        }

        // The branches differ, so psm is the oldest revision on its branch
        // (or the oldest revision overall). Chop one more component: if that
        // yields a revision, it's the branch point; if not, psm is INITIAL.
        //
        // Renumbered revisions (1.9 jumped to 2.0) also land here and get
        // stamped INITIAL, which is wrong but matches the history as logged.
        match str_branch_of(post) {
            Some(bp) => {
                let pre = self.file_get_revision(file, bp)?;
                self.member_mut(psm).pre_rev = Some(pre);
                self.revision_mut(pre).branch_children.push(post_rev);
            }
            None => self.set_initial(psm),
        }

        Ok(())
    }

    /// Marks a member as the file-creation commit. A dead INITIAL revision
    /// is the "file initially added on branch" placeholder, which makes the
    /// whole patch set synthetic.
    fn set_initial(&mut self, psm: MemberId) {
        self.member_mut(psm).pre_rev = None;

        let post_rev = self.member(psm).post_rev;
        if !self.revision(post_rev).dead {
            return;
        }

        if let Some(ps) = self.member(psm).ps {
            if self.patchset(ps).branch_add {
                log::error!("branch_add already set!");
            }
            self.patchset_mut(ps).branch_add = true;
        }
    }
}
