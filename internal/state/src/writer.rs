use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use patchset::Engine;

use crate::Error;

pub(crate) const DESCR_SENTINEL: &str = "-=-END CVSPS DESCR-=-";
pub(crate) const INITIAL: &str = "INITIAL";

/// Writes the whole model to `path` in the cache format.
///
/// Maps and revision tables are emitted in sorted order so the cache is
/// byte-stable across runs; patch sets go out in time order, which is also
/// the order the loader will re-insert them in.
pub fn write_cache(engine: &Engine, path: &Path, cache_date: i64) -> Result<(), Error> {
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "cache date: {}", cache_date)?;
    writeln!(out)?;

    for (_, file) in engine.files() {
        writeln!(out, "file: {}", file.path)?;

        let mut revs: Vec<_> = file.revisions.values().copied().collect();
        revs.sort();
        for rev_id in revs {
            let rev = engine.revision(rev_id);
            writeln!(
                out,
                "{} {} {}",
                rev.rev,
                rev.branch.as_deref().unwrap_or(INITIAL),
                rev.dead as u8
            )?;
        }

        let mut branches: Vec<_> = file.branches.iter().collect();
        branches.sort();
        for (rev, tag) in branches {
            writeln!(out, "branch: {} {}", rev, tag)?;
        }

        let mut symbols: Vec<_> = file.symbols.iter().collect();
        symbols.sort();
        for (tag, &rev_id) in symbols {
            writeln!(out, "symbol: {} {}", tag, engine.revision(rev_id).rev)?;
        }

        writeln!(out)?;
    }

    writeln!(out)?;

    for (counter, ps_id) in engine.patchsets_by_time().enumerate() {
        let ps = engine.patchset(ps_id);

        writeln!(out, "patchset: {}", counter + 1)?;
        writeln!(out, "date: {}", ps.date)?;
        writeln!(out, "author: {}", ps.author)?;
        if let Some(tag) = &ps.tag {
            writeln!(out, "tag: {}", tag)?;
        }
        writeln!(out, "tag_flags: {}", ps.tag_flags.bits())?;
        writeln!(out, "branch: {}", ps.branch)?;
        writeln!(out, "branch_add: {}", ps.branch_add as u8)?;

        writeln!(out, "descr:")?;
        out.write_all(ps.descr.as_bytes())?;
        if !ps.descr.is_empty() && !ps.descr.ends_with('\n') {
            writeln!(out)?;
        }
        writeln!(out, "{}", DESCR_SENTINEL)?;

        writeln!(out, "members:")?;
        for &m in &ps.members {
            let member = engine.member(m);
            let post = engine.revision(member.post_rev);
            let pre = match member.pre_rev {
                Some(pre) => engine.revision(pre).rev.to_string(),
                None => String::from(INITIAL),
            };
            writeln!(
                out,
                "file: {}; pre_rev: {}; post_rev: {}; dead: {}",
                engine.file(member.file).path,
                pre,
                post.rev,
                post.dead as u8
            )?;
        }

        writeln!(out)?;
    }

    out.flush()?;
    Ok(())
}
