//! Presentation: walks the time-ordered patch-set index, applies the user's
//! restrictions and prints the surviving records, optionally with diffs.

use std::{
    fs::File,
    io::{self, Write},
};

use chrono::{Local, TimeZone};
use cvs_patchset_process as process;
use patchset::{Engine, PatchSetId};

use crate::{filter::Restrictions, Opt};

pub fn show_patch_sets(
    engine: &Engine,
    opt: &Opt,
    restrictions: &mut Restrictions,
) -> anyhow::Result<()> {
    // With --summary-first the walk runs twice: summaries only, then diffs
    // only. The tag-range state in `restrictions` carries across passes,
    // which is what lets a range whose end tag resolves late still apply.
    let passes = if opt.summary_first { 2 } else { 1 };

    for pass in 1..=passes {
        let summaries = !opt.summary_first || pass == 1;
        let diffs = !restrictions.ranges.is_empty() && (!opt.summary_first || pass == 2);

        let mut counter = 0;
        for id in engine.patchsets_by_time() {
            // Branch-add patch sets are synthetic; they don't even count.
            if engine.patchset(id).branch_add {
                continue;
            }
            counter += 1;

            if !restrictions.select(engine, id, counter) {
                continue;
            }

            let mut patch_file = None;
            if let Some(dir) = &opt.patch_set_dir {
                let path = dir.join(format!("{}.patch", counter));
                patch_file = Some(File::create(&path).map_err(|e| {
                    anyhow::anyhow!("can't open patch file {}: {}", path.display(), e)
                })?);
                eprintln!("Directing PatchSet {} to file {}", counter, path.display());
            }

            if summaries {
                match &mut patch_file {
                    Some(file) => print_patch_set(file, engine, id, counter)?,
                    None => print_patch_set(&mut io::stdout().lock(), engine, id, counter)?,
                }
            }

            if diffs {
                emit_diffs(engine, id, opt.norc, patch_file.as_ref())?;
            }
        }
    }

    Ok(())
}

fn print_patch_set<W: Write>(
    w: &mut W,
    engine: &Engine,
    id: PatchSetId,
    counter: usize,
) -> anyhow::Result<()> {
    let ps = engine.patchset(id);

    let date = match Local.timestamp_opt(ps.date, 0).single() {
        Some(date) => date.format("%Y/%m/%d %H:%M:%S").to_string(),
        None => ps.date.to_string(),
    };

    // This short dashed line is distinct from the 28-hyphen record
    // separator in the log input.
    writeln!(w, "---------------------")?;
    writeln!(
        w,
        "PatchSet {} {}",
        counter,
        if ps.funk_factor > 0 { "(FUNKY)" } else { "" }
    )?;
    writeln!(w, "Date: {}", date)?;
    writeln!(w, "Author: {}", ps.author)?;
    writeln!(w, "Branch: {}", ps.branch)?;
    writeln!(
        w,
        "Tag: {} {}",
        ps.tag.as_deref().unwrap_or("(none)"),
        ps.tag_flags.describe()
    )?;
    write!(w, "Log:\n{}\n", ps.descr)?;
    writeln!(w, "Members: ")?;

    for &m in &ps.members {
        let member = engine.member(m);
        let post = engine.revision(member.post_rev);
        let pre = match member.pre_rev {
            Some(pre) => engine.revision(pre).rev.to_string(),
            None => String::from("INITIAL"),
        };
        writeln!(
            w,
            "\t{}:{}->{}{}",
            engine.file(member.file).path,
            pre,
            post.rev,
            if post.dead { "(DEAD)" } else { "" }
        )?;
    }

    writeln!(w)?;
    // Child processes may write to the same descriptor next.
    w.flush()?;

    Ok(())
}

fn emit_diffs(
    engine: &Engine,
    id: PatchSetId,
    norc: bool,
    redirect: Option<&File>,
) -> anyhow::Result<()> {
    for &m in &engine.patchset(id).members {
        let member = engine.member(m);
        let post = engine.revision(member.post_rev);

        // A dead predecessor happens when a file was added on a branch;
        // treat the member as a fresh appearance.
        let pre = member
            .pre_rev
            .map(|r| engine.revision(r))
            .filter(|rev| !rev.dead);

        process::diff_patch_set_member(
            norc,
            &engine.file(member.file).path,
            pre.map(|rev| &*rev.rev),
            &post.rev,
            post.dead,
            redirect,
        )?;
    }

    Ok(())
}
