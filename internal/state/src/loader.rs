use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use cvs_log::str_branch_of;
use patchset::{Engine, FileId, TagFlags};

use crate::{
    writer::{DESCR_SENTINEL, INITIAL},
    Error,
};

#[derive(Debug)]
enum State {
    Preamble,
    FileBody(FileId),
    PsFields,
    Descr,
    Members,
}

#[derive(Debug, Default)]
struct PendingPs {
    date: i64,
    author: String,
    tag: Option<String>,
    tag_flags: u8,
    branch: String,
    branch_add: bool,
    descr: String,
    members: Vec<PendingMember>,
}

#[derive(Debug)]
struct PendingMember {
    path: String,
    pre: String,
    post: String,
    dead: bool,
}

/// Reloads a cache written by [`write_cache`](crate::write_cache) into
/// `engine`, rebuilding all in-memory cross-references. Returns the cache
/// timestamp, or `None` when there is no cache to load.
pub fn read_cache(engine: &mut Engine, path: &Path) -> Result<Option<i64>, Error> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut cache_date = None;
    let mut state = State::Preamble;
    let mut pending: Option<PendingPs> = None;

    for line in BufReader::new(file).lines() {
        let line = line?;

        state = match state {
            State::Preamble => {
                if line.is_empty() {
                    State::Preamble
                } else if let Some(date) = line.strip_prefix("cache date: ") {
                    cache_date = Some(
                        date.trim()
                            .parse()
                            .map_err(|_| Error::Malformed(line.clone()))?,
                    );
                    State::Preamble
                } else if let Some(path) = line.strip_prefix("file: ") {
                    State::FileBody(engine.find_or_create_file(path))
                } else if line.starts_with("patchset: ") {
                    pending = Some(PendingPs::default());
                    State::PsFields
                } else {
                    return Err(Error::Malformed(line));
                }
            }

            State::FileBody(file_id) => {
                if line.is_empty() {
                    // All branches for the file are known now; later
                    // revision sightings (incremental refresh) may resolve
                    // their branch.
                    engine.file_mut(file_id).have_branches = true;
                    State::Preamble
                } else {
                    load_file_line(engine, file_id, &line)?;
                    State::FileBody(file_id)
                }
            }

            State::PsFields => {
                let ps = pending.as_mut().ok_or_else(|| Error::Malformed(line.clone()))?;

                if let Some(date) = line.strip_prefix("date: ") {
                    ps.date = date.trim().parse().map_err(|_| Error::Malformed(line.clone()))?;
                    State::PsFields
                } else if let Some(author) = line.strip_prefix("author: ") {
                    ps.author = author.into();
                    State::PsFields
                } else if let Some(tag) = line.strip_prefix("tag: ") {
                    ps.tag = Some(tag.into());
                    State::PsFields
                } else if let Some(flags) = line.strip_prefix("tag_flags: ") {
                    ps.tag_flags = flags
                        .trim()
                        .parse()
                        .map_err(|_| Error::Malformed(line.clone()))?;
                    State::PsFields
                } else if let Some(branch) = line.strip_prefix("branch: ") {
                    ps.branch = branch.into();
                    State::PsFields
                } else if let Some(add) = line.strip_prefix("branch_add: ") {
                    ps.branch_add = add.trim() == "1";
                    State::PsFields
                } else if line == "descr:" {
                    State::Descr
                } else if line == "members:" {
                    State::Members
                } else {
                    return Err(Error::Malformed(line));
                }
            }

            State::Descr => {
                if line == DESCR_SENTINEL {
                    State::PsFields
                } else {
                    let ps = pending.as_mut().ok_or_else(|| Error::Malformed(line.clone()))?;
                    ps.descr.push_str(&line);
                    ps.descr.push('\n');
                    State::Descr
                }
            }

            State::Members => {
                if line.is_empty() {
                    let ps = pending.take().ok_or_else(|| Error::Malformed(line.clone()))?;
                    load_patch_set(engine, ps)?;
                    State::Preamble
                } else {
                    let ps = pending.as_mut().ok_or_else(|| Error::Malformed(line.clone()))?;
                    ps.members.push(parse_member_line(&line)?);
                    State::Members
                }
            }
        };
    }

    // A cache that ends without a trailing blank line still counts.
    match state {
        State::FileBody(file_id) => engine.file_mut(file_id).have_branches = true,
        State::Members => {
            if let Some(ps) = pending.take() {
                load_patch_set(engine, ps)?;
            }
        }
        _ => {}
    }

    Ok(cache_date)
}

/// One line of a file section: a `branch:` or `symbol:` entry, or a bare
/// `<rev> <branch> <dead>` revision line.
fn load_file_line(engine: &mut Engine, file_id: FileId, line: &str) -> Result<(), Error> {
    if let Some(rest) = line.strip_prefix("branch: ") {
        let (rev, tag) = rest
            .split_once(' ')
            .ok_or_else(|| Error::Malformed(line.into()))?;
        engine.add_file_branch(file_id, rev, tag);
        return Ok(());
    }

    if let Some(rest) = line.strip_prefix("symbol: ") {
        let (tag, rev) = rest
            .split_once(' ')
            .ok_or_else(|| Error::Malformed(line.into()))?;
        engine.add_file_symbol(file_id, tag, rev)?;
        return Ok(());
    }

    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(rev), Some(branch), Some(dead)) => {
            let rev_id = engine.file_add_revision(file_id, rev)?;
            if branch != INITIAL {
                let branch = engine.intern(branch);
                engine.revision_mut(rev_id).branch = Some(branch);
            }
            if dead == "1" {
                engine.revision_mut(rev_id).dead = true;
            }
            Ok(())
        }
        _ => Err(Error::Malformed(line.into())),
    }
}

fn parse_member_line(line: &str) -> Result<PendingMember, Error> {
    let malformed = || Error::Malformed(line.into());

    let rest = line.strip_prefix("file: ").ok_or_else(malformed)?;
    let (rest, dead) = rest.rsplit_once("; dead: ").ok_or_else(malformed)?;
    let (rest, post) = rest.rsplit_once("; post_rev: ").ok_or_else(malformed)?;
    let (path, pre) = rest.rsplit_once("; pre_rev: ").ok_or_else(malformed)?;

    Ok(PendingMember {
        path: path.into(),
        pre: pre.into(),
        post: post.into(),
        dead: dead.trim() == "1",
    })
}

/// Recreates one patch set and its members, wiring the same cross-links the
/// linker produces on a live parse: `pre_psm` for same-branch ancestry,
/// `branch_children` when the member is the first revision of a branch.
fn load_patch_set(engine: &mut Engine, ps: PendingPs) -> Result<(), Error> {
    // Cached patch sets are already canonical, so dedup runs with zero fuzz.
    let ps_id = engine.find_or_insert_patch_set(ps.date, &ps.author, &ps.descr, &ps.branch, 0)?;

    let tag = ps.tag.map(|tag| engine.intern(&tag));
    {
        let patchset = engine.patchset_mut(ps_id);
        patchset.tag = tag;
        patchset.tag_flags = TagFlags::from_bits_truncate(ps.tag_flags);
        patchset.branch_add = ps.branch_add;
    }

    for member in ps.members {
        let file = engine
            .find_file(&member.path)
            .ok_or(Error::UnknownFile(member.path))?;
        let post_rev = engine.file_get_revision(file, &member.post)?;
        if member.dead {
            engine.revision_mut(post_rev).dead = true;
        }

        let member_id = engine.create_member(file, post_rev);

        if member.pre != INITIAL {
            let pre_rev = engine.file_get_revision(file, &member.pre)?;
            engine.member_mut(member_id).pre_rev = Some(pre_rev);

            let post_str = engine.revision(post_rev).rev.clone();
            let pre_str = engine.revision(pre_rev).rev.clone();
            if str_branch_of(&post_str) == str_branch_of(&pre_str) {
                engine.revision_mut(pre_rev).pre_psm = Some(member_id);
            } else {
                engine.revision_mut(pre_rev).branch_children.push(post_rev);
            }
        }

        engine.patch_set_add_member(ps_id, member_id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_cache;
    use cvs_log::{Event, RevisionRecord};
    use patchset::PatchSetId;

    fn feed(engine: &mut Engine, events: Vec<Event>, fuzz: i64) {
        for event in events {
            engine.apply(event, fuzz).unwrap();
        }
    }

    fn file(path: &str) -> Event {
        Event::File { path: path.into() }
    }

    fn symbol(tag: &str, rev: &str) -> Event {
        Event::Symbol {
            tag: tag.into(),
            rev: rev.into(),
        }
    }

    fn revision(rev: &str, date: i64, dead: bool, log: &str) -> Event {
        Event::Revision(RevisionRecord {
            rev: rev.into(),
            date,
            author: String::from("alice"),
            dead,
            log: log.into(),
        })
    }

    fn fixture() -> Engine {
        let mut engine = Engine::new();
        feed(
            &mut engine,
            vec![
                file("dir/a.c"),
                symbol("V1", "1.2"),
                symbol("FEATURE", "1.1.0.2"),
                Event::SymbolsEnd,
                revision("1.2", 1000, false, "fix\n"),
                revision("1.1", 900, false, "import\n"),
                revision("1.1.2.1", 1100, false, "branch work\n"),
                Event::FileEnd,
                file("b.c"),
                symbol("V1", "1.1"),
                Event::SymbolsEnd,
                revision("1.2", 1005, true, "fix\n"),
                revision("1.1", 900, false, "import\n"),
                Event::FileEnd,
            ],
            300,
        );
        engine.resolve_global_symbols(None, None);
        engine
    }

    /// Everything the presentation pass can observe about a patch set.
    fn enumerate(engine: &Engine) -> Vec<(i64, String, String, String, Option<String>, u8, bool, Vec<(String, Option<String>, String, bool)>)> {
        engine
            .patchsets_by_time()
            .map(|id| {
                let ps = engine.patchset(id);
                (
                    ps.date,
                    ps.author.to_string(),
                    ps.descr.to_string(),
                    ps.branch.to_string(),
                    ps.tag.as_ref().map(|t| t.to_string()),
                    ps.tag_flags.bits(),
                    ps.branch_add,
                    ps.members
                        .iter()
                        .map(|&m| {
                            let member = engine.member(m);
                            (
                                engine.file(member.file).path.to_string(),
                                member.pre_rev.map(|r| engine.revision(r).rev.to_string()),
                                engine.revision(member.post_rev).rev.to_string(),
                                engine.revision(member.post_rev).dead,
                            )
                        })
                        .collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_round_trip() -> anyhow::Result<()> {
        let engine = fixture();

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cvsps.cache");
        write_cache(&engine, &path, 12345)?;

        let mut reloaded = Engine::new();
        let date = read_cache(&mut reloaded, &path)?;

        assert_eq!(date, Some(12345));
        assert_eq!(enumerate(&engine), enumerate(&reloaded));

        // Cross-links survive the trip: the branch revision hangs off its
        // branch point in both models.
        let file_id = reloaded.find_file("dir/a.c").unwrap();
        let bp = reloaded.file_get_revision(file_id, "1.1")?;
        let child = reloaded.file_get_revision(file_id, "1.1.2.1")?;
        assert_eq!(reloaded.revision(bp).branch_children, vec![child]);
        assert_eq!(
            reloaded.file(file_id).branches_sym.get("FEATURE").map(|r| r.to_string()),
            Some(String::from("1.1.2"))
        );

        Ok(())
    }

    #[test]
    fn test_missing_cache() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut engine = Engine::new();

        assert_eq!(
            read_cache(&mut engine, &dir.path().join("nope"))?,
            None
        );
        assert_eq!(engine.patchsets_by_time().count(), 0);

        Ok(())
    }

    #[test]
    fn test_incremental_refresh_overlap() -> anyhow::Result<()> {
        // First run writes the cache; the second reloads it and re-parses a
        // log window that overlaps the newest cached revision by one, plus a
        // genuinely new revision. The overlap must dedup, the new revision
        // must link to the cached one.
        let engine = fixture();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cvsps.cache");
        write_cache(&engine, &path, 1100)?;

        let mut refreshed = Engine::new();
        read_cache(&mut refreshed, &path)?;
        let before = refreshed.patchsets_by_time().count();

        feed(
            &mut refreshed,
            vec![
                file("dir/a.c"),
                symbol("V1", "1.2"),
                symbol("FEATURE", "1.1.0.2"),
                Event::SymbolsEnd,
                revision("1.3", 2000, false, "new work\n"),
                revision("1.2", 1000, false, "fix\n"),
                Event::FileEnd,
            ],
            300,
        );

        assert_eq!(refreshed.patchsets_by_time().count(), before + 1);

        let file_id = refreshed.find_file("dir/a.c").unwrap();
        let r13 = refreshed.file_get_revision(file_id, "1.3")?;
        let r12 = refreshed.file_get_revision(file_id, "1.2")?;

        let m13 = refreshed.revision(r13).post_psm.unwrap();
        assert_eq!(refreshed.member(m13).pre_rev, Some(r12));
        assert_eq!(refreshed.revision(r12).pre_psm, Some(m13));

        // The cached member for 1.2 is untouched.
        let m12 = refreshed.revision(r12).post_psm.unwrap();
        assert_eq!(refreshed.member(m12).pre_rev, Some(refreshed.file_get_revision(file_id, "1.1")?));

        Ok(())
    }

    #[test]
    fn test_empty_descr_round_trips() -> anyhow::Result<()> {
        let mut engine = Engine::new();
        feed(
            &mut engine,
            vec![
                file("a"),
                Event::SymbolsEnd,
                revision("1.1", 100, false, ""),
                Event::FileEnd,
            ],
            0,
        );

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cvsps.cache");
        write_cache(&engine, &path, 1)?;

        let mut reloaded = Engine::new();
        read_cache(&mut reloaded, &path)?;

        let ps: Vec<PatchSetId> = reloaded.patchsets_by_time().collect();
        assert_eq!(ps.len(), 1);
        assert_eq!(&*reloaded.patchset(ps[0]).descr, "");

        Ok(())
    }
}
