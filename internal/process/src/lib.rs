//! Child-process plumbing: spawning `cvs log` and producing per-member
//! diffs via the external tooling.

use std::{
    fs::File,
    io::BufReader,
    process::{Child, ChildStdout, Command, Stdio},
};

mod error;

pub use self::error::Error;

/// A running `cvs log` child whose stdout is consumed line by line.
#[derive(Debug)]
pub struct CvsLog {
    child: Child,
}

impl CvsLog {
    /// Spawns `cvs [-f] log`, optionally windowed to entries newer than
    /// `since`.
    ///
    /// The window uses two date arguments separated by `;`: everything more
    /// recent than the date, plus the single revision no later than it, so
    /// an incremental refresh overlaps the cache by exactly one revision per
    /// file — which is what fills in `pre_rev` for the oldest new member.
    pub fn spawn(norc: bool, since: Option<&str>) -> Result<Self, Error> {
        let mut command = Command::new("cvs");
        if norc {
            command.arg("-f");
        }
        command.arg("log");
        if let Some(date) = since {
            command.arg("-d").arg(format!("{}<;{}", date, date));
        }

        log::debug!("spawning {:?}", command);
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| Error::spawn("cvs log", err))?;

        Ok(Self { child })
    }

    /// Takes the child's stdout as a buffered reader. Can only be called
    /// once.
    pub fn reader(&mut self) -> Result<BufReader<ChildStdout>, Error> {
        self.child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or(Error::StdoutPipe)
    }

    /// Reaps the child once the stream is drained.
    pub fn wait(mut self) -> Result<(), Error> {
        let status = self.child.wait()?;
        if !status.success() {
            log::warn!("cvs log exited with {}", status);
        }
        Ok(())
    }
}

/// Emits a unified diff for one patch-set member to `redirect` (or inherited
/// stdout when `None`).
///
/// `pre_rev` must be `None` when the member represents the file appearing:
/// either a true INITIAL, or a predecessor that is a dead revision (a file
/// added on a branch). A dead `post_rev` means the file was removed. The
/// external tool's exit status is not an error signal here (`diff` exits
/// non-zero whenever there are differences), so it is only logged.
pub fn diff_patch_set_member(
    norc: bool,
    path: &str,
    pre_rev: Option<&str>,
    post_rev: &str,
    post_dead: bool,
    redirect: Option<&File>,
) -> Result<(), Error> {
    let cmdline = diff_command(norc, path, pre_rev, post_rev, post_dead);
    log::debug!("running {}", cmdline);

    let mut command = Command::new("sh");
    command.arg("-c").arg(&cmdline);
    if let Some(file) = redirect {
        command.stdout(Stdio::from(file.try_clone()?));
    }

    let status = command
        .status()
        .map_err(|err| Error::spawn("diff pipeline", err))?;
    if !status.success() {
        log::debug!("diff pipeline exited with {}", status);
    }

    Ok(())
}

fn diff_command(
    norc: bool,
    path: &str,
    pre_rev: Option<&str>,
    post_rev: &str,
    post_dead: bool,
) -> String {
    let norc = if norc { "-f " } else { "" };
    let file = escape_filename(path);

    match pre_rev {
        // Added: diff the revision content against /dev/null, rewriting the
        // header lines so the patch applies to the real path.
        None => format!(
            "cvs {}update -p -r {} {} | diff -u /dev/null - | sed -e '1 s|^--- /dev/null|--- {}|g' -e '2 s|^+++ -|+++ {}|g'",
            norc, post_rev, file, file, file
        ),
        // Removed: the mirror image.
        Some(pre_rev) if post_dead => format!(
            "cvs {}update -p -r {} {} | diff -u - /dev/null | sed -e '1 s|^--- -|--- {}|g' -e '2 s|^+++ /dev/null|+++ {}|g'",
            norc, pre_rev, file, file, file
        ),
        Some(pre_rev) => format!(
            "cvs {}diff -u -r {} -r {} {}",
            norc, pre_rev, post_rev, file
        ),
    }
}

/// Backslash-escapes the characters the shell would otherwise interpret.
fn escape_filename(src: &str) -> String {
    const NAUGHTY: &str = " \\\"'@<>=;|&()#$`?*[!:{";

    let mut out = String::with_capacity(src.len());
    for c in src.chars() {
        if NAUGHTY.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_filename() {
        assert_eq!(escape_filename("plain/path.c"), "plain/path.c");
        assert_eq!(escape_filename("has space.c"), "has\\ space.c");
        assert_eq!(escape_filename("a;b&c"), "a\\;b\\&c");
        assert_eq!(escape_filename("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_diff_command_shapes() {
        assert_eq!(
            diff_command(false, "f.c", Some("1.1"), "1.2", false),
            "cvs diff -u -r 1.1 -r 1.2 f.c"
        );
        assert_eq!(
            diff_command(true, "f.c", Some("1.1"), "1.2", false),
            "cvs -f diff -u -r 1.1 -r 1.2 f.c"
        );

        let added = diff_command(false, "f.c", None, "1.1", false);
        assert!(added.starts_with("cvs update -p -r 1.1 f.c | diff -u /dev/null -"));

        let removed = diff_command(false, "f.c", Some("1.4"), "1.5", true);
        assert!(removed.starts_with("cvs update -p -r 1.4 f.c | diff -u - /dev/null"));
    }
}
