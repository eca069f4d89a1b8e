//! Reads the checked-out sandbox's `CVS/Root` and `CVS/Repository` to work
//! out the prefix that `RCS file:` paths carry in the log output.

use std::{fs, path::Path};

use anyhow::Context;

/// Computes the strip prefix for the sandbox rooted at `dir`.
///
/// The Root file is a CVSROOT spec (`:pserver:user@host:/cvsroot` or a bare
/// path); only the part after the last colon matters. Some servers repeat
/// the CVSROOT as a prefix of the Repository path, in which case the
/// Repository alone is the prefix.
pub fn strip_path(dir: impl AsRef<Path>) -> anyhow::Result<String> {
    let dir = dir.as_ref();

    let root = read_first_line(&dir.join("CVS/Root")).context("can't read CVS/Root")?;
    let repository =
        read_first_line(&dir.join("CVS/Repository")).context("can't read CVS/Repository")?;

    let root_path = match root.rsplit_once(':') {
        Some((_, path)) => path,
        None => &root,
    };
    let root_path = root_path.trim_end_matches('/');

    let strip = if repository.starts_with(root_path) {
        format!("{}/", repository)
    } else {
        format!("{}/{}/", root_path, repository)
    };

    log::debug!("strip path: {}", strip);
    Ok(strip)
}

fn read_first_line(path: &Path) -> anyhow::Result<String> {
    let contents = fs::read_to_string(path)?;
    contents
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("{} is empty", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sandbox(root: &str, repository: &str) -> anyhow::Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join("CVS"))?;
        fs::write(dir.path().join("CVS/Root"), format!("{}\n", root))?;
        fs::write(dir.path().join("CVS/Repository"), format!("{}\n", repository))?;
        Ok(dir)
    }

    #[test]
    fn test_strip_path() -> anyhow::Result<()> {
        // Remote root: only the path part counts.
        let dir = sandbox(":pserver:anonymous@cvs.example.org:/cvsroot", "module")?;
        assert_eq!(strip_path(dir.path())?, "/cvsroot/module/");

        // Local root, trailing slash stripped before joining.
        let dir = sandbox("/var/cvs/", "module/sub")?;
        assert_eq!(strip_path(dir.path())?, "/var/cvs/module/sub/");

        // Repository already includes the root.
        let dir = sandbox("/var/cvs", "/var/cvs/module")?;
        assert_eq!(strip_path(dir.path())?, "/var/cvs/module/");

        Ok(())
    }

    #[test]
    fn test_missing_sandbox_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(strip_path(dir.path()).is_err());
        Ok(())
    }
}
