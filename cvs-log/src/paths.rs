/// Strips the repository prefix from an `RCS file:` path and removes the
/// `Attic/` component if it is the last directory in the path (CVS moves
/// deleted files into the Attic; the logical path doesn't include it).
///
/// Returns `None` when the path doesn't start with the prefix, which happens
/// when a subdirectory has a different Repository path than its parent; such
/// files are skipped.
pub fn strip_rcs_path(raw: &str, prefix: &str) -> Option<String> {
    raw.strip_prefix(prefix).map(strip_attic)
}

fn strip_attic(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("Attic", file)) => file.into(),
        Some((dir, file)) if dir.ends_with("/Attic") => {
            format!("{}/{}", &dir[..dir.len() - "/Attic".len()], file)
        }
        _ => path.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! assert_strip {
        ($raw:expr, $prefix:expr, $want:expr) => {
            assert_eq!(strip_rcs_path($raw, $prefix), Some(String::from($want)))
        };
    }

    #[test]
    fn test_strip_rcs_path() {
        assert_strip!("foo", "", "foo");
        assert_strip!("foo/bar", "", "foo/bar");
        assert_strip!("/cvsroot/module/foo", "/cvsroot/module/", "foo");
        assert_strip!("/cvsroot/module/dir/foo", "/cvsroot/module/", "dir/foo");

        // Attic stripping, at any depth.
        assert_strip!("Attic/foo", "", "foo");
        assert_strip!("dir/Attic/foo", "", "dir/foo");
        assert_strip!("/r/m/dir/Attic/foo", "/r/m/", "dir/foo");

        // Attic only strips as the final directory component.
        assert_strip!("Attic", "", "Attic");
        assert_strip!("foo/Attic", "", "foo/Attic");
        assert_strip!("Attic/Attic/foo", "", "Attic/foo");

        // Prefix mismatch means the file is skipped entirely.
        assert_eq!(strip_rcs_path("/other/foo", "/cvsroot/module/"), None);
    }
}
