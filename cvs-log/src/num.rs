use std::{fmt::Display, str::FromStr};

use itertools::Itertools;

use crate::Error;

/// A dotted CVS revision number, e.g. `1.4` or `1.4.2.1`.
///
/// CVS uses the same number space for commits, branches and the "magic
/// branch" encoding found in symbol tables: a symbol mapped to `A.B.0.N`
/// names the branch whose commits are numbered `A.B.N.*`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Num(Vec<u32>);

impl Num {
    /// Returns the enclosing branch number, i.e. the revision with the last
    /// component removed. `None` when there is no dot left to chop.
    pub fn branch(&self) -> Option<Num> {
        if self.0.len() < 2 {
            None
        } else {
            Some(Num(self.0[0..self.0.len() - 1].to_vec()))
        }
    }

    /// The value of the last dotted component.
    pub fn leaf(&self) -> u32 {
        self.0[self.0.len() - 1]
    }

    /// True for commits directly on the trunk (`1.1`, `2.34`, ...).
    pub fn is_trunk_commit(&self) -> bool {
        self.0.len() == 2
    }

    /// Decodes the magic-branch form: `A.B.0.N` names the branch `A.B.N`.
    /// Returns `None` for anything that isn't magic.
    pub fn magic_branch(&self) -> Option<Num> {
        let n = self.0.len();
        if n >= 3 && self.0[n - 2] == 0 {
            let mut parts = self.0[0..n - 2].to_vec();
            parts.push(self.0[n - 1]);
            Some(Num(parts))
        } else {
            None
        }
    }

    /// Vendor-branch revisions (`1.1.1`, `1.1.1.1.1`, ...) have an odd
    /// number of components. Import workflows tag these directly, so symbol
    /// classification needs to treat them as branches rather than tags.
    pub fn is_vendor_branch(&self) -> bool {
        self.0.len() % 2 == 1
    }
}

impl FromStr for Num {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::EmptyNum);
        }

        Ok(Num(s
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<u32>, _>>()?))
    }
}

impl Display for Num {
    #[allow(unstable_name_collisions)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.0
                .iter()
                .map(|part| part.to_string())
                .intersperse(String::from("."))
                .collect::<String>()
        )
    }
}

/// Chops the last dotted component off a revision string, returning the
/// enclosing branch revision. Works on the raw string form so callers that
/// hold interned revision strings don't have to re-parse to walk upwards.
pub fn str_branch_of(rev: &str) -> Option<&str> {
    rev.rsplit_once('.').map(|(branch, _)| branch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display() {
        for s in ["1.1", "1.4.2.1", "1.1.1", "10.20.30"] {
            assert_eq!(num(s).to_string(), s);
        }

        assert!(Num::from_str("").is_err());
        assert!(Num::from_str("1.x.2").is_err());
        assert!(Num::from_str("1..2").is_err());
    }

    #[test]
    fn test_branch_and_leaf() {
        assert_eq!(num("1.4.2.1").branch(), Some(num("1.4.2")));
        assert_eq!(num("1.4").branch(), Some(num("1")));
        assert_eq!(num("1").branch(), None);

        assert_eq!(num("1.4.2.7").leaf(), 7);
        assert_eq!(num("3").leaf(), 3);
    }

    #[test]
    fn test_magic_branch() {
        assert_eq!(num("1.4.0.2").magic_branch(), Some(num("1.4.2")));
        assert_eq!(num("1.0.3").magic_branch(), Some(num("1.3")));
        assert_eq!(num("1.4.2.1").magic_branch(), None);
        assert_eq!(num("1.4").magic_branch(), None);
    }

    #[test]
    fn test_vendor_branch() {
        assert!(num("1.1.1").is_vendor_branch());
        assert!(!num("1.1").is_vendor_branch());
        assert!(!num("1.1.1.1").is_vendor_branch());
    }

    #[test]
    fn test_str_branch_of() {
        assert_eq!(str_branch_of("1.4.2.1"), Some("1.4.2"));
        assert_eq!(str_branch_of("1.4"), Some("1"));
        assert_eq!(str_branch_of("1"), None);
    }

    fn num(s: &str) -> Num {
        Num::from_str(s).unwrap()
    }
}
