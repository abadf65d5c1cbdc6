//! Revision numbering for documents and attachments.
//!
//! Versions are `major.minor` pairs ordered lexicographically. The log of
//! revisions for one identity is keyed by version, strictly increasing;
//! "current" is always the highest version.

use std::fmt;
use std::str::FromStr;

/// The kind of edit, which decides how the next version is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    /// Small content tweak: 2.1 -> 2.2
    Minor,
    /// Publish or structural change: 2.2 -> 3.1
    Major,
    /// Non-authorial save. The log must stay strictly increasing, so this
    /// bumps the minor component like a minor edit.
    Admin,
}

/// A `major.minor` revision number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: i64,
    pub minor: i64,
}

impl Version {
    /// The version assigned to the first revision of any identity.
    pub const FIRST: Version = Version { major: 1, minor: 1 };

    pub fn new(major: i64, minor: i64) -> Self {
        Self { major, minor }
    }

    /// Compute the version following this one for the given edit kind.
    pub fn next(self, kind: EditKind) -> Version {
        match kind {
            EditKind::Major => Version {
                major: self.major + 1,
                minor: 1,
            },
            EditKind::Minor | EditKind::Admin => Version {
                major: self.major,
                minor: self.minor + 1,
            },
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Error returned when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError(pub String);

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version: {}", self.0)
    }
}

impl std::error::Error for ParseVersionError {}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| ParseVersionError(s.to_string()))?;
        let major: i64 = major.parse().map_err(|_| ParseVersionError(s.to_string()))?;
        let minor: i64 = minor.parse().map_err(|_| ParseVersionError(s.to_string()))?;
        if major < 0 || minor < 0 {
            return Err(ParseVersionError(s.to_string()));
        }
        Ok(Version { major, minor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_version() {
        assert_eq!(Version::FIRST.to_string(), "1.1");
    }

    #[test]
    fn test_minor_edit_bumps_minor() {
        let v = Version::new(1, 1).next(EditKind::Minor);
        assert_eq!(v, Version::new(1, 2));
    }

    #[test]
    fn test_major_edit_resets_minor() {
        let v = Version::new(1, 2).next(EditKind::Major);
        assert_eq!(v, Version::new(2, 1));
    }

    #[test]
    fn test_admin_edit_bumps_minor() {
        let v = Version::new(3, 4).next(EditKind::Admin);
        assert_eq!(v, Version::new(3, 5));
    }

    #[test]
    fn test_ordering() {
        assert!(Version::new(1, 2) < Version::new(2, 1));
        assert!(Version::new(2, 1) < Version::new(2, 2));
        assert!(Version::new(10, 1) > Version::new(9, 9));
    }

    #[test]
    fn test_parse_roundtrip() {
        let v: Version = "4.2".parse().unwrap();
        assert_eq!(v, Version::new(4, 2));
        assert_eq!(v.to_string(), "4.2");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Version>().is_err());
        assert!("1".parse::<Version>().is_err());
        assert!("1.x".parse::<Version>().is_err());
        assert!("-1.1".parse::<Version>().is_err());
    }
}
