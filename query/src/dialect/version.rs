use std::sync::OnceLock;

use regex::Regex;

/// A `major.minor.patch` triple pulled out of a server version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self { Self { major, minor, patch } }

    /// Find the first version-looking triple in a vendor string such as
    /// `PostgreSQL 13.4 on x86_64-pc-linux-gnu` or `CockroachDB CCL v23.1.11`. MariaDB servers
    /// prefix their real version with `5.5.5-` for old MySQL clients; that prefix is skipped.
    pub fn parse(input: &str) -> Option<Version> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").ok()).as_ref()?;

        let input = input.trim();
        let input = match input.strip_prefix("5.5.5-") {
            Some(rest) if rest.contains("MariaDB") => rest,
            _ => input,
        };

        let captures = pattern.captures(input)?;
        let number = |i: usize| captures.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
        Some(Version { major: number(1)?, minor: number(2)?, patch: number(3).unwrap_or(0) })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}.{}.{}", self.major, self.minor, self.patch) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_strings() {
        assert_eq!(Version::parse("16.2"), Some(Version::new(16, 2, 0)));
        assert_eq!(Version::parse("PostgreSQL 13.4 on x86_64-pc-linux-gnu"), Some(Version::new(13, 4, 0)));
        assert_eq!(Version::parse("CockroachDB CCL v23.1.11 (x86_64-pc-linux-gnu)"), Some(Version::new(23, 1, 11)));
        assert_eq!(Version::parse("5.5.5-10.11.2-MariaDB-1:10.11.2+maria~ubu2204"), Some(Version::new(10, 11, 2)));
        assert_eq!(Version::parse("5.5.5-log"), Some(Version::new(5, 5, 5)));
        assert_eq!(Version::parse("unknown"), None);
    }

    #[test]
    fn test_ordering() {
        assert!(Version::new(8, 0, 4) > Version::new(5, 7, 42));
        assert!(Version::new(3, 38, 0) <= Version::new(3, 45, 1));
    }
}
