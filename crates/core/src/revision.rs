//! Definition revisions.
//!
//! Authored artifacts are immutable once published; edits produce a new
//! revision. The coordinator always addresses a definition as
//! `(ref, revision)` and never observes in-place mutation.

use serde::{Deserialize, Serialize};

/// A monotonically increasing definition revision number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(u32);

impl Revision {
    /// The first published revision.
    pub const INITIAL: Self = Self(1);

    /// Create a revision from a raw number.
    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    /// The raw revision number.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// The revision after this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u32> for Revision {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_and_next() {
        assert_eq!(Revision::INITIAL.get(), 1);
        assert_eq!(Revision::INITIAL.next(), Revision::new(2));
    }

    #[test]
    fn display_prefixes_v() {
        assert_eq!(Revision::new(7).to_string(), "v7");
    }

    #[test]
    fn ordering() {
        assert!(Revision::new(1) < Revision::new(2));
    }

    #[test]
    fn serde_transparent() {
        let json = serde_json::to_string(&Revision::new(3)).unwrap();
        assert_eq!(json, "3");
        let back: Revision = serde_json::from_str("3").unwrap();
        assert_eq!(back, Revision::new(3));
    }
}
