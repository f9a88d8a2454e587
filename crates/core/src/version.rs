//! Version identifier
//!
//! A data-product version is named `<hash-prefix>-<date>`, where the prefix is
//! the first seven characters of the content hash produced by the
//! content-tracking layer and the date is the day the version was promoted.
//!
//! ## Examples
//!
//! - content hash `abcdef1234567890`, date `2024-03-01` -> `abcdef1-2024-03-01`
//!
//! The identifier is only ever derived, never stored on its own. It doubles as
//! the directory name under `downloads/<repo>/` and `data/<repo>/`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of content-hash characters kept in a version identifier
pub const HASH_PREFIX_LEN: usize = 7;

/// Date format used in version identifiers
pub const VERSION_DATE_FORMAT: &str = "%Y-%m-%d";

/// Human-sortable name of one promoted version of a data product
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    /// Derive the identifier from a content hash and a date string.
    ///
    /// Pure and deterministic: the same inputs always produce the same name.
    /// Hashes shorter than the prefix length are used whole.
    pub fn derive(hash: &str, date: &str) -> Self {
        let prefix: String = hash.chars().take(HASH_PREFIX_LEN).collect();
        VersionId(format!("{}-{}", prefix, date))
    }

    /// Derive the identifier from a content hash and a calendar date
    pub fn derive_on(hash: &str, date: NaiveDate) -> Self {
        Self::derive(hash, &date.format(VERSION_DATE_FORMAT).to_string())
    }

    /// Wrap an existing directory name without validation
    pub fn from_folder(name: impl Into<String>) -> Self {
        VersionId(name.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash prefix part (everything before the first `-`)
    pub fn hash_prefix(&self) -> &str {
        self.0.split_once('-').map(|(p, _)| p).unwrap_or(&self.0)
    }

    /// Embedded date, if the identifier carries a parseable one
    pub fn date(&self) -> Option<NaiveDate> {
        let (_, date) = self.0.split_once('-')?;
        NaiveDate::parse_from_str(date, VERSION_DATE_FORMAT).ok()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Short display form of a content hash
pub fn short_hash(hash: &str) -> &str {
    match hash.char_indices().nth(HASH_PREFIX_LEN) {
        Some((idx, _)) => &hash[..idx],
        None => hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_derive_known_value() {
        let v = VersionId::derive("abcdef1234567890", "2024-03-01");
        assert_eq!(v.as_str(), "abcdef1-2024-03-01");
    }

    #[test]
    fn test_derive_on_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let v = VersionId::derive_on("abcdef1234567890", date);
        assert_eq!(v.to_string(), "abcdef1-2024-03-01");
        assert_eq!(v.date(), Some(date));
        assert_eq!(v.hash_prefix(), "abcdef1");
    }

    #[test]
    fn test_short_hash_input() {
        let v = VersionId::derive("abc", "2024-03-01");
        assert_eq!(v.as_str(), "abc-2024-03-01");
    }

    #[test]
    fn test_same_hash_different_dates_differ() {
        let a = VersionId::derive("1111111aaaa", "2024-03-01");
        let b = VersionId::derive("1111111aaaa", "2024-03-02");
        assert_ne!(a, b);
        assert_eq!(a.hash_prefix(), b.hash_prefix());
    }

    #[test]
    fn test_legacy_folder_without_date() {
        let v = VersionId::from_folder("abcdef1");
        assert_eq!(v.date(), None);
        assert_eq!(v.hash_prefix(), "abcdef1");
    }

    #[test]
    fn test_short_hash_helper() {
        assert_eq!(short_hash("0123456789"), "0123456");
        assert_eq!(short_hash("01"), "01");
    }

    proptest! {
        #[test]
        fn prop_derive_is_deterministic(hash in "[0-9a-f]{7,40}", y in 2000i32..2100, m in 1u32..13, d in 1u32..29) {
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            let a = VersionId::derive_on(&hash, date);
            let b = VersionId::derive_on(&hash, date);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.hash_prefix(), &hash[..HASH_PREFIX_LEN]);
            prop_assert_eq!(a.date(), Some(date));
        }
    }
}
