//! Filesystem-safe partition keys.

use std::fmt;

use serde::Serialize;

use super::cell::CellValue;

/// Characters that cannot appear in an output file name.
const UNSAFE_CHARS: [char; 3] = ['/', '\\', ':'];

/// Normalized key identifying one output file.
///
/// Two raw values that normalize to the same string share a key, and their
/// rows land in the same output file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Derives the key for a cell value.
    pub fn resolve(value: &CellValue) -> Self {
        Self::from_raw(&value.to_key_string())
    }

    /// Derives the key for an already stringified value.
    pub fn from_raw(raw: &str) -> Self {
        Self(raw.replace(UNSAFE_CHARS, "_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Output file name for this key with the given extension.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0, extension)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_replaces_unsafe_characters() {
        assert_eq!(PartitionKey::from_raw("A/B\\C:D").as_str(), "A_B_C_D");
        assert_eq!(PartitionKey::from_raw("plain").as_str(), "plain");
    }

    #[test]
    fn test_collision_merges() {
        assert_eq!(PartitionKey::from_raw("A/B"), PartitionKey::from_raw("A_B"));
        assert_eq!(PartitionKey::from_raw("A:B"), PartitionKey::from_raw("A\\B"));
    }

    #[test]
    fn test_blank_is_usable_key() {
        let key = PartitionKey::resolve(&CellValue::Blank);
        assert_eq!(key.as_str(), "None");
        assert_eq!(key.file_name("csv"), "None.csv");
    }

    #[test]
    fn test_numbers_resolve_stably() {
        assert_eq!(PartitionKey::resolve(&CellValue::Number(2024.0)).as_str(), "2024");
    }

    proptest! {
        #[test]
        fn resolve_is_idempotent(raw in ".*") {
            let once = PartitionKey::from_raw(&raw);
            let twice = PartitionKey::from_raw(once.as_str());
            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(once, PartitionKey::from_raw(&raw));
        }

        #[test]
        fn resolved_keys_are_path_safe(raw in ".*") {
            let key = PartitionKey::from_raw(&raw);
            prop_assert!(!key.as_str().contains(UNSAFE_CHARS));
        }

        #[test]
        fn unsafe_swaps_collide(prefix in "[a-z]{0,8}", suffix in "[a-z]{0,8}", sep in prop::sample::select(vec!['/', '\\', ':'])) {
            let raw = format!("{prefix}{sep}{suffix}");
            let swapped = format!("{prefix}_{suffix}");
            prop_assert_eq!(PartitionKey::from_raw(&raw), PartitionKey::from_raw(&swapped));
        }
    }
}
