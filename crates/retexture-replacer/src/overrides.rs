//! Override Resolution
//!
//! Lookups into the pack's override tables. Alias and filtering keys can be
//! written with zeroed parts to act as wildcards; lookups try the candidates
//! below in order and stop at the first hit:
//!
//! 1. exact `(location, hash)`
//! 2. `(location & LOW, 0)`: palette identity only
//! 3. `(location, 0)`: unless addresses are ignored
//! 4. `(location & LOW, hash)`: any address
//! 5. `(location & HIGH, hash)`: unless addresses are ignored
//! 6. `(0, hash)`: data hash only

use ahash::AHashMap;

use crate::config::{HashRangeKey, OverrideTables};
use crate::key::{ReplacementKey, TextureFiltering, HIGH_MASK, LOW_MASK};

/// Result of an alias lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasLookup<'a> {
    /// No alias applies
    Missing,
    /// The pack explicitly suppresses this texture
    Ignored,
    /// `|`-joined filenames, one per mip level
    Files(&'a str),
}

impl<'a> AliasLookup<'a> {
    /// Whether any alias entry matched, including an ignore marker
    pub fn found_alias(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    /// Whether the texture is suppressed
    pub fn ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }

    /// The `|`-joined filenames, empty unless an alias with files matched
    pub fn files(&self) -> &'a str {
        match self {
            Self::Files(files) => files,
            _ => "",
        }
    }
}

/// Candidate keys in resolution order
pub fn wildcard_candidates(location_key: u64, hash: u32, ignore_address: bool) -> Vec<ReplacementKey> {
    let mut keys = Vec::with_capacity(6);
    keys.push(ReplacementKey::new(location_key, hash));
    keys.push(ReplacementKey::new(location_key & LOW_MASK, 0));
    if !ignore_address {
        keys.push(ReplacementKey::new(location_key, 0));
    }
    keys.push(ReplacementKey::new(location_key & LOW_MASK, hash));
    if !ignore_address {
        keys.push(ReplacementKey::new(location_key & HIGH_MASK, hash));
    }
    keys.push(ReplacementKey::new(0, hash));
    keys
}

fn lookup_wildcard<V>(
    map: &AHashMap<ReplacementKey, V>,
    location_key: u64,
    hash: u32,
    ignore_address: bool,
) -> Option<&V> {
    if map.is_empty() {
        return None;
    }
    wildcard_candidates(location_key, hash, ignore_address)
        .into_iter()
        .find_map(|key| map.get(&key))
}

impl OverrideTables {
    /// Resolve the filename alias for a texture
    pub fn lookup_hash_file(&self, location_key: u64, hash: u32, ignore_address: bool) -> AliasLookup<'_> {
        match lookup_wildcard(&self.aliases, location_key, hash, ignore_address) {
            None => AliasLookup::Missing,
            Some(files) if files.is_empty() => AliasLookup::Ignored,
            Some(files) => AliasLookup::Files(files),
        }
    }

    /// Forced filtering for a texture, falling back to the all-zero key
    pub fn find_filtering(&self, location_key: u64, hash: u32, ignore_address: bool) -> Option<TextureFiltering> {
        lookup_wildcard(&self.filtering, location_key, hash, ignore_address)
            .or_else(|| self.filtering.get(&ReplacementKey::default()))
            .copied()
    }

    /// Hashed dimensions for a texture at `addr` with the given size
    pub fn lookup_hash_range(&self, addr: u32, w: u32, h: u32) -> Option<(u32, u32)> {
        self.hash_ranges.get(&HashRangeKey { addr, w, h }).copied()
    }

    /// Per-size hash reduction factor
    pub fn lookup_reduce_hash_range(&self, w: u32, h: u32) -> Option<f32> {
        self.reduce_hash_ranges.get(&(w, h)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCATION: u64 = 0x08b3_1020_0000_0909;
    const HASH: u32 = 0xba70_b2af;

    fn tables(entries: &[(u64, u32, &str)]) -> OverrideTables {
        let mut tables = OverrideTables::default();
        for (location, hash, files) in entries {
            tables
                .aliases
                .insert(ReplacementKey::new(*location, *hash), files.to_string());
        }
        tables
    }

    #[test]
    fn test_candidate_order() {
        let keys = wildcard_candidates(LOCATION, HASH, false);
        assert_eq!(
            keys,
            vec![
                ReplacementKey::new(LOCATION, HASH),
                ReplacementKey::new(0x0909, 0),
                ReplacementKey::new(LOCATION, 0),
                ReplacementKey::new(0x0909, HASH),
                ReplacementKey::new(0x08b3_1020_0000_0000, HASH),
                ReplacementKey::new(0, HASH),
            ]
        );

        let keys = wildcard_candidates(LOCATION, HASH, true);
        assert_eq!(keys.len(), 4);
        assert!(!keys.contains(&ReplacementKey::new(LOCATION, 0)));
    }

    #[test]
    fn test_more_specific_entry_wins() {
        // Every pair of candidate levels: the earlier one must win.
        let candidates = wildcard_candidates(LOCATION, HASH, false);
        for (i, specific) in candidates.iter().enumerate() {
            for general in &candidates[i + 1..] {
                let tables = tables(&[
                    (general.location_key, general.content_hash, "general.png"),
                    (specific.location_key, specific.content_hash, "specific.png"),
                ]);
                assert_eq!(
                    tables.lookup_hash_file(LOCATION, HASH, false),
                    AliasLookup::Files("specific.png")
                );
            }
        }
    }

    #[test]
    fn test_hash_only_wildcard() {
        let tables = tables(&[(0, HASH, "any.png")]);
        assert_eq!(tables.lookup_hash_file(LOCATION, HASH, false), AliasLookup::Files("any.png"));
        assert_eq!(tables.lookup_hash_file(LOCATION, HASH ^ 1, false), AliasLookup::Missing);
    }

    #[test]
    fn test_address_wildcards_skipped_when_ignoring_address() {
        let tables = tables(&[(LOCATION, 0, "addr.png")]);
        assert_eq!(tables.lookup_hash_file(LOCATION, HASH, false), AliasLookup::Files("addr.png"));
        assert_eq!(tables.lookup_hash_file(LOCATION, HASH, true), AliasLookup::Missing);
    }

    #[test]
    fn test_ignored_is_distinct_from_missing() {
        let tables = tables(&[(LOCATION, HASH, "")]);
        let ignored = tables.lookup_hash_file(LOCATION, HASH, false);
        assert!(ignored.found_alias());
        assert!(ignored.ignored());
        assert_eq!(ignored.files(), "");

        let missing = tables.lookup_hash_file(1, 2, false);
        assert!(!missing.found_alias());
        assert!(!missing.ignored());
    }

    #[test]
    fn test_filtering_global_wildcard() {
        let mut tables = OverrideTables::default();
        assert_eq!(tables.find_filtering(LOCATION, HASH, false), None);

        tables.filtering.insert(ReplacementKey::default(), TextureFiltering::Nearest);
        assert_eq!(tables.find_filtering(LOCATION, HASH, false), Some(TextureFiltering::Nearest));

        tables
            .filtering
            .insert(ReplacementKey::new(0, HASH), TextureFiltering::Linear);
        assert_eq!(tables.find_filtering(LOCATION, HASH, false), Some(TextureFiltering::Linear));
    }

    #[test]
    fn test_hash_range_lookup() {
        let mut tables = OverrideTables::default();
        tables
            .hash_ranges
            .insert(HashRangeKey { addr: 0x08b3_1020, w: 512, h: 512 }, (480, 272));

        assert_eq!(tables.lookup_hash_range(0x08b3_1020, 512, 512), Some((480, 272)));
        assert_eq!(tables.lookup_hash_range(0x08b3_1020, 256, 512), None);
        assert_eq!(tables.lookup_reduce_hash_range(512, 512), None);
    }
}
