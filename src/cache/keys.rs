//! Cache key definitions.
//!
//! Every cached query family gets a typed key variant carrying a stable hash
//! of its normalised parameters. Invalidation never inspects key contents;
//! it goes through the [`super::registry::CacheRegistry`] kind tags recorded
//! when the entry was stored.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::domain::catalog::SubjectKind;

/// Key for a cached ordered id list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Fuzzy search across all music kinds.
    MusicSearch { params_hash: u64 },
    /// Fuzzy search within one subject kind.
    SubjectSearch {
        kind: SubjectKind,
        params_hash: u64,
    },
    /// Subjects of one kind ranked by review count.
    Popular { kind: SubjectKind, limit: u32 },
    /// Subjects of one kind ranked by star average.
    TopRated { kind: SubjectKind, limit: u32 },
}

impl CacheKey {
    /// Metric label for the key's query family.
    pub fn family(&self) -> &'static str {
        match self {
            CacheKey::MusicSearch { .. } => "music_search",
            CacheKey::SubjectSearch { .. } => "subject_search",
            CacheKey::Popular { .. } => "popular",
            CacheKey::TopRated { .. } => "top_rated",
        }
    }
}

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Normalise a free-text search query into its significant tokens.
///
/// Tokens are lowercased, split on whitespace, sorted and deduplicated, so
/// `"Blue  Album"`, `"album blue"` and `"BLUE blue album"` all name the same
/// logical search. The same tokens drive both the cache key and the match
/// predicate, keeping key identity aligned with what is actually queried.
pub fn normalize_query(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = query
        .split_whitespace()
        .map(|token| token.to_lowercase())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

/// Hash a search query with its page limit for search cache keys.
pub fn hash_search_key(query: &str, limit: u32) -> u64 {
    let mut hasher = DefaultHasher::new();
    normalize_query(query).hash(&mut hasher);
    limit.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_hash_consistency() {
        let key1 = CacheKey::Popular {
            kind: SubjectKind::Song,
            limit: 20,
        };
        let key2 = CacheKey::Popular {
            kind: SubjectKind::Song,
            limit: 20,
        };
        assert_eq!(key1, key2);
        assert_eq!(hash_value(&key1), hash_value(&key2));

        assert_ne!(
            key1,
            CacheKey::TopRated {
                kind: SubjectKind::Song,
                limit: 20,
            }
        );
    }

    #[test]
    fn normalization_collapses_case_order_and_whitespace() {
        assert_eq!(
            normalize_query("  Blue   Album "),
            normalize_query("album BLUE")
        );
        assert_eq!(normalize_query("blue blue album"), vec!["album", "blue"]);
        assert!(normalize_query("   ").is_empty());
    }

    #[test]
    fn equivalent_queries_share_a_search_hash() {
        assert_eq!(
            hash_search_key("Blue Album", 20),
            hash_search_key("album blue", 20)
        );
    }

    #[test]
    fn different_params_produce_different_hashes() {
        assert_ne!(
            hash_search_key("blue album", 20),
            hash_search_key("red album", 20)
        );
        assert_ne!(
            hash_search_key("blue album", 20),
            hash_search_key("blue album", 10)
        );
    }

    #[test]
    fn family_labels_are_stable() {
        let key = CacheKey::MusicSearch {
            params_hash: hash_search_key("blue", 20),
        };
        assert_eq!(key.family(), "music_search");
        assert_eq!(
            CacheKey::SubjectSearch {
                kind: SubjectKind::Outfit,
                params_hash: 0,
            }
            .family(),
            "subject_search"
        );
    }
}
