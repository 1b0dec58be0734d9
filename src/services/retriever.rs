use std::collections::HashSet;

use crate::{
    error::AppResult,
    services::ann::Neighbor,
    services::model::ReferenceData,
    services::synthesizer::PreferenceVector,
};

/// Merged candidate list in rank order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedItems {
    pub items: Vec<String>,
    /// Segment that contributed each item, parallel to `items`
    pub segments: Vec<String>,
}

impl RankedItems {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cap on the over-fetch per segment, as a multiple of `k`
const MAX_FETCH_FACTOR: usize = 4;

fn fetch_size(k: usize, excluded: usize) -> usize {
    k.saturating_add(excluded).min(k.saturating_mul(MAX_FETCH_FACTOR))
}

/// Queries each vector's segment index for its `k` nearest items and merges
///
/// Per-segment lists are concatenated in the order the vectors were given,
/// each keeping its own rank order. An item already taken by an earlier
/// segment is skipped, as is anything on the user's exclusion list. When the
/// matched segments run dry before `k`, the default segment fills the rest
/// using the first vector. Fewer than `k` items come back only when no
/// eligible candidate is left.
///
/// Each search fetches `k` plus the exclusion count, bounded by
/// `MAX_FETCH_FACTOR * k`, so long exclusion lists cannot widen it further.
pub fn retrieve(
    user_id: &str,
    vectors: &[PreferenceVector],
    reference: &ReferenceData,
    k: usize,
) -> AppResult<RankedItems> {
    let excluded = reference.exclusions_for(user_id);
    let fetch = fetch_size(k, excluded.len());
    let mut seen: HashSet<String> = HashSet::with_capacity(k);
    let mut ranked = RankedItems::default();

    let mut take = |ranked: &mut RankedItems, hits: Vec<Neighbor>, segment: &str| {
        for hit in hits {
            if ranked.len() >= k {
                break;
            }
            if excluded.contains(&hit.id) || !seen.insert(hit.id.clone()) {
                continue;
            }
            ranked.items.push(hit.id);
            ranked.segments.push(segment.to_string());
        }
    };

    for vector in vectors {
        if ranked.len() >= k {
            break;
        }

        let segment = match reference.segment(&vector.segment) {
            Some(segment) => segment,
            None => {
                tracing::warn!(segment = %vector.segment, "Unknown segment, using default");
                reference.default_segment()
            }
        };

        let hits = segment.index.search(&vector.values, fetch, None)?;
        take(&mut ranked, hits, &segment.name);
    }

    if let Some(first) = vectors.first() {
        if ranked.len() < k {
            let segment = reference.default_segment();
            // Items already taken from this segment come back first
            let hits = segment.index.search(&first.values, fetch + ranked.len(), None)?;
            let before = ranked.len();
            take(&mut ranked, hits, &segment.name);
            tracing::debug!(
                user_id = %user_id,
                added = ranked.len() - before,
                "Backfilled from default segment"
            );
        }
    }

    tracing::debug!(
        user_id = %user_id,
        vectors = vectors.len(),
        retrieved = ranked.len(),
        "Candidates retrieved"
    );

    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ann::IndexParams;
    use crate::services::model::{fixtures, UserProfile};

    fn vector(segment: &str, values: [f32; 2]) -> PreferenceVector {
        PreferenceVector {
            segment: segment.to_string(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_length_capped_at_k_without_duplicates() {
        let reference = fixtures::reference();
        let vectors = vec![vector("active", [1.0, 0.0]), vector("arts", [0.0, 1.0])];
        let ranked = retrieve("u9", &vectors, &reference, 100).unwrap();

        assert_eq!(ranked.len(), 100);
        assert_eq!(ranked.segments.len(), 100);
        let unique: HashSet<&String> = ranked.items.iter().collect();
        assert_eq!(unique.len(), 100);
    }

    #[test]
    fn test_first_segment_ranks_first() {
        let reference = fixtures::reference();
        let vectors = vec![vector("arts", [1.0, 0.0]), vector("active", [1.0, 0.0])];
        let ranked = retrieve("u9", &vectors, &reference, 100).unwrap();

        // The arts segment holds 60 items, all of which precede the active ones
        assert!(ranked.segments[..60].iter().all(|s| s == "arts"));
        assert!(ranked.segments[60..].iter().all(|s| s == "active"));
        assert_eq!(ranked.items[0], "m0");
    }

    #[test]
    fn test_exclusions_are_removed() {
        let reference = fixtures::reference();
        let vectors = vec![vector("active", [1.0, 0.0])];
        let ranked = retrieve("u1", &vectors, &reference, 10).unwrap();

        assert_eq!(ranked.len(), 10);
        assert!(!ranked.items.contains(&"a0".to_string()));
        assert!(!ranked.items.contains(&"u1".to_string()));
    }

    #[test]
    fn test_self_match_is_excluded() {
        let reference = fixtures::reference();
        let vectors = vec![vector("general", [1.0, 0.0])];
        let ranked = retrieve("g0", &vectors, &reference, 5).unwrap();
        assert!(!ranked.items.contains(&"g0".to_string()));
        assert_eq!(ranked.len(), 5);
    }

    #[test]
    fn test_small_segment_is_padded_from_default() {
        let reference = fixtures::reference();
        let vectors = vec![vector("arts", [0.0, 1.0])];
        let ranked = retrieve("u9", &vectors, &reference, 100).unwrap();

        assert_eq!(ranked.len(), 100);
        assert!(ranked.segments[..60].iter().all(|s| s == "arts"));
        assert!(ranked.segments[60..].iter().all(|s| s == "general"));
        let unique: HashSet<&String> = ranked.items.iter().collect();
        assert_eq!(unique.len(), 100);
    }

    #[test]
    fn test_padding_skips_items_already_taken() {
        let reference = fixtures::reference();
        let vectors = vec![vector("arts", [0.0, 1.0]), vector("general", [1.0, 0.0])];
        let ranked = retrieve("u9", &vectors, &reference, 250).unwrap();
        assert_eq!(ranked.len(), 210);
        let unique: HashSet<&String> = ranked.items.iter().collect();
        assert_eq!(unique.len(), 210);
    }

    #[test]
    fn test_insufficient_candidates_is_not_an_error() {
        let reference = fixtures::reference();
        let vectors = vec![vector("arts", [0.0, 1.0])];
        // 60 arts items plus 150 general items is all there is
        let ranked = retrieve("u9", &vectors, &reference, 400).unwrap();
        assert_eq!(ranked.len(), 210);
    }

    #[test]
    fn test_long_exclusion_list_keeps_fetch_bounded() {
        assert_eq!(fetch_size(100, 1), 101);
        assert_eq!(fetch_size(5, 10_000), 20);

        let mut bundle = fixtures::bundle();
        bundle.profiles.insert(
            "heavy".to_string(),
            UserProfile {
                excluded: (0..10_000).map(|i| format!("x{}", i)).collect(),
            },
        );
        let reference = ReferenceData::build(bundle, IndexParams::default()).unwrap();
        let vectors = vec![vector("active", [1.0, 0.0])];
        let ranked = retrieve("heavy", &vectors, &reference, 5).unwrap();
        assert_eq!(ranked.len(), 5);
    }

    #[test]
    fn test_unknown_segment_falls_back_to_default() {
        let reference = fixtures::reference();
        let vectors = vec![vector("retired", [0.0, 1.0])];
        let ranked = retrieve("u9", &vectors, &reference, 3).unwrap();
        assert_eq!(ranked.segments, vec!["general"; 3]);
    }

    #[test]
    fn test_nearest_item_ranks_first() {
        let reference = fixtures::reference();
        // Item a0 sits at angle 0 on the circle
        let vectors = vec![vector("active", [1.0, 0.0])];
        let ranked = retrieve("u9", &vectors, &reference, 3).unwrap();
        assert_eq!(ranked.items[0], "a0");
    }
}
