//! Duplicate Detector (C8): pre-write similarity gate via cloud search +
//! Jaccard comparison, fail-open on cloud errors (§4.8).

use std::collections::HashSet;

use tracing::warn;

use crate::cloud::CloudClient;
use crate::error::DuplicateMemory;
use crate::util::truncate_preview;

/// Above this Jaccard similarity, a write is rejected as a duplicate (§4.8).
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

/// How many leading characters of the new content are used for the cloud
/// near-match query (§4.5 step 2).
const COMPARISON_WINDOW: usize = 100;

/// Cap on near-match candidates considered (§4.8).
const MAX_CANDIDATES: usize = 5;

fn word_set(s: &str) -> HashSet<String> {
    s.to_lowercase().split_whitespace().map(|w| w.to_string()).collect()
}

/// Jaccard similarity over whitespace-split word sets (§4.8, bit-exact
/// definition — re-implementers must match it for behavior parity).
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let wa = word_set(a);
    let wb = word_set(b);
    if wa.is_empty() && wb.is_empty() {
        return 1.0;
    }
    let intersection = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Query the cloud for near-matches on the new content and reject the
/// write if any candidate clears [`SIMILARITY_THRESHOLD`]. Cloud-search
/// failures do not block the write (fail-open, §4.8).
pub async fn check_duplicate(
    cloud: &dyn CloudClient,
    user_id: &str,
    content: &str,
) -> Option<DuplicateMemory> {
    let window = truncate_preview(content, COMPARISON_WINDOW);
    let candidates = match cloud.search(user_id, window, MAX_CANDIDATES).await {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(error = %err, "duplicate-detection cloud search failed, proceeding (fail-open)");
            return None;
        }
    };

    candidates
        .into_iter()
        .map(|candidate| {
            let similarity = jaccard_similarity(content, &candidate.content);
            (candidate.id, similarity)
        })
        .filter(|(_, similarity)| *similarity >= SIMILARITY_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(existing_id, similarity)| DuplicateMemory { existing_id, similarity })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{AddMemoryContent, DemoCloudClient};
    use std::collections::HashMap;

    #[test]
    fn identical_content_has_similarity_one() {
        assert_eq!(jaccard_similarity("hello world", "hello world"), 1.0);
    }

    #[test]
    fn disjoint_content_has_similarity_zero() {
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn case_insensitive_near_duplicate_crosses_threshold() {
        let sim = jaccard_similarity(
            "User prefers TypeScript and dark mode",
            "User prefers typescript and Dark Mode",
        );
        assert!(sim >= SIMILARITY_THRESHOLD, "similarity was {sim}");
    }

    #[tokio::test]
    async fn detects_duplicate_against_cloud_candidate() {
        let cloud = DemoCloudClient::new();
        cloud
            .add_memory(
                "u1",
                AddMemoryContent::Content("User prefers TypeScript and dark mode".into()),
                HashMap::new(),
            )
            .await
            .unwrap();

        let result = check_duplicate(&cloud, "u1", "User prefers typescript and Dark Mode").await;
        assert!(result.is_some());
        assert!(result.unwrap().similarity >= SIMILARITY_THRESHOLD);
    }

    #[tokio::test]
    async fn distinct_content_is_not_a_duplicate() {
        let cloud = DemoCloudClient::new();
        cloud
            .add_memory("u1", AddMemoryContent::Content("User prefers TypeScript".into()), HashMap::new())
            .await
            .unwrap();

        let result = check_duplicate(&cloud, "u1", "Completely unrelated content about gardening").await;
        assert!(result.is_none());
    }
}
