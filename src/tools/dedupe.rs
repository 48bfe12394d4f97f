//! `deduplicate_memories` (§6): batch duplicate-group detection over the
//! full set of a user's memories, reusing the Duplicate Detector's Jaccard
//! metric (§4.8) instead of its cloud-search pre-filter.

use std::time::Instant;

use async_trait::async_trait;
use tracing::warn;

use crate::engine::Engine;
use crate::error::ToolError;
use crate::model::Memory;
use crate::pipeline::{jaccard_similarity, SIMILARITY_THRESHOLD};

use super::tool::{optional_str, ApprovalRequirement, RiskLevel, Tool, ToolOutput};

pub struct DeduplicateMemoriesTool;

/// Upper bound on how many memories are pulled per user for comparison —
/// an O(n^2) scan beyond this would be unreasonably expensive.
const MAX_SCAN: usize = 500;

struct Group {
    primary: Memory,
    duplicates: Vec<(Memory, f64)>,
}

fn find_groups(memories: &[Memory], threshold: f64) -> Vec<Group> {
    let mut assigned = vec![false; memories.len()];
    let mut groups = Vec::new();

    for i in 0..memories.len() {
        if assigned[i] {
            continue;
        }
        let mut duplicates = Vec::new();
        for j in (i + 1)..memories.len() {
            if assigned[j] {
                continue;
            }
            let similarity = jaccard_similarity(&memories[i].content, &memories[j].content);
            if similarity >= threshold {
                duplicates.push((memories[j].clone(), similarity));
                assigned[j] = true;
            }
        }
        if !duplicates.is_empty() {
            assigned[i] = true;
            groups.push(Group {
                primary: memories[i].clone(),
                duplicates,
            });
        }
    }

    groups
}

#[async_trait]
impl Tool for DeduplicateMemoriesTool {
    fn name(&self) -> &str {
        "deduplicate_memories"
    }

    fn description(&self) -> &str {
        "Find near-duplicate memory groups (and optionally delete all but one per group)"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_id": {"type": "string"},
                "similarity_threshold": {"type": "number", "default": 0.85},
                "dry_run": {"type": "boolean", "default": true},
            },
            "required": [],
        })
    }

    async fn execute(&self, params: serde_json::Value, engine: &Engine) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let user_id = optional_str(&params, "user_id", &engine.default_user_id);
        let threshold = params
            .get("similarity_threshold")
            .and_then(|v| v.as_f64())
            .unwrap_or(SIMILARITY_THRESHOLD);
        let dry_run = params.get("dry_run").and_then(|v| v.as_bool()).unwrap_or(true);

        let memories = engine.cloud.list_all(user_id, MAX_SCAN).await?;
        let groups = find_groups(&memories, threshold);

        let mut deleted = 0usize;
        let mut group_json = Vec::with_capacity(groups.len());
        for group in &groups {
            if !dry_run {
                for (dup, _) in &group.duplicates {
                    match engine.pipeline.delete_memory(user_id, &dup.id).await {
                        Ok(()) => deleted += 1,
                        Err(err) => warn!(memory_id = dup.id, error = %err, "deduplicate: delete failed"),
                    }
                }
            }
            group_json.push(serde_json::json!({
                "primary": group.primary.id,
                "duplicates": group.duplicates.iter().map(|(m, sim)| serde_json::json!({
                    "id": m.id,
                    "similarity%": (sim * 100.0).round(),
                    "content": m.content,
                })).collect::<Vec<_>>(),
            }));
        }

        let mut result = serde_json::json!({ "groups": group_json });
        if !dry_run {
            result["deleted"] = serde_json::json!(deleted);
        }

        Ok(ToolOutput::success(result, start.elapsed()))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }

    fn requires_approval(&self) -> ApprovalRequirement {
        ApprovalRequirement::UnlessAutoApproved
    }
}
