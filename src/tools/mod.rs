//! The §6 EXTERNAL INTERFACES RPC surface: eight named tools dispatched by
//! the executor, each a thin adapter from JSON params onto the engine.

pub mod executor;
pub mod tool;

mod add_memory;
mod cache_stats;
mod dedupe;
mod delete_memory;
mod get_all_memories;
mod optimize_cache;
mod search_memory;
mod sync_status;

pub use add_memory::AddMemoryTool;
pub use cache_stats::CacheStatsTool;
pub use dedupe::DeduplicateMemoriesTool;
pub use delete_memory::DeleteMemoryTool;
pub use executor::{ExecutedTool, ToolExecutor, ToolRegistry};
pub use get_all_memories::GetAllMemoriesTool;
pub use optimize_cache::OptimizeCacheTool;
pub use search_memory::SearchMemoryTool;
pub use sync_status::SyncStatusTool;
pub use tool::{
    require_param, require_str, optional_str, optional_u64, ApprovalRequirement, RiskLevel, Tool,
    ToolErrorKind, ToolOutput, ToolRateLimitConfig, ToolRetryConfig, ToolSchema,
};

use std::sync::Arc;

/// Build the registry of all 8 operations, the wiring every transport
/// (stdio, HTTP, in-process callers) starts from.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(AddMemoryTool));
    registry.register(Arc::new(SearchMemoryTool));
    registry.register(Arc::new(GetAllMemoriesTool));
    registry.register(Arc::new(DeleteMemoryTool));
    registry.register(Arc::new(DeduplicateMemoriesTool));
    registry.register(Arc::new(OptimizeCacheTool));
    registry.register(Arc::new(CacheStatsTool));
    registry.register(Arc::new(SyncStatusTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_eight_operations() {
        let registry = default_registry();
        for name in [
            "add_memory",
            "search_memory",
            "get_all_memories",
            "delete_memory",
            "deduplicate_memories",
            "optimize_cache",
            "cache_stats",
            "sync_status",
        ] {
            assert!(registry.get(name).is_some(), "missing tool '{name}'");
        }
    }
}
