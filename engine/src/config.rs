use indexmap::IndexMap;
use serde::Deserialize;

// Cadence at which the chain-state snapshot is refreshed from the store
pub const DEFAULT_STATE_REFRESH_INTERVAL_MS: u64 = 1_000;

// Upper bound on rows materialized by the paged list getters
// (proposals, votes). The id+height projection runs first; only the
// selected page is re-fetched in full.
pub const DEFAULT_PAGE_ROW_BOUND: usize = 1_000;

/// Engine configuration. Everything has a default so a zero-config
/// engine works against an empty store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// Named code-id sets, e.g. `dao-core -> [1, 7]`. Formula code-id
    /// filters and the bank-history allowlist refer to these names, not
    /// to raw ids, so chain upgrades only touch configuration.
    pub code_ids: IndexMap<String, Vec<u64>>,

    /// Code-id keys whose contracts keep per-denom bank history; other
    /// addresses are served from the latest-snapshot table only.
    pub track_bank_history_code_ids_keys: Vec<String>,

    pub state_refresh_interval_ms: u64,

    pub page_row_bound: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            code_ids: IndexMap::new(),
            track_bank_history_code_ids_keys: Vec::new(),
            state_refresh_interval_ms: DEFAULT_STATE_REFRESH_INTERVAL_MS,
            page_row_bound: DEFAULT_PAGE_ROW_BOUND,
        }
    }
}

impl EngineConfig {
    /// Resolve code-id keys to the union of their configured ids.
    /// Unknown keys resolve to nothing.
    pub fn resolve_code_ids(&self, keys: &[&str]) -> Vec<u64> {
        let mut ids: Vec<u64> = keys
            .iter()
            .filter_map(|key| self.code_ids.get(*key))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// First configured key whose set contains `code_id`.
    pub fn code_id_key_for(&self, code_id: u64) -> Option<&str> {
        self.code_ids
            .iter()
            .find(|(_, ids)| ids.contains(&code_id))
            .map(|(key, _)| key.as_str())
    }

    pub fn tracks_bank_history(&self, code_id: u64) -> bool {
        let keys: Vec<&str> = self
            .track_bank_history_code_ids_keys
            .iter()
            .map(String::as_str)
            .collect();
        self.resolve_code_ids(&keys).contains(&code_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        let mut code_ids = IndexMap::new();
        code_ids.insert("cw20".to_string(), vec![2, 3]);
        code_ids.insert("dao-core".to_string(), vec![1, 3]);
        EngineConfig {
            code_ids,
            track_bank_history_code_ids_keys: vec!["cw20".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_code_ids_union() {
        let config = config();
        assert_eq!(config.resolve_code_ids(&["cw20", "dao-core"]), vec![1, 2, 3]);
        assert!(config.resolve_code_ids(&["unknown"]).is_empty());
    }

    #[test]
    fn test_code_id_key_for_first_match() {
        let config = config();
        // 3 belongs to both sets; insertion order wins
        assert_eq!(config.code_id_key_for(3), Some("cw20"));
        assert_eq!(config.code_id_key_for(9), None);
    }

    #[test]
    fn test_bank_history_tracking() {
        let config = config();
        assert!(config.tracks_bank_history(2));
        assert!(!config.tracks_bank_history(1));
    }
}
