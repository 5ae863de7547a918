//! Mapper configuration.

use super::cost::CostModel;
use dirtmap_common::types::QubitId;

/// Cached commands per qubit above which half of the buffer is forwarded.
pub const DEFAULT_CACHE_LIMIT: usize = 200;

/// Settings consumed when a [`DirtyQubitMapper`](super::DirtyQubitMapper) is
/// built.
#[derive(Debug, Clone)]
pub struct MapperConfig {
    /// A qubit whose buffer grows past this many commands forwards half of it.
    pub cache_limit: usize,
    /// Gate costs used for load estimation.
    pub cost_model: CostModel,
    /// Manual target for the next remap, bypassing involvement analysis.
    pub next_target: Option<QubitId>,
}

impl MapperConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_limit: DEFAULT_CACHE_LIMIT,
            cost_model: CostModel::new(),
            next_target: None,
        }
    }

    /// Sets the per-qubit cache limit.
    #[must_use]
    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit;
        self
    }

    /// Sets the cost model.
    #[must_use]
    pub fn with_cost_model(mut self, cost_model: CostModel) -> Self {
        self.cost_model = cost_model;
        self
    }

    /// Forces the next remap onto `target`.
    ///
    /// The caller is responsible for `target` really being uninvolved.
    #[must_use]
    pub fn with_next_target(mut self, target: QubitId) -> Self {
        self.next_target = Some(target);
        self
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self::new()
    }
}
