/// Configuration for the dispatch pipeline.
///
/// The execution context itself has no tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of responses held by the response cache.
    pub response_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_cache_capacity: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.response_cache_capacity, 1000);
    }
}
