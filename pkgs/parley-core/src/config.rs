//! Engine configuration

/// Tunables for the chat engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum message length in characters (default: 4096)
    pub max_content_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_content_len: 4096,
        }
    }
}
