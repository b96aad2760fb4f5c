use std::time::Duration;

use mled::EngineConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub engine: EngineConfig,
    pub ui_refresh: Duration,
    pub log_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            ui_refresh: Duration::from_millis(100),
            log_capacity: 500,
        }
    }
}
