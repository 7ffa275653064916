use super::Config;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tokio::time::{interval, Duration};

/// Configuration manager with hot-reload capability, generalized from
/// the pump.fun-strategy-specific `ConfigManager`.
pub struct ConfigManager {
    config_path: String,
    current_config: Arc<RwLock<Config>>,
    last_modified: RwLock<SystemTime>,
}

impl ConfigManager {
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let config = Config::load_from_file(path)?;
        config.validate()?;
        let last_modified = std::fs::metadata(path)?.modified()?;

        Ok(Self {
            config_path: path.to_string(),
            current_config: Arc::new(RwLock::new(config)),
            last_modified: RwLock::new(last_modified),
        })
    }

    pub fn get_config(&self) -> Config {
        self.current_config.read().unwrap().clone()
    }

    /// Spawns a background task that re-reads the file every 5s when its
    /// mtime advances. A config that fails to parse or validate is
    /// logged and the previous config is kept — a hot reload never
    /// crashes the process.
    pub fn start_hot_reload(&self) {
        let mut reload_timer = interval(Duration::from_secs(5));
        let config_path = self.config_path.clone();
        let current_config = Arc::clone(&self.current_config);
        let last_modified = Arc::new(RwLock::new(*self.last_modified.read().unwrap()));

        tokio::spawn(async move {
            loop {
                reload_timer.tick().await;

                let Ok(metadata) = std::fs::metadata(&config_path) else { continue };
                let Ok(modified) = metadata.modified() else { continue };
                let last_mod = *last_modified.read().unwrap();
                if modified <= last_mod {
                    continue;
                }

                match Config::load_from_file(&config_path).and_then(|c| {
                    c.validate()?;
                    Ok(c)
                }) {
                    Ok(new_config) => {
                        *current_config.write().unwrap() = new_config;
                        *last_modified.write().unwrap() = modified;
                        tracing::info!("configuration reloaded");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to reload configuration, keeping current");
                    }
                }
            }
        });
    }
}
