use backup_engine::EngineConfig;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// TOML engine configuration; without one the engine runs on defaults
    /// and `BACKUP_MASTER_KEY`.
    pub engine_config: Option<PathBuf>,
    pub log_level: String,
    /// Cron expression (with seconds) driving the engine's schedule ticks
    pub tick_cron: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()));

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            db_path: std::env::var("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("clinic.db")),
            engine_config: std::env::var("ENGINE_CONFIG").ok().map(PathBuf::from),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            tick_cron: std::env::var("TICK_CRON").unwrap_or_else(|_| "0 * * * * *".into()),
            data_dir,
        }
    }

    pub fn load_engine_config(&self) -> anyhow::Result<EngineConfig> {
        if let Some(path) = &self.engine_config {
            return Ok(EngineConfig::from_file(path)?);
        }

        let master_key = std::env::var("BACKUP_MASTER_KEY")
            .map_err(|_| anyhow::anyhow!("set ENGINE_CONFIG or BACKUP_MASTER_KEY"))?;
        let mut config = EngineConfig::with_master_key(master_key);
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
