// Configuration module entry point
// Loads startup configuration and holds shared runtime state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{
    CacheConfig, CompressionConfig, Config, Environment, LoggingConfig, PerformanceConfig,
    ServerConfig, StaticFilesConfig,
};

impl Config {
    /// Load configuration from the default "config.toml" location
    ///
    /// The file is optional; the zero-config run binds 0.0.0.0:3000 and
    /// serves from "public" in production mode.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from specified file path (without extension)
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("STATICD").separator("__"))
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.environment", "production")?
            .set_default("static_files.root", "public")?
            .set_default("static_files.index_files", vec!["index.html".to_string()])?
            .set_default("cache.default_max_age", 86_400)?
            .set_default("cache.long_max_age", 31_536_000)?
            .set_default(
                "cache.long_lived_extensions",
                vec!["js".to_string(), "css".to_string()],
            )?
            .set_default("compression.enabled", true)?
            .set_default("compression.min_size", 1024)?
            .set_default("compression.gzip_level", 6)?
            .set_default("compression.brotli_quality", 4)?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("logging.show_headers", false)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .build()?;

        settings.try_deserialize()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}
