use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::data::DEFAULT_COMMIT_BATCH_SIZE;
use crate::tracer::FilterConfig;
use crate::transport::{DEFAULT_ENDPOINT, DEFAULT_HIGH_WATER_MARK};
use crate::util::paths::{config_path, database_path};

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Which source files get traced
    pub tracer: FilterConfig,
    pub storage: StorageConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Run store file
    pub database: PathBuf,
    /// Statements per transaction before an automatic commit
    pub commit_batch_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub endpoint: String,
    /// Messages a publisher may queue before `send` blocks
    pub high_water_mark: usize,
    /// Collector wait per poll
    pub poll_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracer: FilterConfig::default(),
            storage: StorageConfig {
                database: database_path(),
                commit_batch_size: DEFAULT_COMMIT_BATCH_SIZE,
            },
            transport: TransportConfig {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                high_water_mark: DEFAULT_HIGH_WATER_MARK,
                poll_timeout: Duration::from_millis(100),
            },
        }
    }
}

/// TOML representation of the tracer section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlTracerConfig {
    pub include_stdlib: Option<bool>,
    pub include_site_packages: Option<bool>,
    pub include_packages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlStorageConfig {
    pub database: Option<PathBuf>,
    pub commit_batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlTransportConfig {
    pub endpoint: Option<String>,
    pub high_water_mark: Option<usize>,
    pub poll_timeout_ms: Option<u64>,
}

/// Root TOML configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub tracer: Option<TomlTracerConfig>,
    pub storage: Option<TomlStorageConfig>,
    pub transport: Option<TomlTransportConfig>,
}

impl Config {
    /// Load configuration from the data directory, merging with defaults.
    ///
    /// The bundled example is written on first run.
    pub fn load() -> Self {
        let config_file = config_path();

        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        Self::load_from(&config_file)
    }

    /// Load configuration from `path`, merging with defaults.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Config::default();

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return config,
        };
        match toml::from_str::<TomlConfig>(&contents) {
            Ok(toml_config) => config.merge(toml_config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
            }
        }

        config
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(tracer) = toml_config.tracer {
            if let Some(include_stdlib) = tracer.include_stdlib {
                self.tracer.include_stdlib = include_stdlib;
            }
            if let Some(include_site_packages) = tracer.include_site_packages {
                self.tracer.include_site_packages = include_site_packages;
            }
            if let Some(include_packages) = tracer.include_packages {
                self.tracer.include_packages = include_packages;
            }
        }

        if let Some(storage) = toml_config.storage {
            if let Some(database) = storage.database {
                self.storage.database = database;
            }
            if let Some(batch_size) = storage.commit_batch_size {
                self.storage.commit_batch_size = batch_size.max(1);
            }
        }

        if let Some(transport) = toml_config.transport {
            if let Some(endpoint) = transport.endpoint {
                self.transport.endpoint = endpoint;
            }
            if let Some(high_water_mark) = transport.high_water_mark {
                self.transport.high_water_mark = high_water_mark.max(1);
            }
            if let Some(poll_timeout_ms) = transport.poll_timeout_ms {
                self.transport.poll_timeout = Duration::from_millis(poll_timeout_ms);
            }
        }
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!("Failed to create config directory: {}", e);
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            eprintln!("Failed to write default config: {}", e);
        }
    }
}
