mod settings;

pub use settings::{Config, StorageConfig, TransportConfig, EXAMPLE_CONFIG};
