use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::Conversion;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub conversion: Conversion,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// env_logger filter used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl ModelConfig {
    /// Load configuration from defaults, an optional `oak-model` file in the
    /// working directory and `OAK_` environment variables
    pub fn load() -> anyhow::Result<Self> {
        // Load environment variables from .env file if it exists
        dotenvy::dotenv().ok();
        Self::build(config::File::with_name("oak-model").required(false))
    }

    /// Load configuration with `path` as the config file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::build(config::File::from(path).required(true))
    }

    fn build<S>(file: S) -> anyhow::Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&ModelConfig::default())?);

        config = config.add_source(file);

        // Add environment variables like OAK_CONVERSION__BOOL_TRUE
        config = config.add_source(
            config::Environment::with_prefix("OAK")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = config.build()?;
        let model_config: ModelConfig = config.try_deserialize()?;

        Ok(model_config)
    }

    /// Install the configured conversion as the process-wide default
    pub fn apply(&self) {
        log::info!(
            "Default conversion: bool tokens '{}'/'{}', {:?} rounding, {:?} doubles",
            self.conversion.bool_true,
            self.conversion.bool_false,
            self.conversion.rounding,
            self.conversion.double_format
        );
        Conversion::set_global_default(self.conversion.clone());
    }
}
