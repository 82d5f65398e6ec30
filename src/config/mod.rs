use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub source: SourceConfig,
    pub web: WebConfig,
    pub schedule: ScheduleConfig,
    pub columns: ColumnsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub feed_dir: PathBuf,
    pub feed_file_name: String,
    pub working_file_name: String,
    pub state_file: PathBuf,
    pub mapping_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Host integration switch; a disabled generator never advances
    pub enabled: bool,
    pub batch_size: u32,
    pub batch_delay_ms: u64,
    pub max_pages_per_run: Option<u32>,
    /// Failed fetches of one page before the pass skips it
    #[serde(default = "default_max_page_attempts")]
    pub max_page_attempts: u32,
    pub feed_version: Option<String>,
}

fn default_max_page_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub products_file: PathBuf,
    pub published_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub cron: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnsConfig {
    pub allowed: Vec<String>,
    pub required: Vec<String>,
    pub suggested: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                feed_dir: PathBuf::from("./data/feeds"),
                feed_file_name: "product-feed.xml".to_string(),
                working_file_name: "product-feed-tmp.xml".to_string(),
                state_file: PathBuf::from("./data/generation-state.json"),
                mapping_file: PathBuf::from("./data/column-mapping.toml"),
            },
            generation: GenerationConfig {
                enabled: true,
                batch_size: 10,
                batch_delay_ms: 10,
                max_pages_per_run: None,
                max_page_attempts: default_max_page_attempts(),
                feed_version: None,
            },
            source: SourceConfig {
                products_file: PathBuf::from("./data/products.json"),
                published_only: true,
            },
            web: WebConfig {
                base_url: "http://localhost:8080".to_string(),
            },
            schedule: ScheduleConfig {
                cron: "0 0 * * * *".to_string(),
            },
            columns: ColumnsConfig::default(),
        }
    }
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        let allowed = [
            "productID",
            "name",
            "description",
            "price",
            "fromPrice",
            "currency",
            "productURL",
            "imageURL",
            "categories",
            "categoryPath",
            "brand",
            "EAN",
            "UPC",
            "SKU",
            "stock",
            "deliveryTime",
            "deliveryCosts",
            "color",
            "size",
            "material",
            "gender",
            "condition",
        ];
        Self {
            allowed: allowed.iter().map(|c| c.to_string()).collect(),
            required: vec![
                "name".to_string(),
                "productURL".to_string(),
                "price".to_string(),
            ],
            suggested: vec![
                "EAN".to_string(),
                "UPC".to_string(),
                "description".to_string(),
                "imageURL".to_string(),
            ],
        }
    }
}

impl GenerationConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn feed_version(&self) -> String {
        self.feed_version
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
    }
}

impl StorageConfig {
    pub fn feed_path(&self) -> PathBuf {
        self.feed_dir.join(&self.feed_file_name)
    }

    pub fn working_path(&self) -> PathBuf {
        self.feed_dir.join(&self.working_file_name)
    }
}

impl Config {
    /// Load the configuration file, writing the defaults when it does not exist yet
    pub fn load<P: AsRef<Path>>(config_file: P) -> Result<Self> {
        let config_file = config_file.as_ref();

        if config_file.exists() {
            let contents = std::fs::read_to_string(config_file)
                .with_context(|| format!("reading {}", config_file.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("parsing {}", config_file.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::create_dir_all(&default_config.storage.feed_dir)?;
            if let Some(parent) = config_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(config_file, contents)?;
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.generation.batch_size == 0 {
            anyhow::bail!("generation.batch_size must be greater than zero");
        }
        if self.generation.max_pages_per_run == Some(0) {
            anyhow::bail!("generation.max_pages_per_run must be greater than zero when set");
        }
        if self.generation.max_page_attempts == 0 {
            anyhow::bail!("generation.max_page_attempts must be greater than zero");
        }
        if self.storage.feed_file_name == self.storage.working_file_name {
            anyhow::bail!("storage.feed_file_name and storage.working_file_name must differ");
        }
        for column in &self.columns.required {
            if !self.columns.allowed.contains(column) {
                anyhow::bail!("required column {column} is not in columns.allowed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let contents = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&contents).unwrap();
        assert_eq!(parsed.generation.batch_size, 10);
        assert_eq!(parsed.storage.feed_file_name, "product-feed.xml");
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.feed_dir = dir.path().join("feeds");
        let path = dir.path().join("feed-sync.toml");
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.storage.feed_path(), dir.path().join("feeds/product-feed.xml"));
        assert_eq!(
            loaded.storage.working_path(),
            dir.path().join("feeds/product-feed-tmp.xml")
        );
    }

    #[test]
    fn test_validate_rejects_same_file_names() {
        let mut config = Config::default();
        config.storage.working_file_name = config.storage.feed_file_name.clone();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.generation.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_page_limits() {
        let mut config = Config::default();
        config.generation.max_pages_per_run = Some(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_pages_per_run"));

        config.generation.max_pages_per_run = Some(1);
        assert!(config.validate().is_ok());

        config.generation.max_page_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_page_attempts_uses_default() {
        let config = Config::default();
        let mut value: toml::Value = toml::Value::try_from(&config).unwrap();
        value["generation"]
            .as_table_mut()
            .unwrap()
            .remove("max_page_attempts");
        let parsed: Config = toml::from_str(&toml::to_string(&value).unwrap()).unwrap();
        assert_eq!(parsed.generation.max_page_attempts, 3);
    }
}
