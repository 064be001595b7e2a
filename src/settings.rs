use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::parser::extract::FieldContext;

/// Optional config file looked up in the working directory.
pub const CONFIG_FILE: &str = "vehicle_listings";
pub const ENV_PREFIX: &str = "VL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Json,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Blob declaration names in priority order.
    pub blob_names: Vec<String>,
    pub canonical_script_id: String,
    /// Parsed trees written to `debug_dir` per run. 0 disables sampling.
    pub max_debug_samples: usize,
    pub debug_dir: PathBuf,
    pub reveal_timeout_ms: u64,
    /// Country left out of assembled addresses.
    pub default_country: String,
    pub list_delimiter: String,
    pub store_path: PathBuf,
    pub store_backend: StoreBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            blob_names: [
                "CLASSIFIED_MAIN_INFOS",
                "SummaryInformationData",
                "CLASSIFIED_MORE_INFOS",
                "ProductData",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            canonical_script_id: "__NEXT_DATA__".to_string(),
            max_debug_samples: 0,
            debug_dir: PathBuf::from("debug_samples"),
            reveal_timeout_ms: 2000,
            default_country: "FRANCE".to_string(),
            list_delimiter: " | ".to_string(),
            store_path: PathBuf::from("data/listings.json"),
            store_backend: StoreBackend::Json,
        }
    }
}

impl EngineConfig {
    /// Defaults, then `vehicle_listings.{toml,json,...}` if present, then
    /// `VL_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from(File::with_name(CONFIG_FILE).required(false))
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        Self::load_from(File::from(path).required(true))
    }

    fn load_from<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = Config::try_from(&EngineConfig::default()).context("encoding defaults")?;
        Config::builder()
            .add_source(defaults)
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("blob_names"),
            )
            .build()
            .context("reading configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn reveal_timeout(&self) -> Duration {
        Duration::from_millis(self.reveal_timeout_ms)
    }

    pub fn field_context(&self) -> FieldContext<'_> {
        FieldContext {
            delimiter: &self.list_delimiter,
            default_country: &self.default_country,
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_known_blobs() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.blob_names[0], "CLASSIFIED_MAIN_INFOS");
        assert_eq!(cfg.blob_names.len(), 4);
        assert_eq!(cfg.max_debug_samples, 0);
        assert_eq!(cfg.reveal_timeout(), Duration::from_secs(2));
    }

    // Only test that sets `VL_*` variables.
    #[test]
    fn file_then_environment_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "max_debug_samples = 3").unwrap();
        writeln!(f, "store_backend = \"sqlite\"").unwrap();
        writeln!(f, "blob_names = [\"ProductData\"]").unwrap();
        drop(f);

        let cfg = EngineConfig::load_file(&path).unwrap();
        assert_eq!(cfg.max_debug_samples, 3);
        assert_eq!(cfg.store_backend, StoreBackend::Sqlite);
        assert_eq!(cfg.blob_names, vec!["ProductData".to_string()]);
        assert_eq!(cfg.canonical_script_id, "__NEXT_DATA__");

        std::env::set_var("VL_MAX_DEBUG_SAMPLES", "5");
        std::env::set_var("VL_BLOB_NAMES", "CLASSIFIED_MAIN_INFOS,ProductData");
        let from_env = EngineConfig::load_file(&path);
        std::env::remove_var("VL_MAX_DEBUG_SAMPLES");
        std::env::remove_var("VL_BLOB_NAMES");

        let cfg = from_env.unwrap();
        assert_eq!(cfg.max_debug_samples, 5);
        assert_eq!(
            cfg.blob_names,
            vec!["CLASSIFIED_MAIN_INFOS".to_string(), "ProductData".to_string()]
        );
        assert_eq!(cfg.store_backend, StoreBackend::Sqlite);
    }

    #[test]
    fn field_context_borrows_settings() {
        let cfg = EngineConfig {
            list_delimiter: "; ".into(),
            ..EngineConfig::default()
        };
        let ctx = cfg.field_context();
        assert_eq!(ctx.delimiter, "; ");
        assert_eq!(ctx.default_country, "FRANCE");
    }
}
