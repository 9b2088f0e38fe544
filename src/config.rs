use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::classify::{Classifier, UNCLASSIFIED_PATTERNS};
use crate::error::TaxonomyError;
use crate::ncbi::DATA_URL;
use crate::rank::{NCBI_RANKS, NO_RANK, RankLadder};

pub const DEFAULT_CONFIG_FILE: &str = "kira-tax.json";
pub const DEFAULT_SOURCE_NAME: &str = "ncbi";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub ranks: Option<Vec<String>>,
    #[serde(default)]
    pub no_rank: Option<String>,
    #[serde(default)]
    pub unclassified_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub source: Option<SourceEntry>,
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SourceEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Immutable settings shared by ingestion, classification and the engine
/// for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub ladder: RankLadder,
    pub classifier: Classifier,
    pub source_name: String,
    pub source_description: Option<String>,
    pub database: Option<Utf8PathBuf>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            ladder: RankLadder::default(),
            classifier: Classifier::default(),
            source_name: DEFAULT_SOURCE_NAME.to_string(),
            source_description: Some(DATA_URL.to_string()),
            database: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `kira-tax.json` in the working directory when it
    /// exists, falling back to the built-in NCBI settings.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, TaxonomyError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| TaxonomyError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| TaxonomyError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, TaxonomyError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let no_rank = config.no_rank.unwrap_or_else(|| NO_RANK.to_string());
        let ladder = match config.ranks {
            Some(ranks) => RankLadder::new(ranks, &no_rank)?,
            None => RankLadder::new(NCBI_RANKS.iter().map(|rank| rank.to_string()), &no_rank)?,
        };

        let classifier = match config.unclassified_patterns {
            Some(patterns) => Classifier::new(patterns)?,
            None => Classifier::new(UNCLASSIFIED_PATTERNS)?,
        };

        let (source_name, source_description) = match config.source {
            Some(source) => (source.name, source.description),
            None => (DEFAULT_SOURCE_NAME.to_string(), Some(DATA_URL.to_string())),
        };

        Ok(ResolvedConfig {
            schema_version,
            ladder,
            classifier,
            source_name,
            source_description,
            database: config.database.map(Utf8PathBuf::from),
        })
    }
}
