use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::info;

use crate::classify::set_classified;
use crate::config::ResolvedConfig;
use crate::error::{TaxonomyError, sql};
use crate::fs_util::{Record, dump_file, read_archive, read_raw_file};
use crate::normalize::{normalize_merges, normalize_names, normalize_nodes};
use crate::store::{Store, add_source, load_rows, seed_ranks};
use crate::validate::{Scope, validate_all};

pub const DATA_URL: &str = "https://ftp.ncbi.nlm.nih.gov/pub/taxonomy/taxdmp.zip";

pub const NODES_MEMBER: &str = "nodes.dmp";
pub const NAMES_MEMBER: &str = "names.dmp";
pub const MERGED_MEMBER: &str = "merged.dmp";

/// Where a taxdump comes from: the `taxdmp.zip` archive, or a directory
/// holding the extracted (optionally gzipped) `.dmp` files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpSource {
    Archive(PathBuf),
    Directory(PathBuf),
}

impl DumpSource {
    pub fn from_path(path: &Path) -> Self {
        if path.is_dir() {
            DumpSource::Directory(path.to_path_buf())
        } else {
            DumpSource::Archive(path.to_path_buf())
        }
    }

    pub fn records(
        &self,
        member: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<Record, TaxonomyError>>>, TaxonomyError> {
        match self {
            DumpSource::Archive(archive) => Ok(Box::new(read_archive(archive, member)?)),
            DumpSource::Directory(dir) => {
                let path = dump_file(dir, member)
                    .map_err(|err| TaxonomyError::Filesystem(err.to_string()))?;
                Ok(Box::new(read_raw_file(&path)?))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub source_id: i64,
    pub ranks: usize,
    pub nodes: usize,
    pub names: usize,
    pub merged: usize,
    pub unclassified: usize,
}

/// Imports a full taxdump in one transaction: source, ranks, nodes, names
/// and merged rows, then both validators and the classification pass.
/// Any failure rolls the whole import back.
pub fn load_taxdump(
    store: &mut Store,
    dump: &DumpSource,
    config: &ResolvedConfig,
) -> Result<LoadSummary, TaxonomyError> {
    let tx = store.transaction()?;

    let (source_id, _) = add_source(
        &tx,
        &config.source_name,
        config.source_description.as_deref(),
    )?;

    info!("loading ranks");
    let ranks = seed_ranks(&tx, &config.ladder)?;

    info!("loading nodes");
    let node_rows = normalize_nodes(dump.records(NODES_MEMBER)?, source_id, &config.ladder)?;
    let nodes = load_rows(&tx, "nodes", None, node_rows)?;

    info!("loading names");
    let names = load_rows(
        &tx,
        "names",
        None,
        normalize_names(dump.records(NAMES_MEMBER)?, source_id),
    )?;

    info!("loading merged");
    let merged = load_rows(&tx, "merged", None, normalize_merges(dump.records(MERGED_MEMBER)?))?;

    validate_all(&tx, Scope::All)?;
    let unclassified = set_classified(&tx, &config.classifier)?;

    tx.commit().map_err(sql)?;
    Ok(LoadSummary {
        source_id,
        ranks,
        nodes,
        names,
        merged,
        unclassified,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    pub path: PathBuf,
    pub downloaded: bool,
}

/// Retrieval of the taxdump archive onto local storage.
pub trait TaxdumpClient: Send + Sync {
    fn fetch(&self, dest_dir: &Path, clobber: bool) -> Result<FetchOutcome, TaxonomyError>;
}

#[derive(Clone)]
pub struct TaxdumpHttpClient {
    client: Client,
    url: String,
}

impl TaxdumpHttpClient {
    pub fn new() -> Result<Self, TaxonomyError> {
        Self::with_url(DATA_URL)
    }

    pub fn with_url(url: &str) -> Result<Self, TaxonomyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-tax/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TaxonomyError::Download(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|err| TaxonomyError::Download(err.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn target_path(&self, dest_dir: &Path) -> PathBuf {
        let file_name = self
            .url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("taxdmp.zip");
        dest_dir.join(file_name)
    }
}

impl TaxdumpClient for TaxdumpHttpClient {
    fn fetch(&self, dest_dir: &Path, clobber: bool) -> Result<FetchOutcome, TaxonomyError> {
        fs::create_dir_all(dest_dir).map_err(|err| TaxonomyError::Filesystem(err.to_string()))?;
        let target = self.target_path(dest_dir);
        if target.exists() && !clobber {
            info!(path = %target.display(), "taxdump exists; not downloading");
            return Ok(FetchOutcome {
                path: target,
                downloaded: false,
            });
        }

        info!(url = %self.url, path = %target.display(), "downloading taxdump");
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|err| TaxonomyError::Download(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "taxdump request failed".to_string());
            return Err(TaxonomyError::DownloadStatus { status, message });
        }

        let mut temp = tempfile::Builder::new()
            .prefix("kira-tax-download")
            .tempfile_in(dest_dir)
            .map_err(|err| TaxonomyError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, temp.as_file_mut())
            .map_err(|err| TaxonomyError::Download(err.to_string()))?;
        if target.exists() {
            fs::remove_file(&target).map_err(|err| TaxonomyError::Filesystem(err.to_string()))?;
        }
        temp.persist(&target)
            .map_err(|err| TaxonomyError::Filesystem(err.to_string()))?;

        Ok(FetchOutcome {
            path: target,
            downloaded: true,
        })
    }
}
