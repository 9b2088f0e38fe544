use std::io::{self, Write};

use serde::Serialize;

use crate::domain::Lineage;
use crate::ncbi::{FetchOutcome, LoadSummary};

#[derive(Debug, Serialize)]
pub struct NewDatabaseResult {
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<FetchOutcome>,
    pub summary: LoadSummary,
}

#[derive(Debug, Serialize)]
pub struct NamedResult {
    pub requested: usize,
    pub named: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MergedEntry {
    pub tax_id: String,
    pub current: String,
    pub merged: bool,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_new_database(result: &NewDatabaseResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_lineages(lineages: &[Lineage]) -> io::Result<()> {
        Self::print_json(&lineages)
    }

    pub fn print_named(result: &NamedResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_merged(entries: &[MergedEntry]) -> io::Result<()> {
        Self::print_json(&entries)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
