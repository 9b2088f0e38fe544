#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use kira_taxonomy::config::ResolvedConfig;
use kira_taxonomy::ncbi::{DumpSource, LoadSummary, load_taxdump};
use kira_taxonomy::store::Store;
use kira_taxonomy::taxonomy::Taxonomy;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// A trimmed Firmicutes corner of NCBI: tax_id, parent_id, rank.
pub const NODES: &[(&str, &str, &str)] = &[
    ("1", "1", "no rank"),
    ("131567", "1", "no rank"),
    ("2", "131567", "superkingdom"),
    ("1239", "2", "phylum"),
    ("91061", "1239", "class"),
    ("186801", "1239", "class"),
    ("2000000", "1239", "clade"),
    ("1385", "91061", "order"),
    ("90964", "1385", "family"),
    ("1279", "90964", "genus"),
    ("1280", "1279", "species"),
    ("1281", "1279", "species"),
    ("1282", "1279", "species"),
    ("46170", "1280", "subspecies"),
    ("186802", "186801", "order"),
    ("31979", "186802", "family"),
    ("1485", "31979", "genus"),
    ("1502", "1485", "species"),
    ("1534", "1485", "species"),
    ("2000001", "2000000", "species"),
];

/// tax_id, name, unique name, name class; grouped by tax_id.
pub const NAMES: &[(&str, &str, &str, &str)] = &[
    ("1", "root", "", "scientific name"),
    ("131567", "cellular organisms", "", "scientific name"),
    ("2", "Bacteria", "Bacteria <bacteria>", "scientific name"),
    ("2", "eubacteria", "", "genbank common name"),
    ("1239", "Firmicutes", "", "scientific name"),
    ("1239", "Bacillota", "", "synonym"),
    ("91061", "Bacilli", "", "scientific name"),
    ("186801", "Clostridia", "", "scientific name"),
    ("2000000", "Bacillota incertae sedis", "", "scientific name"),
    ("1385", "Bacillales", "", "scientific name"),
    ("90964", "Staphylococcaceae", "", "scientific name"),
    ("1279", "Staphylococcus", "", "scientific name"),
    ("1280", "Staphylococcus aureus", "", "scientific name"),
    ("1280", "Micrococcus aureus", "", "synonym"),
    ("1281", "Staphylococcus carnosus", "", "scientific name"),
    ("1282", "Staphylococcus epidermidis", "", "scientific name"),
    ("46170", "Staphylococcus aureus subsp. aureus", "", "scientific name"),
    ("186802", "Eubacteriales", "", "scientific name"),
    ("186802", "Clostridiales", "", "synonym"),
    ("31979", "Clostridiaceae", "", "scientific name"),
    ("1485", "Clostridium", "", "scientific name"),
    ("1502", "Clostridium perfringens", "", "scientific name"),
    ("1534", "uncultured Clostridium sp.", "", "scientific name"),
    ("2000001", "Abyssibacillus profundus", "", "scientific name"),
];

/// old_tax_id, new_tax_id
pub const MERGED: &[(&str, &str)] = &[("12345", "1280"), ("99999", "1502")];

fn dump_line(fields: &[&str]) -> String {
    format!("{}\t|\n", fields.join("\t|\t"))
}

pub fn nodes_dmp() -> String {
    NODES
        .iter()
        .map(|&(tax_id, parent_id, rank)| dump_line(&[tax_id, parent_id, rank, "", "0"]))
        .collect()
}

pub fn names_dmp() -> String {
    NAMES
        .iter()
        .map(|&(tax_id, name, unique, class)| dump_line(&[tax_id, name, unique, class]))
        .collect()
}

pub fn merged_dmp() -> String {
    MERGED
        .iter()
        .map(|&(old, new)| dump_line(&[old, new]))
        .collect()
}

/// Writes nodes.dmp, names.dmp and merged.dmp into `dir`.
pub fn write_dump(dir: &Path) {
    fs::write(dir.join("nodes.dmp"), nodes_dmp()).unwrap();
    fs::write(dir.join("names.dmp"), names_dmp()).unwrap();
    fs::write(dir.join("merged.dmp"), merged_dmp()).unwrap();
}

/// Writes the same dump as a taxdmp.zip archive and returns its path.
pub fn write_archive(dir: &Path) -> PathBuf {
    let path = dir.join("taxdmp.zip");
    let file = fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (member, content) in [
        ("nodes.dmp", nodes_dmp()),
        ("names.dmp", names_dmp()),
        ("merged.dmp", merged_dmp()),
    ] {
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file(member, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

pub fn empty_store() -> Store {
    let mut store = Store::open_in_memory().unwrap();
    store.initialize_schema(false).unwrap();
    store
}

/// An in-memory store loaded from the fixture dump.
pub fn loaded_store() -> (Store, LoadSummary) {
    let temp = TempDir::new().unwrap();
    write_dump(temp.path());
    let mut store = empty_store();
    let summary = load_taxdump(
        &mut store,
        &DumpSource::Directory(temp.path().to_path_buf()),
        &ResolvedConfig::default(),
    )
    .unwrap();
    (store, summary)
}

pub fn taxonomy() -> Taxonomy {
    let (store, _) = loaded_store();
    Taxonomy::open(store).unwrap()
}
