use std::fs;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::TaxonomyError;

pub const FIELD_SEPARATOR: &str = "\t|\t";
pub const RECORD_TERMINATOR: &str = "\t|";

/// One split line of a taxdump member.
pub type Record = Vec<String>;

/// Lazily splits `\t|\t`-delimited dump lines from any buffered reader.
pub struct DumpRecords<R> {
    reader: R,
    line: String,
    line_no: usize,
    origin: String,
}

impl<R: BufRead> DumpRecords<R> {
    pub fn new(reader: R, origin: impl Into<String>) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
            origin: origin.into(),
        }
    }
}

impl<R: BufRead> Iterator for DumpRecords<R> {
    type Item = Result<Record, TaxonomyError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            self.line_no += 1;
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {
                    if let Some(record) = split_record(&self.line) {
                        return Some(Ok(record));
                    }
                }
                Err(err) => {
                    return Some(Err(TaxonomyError::MalformedRecord(format!(
                        "{} line {}: {err}",
                        self.origin, self.line_no
                    ))));
                }
            }
        }
    }
}

/// Splits one dump line; blank lines yield `None`.
pub fn split_record(line: &str) -> Option<Record> {
    let line = line.trim_end_matches(['\n', '\r']);
    let line = line.strip_suffix(RECORD_TERMINATOR).unwrap_or(line);
    if line.trim().is_empty() {
        return None;
    }
    Some(line.split(FIELD_SEPARATOR).map(str::to_string).collect())
}

/// Records of `member` inside a zip archive such as `taxdmp.zip`.
pub fn read_archive(
    archive: &Path,
    member: &str,
) -> Result<DumpRecords<Cursor<Vec<u8>>>, TaxonomyError> {
    let file = fs::File::open(archive)
        .map_err(|err| TaxonomyError::Archive(format!("open zip {}: {err}", archive.display())))?;
    let mut zip = ZipArchive::new(file).map_err(|err| TaxonomyError::Archive(err.to_string()))?;
    let mut entry = zip.by_name(member).map_err(|err| {
        TaxonomyError::Archive(format!("{member} in {}: {err}", archive.display()))
    })?;
    let mut content = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut content)
        .map_err(|err| TaxonomyError::Archive(err.to_string()))?;
    Ok(DumpRecords::new(Cursor::new(content), member))
}

/// Records of a flat dump file; `.gz` files are decompressed on the fly.
pub fn read_raw_file(path: &Path) -> Result<DumpRecords<Box<dyn BufRead>>, TaxonomyError> {
    let file = fs::File::open(path)
        .map_err(|err| TaxonomyError::Filesystem(format!("open {}: {err}", path.display())))?;
    let reader: Box<dyn BufRead> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(DumpRecords::new(reader, path.display().to_string()))
}

/// Finds `member` (or `member.gz`) in a directory of extracted dump files.
pub fn dump_file(dir: &Path, member: &str) -> io::Result<std::path::PathBuf> {
    let plain = dir.join(member);
    if plain.exists() {
        return Ok(plain);
    }
    let gz = dir.join(format!("{member}.gz"));
    if gz.exists() {
        return Ok(gz);
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{member} not found in {}", dir.display()),
    ))
}
