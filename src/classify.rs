use regex::Regex;
use rusqlite::{Connection, params};
use tracing::info;

use crate::error::{TaxonomyError, sql};
use crate::rank::ROOT_RANK;

/// Regex fragments marking a species name as informal or unclassified
/// (environmental samples, uncultured clones, "sp." placeholders...).
///
/// A name starting with a lower-case letter is also unclassified, except
/// the literal `root`; that exception lives in `Classifier::is_unclassified`.
pub const UNCLASSIFIED_PATTERNS: &[&str] = &[
    r"-like\b",
    r"\bactinomycete\b",
    r"\bcrenarchaeote\b",
    r"\bculture\b",
    r"\bchimeric\b",
    r"\bcyanobiont\b",
    r"degrading",
    r"\beuryarchaeote\b",
    r"disease",
    r"\b[cC]lone",
    r"\bmethanogen(ic)?\b",
    r"\bplanktonic\b",
    r"\bplanctomycete\b",
    r"\bsymbiote\b",
    r"\btransconjugant\b",
    r"^[a-z]",
    r"^\W+\s+[a-zA-Z]*\d",
    r"\d\d",
    r"atypical",
    r"^cf\.",
    r"acidophile",
    r"\bactinobacterium\b",
    r"aerobic",
    r".+\b[Al]g(um|a)\b",
    r"\b[Bb]acteri(um|al)\b",
    r".+\b[Bb]acteria\b",
    r"Barophile",
    r"cyanobacterium",
    r"Chloroplast",
    r"Cloning",
    r"\bclone\b",
    r"cluster",
    r"^diazotroph",
    r"\bcoccus\b",
    r"archaeon",
    r"-containing",
    r"epibiont",
    r"environmental samples",
    r"eubacterium",
    r"halophilic",
    r"hydrothermal\b",
    r"isolate",
    r"\bmarine\b",
    r"methanotroph",
    r"microorganism",
    r"mollicute",
    r"pathogen",
    r"[Pp]hytoplasma",
    r"proteobacterium",
    r"putative",
    r"\bsp\.",
    r"species",
    r"spirochete",
    r"str\.",
    r"strain",
    r"symbiont",
    r"\b[Tt]axon\b",
    r"unicellular",
    r"uncultured",
    r"unclassified",
    r"unidentified",
    r"unknown",
    r"vector\b",
    r"vent\b",
];

/// A compiled alternation of unclassified-name patterns.
#[derive(Debug, Clone)]
pub struct Classifier {
    regex: Regex,
}

impl Classifier {
    pub fn new<I, S>(patterns: I) -> Result<Self, TaxonomyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternation = patterns
            .into_iter()
            .map(|pattern| format!("(?:{})", pattern.as_ref()))
            .collect::<Vec<_>>()
            .join("|");
        let regex =
            Regex::new(&alternation).map_err(|err| TaxonomyError::InvalidPattern(err.to_string()))?;
        Ok(Self { regex })
    }

    pub fn is_unclassified(&self, tax_name: &str) -> bool {
        tax_name != ROOT_RANK && self.regex.is_match(tax_name)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(UNCLASSIFIED_PATTERNS)
            .unwrap_or_else(|_| unreachable!("built-in patterns compile"))
    }
}

/// Flags species whose primary name matches `classifier` by setting
/// `is_classified = 0` on their names. Returns the number of taxa flagged.
pub fn set_classified(conn: &Connection, classifier: &Classifier) -> Result<usize, TaxonomyError> {
    let mut stmt = conn
        .prepare(
            "SELECT tax_id, tax_name
             FROM names
             JOIN nodes USING (tax_id)
             WHERE is_primary = 1 AND rank = 'species'",
        )
        .map_err(sql)?;
    let unclassified = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(sql)?
        .filter_map(|row| match row {
            Ok((tax_id, tax_name)) if classifier.is_unclassified(&tax_name) => Some(Ok(tax_id)),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(sql)?;
    drop(stmt);

    conn.execute_batch(
        "DROP TABLE IF EXISTS temp.unclassified_taxa;
         CREATE TEMPORARY TABLE unclassified_taxa (tax_id TEXT PRIMARY KEY);",
    )
    .map_err(sql)?;
    {
        let mut insert = conn
            .prepare("INSERT OR IGNORE INTO temp.unclassified_taxa (tax_id) VALUES (?1)")
            .map_err(sql)?;
        for tax_id in &unclassified {
            insert.execute(params![tax_id]).map_err(sql)?;
        }
    }
    conn.execute(
        "UPDATE names SET is_classified = 0
         WHERE tax_id IN (SELECT tax_id FROM temp.unclassified_taxa)",
        [],
    )
    .map_err(sql)?;
    conn.execute_batch("DROP TABLE temp.unclassified_taxa;")
        .map_err(sql)?;

    info!(species = unclassified.len(), "flagged unclassified species");
    Ok(unclassified.len())
}
