//! Turns raw taxdump records into load-ready rows.
//!
//! Each normalizer yields a header row first, then data rows, so the
//! output can be handed straight to `Store::bulk_load` without a column
//! list. Nothing here touches the store.

use std::iter;

use tracing::debug;

use crate::domain::SCIENTIFIC_NAME;
use crate::error::TaxonomyError;
use crate::fs_util::Record;
use crate::rank::{RankLadder, ROOT_RANK};

/// A single load-ready column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Null,
    Int(i64),
    Text(String),
}

impl Field {
    pub fn text(value: impl Into<String>) -> Self {
        Field::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }
}

pub type Row = Vec<Field>;
pub type RowResult = Result<Row, TaxonomyError>;

pub const NODE_COLUMNS: &[&str] = &[
    "tax_id",
    "parent_id",
    "rank",
    "embl_code",
    "division_id",
    "source_id",
    "is_valid",
];

pub const NAME_COLUMNS: &[&str] = &[
    "tax_id",
    "tax_name",
    "unique_name",
    "name_class",
    "source_id",
    "is_primary",
    "is_classified",
];

pub const MERGE_COLUMNS: &[&str] = &["old_tax_id", "new_tax_id"];

pub fn header(columns: &[&str]) -> Row {
    columns.iter().map(|column| Field::text(*column)).collect()
}

/// Rows for the `nodes` table.
///
/// The first record is taken to be the root: its rank is forced to
/// `root` and its parent to NULL so that upward walks terminate. Ranks
/// are made single tokens, and ranks outside `ladder` fall back to the
/// ladder's placeholder rank.
pub fn normalize_nodes<'a, I>(
    records: I,
    source_id: i64,
    ladder: &'a RankLadder,
) -> Result<impl Iterator<Item = RowResult> + 'a, TaxonomyError>
where
    I: IntoIterator<Item = Result<Record, TaxonomyError>> + 'a,
    I::IntoIter: 'a,
{
    let mut records = records.into_iter();
    let first = records
        .next()
        .ok_or_else(|| TaxonomyError::EmptyDump("nodes.dmp".to_string()))??;

    let mut root = node_row(first, source_id, ladder)?;
    root[1] = Field::Null;
    root[2] = Field::text(ROOT_RANK);

    let rest = records
        .map(move |record| record.and_then(|fields| node_row(fields, source_id, ladder)));
    Ok(iter::once(Ok(header(NODE_COLUMNS)))
        .chain(iter::once(Ok(root)))
        .chain(rest))
}

fn node_row(fields: Record, source_id: i64, ladder: &RankLadder) -> RowResult {
    if fields.len() < 3 {
        return Err(TaxonomyError::MalformedRecord(format!(
            "nodes.dmp record needs tax_id, parent_id and rank: {fields:?}"
        )));
    }
    let mut fields = fields.into_iter();
    let tax_id = fields.next().unwrap_or_default();
    let parent_id = fields.next().unwrap_or_default();
    let raw_rank = fields.next().unwrap_or_default();
    let embl_code = fields.next().map(Field::Text).unwrap_or(Field::Null);
    let division_id = fields.next().map(Field::Text).unwrap_or(Field::Null);

    let mut rank = raw_rank.split_whitespace().collect::<Vec<_>>().join("_");
    if !ladder.contains(&rank) {
        debug!(tax_id = %tax_id, rank = %rank, "rank not on ladder; using placeholder");
        rank = ladder.no_rank().to_string();
    }

    Ok(vec![
        Field::Text(tax_id),
        Field::Text(parent_id),
        Field::Text(rank),
        embl_code,
        division_id,
        Field::Int(source_id),
        Field::Int(1),
    ])
}

/// Rows for the `names` table.
///
/// Input must arrive grouped by tax_id. Each group must contain exactly
/// one scientific name, which becomes the primary name; a group that
/// does not ends the stream with `PrimaryNameCount`.
pub fn normalize_names<I>(records: I, source_id: i64) -> impl Iterator<Item = RowResult>
where
    I: IntoIterator<Item = Result<Record, TaxonomyError>>,
{
    iter::once(Ok(header(NAME_COLUMNS))).chain(NameRows {
        records: records.into_iter(),
        source_id,
        current: None,
        primaries: 0,
        done: false,
    })
}

struct NameRows<I> {
    records: I,
    source_id: i64,
    current: Option<String>,
    primaries: usize,
    done: bool,
}

impl<I> NameRows<I> {
    fn close_group(&mut self) -> Result<(), TaxonomyError> {
        match self.current.take() {
            Some(tax_id) if self.primaries != 1 => Err(TaxonomyError::PrimaryNameCount {
                tax_id,
                count: self.primaries,
            }),
            _ => Ok(()),
        }
    }

    fn fail(&mut self, err: TaxonomyError) -> Option<RowResult> {
        self.done = true;
        Some(Err(err))
    }
}

impl<I> Iterator for NameRows<I>
where
    I: Iterator<Item = Result<Record, TaxonomyError>>,
{
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let fields = match self.records.next() {
            Some(Ok(fields)) => fields,
            Some(Err(err)) => return self.fail(err),
            None => {
                self.done = true;
                return self.close_group().err().map(Err);
            }
        };
        if fields.len() < 4 {
            return self.fail(TaxonomyError::MalformedRecord(format!(
                "names.dmp record needs tax_id, name, unique name and class: {fields:?}"
            )));
        }

        if self.current.as_deref() != Some(fields[0].as_str()) {
            if let Err(err) = self.close_group() {
                return self.fail(err);
            }
            self.current = Some(fields[0].clone());
            self.primaries = 0;
        }

        let is_primary = fields[3] == SCIENTIFIC_NAME;
        self.primaries += usize::from(is_primary);

        let mut row: Row = fields.into_iter().take(4).map(Field::Text).collect();
        row.extend([
            Field::Int(self.source_id),
            Field::Int(i64::from(is_primary)),
            Field::Null,
        ]);
        Some(Ok(row))
    }
}

/// Rows for the `merged` table.
pub fn normalize_merges<I>(records: I) -> impl Iterator<Item = RowResult>
where
    I: IntoIterator<Item = Result<Record, TaxonomyError>>,
{
    let rows = records.into_iter().map(|record| {
        let fields = record?;
        if fields.len() < 2 {
            return Err(TaxonomyError::MalformedRecord(format!(
                "merged.dmp record needs old and new tax_id: {fields:?}"
            )));
        }
        Ok(fields.into_iter().take(2).map(Field::Text).collect())
    });
    iter::once(Ok(header(MERGE_COLUMNS))).chain(rows)
}
