//! Global consistency checks, run after every bulk load and every edit.
//!
//! Both validators work on a plain connection so they can run inside an
//! open transaction (before commit) or standalone against a store.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use tracing::debug;

use crate::domain::SCIENTIFIC_NAME;
use crate::error::{TaxonomyError, sql};
use crate::rank::ROOT_RANK;

/// Which taxa a validator looks at.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    All,
    Taxa(&'a [String]),
}

impl Scope<'_> {
    /// An `AND <column> IN (...)` clause plus its bound values.
    fn filter(&self, column: &str) -> (String, Vec<Value>) {
        match self {
            Scope::All => (String::new(), Vec::new()),
            Scope::Taxa(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                (
                    format!(" AND {column} IN ({placeholders})"),
                    ids.iter().map(|id| Value::Text(id.clone())).collect(),
                )
            }
        }
    }
}

/// Every taxon in scope has exactly one primary scientific name.
pub fn validate_primary_names(conn: &Connection, scope: Scope<'_>) -> Result<(), TaxonomyError> {
    if matches!(scope, Scope::Taxa(ids) if ids.is_empty()) {
        return Ok(());
    }
    let (filter, values) = scope.filter("n.tax_id");
    let query = format!(
        "SELECT n.tax_id,
                COALESCE(SUM(CASE WHEN nm.is_primary = 1 AND nm.name_class = '{SCIENTIFIC_NAME}' THEN 1 ELSE 0 END), 0) AS primaries
         FROM nodes n
         LEFT JOIN names nm ON nm.tax_id = n.tax_id
         WHERE 1 = 1{filter}
         GROUP BY n.tax_id
         HAVING primaries != 1
         LIMIT 1"
    );
    let violation: Option<(String, i64)> = conn
        .query_row(&query, params_from_iter(values), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()
        .map_err(sql)?;
    debug!(?scope, ok = violation.is_none(), "validated primary names");
    match violation {
        Some((tax_id, count)) => Err(TaxonomyError::PrimaryNameCount {
            tax_id,
            count: count as usize,
        }),
        None => Ok(()),
    }
}

/// The node graph is a single-rooted forest whose ranks strictly decrease
/// in height from parent to child.
///
/// Edges touching a placeholder-rank node carry no ordering information
/// and are not compared.
pub fn validate_hierarchy(conn: &Connection, scope: Scope<'_>) -> Result<(), TaxonomyError> {
    if matches!(scope, Scope::Taxa(ids) if ids.is_empty()) {
        return Ok(());
    }
    check_single_root(conn)?;

    let (filter, values) = scope.filter("c.tax_id");
    let dangling = format!(
        "SELECT c.tax_id, c.parent_id FROM nodes c
         LEFT JOIN nodes p ON p.tax_id = c.parent_id
         WHERE c.parent_id IS NOT NULL AND p.tax_id IS NULL{filter}
         LIMIT 1"
    );
    let orphan: Option<(String, String)> = conn
        .query_row(&dangling, params_from_iter(values.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()
        .map_err(sql)?;
    if let Some((tax_id, parent_id)) = orphan {
        return Err(TaxonomyError::TaxonIntegrity(format!(
            "node {tax_id} references missing parent {parent_id}"
        )));
    }

    let unranked = format!(
        "SELECT c.tax_id, c.rank FROM nodes c
         LEFT JOIN ranks r ON r.rank = c.rank
         WHERE r.rank IS NULL{filter}
         LIMIT 1"
    );
    let unknown: Option<(String, Option<String>)> = conn
        .query_row(&unranked, params_from_iter(values.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()
        .map_err(sql)?;
    if let Some((tax_id, rank)) = unknown {
        return Err(TaxonomyError::TaxonIntegrity(format!(
            "node {tax_id} has rank {} which is not in the ranks table",
            rank.unwrap_or_default()
        )));
    }

    let ordering = format!(
        "SELECT c.tax_id, c.rank, p.tax_id, p.rank FROM nodes c
         JOIN nodes p ON p.tax_id = c.parent_id
         JOIN ranks rc ON rc.rank = c.rank
         JOIN ranks rp ON rp.rank = p.rank
         WHERE rc.height >= rp.height AND rc.no_rank = 0 AND rp.no_rank = 0{filter}
         LIMIT 1"
    );
    let inverted: Option<(String, String, String, String)> = conn
        .query_row(&ordering, params_from_iter(values.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .optional()
        .map_err(sql)?;
    debug!(?scope, ok = inverted.is_none(), "validated rank ordering");
    if let Some((tax_id, rank, parent_id, parent_rank)) = inverted {
        return Err(TaxonomyError::TaxonIntegrity(format!(
            "node {tax_id} ({rank}) is not below its parent {parent_id} ({parent_rank})"
        )));
    }
    Ok(())
}

fn check_single_root(conn: &Connection) -> Result<(), TaxonomyError> {
    let mut stmt = conn
        .prepare("SELECT tax_id, rank FROM nodes WHERE parent_id IS NULL LIMIT 2")
        .map_err(sql)?;
    let roots = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))
        .map_err(sql)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sql)?;
    match roots.as_slice() {
        [] => {
            let empty: bool = conn
                .query_row("SELECT NOT EXISTS (SELECT 1 FROM nodes)", [], |row| row.get(0))
                .map_err(sql)?;
            if empty {
                Ok(())
            } else {
                Err(TaxonomyError::TaxonIntegrity(
                    "taxonomy has no root (no node with a null parent)".to_string(),
                ))
            }
        }
        [(_, Some(rank))] if rank == ROOT_RANK => Ok(()),
        [(tax_id, rank)] => Err(TaxonomyError::TaxonIntegrity(format!(
            "root node {tax_id} must have rank {ROOT_RANK}, found {}",
            rank.as_deref().unwrap_or("NULL")
        ))),
        _ => Err(TaxonomyError::TaxonIntegrity(
            "taxonomy has more than one node with a null parent".to_string(),
        )),
    }
}

/// Runs both validators.
pub fn validate_all(conn: &Connection, scope: Scope<'_>) -> Result<(), TaxonomyError> {
    validate_hierarchy(conn, scope)?;
    validate_primary_names(conn, scope)
}
