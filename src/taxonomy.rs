//! Query and mutation API over a loaded taxonomy.
//!
//! Lookups take `&str` ids; an empty id stands for "no taxon" and yields
//! `None` or an empty result instead of an error. Only `lineage` treats a
//! missing taxon as an error. Child, sibling and subtree enumeration order
//! ids shortest first, then lexically, so `"91061"` comes before `"186801"`.

use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

use crate::domain::{
    EditRecord, Lineage, LineageStep, NameEntry, NewName, NewNode, NodeRecord, SCIENTIFIC_NAME,
    SYNONYM, SourceRef,
};
use crate::error::{TaxonomyError, sql};
use crate::rank::{RankLadder, ROOT_RANK};
use crate::store::{self, Store};
use crate::validate::{Scope, validate_all, validate_primary_names};

/// Upper bound on parent hops; a walk that needs more is a cycle.
const MAX_DEPTH: i64 = 1024;

const SPECIES: &str = "species";

#[derive(Debug)]
pub struct Taxonomy {
    store: Store,
    ladder: RankLadder,
}

impl Taxonomy {
    /// Opens the engine over a loaded store, reading the ladder from its
    /// `ranks` table.
    pub fn open(store: Store) -> Result<Self, TaxonomyError> {
        let ladder = store.rank_ladder()?;
        Self::with_ladder(store, ladder)
    }

    pub fn with_ladder(store: Store, ladder: RankLadder) -> Result<Self, TaxonomyError> {
        let misplaced: Option<String> = store
            .connection()
            .query_row(
                "SELECT tax_id FROM nodes WHERE rank = ?1 AND parent_id IS NOT NULL LIMIT 1",
                params![ROOT_RANK],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql)?;
        if let Some(tax_id) = misplaced {
            return Err(TaxonomyError::TaxonIntegrity(format!(
                "root node {tax_id} must have a null parent_id"
            )));
        }
        Ok(Self { store, ladder })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    pub fn ladder(&self) -> &RankLadder {
        &self.ladder
    }

    pub fn is_below(lower: &str, upper: &str) -> Result<bool, TaxonomyError> {
        RankLadder::standard().is_below(lower, upper)
    }

    pub fn ranks_below(rank: &str) -> Result<Vec<String>, TaxonomyError> {
        RankLadder::standard().ranks_below(rank)
    }

    pub fn node(&self, tax_id: &str) -> Result<Option<NodeRecord>, TaxonomyError> {
        if tax_id.is_empty() {
            return Ok(None);
        }
        let no_rank = self.ladder.no_rank();
        self.store
            .connection()
            .query_row(
                "SELECT tax_id, parent_id, rank, embl_code, division_id, source_id, is_valid
                 FROM nodes WHERE tax_id = ?1",
                params![tax_id],
                |row| {
                    Ok(NodeRecord {
                        tax_id: row.get(0)?,
                        parent_id: row.get(1)?,
                        rank: row
                            .get::<_, Option<String>>(2)?
                            .unwrap_or_else(|| no_rank.to_string()),
                        embl_code: row.get(3)?,
                        division_id: row.get(4)?,
                        source_id: row.get(5)?,
                        is_valid: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(sql)
    }

    pub fn rank(&self, tax_id: &str) -> Result<Option<String>, TaxonomyError> {
        Ok(self.node(tax_id)?.map(|node| node.rank))
    }

    pub fn parent_id(&self, tax_id: &str) -> Result<Option<String>, TaxonomyError> {
        Ok(self.node(tax_id)?.and_then(|node| node.parent_id))
    }

    /// The current id for a renumbered one; ids that were never merged
    /// come back unchanged.
    pub fn resolve_merged(&self, tax_id: &str) -> Result<Option<String>, TaxonomyError> {
        if tax_id.is_empty() {
            return Ok(None);
        }
        let merged: Option<String> = self
            .store
            .connection()
            .query_row(
                "SELECT new_tax_id FROM merged WHERE old_tax_id = ?1",
                params![tax_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql)?;
        Ok(Some(merged.unwrap_or_else(|| tax_id.to_string())))
    }

    /// The taxon with its ancestors from the parent up to the root.
    pub fn lineage(&self, tax_id: &str) -> Result<Lineage, TaxonomyError> {
        let current = self
            .resolve_merged(tax_id)?
            .ok_or_else(|| TaxonomyError::TaxonNotFound(tax_id.to_string()))?;
        let no_rank = self.ladder.no_rank();

        let conn = self.store.connection();
        let mut stmt = conn
            .prepare(
                "WITH RECURSIVE up(tax_id, parent_id, rank, depth) AS (
                     SELECT tax_id, parent_id, rank, 0 FROM nodes WHERE tax_id = ?1
                     UNION ALL
                     SELECT n.tax_id, n.parent_id, n.rank, up.depth + 1
                     FROM nodes n JOIN up ON n.tax_id = up.parent_id
                     WHERE up.depth < ?2
                 )
                 SELECT up.tax_id, up.parent_id, up.rank, nm.tax_name
                 FROM up
                 LEFT JOIN names nm ON nm.tax_id = up.tax_id AND nm.is_primary = 1
                 ORDER BY up.depth",
            )
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![current, MAX_DEPTH], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(sql)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql)?;

        let mut rows = rows.into_iter();
        let (tax_id, parent_id, rank, tax_name) = rows
            .next()
            .ok_or_else(|| TaxonomyError::TaxonNotFound(tax_id.to_string()))?;
        let mut last_parent = parent_id.clone();
        let mut ancestors = Vec::new();
        for (step_id, step_parent, step_rank, step_name) in rows {
            last_parent = step_parent;
            ancestors.push(LineageStep {
                tax_id: step_id,
                rank: step_rank.unwrap_or_else(|| no_rank.to_string()),
                tax_name: step_name,
            });
        }
        if let Some(dangling) = last_parent {
            return Err(TaxonomyError::TaxonIntegrity(format!(
                "lineage of {tax_id} does not reach the root (stopped at parent {dangling})"
            )));
        }

        Ok(Lineage {
            tax_id,
            parent_id,
            rank: rank.unwrap_or_else(|| no_rank.to_string()),
            tax_name,
            ancestors,
        })
    }

    /// True iff `candidate` is a strict ancestor of `tax_id`.
    pub fn is_ancestor_of(&self, candidate: &str, tax_id: &str) -> Result<bool, TaxonomyError> {
        if candidate.is_empty() || tax_id.is_empty() {
            return Ok(false);
        }
        self.store
            .connection()
            .query_row(
                "WITH RECURSIVE up(tax_id, parent_id, depth) AS (
                     SELECT tax_id, parent_id, 0 FROM nodes WHERE tax_id = ?1
                     UNION ALL
                     SELECT n.tax_id, n.parent_id, up.depth + 1
                     FROM nodes n JOIN up ON n.tax_id = up.parent_id
                     WHERE up.depth < ?3
                 )
                 SELECT EXISTS (SELECT 1 FROM up WHERE depth > 0 AND tax_id = ?2)",
                params![tax_id, candidate, MAX_DEPTH],
                |row| row.get(0),
            )
            .map_err(sql)
    }

    pub fn sibling_of(&self, tax_id: &str) -> Result<Option<String>, TaxonomyError> {
        if tax_id.is_empty() {
            return Ok(None);
        }
        let sibling: Option<String> = self
            .store
            .connection()
            .query_row(
                "SELECT tax_id FROM nodes
                 WHERE parent_id = (SELECT parent_id FROM nodes WHERE tax_id = ?1)
                   AND tax_id != ?1
                 ORDER BY length(tax_id), tax_id
                 LIMIT 1",
                params![tax_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql)?;
        if sibling.is_none() {
            debug!(tax_id, "no sibling found");
        }
        Ok(sibling)
    }

    pub fn child_of(&self, tax_id: &str) -> Result<Option<String>, TaxonomyError> {
        let child = self.children(tax_id, Some(1))?.into_iter().next();
        if child.is_none() {
            debug!(tax_id, "no child found");
        }
        Ok(child)
    }

    /// Up to `n` direct children of `tax_id`.
    pub fn children_of(&self, tax_id: &str, n: usize) -> Result<Vec<String>, TaxonomyError> {
        self.children(tax_id, Some(n))
    }

    /// Direct children, placeholder-rank ones included.
    fn children(&self, tax_id: &str, limit: Option<usize>) -> Result<Vec<String>, TaxonomyError> {
        if tax_id.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.map_or(-1, |n| n as i64);
        let conn = self.store.connection();
        let mut stmt = conn
            .prepare_cached(
                "SELECT tax_id FROM nodes
                 WHERE parent_id = ?1
                 ORDER BY length(tax_id), tax_id
                 LIMIT ?2",
            )
            .map_err(sql)?;
        stmt.query_map(params![tax_id, limit], |row| row.get(0))
            .map_err(sql)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql)
    }

    /// A species strictly below `tax_id`, if any.
    pub fn species_below(&self, tax_id: &str) -> Result<Option<String>, TaxonomyError> {
        if tax_id.is_empty() {
            return Ok(None);
        }
        self.store
            .connection()
            .query_row(
                "WITH RECURSIVE down(tax_id, rank, depth) AS (
                     SELECT tax_id, rank, 0 FROM nodes WHERE tax_id = ?1
                     UNION ALL
                     SELECT n.tax_id, n.rank, down.depth + 1
                     FROM nodes n JOIN down ON n.parent_id = down.tax_id
                     WHERE down.depth < ?3 AND down.rank != ?2
                 )
                 SELECT tax_id FROM down
                 WHERE depth > 0 AND rank = ?2
                 ORDER BY depth, length(tax_id), tax_id
                 LIMIT 1",
                params![tax_id, SPECIES, MAX_DEPTH],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql)
    }

    /// Species reached by a pre-order walk over the children of `tax_id`,
    /// descending no further than species. Unranked nodes are walked
    /// through. A species `tax_id` yields itself.
    pub fn nary_subtree(&self, tax_id: &str) -> Result<Option<Vec<String>>, TaxonomyError> {
        self.subtree(tax_id, None)
    }

    /// Like `nary_subtree`, but follows at most `per_node` children of
    /// each node.
    pub fn nary_subtree_capped(
        &self,
        tax_id: &str,
        per_node: usize,
    ) -> Result<Option<Vec<String>>, TaxonomyError> {
        self.subtree(tax_id, Some(per_node))
    }

    fn subtree(
        &self,
        tax_id: &str,
        per_node: Option<usize>,
    ) -> Result<Option<Vec<String>>, TaxonomyError> {
        let Some(root) = self.node(tax_id)? else {
            return Ok(None);
        };
        let mut species = Vec::new();
        let mut stack = vec![(root.tax_id, root.rank)];
        while let Some((current, rank)) = stack.pop() {
            if rank == SPECIES {
                species.push(current);
                continue;
            }
            let children = self.children(&current, per_node)?;
            for child in children.into_iter().rev() {
                let rank = self.rank(&child)?.unwrap_or_default();
                stack.push((child, rank));
            }
        }
        Ok(Some(species))
    }

    /// The ancestor of `tax_id` at `rank`.
    pub fn parent_at_rank(
        &self,
        tax_id: &str,
        rank: &str,
    ) -> Result<Option<String>, TaxonomyError> {
        self.ladder.height(rank)?;
        if tax_id.is_empty() {
            return Ok(None);
        }
        self.store
            .connection()
            .query_row(
                "WITH RECURSIVE up(tax_id, parent_id, rank, depth) AS (
                     SELECT tax_id, parent_id, rank, 0 FROM nodes WHERE tax_id = ?1
                     UNION ALL
                     SELECT n.tax_id, n.parent_id, n.rank, up.depth + 1
                     FROM nodes n JOIN up ON n.tax_id = up.parent_id
                     WHERE up.depth < ?3
                 )
                 SELECT tax_id FROM up WHERE depth > 0 AND rank = ?2 ORDER BY depth LIMIT 1",
                params![tax_id, rank, MAX_DEPTH],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql)
    }

    pub fn tax_ids(&self) -> Result<Vec<String>, TaxonomyError> {
        let conn = self.store.connection();
        let mut stmt = conn
            .prepare("SELECT tax_id FROM nodes ORDER BY length(tax_id), tax_id")
            .map_err(sql)?;
        stmt.query_map([], |row| row.get(0))
            .map_err(sql)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql)
    }

    pub fn primary_name(&self, tax_id: &str) -> Result<Option<String>, TaxonomyError> {
        if tax_id.is_empty() {
            return Ok(None);
        }
        self.store
            .connection()
            .query_row(
                "SELECT tax_name FROM names WHERE tax_id = ?1 AND is_primary = 1",
                params![tax_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql)
    }

    /// `(tax_id, primary name, whether tax_name is itself primary)` for a
    /// taxon carrying `tax_name`.
    pub fn primary_from_name(
        &self,
        tax_name: &str,
    ) -> Result<Option<(String, String, bool)>, TaxonomyError> {
        if tax_name.is_empty() {
            return Ok(None);
        }
        let found: Option<(String, bool)> = self
            .store
            .connection()
            .query_row(
                "SELECT tax_id, COALESCE(is_primary, 0) FROM names
                 WHERE tax_name = ?1
                 ORDER BY is_primary DESC, length(tax_id), tax_id
                 LIMIT 1",
                params![tax_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(sql)?;
        let Some((tax_id, is_primary)) = found else {
            return Ok(None);
        };
        let primary = if is_primary {
            tax_name.to_string()
        } else {
            self.primary_name(&tax_id)?.unwrap_or_default()
        };
        Ok(Some((tax_id, primary, is_primary)))
    }

    pub fn synonyms(&self, tax_id: &str) -> Result<Vec<NameEntry>, TaxonomyError> {
        if tax_id.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.store.connection();
        let mut stmt = conn
            .prepare(
                "SELECT tax_name, name_class, COALESCE(is_primary, 0) FROM names
                 WHERE tax_id = ?1
                 ORDER BY is_primary DESC, id",
            )
            .map_err(sql)?;
        stmt.query_map(params![tax_id], |row| {
            Ok(NameEntry {
                tax_name: row.get(0)?,
                name_class: row.get(1)?,
                is_primary: row.get(2)?,
            })
        })
        .map_err(sql)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sql)
    }

    /// The ids among `tax_ids` that exist and are not flagged
    /// unclassified, keeping input order. Placeholder-rank taxa are
    /// dropped unless `include_no_rank`.
    pub fn named(
        &self,
        tax_ids: &[String],
        include_no_rank: bool,
    ) -> Result<Vec<String>, TaxonomyError> {
        let conn = self.store.connection();
        let mut stmt = conn
            .prepare(
                "SELECT EXISTS (
                     SELECT 1 FROM nodes n
                     JOIN names nm ON nm.tax_id = n.tax_id AND nm.is_primary = 1
                     WHERE n.tax_id = ?1
                       AND COALESCE(nm.is_classified, 1) = 1
                       AND (?2 OR n.rank != ?3)
                 )",
            )
            .map_err(sql)?;
        let mut named = Vec::new();
        for tax_id in tax_ids {
            let keep: bool = stmt
                .query_row(params![tax_id, include_no_rank, self.ladder.no_rank()], |row| {
                    row.get(0)
                })
                .map_err(sql)?;
            if keep {
                named.push(tax_id.clone());
            }
        }
        Ok(named)
    }

    pub fn add_source(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> Result<(i64, bool), TaxonomyError> {
        self.store.add_source(name, description)
    }

    /// Inserts a node with its primary name and moves `children` under
    /// it, all in one transaction. Returns the new node's lineage.
    pub fn add_node(&mut self, node: NewNode) -> Result<Lineage, TaxonomyError> {
        if node.tax_id.is_empty() {
            return Err(TaxonomyError::TaxonIntegrity(
                "new node needs a tax_id".to_string(),
            ));
        }
        let height = self.ladder.height(&node.rank)?;
        if self.node(&node.tax_id)?.is_some() {
            return Err(TaxonomyError::TaxonIntegrity(format!(
                "tax_id {} already exists",
                node.tax_id
            )));
        }

        let parent_rank = self.rank(&node.parent_id)?.ok_or_else(|| {
            TaxonomyError::TaxonIntegrity(format!(
                "parent_id {} of {} does not exist",
                node.parent_id, node.tax_id
            ))
        })?;
        if height >= self.ladder.height(&parent_rank)? {
            return Err(TaxonomyError::TaxonIntegrity(format!(
                "rank {} of {} is not below rank {parent_rank} of parent {}",
                node.rank, node.tax_id, node.parent_id
            )));
        }

        for child in &node.children {
            let child_rank = self.rank(child)?.ok_or_else(|| {
                TaxonomyError::TaxonIntegrity(format!("child {child} does not exist"))
            })?;
            if self.ladder.height(&child_rank)? >= height {
                return Err(TaxonomyError::TaxonIntegrity(format!(
                    "child {child} ({child_rank}) is not below rank {} of {}",
                    node.rank, node.tax_id
                )));
            }
        }

        let tx = self.store.transaction()?;
        let source_id = resolve_source(&tx, &node.source)?;
        tx.execute(
            "INSERT INTO nodes (tax_id, parent_id, rank, source_id, is_valid)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![node.tax_id, node.parent_id, node.rank, source_id],
        )
        .map_err(sql)?;
        tx.execute(
            "INSERT INTO names (tax_id, tax_name, name_class, source_id, is_primary)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![node.tax_id, node.tax_name, SCIENTIFIC_NAME, source_id],
        )
        .map_err(sql)?;
        for name in &node.names {
            insert_name(&tx, &node.tax_id, name, source_id)?;
        }
        for child in &node.children {
            tx.execute(
                "UPDATE nodes SET parent_id = ?1 WHERE tax_id = ?2",
                params![node.tax_id, child],
            )
            .map_err(sql)?;
        }

        let mut touched = vec![node.tax_id.clone()];
        touched.extend(node.children.iter().cloned());
        validate_all(&tx, Scope::Taxa(&touched))?;
        tx.commit().map_err(sql)?;

        info!(
            tax_id = %node.tax_id,
            parent_id = %node.parent_id,
            rank = %node.rank,
            children = node.children.len(),
            "added node"
        );
        self.lineage(&node.tax_id)
    }

    /// Attaches a name to an existing taxon. A primary name replaces the
    /// current scientific name, which is kept as a synonym.
    pub fn add_name(
        &mut self,
        tax_id: &str,
        name: NewName,
        source: &SourceRef,
    ) -> Result<i64, TaxonomyError> {
        if self.node(tax_id)?.is_none() {
            return Err(TaxonomyError::TaxonIntegrity(format!(
                "cannot name missing tax_id {tax_id:?}"
            )));
        }
        let tx = self.store.transaction()?;
        let source_id = resolve_source(&tx, source)?;
        if name.is_primary {
            tx.execute(
                "UPDATE names SET is_primary = 0, name_class = ?2
                 WHERE tax_id = ?1 AND is_primary = 1",
                params![tax_id, SYNONYM],
            )
            .map_err(sql)?;
        }
        let id = insert_name(&tx, tax_id, &name, source_id)?;
        validate_primary_names(&tx, Scope::Taxa(&[tax_id.to_string()]))?;
        tx.commit().map_err(sql)?;
        debug!(tax_id, tax_name = %name.tax_name, primary = name.is_primary, "added name");
        Ok(id)
    }

    /// Applies one edit-file record, falling back to `default_source`
    /// when the record names none.
    pub fn apply_edit(
        &mut self,
        record: EditRecord,
        default_source: &str,
    ) -> Result<(), TaxonomyError> {
        match record {
            EditRecord::Node {
                tax_id,
                parent_id,
                rank,
                tax_name,
                source_name,
                children,
                names,
            } => {
                let source = source_name.unwrap_or_else(|| default_source.to_string());
                let mut node = NewNode::new(tax_id, parent_id, rank, tax_name, source.as_str())
                    .with_children(children);
                node.names = names;
                self.add_node(node)?;
            }
            EditRecord::Name {
                tax_id,
                source_name,
                names,
            } => {
                let source =
                    SourceRef::Name(source_name.unwrap_or_else(|| default_source.to_string()));
                for name in names {
                    self.add_name(&tax_id, name, &source)?;
                }
            }
        }
        Ok(())
    }
}

fn resolve_source(conn: &rusqlite::Connection, source: &SourceRef) -> Result<i64, TaxonomyError> {
    match source {
        SourceRef::Id(id) => {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS (SELECT 1 FROM source WHERE id = ?1)",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(sql)?;
            if exists {
                Ok(*id)
            } else {
                Err(TaxonomyError::TaxonIntegrity(format!(
                    "source_id {id} does not exist"
                )))
            }
        }
        SourceRef::Name(name) => Ok(store::add_source(conn, name, None)?.0),
    }
}

fn insert_name(
    conn: &rusqlite::Connection,
    tax_id: &str,
    name: &NewName,
    source_id: i64,
) -> Result<i64, TaxonomyError> {
    let name_class = if name.is_primary {
        SCIENTIFIC_NAME
    } else {
        name.name_class.as_deref().unwrap_or(SYNONYM)
    };
    conn.execute(
        "INSERT INTO names (tax_id, tax_name, unique_name, name_class, source_id, is_primary)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            tax_id,
            name.tax_name,
            name.unique_name,
            name_class,
            source_id,
            name.is_primary
        ],
    )
    .map_err(sql)?;
    Ok(conn.last_insert_rowid())
}
