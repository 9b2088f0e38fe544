use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::TaxonomyError;

/// NCBI rank order, most specific first. The last two entries are the
/// taxonomy root and the placeholder used for unranked taxa.
pub const NCBI_RANKS: &[&str] = &[
    "forma",
    "varietas",
    "subspecies",
    "species",
    "species_subgroup",
    "species_group",
    "subgenus",
    "genus",
    "subtribe",
    "tribe",
    "subfamily",
    "family",
    "superfamily",
    "parvorder",
    "infraorder",
    "suborder",
    "order",
    "superorder",
    "cohort",
    "infraclass",
    "subclass",
    "class",
    "superclass",
    "subphylum",
    "phylum",
    "superphylum",
    "subkingdom",
    "kingdom",
    "superkingdom",
    "root",
    "no_rank",
];

pub const ROOT_RANK: &str = "root";
pub const NO_RANK: &str = "no_rank";

static STANDARD: LazyLock<RankLadder> = LazyLock::new(|| {
    RankLadder::new(NCBI_RANKS.iter().map(|rank| rank.to_string()), NO_RANK)
        .unwrap_or_else(|_| unreachable!("built-in rank list is valid"))
});

/// A fixed, totally ordered rank vocabulary. The height of a rank is its
/// position in the list, so lower heights are more specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankLadder {
    ranks: Vec<String>,
    heights: HashMap<String, usize>,
    no_rank: String,
}

impl RankLadder {
    pub fn new<I>(ranks: I, no_rank: &str) -> Result<Self, TaxonomyError>
    where
        I: IntoIterator<Item = String>,
    {
        let ranks: Vec<String> = ranks.into_iter().collect();
        let mut heights = HashMap::with_capacity(ranks.len());
        for (height, rank) in ranks.iter().enumerate() {
            if rank.is_empty() || rank.chars().any(char::is_whitespace) {
                return Err(TaxonomyError::UnknownRank(format!(
                    "rank names must be single tokens: {rank:?}"
                )));
            }
            if heights.insert(rank.clone(), height).is_some() {
                return Err(TaxonomyError::UnknownRank(format!("duplicate rank {rank}")));
            }
        }
        if !heights.contains_key(no_rank) {
            return Err(TaxonomyError::UnknownRank(no_rank.to_string()));
        }
        Ok(Self {
            ranks,
            heights,
            no_rank: no_rank.to_string(),
        })
    }

    /// The built-in NCBI ladder.
    pub fn standard() -> &'static RankLadder {
        &STANDARD
    }

    pub fn ranks(&self) -> &[String] {
        &self.ranks
    }

    pub fn no_rank(&self) -> &str {
        &self.no_rank
    }

    pub fn contains(&self, rank: &str) -> bool {
        self.heights.contains_key(rank)
    }

    pub fn height(&self, rank: &str) -> Result<usize, TaxonomyError> {
        self.heights
            .get(rank)
            .copied()
            .ok_or_else(|| TaxonomyError::UnknownRank(rank.to_string()))
    }

    /// True iff `lower` is strictly more specific than `upper`.
    pub fn is_below(&self, lower: &str, upper: &str) -> Result<bool, TaxonomyError> {
        Ok(self.height(lower)? < self.height(upper)?)
    }

    /// Every rank more specific than `rank`, nearest first.
    pub fn ranks_below(&self, rank: &str) -> Result<Vec<String>, TaxonomyError> {
        let height = self.height(rank)?;
        Ok(self.ranks[..height].iter().rev().cloned().collect())
    }

    /// Seed rows for the `ranks` table: (rank, height, no_rank flag).
    pub fn rows(&self) -> impl Iterator<Item = (&str, i64, bool)> + '_ {
        self.ranks
            .iter()
            .enumerate()
            .map(|(height, rank)| (rank.as_str(), height as i64, *rank == self.no_rank))
    }
}

impl Default for RankLadder {
    fn default() -> Self {
        STANDARD.clone()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn heights_follow_list_order() {
        let ladder = RankLadder::standard();
        assert_eq!(ladder.height("forma").unwrap(), 0);
        assert_eq!(ladder.height("species").unwrap(), 3);
        assert_eq!(ladder.height("root").unwrap(), NCBI_RANKS.len() - 2);
        assert_eq!(ladder.height("no_rank").unwrap(), NCBI_RANKS.len() - 1);
    }

    #[test]
    fn rejects_duplicates_and_missing_placeholder() {
        let dup = RankLadder::new(
            ["species", "genus", "species", "no_rank"].map(String::from),
            "no_rank",
        );
        assert_matches!(dup, Err(TaxonomyError::UnknownRank(_)));

        let missing = RankLadder::new(["species", "genus"].map(String::from), "no_rank");
        assert_matches!(missing, Err(TaxonomyError::UnknownRank(_)));
    }

    #[test]
    fn seed_rows_flag_placeholder() {
        let rows: Vec<_> = RankLadder::standard().rows().collect();
        assert_eq!(rows.len(), NCBI_RANKS.len());
        assert_eq!(rows[0], ("forma", 0, false));
        assert_eq!(rows.last().copied(), Some(("no_rank", 30, true)));
    }
}
