use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const SCIENTIFIC_NAME: &str = "scientific name";
pub const SYNONYM: &str = "synonym";

/// One row of the `nodes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRecord {
    pub tax_id: String,
    pub parent_id: Option<String>,
    pub rank: String,
    pub embl_code: Option<String>,
    pub division_id: Option<String>,
    pub source_id: Option<i64>,
    pub is_valid: bool,
}

/// A taxon name together with its primary flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameEntry {
    pub tax_name: String,
    pub name_class: Option<String>,
    pub is_primary: bool,
}

/// Provenance of rows created by an edit: an existing source id, or a
/// source name that is created on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceRef {
    Id(i64),
    Name(String),
}

impl From<i64> for SourceRef {
    fn from(value: i64) -> Self {
        SourceRef::Id(value)
    }
}

impl From<&str> for SourceRef {
    fn from(value: &str) -> Self {
        SourceRef::Name(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewName {
    pub tax_name: String,
    #[serde(default)]
    pub unique_name: Option<String>,
    #[serde(default)]
    pub name_class: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

impl NewName {
    pub fn synonym(tax_name: impl Into<String>) -> Self {
        Self {
            tax_name: tax_name.into(),
            unique_name: None,
            name_class: Some(SYNONYM.to_string()),
            is_primary: false,
        }
    }
}

/// Input for `Taxonomy::add_node`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNode {
    pub tax_id: String,
    pub parent_id: String,
    pub rank: String,
    pub tax_name: String,
    pub source: SourceRef,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub names: Vec<NewName>,
}

impl NewNode {
    pub fn new(
        tax_id: impl Into<String>,
        parent_id: impl Into<String>,
        rank: impl Into<String>,
        tax_name: impl Into<String>,
        source: impl Into<SourceRef>,
    ) -> Self {
        Self {
            tax_id: tax_id.into(),
            parent_id: parent_id.into(),
            rank: rank.into(),
            tax_name: tax_name.into(),
            source: source.into(),
            children: Vec::new(),
            names: Vec::new(),
        }
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_name(mut self, name: NewName) -> Self {
        self.names.push(name);
        self
    }
}

/// One entry of an edit file: a new node, or extra names for an
/// existing taxon. Records without a source use the caller's default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EditRecord {
    Node {
        tax_id: String,
        parent_id: String,
        rank: String,
        tax_name: String,
        #[serde(default)]
        source_name: Option<String>,
        #[serde(default)]
        children: Vec<String>,
        #[serde(default)]
        names: Vec<NewName>,
    },
    Name {
        tax_id: String,
        #[serde(default)]
        source_name: Option<String>,
        names: Vec<NewName>,
    },
}

impl EditRecord {
    pub fn tax_id(&self) -> &str {
        match self {
            EditRecord::Node { tax_id, .. } | EditRecord::Name { tax_id, .. } => tax_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageStep {
    pub tax_id: String,
    pub rank: String,
    pub tax_name: Option<String>,
}

/// A taxon plus its ancestors, ordered from the parent up to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lineage {
    pub tax_id: String,
    pub parent_id: Option<String>,
    pub rank: String,
    pub tax_name: Option<String>,
    pub ancestors: Vec<LineageStep>,
}

impl Lineage {
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    pub fn root(&self) -> Option<&LineageStep> {
        self.ancestors.last()
    }

    /// rank -> tax_id over the taxon and its ancestors. Placeholder ranks
    /// collide, so only the nearest one is kept.
    pub fn by_rank(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(self.rank.clone(), self.tax_id.clone());
        for step in &self.ancestors {
            map.entry(step.rank.clone())
                .or_insert_with(|| step.tax_id.clone());
        }
        map
    }

    pub fn contains(&self, tax_id: &str) -> bool {
        self.ancestors.iter().any(|step| step.tax_id == tax_id)
    }
}
