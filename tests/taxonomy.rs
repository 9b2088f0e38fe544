mod common;

use assert_matches::assert_matches;

use kira_taxonomy::domain::{NewName, NewNode, SourceRef};
use kira_taxonomy::error::TaxonomyError;
use kira_taxonomy::rank::RankLadder;
use kira_taxonomy::taxonomy::Taxonomy;

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn node_lookups() {
    let tax = common::taxonomy();
    let node = tax.node("1280").unwrap().unwrap();
    assert_eq!(node.parent_id.as_deref(), Some("1279"));
    assert_eq!(node.rank, "species");
    assert_eq!(node.source_id, Some(1));
    assert!(node.is_valid);

    assert_eq!(tax.rank("1").unwrap().as_deref(), Some("root"));
    assert_eq!(tax.parent_id("1").unwrap(), None);
    assert_eq!(tax.rank("2000000").unwrap().as_deref(), Some("no_rank"));
    assert_eq!(tax.node("424242").unwrap(), None);
    assert_eq!(tax.rank("").unwrap(), None);
    assert_eq!(tax.parent_id("").unwrap(), None);
}

#[test]
fn lineage_walks_to_root() {
    let tax = common::taxonomy();
    let lineage = tax.lineage("1280").unwrap();
    assert_eq!(lineage.tax_id, "1280");
    assert_eq!(lineage.parent_id.as_deref(), Some("1279"));
    assert_eq!(lineage.tax_name.as_deref(), Some("Staphylococcus aureus"));
    let path: Vec<&str> = lineage
        .ancestors
        .iter()
        .map(|step| step.tax_id.as_str())
        .collect();
    assert_eq!(
        path,
        ["1279", "90964", "1385", "91061", "1239", "2", "131567", "1"]
    );
    assert_eq!(lineage.depth(), 8);

    let root = lineage.root().unwrap();
    assert_eq!(root.rank, "root");
    assert_eq!(tax.parent_id(&root.tax_id).unwrap(), None);
    assert_eq!(
        lineage.by_rank().get("family").map(String::as_str),
        Some("90964")
    );
}

#[test]
fn every_lineage_ends_at_root() {
    let tax = common::taxonomy();
    for tax_id in tax.tax_ids().unwrap() {
        let lineage = tax.lineage(&tax_id).unwrap();
        if tax_id == "1" {
            assert!(lineage.ancestors.is_empty());
            assert_eq!(lineage.rank, "root");
            continue;
        }
        let root = lineage.root().unwrap();
        assert_eq!(root.tax_id, "1", "{tax_id}");
        assert_eq!(root.rank, "root");
    }
}

#[test]
fn lineage_of_missing_taxon_fails() {
    let tax = common::taxonomy();
    assert_matches!(tax.lineage("424242"), Err(TaxonomyError::TaxonNotFound(id)) if id == "424242");
    assert_matches!(tax.lineage(""), Err(TaxonomyError::TaxonNotFound(_)));
}

#[test]
fn lineage_follows_merged_ids() {
    let tax = common::taxonomy();
    assert_eq!(tax.resolve_merged("12345").unwrap().as_deref(), Some("1280"));
    assert_eq!(tax.resolve_merged("1281").unwrap().as_deref(), Some("1281"));
    assert_eq!(tax.resolve_merged("").unwrap(), None);
    assert_eq!(tax.lineage("99999").unwrap().tax_id, "1502");
}

#[test]
fn parent_is_ancestor() {
    let tax = common::taxonomy();
    for tax_id in tax.tax_ids().unwrap() {
        if let Some(parent_id) = tax.parent_id(&tax_id).unwrap() {
            assert!(tax.is_ancestor_of(&parent_id, &tax_id).unwrap(), "{tax_id}");
        }
    }
}

#[test]
fn ancestor_test_is_strict() {
    let tax = common::taxonomy();
    assert!(tax.is_ancestor_of("1", "46170").unwrap());
    assert!(tax.is_ancestor_of("1239", "1502").unwrap());
    assert!(!tax.is_ancestor_of("1280", "1280").unwrap());
    assert!(!tax.is_ancestor_of("1280", "1279").unwrap());
    assert!(!tax.is_ancestor_of("91061", "1502").unwrap());
    assert!(!tax.is_ancestor_of("", "1280").unwrap());
    assert!(!tax.is_ancestor_of("1279", "").unwrap());
    assert!(!tax.is_ancestor_of("424242", "1280").unwrap());
}

#[test]
fn siblings() {
    let tax = common::taxonomy();
    assert_eq!(tax.sibling_of("91061").unwrap().as_deref(), Some("186801"));
    assert_eq!(tax.sibling_of("1282").unwrap().as_deref(), Some("1280"));
    assert_eq!(tax.sibling_of("46170").unwrap(), None);
    assert_eq!(tax.sibling_of("1").unwrap(), None);
    assert_eq!(tax.sibling_of("").unwrap(), None);
}

#[test]
fn children_in_id_order() {
    let tax = common::taxonomy();
    assert_eq!(tax.children_of("1239", 2).unwrap(), ids(&["91061", "186801"]));
    assert_eq!(
        tax.children_of("1239", 10).unwrap(),
        ids(&["91061", "186801", "2000000"])
    );
    assert_eq!(tax.children_of("1", 10).unwrap(), ids(&["131567"]));
    assert_eq!(tax.child_of("2000000").unwrap().as_deref(), Some("2000001"));
    assert_eq!(tax.children_of("1279", 2).unwrap(), ids(&["1280", "1281"]));
    assert_eq!(tax.child_of("1280").unwrap().as_deref(), Some("46170"));
    assert_eq!(tax.child_of("46170").unwrap(), None);
    assert_eq!(tax.child_of("").unwrap(), None);
    assert!(tax.children_of("46170", 5).unwrap().is_empty());
    assert!(tax.children_of("", 5).unwrap().is_empty());
}

#[test]
fn species_below_returns_descendant_species() {
    let tax = common::taxonomy();
    for tax_id in tax.tax_ids().unwrap() {
        if let Some(species) = tax.species_below(&tax_id).unwrap() {
            assert_eq!(tax.rank(&species).unwrap().as_deref(), Some("species"));
            assert!(tax.is_ancestor_of(&tax_id, &species).unwrap(), "{tax_id}");
        }
    }
    assert_eq!(tax.species_below("1239").unwrap().as_deref(), Some("2000001"));
    assert_eq!(tax.species_below("91061").unwrap().as_deref(), Some("1280"));
    assert_eq!(tax.species_below("186801").unwrap().as_deref(), Some("1502"));
    assert_eq!(tax.species_below("1280").unwrap(), None);
    assert_eq!(tax.species_below("").unwrap(), None);
}

#[test]
fn nary_subtree_collects_species_in_preorder() {
    let tax = common::taxonomy();
    let firmicutes = ids(&["1280", "1281", "1282", "1502", "1534", "2000001"]);
    assert_eq!(tax.nary_subtree("1239").unwrap(), Some(firmicutes.clone()));
    assert_eq!(tax.nary_subtree("2000000").unwrap(), Some(ids(&["2000001"])));
    assert_eq!(tax.nary_subtree("1280").unwrap(), Some(ids(&["1280"])));
    assert_eq!(tax.nary_subtree("46170").unwrap(), Some(Vec::new()));
    assert_eq!(tax.nary_subtree("").unwrap(), None);
    assert_eq!(tax.nary_subtree("424242").unwrap(), None);
}

#[test]
fn nary_subtree_walks_through_unranked_nodes() {
    let tax = common::taxonomy();
    let from_root = tax.nary_subtree("1").unwrap();
    assert_eq!(from_root, tax.nary_subtree("1239").unwrap());
    assert_eq!(from_root, tax.nary_subtree("131567").unwrap());
    for species in from_root.unwrap() {
        assert_eq!(tax.rank(&species).unwrap().as_deref(), Some("species"));
        assert!(tax.is_ancestor_of("1", &species).unwrap());
    }
    assert_eq!(
        tax.nary_subtree_capped("1", 1).unwrap(),
        Some(ids(&["1280"]))
    );
}

#[test]
fn capped_subtree_limits_fan_out() {
    let tax = common::taxonomy();
    assert_eq!(
        tax.nary_subtree_capped("1239", 1).unwrap(),
        Some(ids(&["1280"]))
    );
    assert_eq!(
        tax.nary_subtree_capped("1239", 2).unwrap(),
        Some(ids(&["1280", "1281", "1502", "1534"]))
    );
}

#[test]
fn names_and_ranks() {
    let tax = common::taxonomy();
    assert_eq!(
        tax.primary_name("1239").unwrap().as_deref(),
        Some("Firmicutes")
    );
    assert_eq!(tax.primary_name("424242").unwrap(), None);
    assert_eq!(
        tax.primary_from_name("Micrococcus aureus").unwrap(),
        Some((
            "1280".to_string(),
            "Staphylococcus aureus".to_string(),
            false
        ))
    );
    assert_eq!(
        tax.primary_from_name("Bacilli").unwrap(),
        Some(("91061".to_string(), "Bacilli".to_string(), true))
    );
    assert_eq!(tax.primary_from_name("Escherichia coli").unwrap(), None);

    let synonyms = tax.synonyms("186802").unwrap();
    assert_eq!(synonyms.len(), 2);
    assert!(synonyms[0].is_primary);
    assert_eq!(synonyms[1].tax_name, "Clostridiales");

    assert_eq!(
        tax.parent_at_rank("46170", "family").unwrap().as_deref(),
        Some("90964")
    );
    assert_eq!(tax.parent_at_rank("1280", "species").unwrap(), None);
    assert_matches!(
        tax.parent_at_rank("1280", "clade"),
        Err(TaxonomyError::UnknownRank(_))
    );
}

#[test]
fn named_drops_unclassified_and_missing() {
    let tax = common::taxonomy();
    let requested = ids(&["1280", "1534", "2000000", "424242", "1279"]);
    assert_eq!(
        tax.named(&requested, true).unwrap(),
        ids(&["1280", "2000000", "1279"])
    );
    assert_eq!(tax.named(&requested, false).unwrap(), ids(&["1280", "1279"]));
}

#[test]
fn add_subspecies_under_species() {
    let mut tax = common::taxonomy();
    let (source_id, created) = tax.add_source("legacy", Some("hand curated")).unwrap();
    assert!(created);
    assert_eq!(source_id, 2);

    tax.add_node(NewNode::new("1280_1", "1280", "subspecies", "foo", 2i64)).unwrap();

    let lineage = tax.lineage("1280_1").unwrap();
    assert_eq!(lineage.tax_id, "1280_1");
    assert_eq!(lineage.tax_name.as_deref(), Some("foo"));
    assert_eq!(lineage.ancestors[0].tax_id, "1280");
    assert_eq!(tax.node("1280_1").unwrap().unwrap().source_id, Some(2));
}

#[test]
fn add_node_reparents_children() {
    let mut tax = common::taxonomy();
    tax.add_source("legacy", None).unwrap();
    let node = NewNode::new(
        "1279_1",
        "1279",
        "species_group",
        "between genus and species",
        2i64,
    )
    .with_children(["1280", "1281"]);
    let lineage = tax.add_node(node).unwrap();
    assert_eq!(lineage.parent_id.as_deref(), Some("1279"));

    assert_eq!(tax.parent_id("1280").unwrap().as_deref(), Some("1279_1"));
    assert_eq!(tax.parent_id("1281").unwrap().as_deref(), Some("1279_1"));
    assert_eq!(tax.parent_id("1282").unwrap().as_deref(), Some("1279"));
    assert!(tax.is_ancestor_of("1279_1", "46170").unwrap());
    assert_eq!(tax.lineage("1280").unwrap().depth(), 9);
}

#[test]
fn add_node_rejects_rank_not_below_parent() {
    let mut tax = common::taxonomy();
    tax.add_source("legacy", None).unwrap();
    let node = NewNode::new("1279_1", "1279", "genus", "between genus and species", 2i64)
        .with_children(["1280", "1281"]);
    assert_matches!(tax.add_node(node), Err(TaxonomyError::TaxonIntegrity(_)));

    assert_eq!(tax.node("1279_1").unwrap(), None);
    assert_eq!(tax.parent_id("1280").unwrap().as_deref(), Some("1279"));
    assert_eq!(tax.primary_from_name("between genus and species").unwrap(), None);
}

#[test]
fn add_node_rejects_bad_children_and_parents() {
    let mut tax = common::taxonomy();

    let child_not_below = NewNode::new("1279_2", "1279", "species", "sp. nov.", 1i64)
        .with_children(["1281"]);
    assert_matches!(
        tax.add_node(child_not_below),
        Err(TaxonomyError::TaxonIntegrity(_))
    );

    let missing_child =
        NewNode::new("1279_3", "1279", "species", "sp. nov.", 1i64).with_children(["424242"]);
    assert_matches!(
        tax.add_node(missing_child),
        Err(TaxonomyError::TaxonIntegrity(_))
    );

    let missing_parent = NewNode::new("1279_4", "424242", "species", "sp. nov.", 1i64);
    assert_matches!(
        tax.add_node(missing_parent),
        Err(TaxonomyError::TaxonIntegrity(_))
    );

    let duplicate = NewNode::new("1281", "1279", "species", "again", 1i64);
    assert_matches!(tax.add_node(duplicate), Err(TaxonomyError::TaxonIntegrity(_)));

    let unknown_rank = NewNode::new("1279_5", "1279", "strain", "sp. nov.", 1i64);
    assert_matches!(tax.add_node(unknown_rank), Err(TaxonomyError::UnknownRank(_)));

    let missing_source = NewNode::new("1279_6", "1279", "species", "sp. nov.", 7i64);
    assert_matches!(
        tax.add_node(missing_source),
        Err(TaxonomyError::TaxonIntegrity(_))
    );

    assert_eq!(tax.tax_ids().unwrap().len(), common::NODES.len());
}

#[test]
fn add_node_with_named_source_and_synonyms() {
    let mut tax = common::taxonomy();
    let node = NewNode::new("1485_1", "1485", "species", "Clostridium novum", "curation")
        .with_name(NewName::synonym("Clostridium nova"));
    tax.add_node(node).unwrap();

    assert_eq!(tax.store().count("source").unwrap(), 2);
    let names = tax.synonyms("1485_1").unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(names[0].tax_name, "Clostridium novum");
    assert_eq!(names[0].name_class.as_deref(), Some("scientific name"));
    assert_eq!(names[1].name_class.as_deref(), Some("synonym"));
    assert_eq!(
        tax.primary_from_name("Clostridium nova").unwrap(),
        Some((
            "1485_1".to_string(),
            "Clostridium novum".to_string(),
            false
        ))
    );
}

#[test]
fn primary_name_replaces_scientific_name() {
    let mut tax = common::taxonomy();
    let name = NewName {
        tax_name: "Staphylococcus aureus Rosenbach".to_string(),
        unique_name: None,
        name_class: None,
        is_primary: true,
    };
    tax.add_name("1280", name, &SourceRef::Id(1)).unwrap();

    assert_eq!(
        tax.primary_name("1280").unwrap().as_deref(),
        Some("Staphylococcus aureus Rosenbach")
    );
    let demoted = tax
        .synonyms("1280")
        .unwrap()
        .into_iter()
        .find(|name| name.tax_name == "Staphylococcus aureus")
        .unwrap();
    assert!(!demoted.is_primary);
    assert_eq!(demoted.name_class.as_deref(), Some("synonym"));

    assert_matches!(
        tax.add_name("424242", NewName::synonym("nothing"), &SourceRef::Id(1)),
        Err(TaxonomyError::TaxonIntegrity(_))
    );
}

#[test]
fn open_rejects_root_with_parent() {
    let mut store = common::empty_store();
    store.seed_ranks(RankLadder::standard()).unwrap();
    store
        .connection()
        .execute(
            "INSERT INTO nodes (tax_id, parent_id, rank) VALUES ('1', '0', 'root')",
            [],
        )
        .unwrap();
    assert_matches!(Taxonomy::open(store), Err(TaxonomyError::TaxonIntegrity(_)));
}

#[test]
fn rank_helpers_on_engine() {
    assert!(Taxonomy::is_below("species", "genus").unwrap());
    assert!(!Taxonomy::is_below("genus", "species").unwrap());
    let below_family = Taxonomy::ranks_below("family").unwrap();
    assert_eq!(below_family.first().map(String::as_str), Some("subfamily"));
    assert_eq!(below_family.last().map(String::as_str), Some("forma"));
    assert!(Taxonomy::ranks_below("forma").unwrap().is_empty());
}
