use super::{build_bytes, open_bytes};
use crate::block::write_dictzip;
use crate::builder::CompressionMethod;
use crate::dict::{
    open_dictionary, AnyDictionary, Dictionary, EditableDictionary, HybridDict, SqlDict,
    StaticDict,
};

fn static_dict(entries: &[(&str, &str)]) -> StaticDict {
    open_bytes(
        build_bytes(entries, &[("id", "Static")], CompressionMethod::None),
        false,
    )
    .unwrap()
}

fn overlay(
    dir: &tempfile::TempDir,
    static_entries: &[(&str, &str)],
    dynamic_entries: &[(&str, &str)],
) -> HybridDict {
    let path = dir.path().join("over.hdic");
    let mut hybrid = HybridDict::create(&path, static_dict(static_entries)).unwrap();
    for (word, sense) in dynamic_entries {
        hybrid.insert_entry(word).unwrap();
        hybrid.update_entry(word, sense).unwrap();
    }
    hybrid
}

fn drain(hybrid: &mut HybridDict) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if !hybrid.first_entry().unwrap() {
        return out;
    }
    loop {
        let word = hybrid.keyword().unwrap().to_owned();
        let sense = hybrid.description().unwrap().unwrap_or_default();
        out.push((word, sense));
        if !hybrid.next_entry().unwrap() {
            break;
        }
    }
    out
}

#[test]
fn dynamic_entry_shadows_static() {
    let dir = tempfile::tempdir().unwrap();
    let mut hybrid = overlay(
        &dir,
        &[("cat", "mammal")],
        &[("cat", "feline"), ("dog", "canine")],
    );

    let merged = drain(&mut hybrid);
    assert_eq!(
        merged,
        vec![
            ("cat".to_string(), "feline".to_string()),
            ("dog".to_string(), "canine".to_string()),
        ]
    );

    assert!(hybrid.find_entry("cat").unwrap().matches);
    assert_eq!(hybrid.description().unwrap().as_deref(), Some("feline"));
    // backward iteration is unsupported
    assert!(!hybrid.previous_entry().unwrap());
}

#[test]
fn merged_iteration_interleaves_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let mut hybrid = overlay(
        &dir,
        &[("ant", "insect"), ("cat", "mammal"), ("zebra", "stripes")],
        &[("bee", "buzzes"), ("yak", "grunts")],
    );

    let words: Vec<String> = drain(&mut hybrid).into_iter().map(|(w, _)| w).collect();
    assert_eq!(words, ["ant", "bee", "cat", "yak", "zebra"]);
}

#[test]
fn lookups_reach_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let mut hybrid = overlay(&dir, &[("stone", "rock")], &[("water", "liquid")]);

    assert!(hybrid.find_entry("stone").unwrap().matches);
    assert_eq!(hybrid.description().unwrap().as_deref(), Some("rock"));

    assert!(hybrid.find_entry("water").unwrap().matches);
    assert_eq!(hybrid.description().unwrap().as_deref(), Some("liquid"));

    let miss = hybrid.find_entry("air").unwrap();
    assert!(!miss.matches);
}

#[test]
fn update_materializes_static_entries() {
    let dir = tempfile::tempdir().unwrap();
    let mut hybrid = overlay(&dir, &[("stone", "rock")], &[]);

    hybrid.update_entry("stone", "mineral matter").unwrap();
    assert!(hybrid.find_entry("stone").unwrap().matches);
    assert_eq!(
        hybrid.description().unwrap().as_deref(),
        Some("mineral matter")
    );

    // exactly one merged entry: the edit shadows, it does not duplicate
    let merged = drain(&mut hybrid);
    assert_eq!(merged.len(), 1);
}

#[test]
fn removing_a_dynamic_entry_unshadows_the_static_one() {
    let dir = tempfile::tempdir().unwrap();
    let mut hybrid = overlay(&dir, &[("cat", "mammal")], &[("cat", "feline")]);

    hybrid.remove_entry("cat").unwrap();
    assert!(hybrid.find_entry("cat").unwrap().matches);
    assert_eq!(hybrid.description().unwrap().as_deref(), Some("mammal"));
}

#[test]
fn properties_prefer_dynamic_then_static() {
    let dir = tempfile::tempdir().unwrap();
    let mut hybrid = overlay(&dir, &[("cat", "mammal")], &[]);

    // stamped by the builder, present only on the static side
    assert_eq!(hybrid.property("items").unwrap().as_deref(), Some("1"));

    hybrid.set_property("items", "overridden").unwrap();
    assert_eq!(
        hybrid.property("items").unwrap().as_deref(),
        Some("overridden")
    );

    assert_eq!(hybrid.name(), "Static");
    assert!(hybrid.file_name().ends_with(".hdic"));
    assert!(hybrid.is_dynamic());
    assert!(!hybrid.is_meta_editable());
}

#[test]
fn load_finds_the_static_sibling() {
    let dir = tempfile::tempdir().unwrap();
    let image = build_bytes(
        &[("cat", "mammal"), ("owl", "bird")],
        &[("id", "Sibling")],
        CompressionMethod::None,
    );
    let static_path = dir.path().join("animals.dic.dz");
    let mut file = std::fs::File::create(&static_path).unwrap();
    write_dictzip(&image, 4096, &mut file).unwrap();
    drop(file);

    let hybrid_path = dir.path().join("animals.hdic");
    {
        let static_dic = StaticDict::open(&static_path, false).unwrap();
        let mut hybrid = HybridDict::create(&hybrid_path, static_dic).unwrap();
        hybrid.insert_entry("cat").unwrap();
        hybrid.update_entry("cat", "feline").unwrap();
    }

    let mut reloaded = HybridDict::load(&hybrid_path).unwrap();
    assert_eq!(reloaded.name(), "Sibling");
    assert!(reloaded.find_entry("owl").unwrap().matches);
    assert_eq!(reloaded.description().unwrap().as_deref(), Some("bird"));
    assert!(reloaded.find_entry("cat").unwrap().matches);
    assert_eq!(reloaded.description().unwrap().as_deref(), Some("feline"));
}

#[test]
fn factory_selects_hybrid_backend() {
    let dir = tempfile::tempdir().unwrap();
    let image = build_bytes(&[("cat", "mammal")], &[("id", "F")], CompressionMethod::None);
    let static_path = dir.path().join("f.dic.dz");
    let mut file = std::fs::File::create(&static_path).unwrap();
    write_dictzip(&image, 4096, &mut file).unwrap();
    drop(file);

    let hybrid_path = dir.path().join("f.hdic");
    drop(HybridDict::create(&hybrid_path, StaticDict::open(&static_path, false).unwrap()).unwrap());

    let mut dict = open_dictionary(&hybrid_path, false).unwrap();
    assert!(matches!(dict, AnyDictionary::Hybrid(_)));
    assert!(dict.as_editable().is_some());
    assert!(dict.find_entry("cat").unwrap().matches);
}

#[test]
fn overlay_collation_comes_from_the_static_side() {
    let dir = tempfile::tempdir().unwrap();
    let image = build_bytes(
        &[("cab", "s1"), ("bac", "s2")],
        &[("id", "Coll"), ("char-precedence", "cba")],
        CompressionMethod::None,
    );
    let static_path = dir.path().join("coll.dic.dz");
    let mut file = std::fs::File::create(&static_path).unwrap();
    write_dictzip(&image, 4096, &mut file).unwrap();
    drop(file);

    let hybrid_path = dir.path().join("coll.hdic");
    let mut hybrid =
        HybridDict::create(&hybrid_path, StaticDict::open(&static_path, false).unwrap()).unwrap();

    let mut sql = SqlDict::load(&hybrid_path).unwrap();
    assert_eq!(sql.property("collation").unwrap().as_deref(), Some("cba"));

    // under c < b < a, "cab" sorts before "bac" on both sides
    assert!(hybrid.first_entry().unwrap());
    assert_eq!(hybrid.keyword(), Some("cab"));
    assert!(hybrid.next_entry().unwrap());
    assert_eq!(hybrid.keyword(), Some("bac"));
}
