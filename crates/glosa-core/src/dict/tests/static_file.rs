use super::{build_bytes, open_bytes};
use crate::block::write_dictzip;
use crate::builder::CompressionMethod;
use crate::dict::{open_dictionary, AnyDictionary, DictError, Dictionary, StaticDict};
use crate::escape::escape;
use crate::shcm::ShcmBuilder;

const THREE: &[(&str, &str)] = &[("alpha", "a1"), ("beta", "b1"), ("gamma", "g1")];

#[test]
fn header_roundtrip() {
    let bytes = build_bytes(
        THREE,
        &[
            ("id", "Test"),
            ("char-precedence", "ABCabc"),
            ("search-ignore-chars", "-."),
        ],
        CompressionMethod::None,
    );
    let mut dict = open_bytes(bytes, true).unwrap();

    assert_eq!(dict.name(), "Test");
    assert_eq!(
        dict.property("char-precedence").unwrap().as_deref(),
        Some("ABCabc")
    );
    assert_eq!(
        dict.property("search-ignore-chars").unwrap().as_deref(),
        Some("-.")
    );
    assert_eq!(
        dict.property("compression-method").unwrap().as_deref(),
        Some("none")
    );
    assert_eq!(dict.property("items").unwrap().as_deref(), Some("3"));
    // the index is consumed at open time, not exposed
    assert_eq!(dict.property("index").unwrap(), None);
}

#[test]
fn ignore_chars_default_depends_on_precedence() {
    let bytes = build_bytes(THREE, &[("id", "T")], CompressionMethod::None);
    let mut dict = open_bytes(bytes, false).unwrap();
    assert_eq!(
        dict.property("search-ignore-chars").unwrap().as_deref(),
        Some("-.")
    );

    let bytes = build_bytes(
        THREE,
        &[("id", "T"), ("char-precedence", "abglmtz")],
        CompressionMethod::None,
    );
    let mut dict = open_bytes(bytes, false).unwrap();
    assert_eq!(
        dict.property("search-ignore-chars").unwrap().as_deref(),
        Some("")
    );
}

#[test]
fn find_entry_on_three_entry_file() {
    let mut dict = open_bytes(
        build_bytes(THREE, &[("id", "T")], CompressionMethod::None),
        true,
    )
    .unwrap();

    let hit = dict.find_entry("beta").unwrap();
    assert!(hit.matches);
    assert!(!hit.subword);
    assert_eq!(dict.keyword(), Some("beta"));
    assert_eq!(dict.description().unwrap().as_deref(), Some("b1"));

    let miss = dict.find_entry("b").unwrap();
    assert!(!miss.matches);
    assert!(miss.subword);
    assert_eq!(dict.keyword(), Some("beta"));

    let past = dict.find_entry("zzz").unwrap();
    assert!(!past.matches);
    assert!(!past.subword);
    assert_eq!(dict.keyword(), Some("gamma"));
}

#[test]
fn lookup_is_case_insensitive_by_default() {
    let mut dict = open_bytes(
        build_bytes(THREE, &[("id", "T")], CompressionMethod::None),
        false,
    )
    .unwrap();
    assert!(dict.find_entry("BETA").unwrap().matches);
    assert_eq!(dict.description().unwrap().as_deref(), Some("b1"));
}

#[test]
fn iteration_is_strictly_increasing() {
    let entries: Vec<(String, String)> = (0..200)
        .map(|i| (format!("w{:03}", (i * 37) % 200), format!("sense {i}")))
        .collect();
    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(w, s)| (w.as_str(), s.as_str()))
        .collect();
    let mut dict = open_bytes(
        build_bytes(&borrowed, &[("id", "T")], CompressionMethod::None),
        true,
    )
    .unwrap();

    let collation = dict.collation();
    let coll = collation.read().unwrap();

    assert!(dict.first_entry().unwrap());
    let mut previous = coll.canonize(dict.keyword().unwrap());
    let mut count = 1;
    while dict.next_entry().unwrap() {
        let current = coll.canonize(dict.keyword().unwrap());
        assert_eq!(
            coll.compare(&previous, &current),
            std::cmp::Ordering::Less,
            "entries out of order at #{count}"
        );
        previous = current;
        count += 1;
    }
    assert_eq!(count, 200);
    assert!(dict.at_end());
    assert!(!dict.next_entry().unwrap());
    assert_eq!(dict.keyword(), None);
}

#[test]
fn every_keyword_is_findable() {
    let entries: Vec<(String, String)> = (0..300)
        .map(|i| (format!("entry{i:04}"), format!("sense {i}")))
        .collect();
    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(w, s)| (w.as_str(), s.as_str()))
        .collect();
    let mut dict = open_bytes(
        build_bytes(&borrowed, &[("id", "T")], CompressionMethod::None),
        false,
    )
    .unwrap();

    for (word, sense) in &entries {
        assert!(dict.find_entry(word).unwrap().matches, "missing {word}");
        assert_eq!(dict.description().unwrap().as_deref(), Some(sense.as_str()));
    }
}

#[test]
fn trailing_newline_is_tolerated() {
    let mut bytes = build_bytes(THREE, &[("id", "T")], CompressionMethod::None);
    bytes.push(b'\n');
    let mut dict = open_bytes(bytes, true).unwrap();

    assert!(dict.last_entry().unwrap());
    assert_eq!(dict.keyword(), Some("gamma"));
    assert!(dict.find_entry("alpha").unwrap().matches);
}

#[test]
fn corrupt_trailer_fails_integrity_check() {
    let mut bytes = build_bytes(THREE, &[("id", "T")], CompressionMethod::None);
    bytes.push(b'x');
    let result = open_bytes(bytes, true);
    assert!(matches!(result, Err(DictError::Integrity(_))));
}

#[test]
fn descriptions_with_delimiters_survive() {
    let entries = &[
        ("multi", "line one\nline two"),
        ("nul", "before\x00after"),
        ("esc", "literal \x1b escape"),
    ];
    let mut dict = open_bytes(
        build_bytes(entries, &[("id", "T")], CompressionMethod::None),
        true,
    )
    .unwrap();

    for (word, sense) in entries {
        assert!(dict.find_entry(word).unwrap().matches);
        assert_eq!(dict.description().unwrap().as_deref(), Some(*sense));
    }
}

#[test]
fn collation_grouping_orders_entries() {
    let entries = &[("ábel", "second"), ("Abel", "first"), ("baker", "third")];
    let mut dict = open_bytes(
        build_bytes(
            entries,
            &[("id", "T"), ("char-precedence", "{Aaá}{Bb}eklr")],
            CompressionMethod::None,
        ),
        false,
    )
    .unwrap();

    assert!(dict.first_entry().unwrap());
    assert_eq!(dict.keyword(), Some("Abel"));
    assert!(dict.next_entry().unwrap());
    assert_eq!(dict.keyword(), Some("ábel"));
    assert!(dict.next_entry().unwrap());
    assert_eq!(dict.keyword(), Some("baker"));
}

#[test]
fn shcm_dictionary_roundtrips() {
    let entries: Vec<(String, String)> = (0..100)
        .map(|i| (format!("word{i:03}"), format!("meaning of number {i} spelled out")))
        .collect();
    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(w, s)| (w.as_str(), s.as_str()))
        .collect();
    let bytes = build_bytes(&borrowed, &[("id", "Packed")], CompressionMethod::Shcm);
    let mut dict = open_bytes(bytes, true).unwrap();

    assert_eq!(
        dict.property("compression-method").unwrap().as_deref(),
        Some("shcm")
    );
    for (word, sense) in entries.iter().step_by(7) {
        assert!(dict.find_entry(word).unwrap().matches, "missing {word}");
        assert_eq!(dict.description().unwrap().as_deref(), Some(sense.as_str()));
    }

    assert!(dict.first_entry().unwrap());
    let mut count = 1;
    while dict.next_entry().unwrap() {
        count += 1;
    }
    assert_eq!(count, 100);
}

#[test]
fn singly_escaped_shcm_tree_is_tolerated() {
    // Assemble a file whose shcm-tree property carries only the escape
    // pass every property value gets, without the redundant second one.
    let mut model = ShcmBuilder::new();
    model.accumulate(b"alphabeta sense");
    let codec = model.finish().unwrap();

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"compression-method=shcm\n");
    bytes.extend_from_slice(b"id=Single\n");
    bytes.extend_from_slice(b"shcm-tree=");
    bytes.extend_from_slice(&escape(&codec.packed_tree()));
    bytes.push(b'\n');
    bytes.push(0);
    for word in ["alpha", "beta"] {
        bytes.extend_from_slice(&escape(&codec.encode(word.as_bytes()).unwrap()));
        bytes.push(b'\n');
        bytes.extend_from_slice(&escape(&codec.encode(b"sense").unwrap()));
        bytes.push(0);
    }

    let mut dict = open_bytes(bytes, false).unwrap();
    assert!(dict.find_entry("beta").unwrap().matches);
    assert_eq!(dict.description().unwrap().as_deref(), Some("sense"));
}

#[test]
fn random_entry_lands_on_a_real_entry() {
    let entries: Vec<(String, String)> = (0..50)
        .map(|i| (format!("rand{i:02}"), format!("s{i}")))
        .collect();
    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(w, s)| (w.as_str(), s.as_str()))
        .collect();
    let mut dict = open_bytes(
        build_bytes(&borrowed, &[("id", "T")], CompressionMethod::None),
        false,
    )
    .unwrap();

    for _ in 0..20 {
        assert!(dict.random_entry().unwrap());
        let word = dict.keyword().unwrap().to_owned();
        assert!(entries.iter().any(|(w, _)| w == &word), "bogus {word}");
    }
}

#[test]
fn length_limits_apply_declared_slack() {
    let mut dict = open_bytes(
        build_bytes(THREE, &[("id", "T")], CompressionMethod::None),
        false,
    )
    .unwrap();
    // builder stamps the observed maxima; the reader adds its slack
    assert_eq!(dict.max_word_length(), 5 + 5);
    assert_eq!(dict.max_entry_length(), 9 + 10);
    assert_eq!(dict.property("max-word-length").unwrap().as_deref(), Some("5"));
}

#[test]
fn dictzip_dictionary_random_access() {
    let entries: Vec<(String, String)> = (0..100_000)
        .map(|i| (format!("key{i:05}"), format!("val{i:05}")))
        .collect();
    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(w, s)| (w.as_str(), s.as_str()))
        .collect();
    let image = build_bytes(&borrowed, &[("id", "Big")], CompressionMethod::None);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.dic.dz");
    let mut file = std::fs::File::create(&path).unwrap();
    write_dictzip(&image, 8192, &mut file).unwrap();
    drop(file);

    let mut dict = StaticDict::open(&path, false).unwrap();
    let after_open = dict.block().inflations();

    let hit = dict.find_entry("key05000").unwrap();
    assert!(hit.matches);
    assert_eq!(dict.description().unwrap().as_deref(), Some("val05000"));

    // the sparse index pins the search to one ~32 KiB region, so only a
    // handful of the ~220 chunks are ever inflated
    let total_chunks = image.len() / 8192 + 1;
    let used = dict.block().inflations() - after_open;
    assert!(used <= 16, "inflated {used} chunks for one lookup");
    assert!((used as usize) < total_chunks / 10);

    // integrity check exercises the index anchors on the compressed file
    dict.check_integrity().unwrap();
}

#[test]
fn factory_selects_static_backend() {
    let bytes = build_bytes(THREE, &[("id", "T")], CompressionMethod::None);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.dic");
    std::fs::write(&path, &bytes).unwrap();

    let mut dict = open_dictionary(&path, true).unwrap();
    assert!(matches!(dict, AnyDictionary::Static(_)));
    assert!(!dict.is_dynamic());
    assert!(dict.as_editable().is_none());
    assert!(dict.find_entry("alpha").unwrap().matches);
}
