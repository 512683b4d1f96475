//! Property-based tests for port round trips and list numbering
//!
//! Uses proptest over a directory-backed tree so each case stays cheap

use databundle::{BundlePath, DirTree, ErrorDocument, PortStore, VirtualTree};
use proptest::prelude::*;
use std::collections::BTreeSet;
use tempfile::TempDir;
use url::Url;

fn p(s: &str) -> BundlePath {
    BundlePath::new(s).unwrap()
}

proptest! {
    #[test]
    fn prop_value_round_trip(text in any::<String>()) {
        let temp_dir = TempDir::new().unwrap();
        let mut tree = DirTree::new(temp_dir.path()).unwrap();
        let mut ports = PortStore::new(&mut tree);

        ports.set_value(&p("inputs/in1"), &text).unwrap();
        prop_assert_eq!(ports.get_string_value(&p("inputs/in1")).unwrap(), Some(text));
    }

    #[test]
    fn prop_reference_round_trip(
        segment in "[a-zA-Z0-9\u{e0}-\u{ff}\u{2600}-\u{2610} ]{0,12}",
        fragment in proptest::option::of("[a-z\u{2605}]{1,6}"),
    ) {
        let mut raw = format!("http://example.org/{}", segment);
        if let Some(fragment) = fragment {
            raw.push('#');
            raw.push_str(&fragment);
        }
        let uri = Url::parse(&raw).unwrap();

        let temp_dir = TempDir::new().unwrap();
        let mut tree = DirTree::new(temp_dir.path()).unwrap();
        let mut ports = PortStore::new(&mut tree);

        let file = ports.set_reference(&p("inputs/in1"), &uri).unwrap();
        prop_assert_eq!(ports.get_reference(&p("inputs/in1")).unwrap(), Some(uri));
        drop(ports);
        let text = tree.read(&file).unwrap();
        prop_assert!(text.is_ascii(), "reference files are ASCII");
    }

    #[test]
    fn prop_error_round_trip(
        message in "[^\r\n]{0,40}",
        trace in any::<String>(),
        cause_count in 0usize..4,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let mut tree = DirTree::new(temp_dir.path()).unwrap();
        let mut ports = PortStore::new(&mut tree);

        let causes: Vec<BundlePath> = (0..cause_count)
            .map(|i| {
                let port = p(&format!("inputs/in{}", i));
                ports.set_error(&port, "cause", "", &[]).unwrap()
            })
            .collect();

        let mut expected = ErrorDocument::new(message.as_str(), trace.as_str());
        expected.caused_by = causes;
        ports.set_error_document(&p("outputs/out1"), &expected).unwrap();

        prop_assert_eq!(ports.get_error(&p("outputs/out1")).unwrap(), Some(expected));
    }

    #[test]
    fn prop_new_list_item_is_one_past_max(
        indices in prop::collection::btree_set(0u64..50, 0..10),
        extension in prop::sample::select(vec!["", ".txt", ".url", ".err"]),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let mut tree = DirTree::new(temp_dir.path()).unwrap();
        for index in &indices {
            tree.write(&p(&format!("list/{}{}", index, extension)), b"").unwrap();
        }
        tree.write(&p("list/nonumber"), b"").unwrap();
        let ports = PortStore::new(&mut tree);

        let next = ports.new_list_item(&p("list")).unwrap();
        let expected = indices.iter().max().map_or(0, |max| max + 1).to_string();
        prop_assert_eq!(next.file_name(), Some(expected.as_str()));
    }

    #[test]
    fn prop_get_list_marks_holes(indices in prop::collection::btree_set(0u64..30, 1..10)) {
        let temp_dir = TempDir::new().unwrap();
        let mut tree = DirTree::new(temp_dir.path()).unwrap();
        let mut ports = PortStore::new(&mut tree);
        let list = p("inputs/list");
        ports.create_list(&list).unwrap();
        for index in &indices {
            let item = ports.get_list_item(&list, *index);
            ports.set_value(&item, "x").unwrap();
        }

        let items = ports.get_list(&list).unwrap().unwrap();
        let max = *indices.iter().max().unwrap();
        prop_assert_eq!(items.len() as u64, max + 1);

        let present: BTreeSet<u64> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_some())
            .map(|(i, _)| i as u64)
            .collect();
        prop_assert_eq!(present, indices);
    }
}
