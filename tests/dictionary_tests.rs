use dirtrace_rs::dictionary::{parse_paths_str, replay, DictOp, Dictionary, DictionaryError, PathEntry};

fn p(s: &str) -> PathEntry {
    PathEntry::normalize(s).unwrap()
}

#[test]
fn remove_then_add_over_baseline() {
    let mut d = Dictionary::new(vec![p("admin/"), p("backup/")]);
    assert!(d.remove_path("backup/"));
    d.add_path("secret/").unwrap();

    let effective: Vec<String> = d.effective_set().iter().map(|e| e.to_string()).collect();
    assert_eq!(effective, vec!["admin/", "secret/"]);
    assert_eq!(d.paths(), &[p("admin/"), p("secret/")]);
    assert_eq!(
        d.operations(),
        &[
            DictOp::Remove { paths: vec![p("backup/")] },
            DictOp::Add { paths: vec![p("secret/")] },
        ]
    );
}

#[test]
fn cached_list_matches_replay_for_mixed_edits() {
    let mut d = Dictionary::new(vec![p("a"), p("b"), p("c")]);
    let edits: &[(&str, bool)] = &[
        ("d", true),
        ("a", false),
        ("a", false),
        ("d", true),
        ("e", true),
        ("b", false),
        ("a", true),
        ("zzz", false),
    ];
    for &(path, add) in edits {
        if add {
            let _ = d.add_path(path);
        } else {
            d.remove_path(path);
        }
        let cached: std::collections::BTreeSet<_> = d.paths().iter().cloned().collect();
        assert_eq!(cached, d.effective_set(), "after editing {path}");
    }
    let names: Vec<&str> = d.paths().iter().map(PathEntry::as_str).collect();
    assert_eq!(names, vec!["c/", "d/", "e/", "a/"]);
}

#[test]
fn replay_is_idempotent_for_repeated_ops() {
    let ops = vec![
        DictOp::Add { paths: vec![p("x"), p("x")] },
        DictOp::Add { paths: vec![p("x")] },
        DictOp::Remove { paths: vec![p("missing")] },
        DictOp::Remove { paths: vec![p("base")] },
        DictOp::Remove { paths: vec![p("base")] },
    ];
    let set = replay(&[p("base")], &ops);
    assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![p("x")]);
}

#[test]
fn without_baseline_only_edits_count() {
    let mut d = Dictionary::new(vec![p("admin")]);
    d.set_use_baseline(false);
    assert!(d.effective_set().is_empty());
    d.add_path("custom").unwrap();
    assert_eq!(d.effective_set().into_iter().collect::<Vec<_>>(), vec![p("custom")]);
    assert!(!d.use_baseline());
}

#[test]
fn add_reports_empty_and_duplicate() {
    let mut d = Dictionary::new(vec![p("admin")]);
    assert_eq!(d.add_path("   "), Err(DictionaryError::EmptyPath));
    assert_eq!(d.add_path(" admin "), Err(DictionaryError::Duplicate(p("admin/"))));
    assert!(d.operations().is_empty());
}

#[test]
fn operations_serialize_as_tagged_commands() {
    let mut d = Dictionary::new(vec![]);
    d.add_path("secret").unwrap();
    let json = serde_json::to_value(d.operations()).unwrap();
    assert_eq!(json, serde_json::json!([{"type": "add", "paths": ["secret/"]}]));
}

#[test]
fn parse_file_content() {
    let input = r#"
        # panels
        admin
        wp-admin/   # wordpress
        admin/

    "#;
    let paths = parse_paths_str(input);
    assert_eq!(paths, vec![p("admin/"), p("wp-admin/")]);
}
