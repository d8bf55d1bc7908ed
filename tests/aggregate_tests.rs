use dirtrace_rs::aggregate::merge;
use dirtrace_rs::types::{FindingStatus, RawPayload, Source};

fn payload(json: &str) -> RawPayload {
    serde_json::from_str(json).expect("payload parses")
}

#[test]
fn later_target_wins_on_url_collision() {
    let p = payload(
        r#"{
            "http://a.test": {"directories": {
                "http://shared.test/admin/": {"status_code": 200, "content_length": 1, "directory_listing": true, "source": "initial"},
                "http://a.test/only-a/": {"status_code": 404, "content_length": 0, "directory_listing": false}
            }},
            "http://b.test": {"directories": {
                "http://shared.test/admin/": {"status_code": 403, "content_length": 7, "directory_listing": false, "source": "crawl"}
            }}
        }"#,
    );
    let merged = merge(&p);
    assert_eq!(merged.findings.len(), 2);
    let shared = merged.findings.get("http://shared.test/admin/").unwrap();
    assert_eq!(shared.status, FindingStatus::Code(403));
    assert_eq!(shared.content_length, 7);
    assert!(!shared.listing_exposed);
    assert_eq!(shared.source, Source::CrawledPage);
    assert_eq!(shared.note, None);
}

#[test]
fn reordering_targets_flips_the_winner() {
    let forward = payload(
        r#"{"a": {"directories": {"http://x/": {"status_code": 200, "content_length": 1}}},
            "b": {"directories": {"http://x/": {"status_code": 403, "content_length": 2}}}}"#,
    );
    let reversed = payload(
        r#"{"b": {"directories": {"http://x/": {"status_code": 403, "content_length": 2}}},
            "a": {"directories": {"http://x/": {"status_code": 200, "content_length": 1}}}}"#,
    );
    assert_eq!(merge(&forward).findings.get("http://x/").unwrap().content_length, 2);
    assert_eq!(merge(&reversed).findings.get("http://x/").unwrap().content_length, 1);
}

#[test]
fn merge_is_deterministic() {
    let p = payload(
        r#"{
            "t1": {"directories": {"http://t1/a/": {"status_code": 200, "content_length": 3}, "http://t1/b/": {"status_code": "EXCLUDED", "content_length": null}}, "server_info": {"Server": "Apache"}},
            "t2": {"directories": {"http://t2/c/": {"status_code": "NO_RESPONSE_OR_ERROR"}}}
        }"#,
    );
    let first = merge(&p);
    let second = merge(&p);
    assert_eq!(first, second);
    let urls: Vec<&str> = first.findings.iter().map(|f| f.url.as_str()).collect();
    assert_eq!(urls, vec!["http://t1/a/", "http://t1/b/", "http://t2/c/"]);
    assert_eq!(first.server_info.keys().collect::<Vec<_>>(), vec!["t1"]);
}

#[test]
fn empty_payload_merges_to_nothing() {
    let merged = merge(&RawPayload::new());
    assert!(merged.findings.is_empty());
    assert!(merged.server_info.is_empty());
}

#[test]
fn large_directory_map_keeps_order() {
    let n = 20_000;
    let dirs: Vec<String> = (0..n)
        .map(|i| format!(r#""http://big.test/p{i}/": {{"status_code": 404, "content_length": {i}}}"#))
        .collect();
    let merged = merge(&payload(&format!(r#"{{"http://big.test": {{"directories": {{{}}}}}}}"#, dirs.join(","))));
    assert_eq!(merged.findings.len(), n);
    let urls: Vec<&str> = merged.findings.iter().map(|f| f.url.as_str()).collect();
    assert_eq!(urls[0], "http://big.test/p0/");
    assert_eq!(urls[n - 1], format!("http://big.test/p{}/", n - 1));
    assert_eq!(merged.findings.get("http://big.test/p777/").map(|f| f.content_length), Some(777));
}
