use dirtrace_rs::aggregate::FindingSet;
use dirtrace_rs::classify::{view, Category, SortDirection, SortKey, SortState};
use dirtrace_rs::types::{Finding, FindingStatus, Source};

fn set() -> FindingSet {
    let rows = [
        ("http://t/d/", FindingStatus::Code(200), 40, false, Source::InitialProbe),
        ("http://t/b/", FindingStatus::Code(403), 10, true, Source::CrawledPage),
        ("http://t/api/", FindingStatus::Code(200), 30, false, Source::DiscoveredApiBase),
        ("http://t/a/", FindingStatus::Excluded, 0, false, Source::TargetBaseUrl),
        ("http://t/c/", FindingStatus::Code(404), 5, false, Source::Unknown),
    ];
    let mut s = FindingSet::new();
    for (url, status, len, listing, source) in rows {
        s.insert(Finding {
            url: url.into(),
            status,
            content_length: len,
            listing_exposed: listing,
            source,
            note: None,
        });
    }
    s
}

fn urls(rows: Vec<&Finding>) -> Vec<String> {
    rows.into_iter().map(|f| f.url.clone()).collect()
}

#[test]
fn selecting_same_key_twice_reverses() {
    let s = set();
    for key in [SortKey::Url, SortKey::Length, SortKey::Source] {
        let mut state = SortState::default();
        if state.key == key {
            state.select(SortKey::Status);
        }
        state.select(key);
        assert_eq!(state.direction, SortDirection::Ascending);
        let asc = urls(view(&s, Category::All, Some(state)));
        state.select(key);
        assert_eq!(state.direction, SortDirection::Descending);
        let mut desc = urls(view(&s, Category::All, Some(state)));
        desc.reverse();
        assert_eq!(asc, desc, "key {key:?}");
    }
}

#[test]
fn url_sort_is_lexicographic() {
    let s = set();
    let rows = urls(view(&s, Category::All, Some(SortState { key: SortKey::Url, direction: SortDirection::Ascending })));
    assert_eq!(rows, vec!["http://t/a/", "http://t/api/", "http://t/b/", "http://t/c/", "http://t/d/"]);
}

#[test]
fn source_sort_uses_display_names() {
    let s = set();
    let rows = view(&s, Category::All, Some(SortState { key: SortKey::Source, direction: SortDirection::Ascending }));
    let names: Vec<&str> = rows.iter().map(|f| f.source.display_name()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert_eq!(names[0], "API Base");
}

#[test]
fn unsorted_view_keeps_insertion_order() {
    let s = set();
    assert_eq!(
        urls(view(&s, Category::Successful, None)),
        vec!["http://t/d/", "http://t/b/", "http://t/api/"]
    );
    assert_eq!(urls(view(&s, Category::ApiEndpoints, None)), vec!["http://t/api/"]);
    assert_eq!(urls(view(&s, Category::Directories, None)), vec!["http://t/d/", "http://t/b/"]);
}

fn toggled_twice(s: &FindingSet, key: SortKey) -> (Vec<String>, Vec<String>) {
    let mut state = SortState::default();
    state.select(key);
    let asc = urls(view(s, Category::All, Some(state)));
    state.select(key);
    let desc = urls(view(s, Category::All, Some(state)));
    (asc, desc)
}

#[test]
fn status_ties_keep_insertion_order_both_ways() {
    let s = set();
    let (asc, desc) = toggled_twice(&s, SortKey::Status);
    assert_eq!(asc, vec!["http://t/d/", "http://t/api/", "http://t/b/", "http://t/c/", "http://t/a/"]);
    assert_eq!(desc, vec!["http://t/a/", "http://t/c/", "http://t/b/", "http://t/d/", "http://t/api/"]);
}

#[test]
fn listing_ties_keep_insertion_order_both_ways() {
    let s = set();
    let (asc, desc) = toggled_twice(&s, SortKey::Listing);
    assert_eq!(asc, vec!["http://t/api/", "http://t/d/", "http://t/a/", "http://t/c/", "http://t/b/"]);
    assert_eq!(desc, vec!["http://t/b/", "http://t/d/", "http://t/a/", "http://t/c/", "http://t/api/"]);
}
