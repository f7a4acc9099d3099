use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kyro_filter::{
    FilterConfig, FixedClock, InMemoryPatternStore, MatchedMetric, PatternStorage, RefreshStats,
};

const NOW: i64 = 1_700_000_000;
const HOUR: Duration = Duration::from_secs(3600);

fn setup(patterns: &[&str]) -> (Arc<InMemoryPatternStore>, Arc<FixedClock>, PatternStorage) {
    let store = Arc::new(InMemoryPatternStore::with_patterns(patterns.iter().copied()));
    let clock = Arc::new(FixedClock::at_unix(NOW));
    let storage =
        PatternStorage::with_clock(store.clone(), FilterConfig::default(), clock.clone()).unwrap();
    storage.refresh().unwrap();
    (store, clock, storage)
}

fn matched(storage: &PatternStorage, line: &str) -> Vec<String> {
    let mut patterns = storage
        .process_incoming_metric(line, HOUR)
        .map(|m| m.patterns)
        .unwrap_or_default();
    patterns.sort();
    patterns
}

#[test]
fn glob_patterns_route_untagged_metrics() {
    let (_, _, storage) = setup(&[
        "Simple.matching.pattern",
        "Star.single.*",
        "Bracket.{one,two,three}.pattern",
        "Complex.*.*",
        "Question.?at_begin",
    ]);

    assert_eq!(
        matched(&storage, &format!("Simple.matching.pattern 1 {NOW}")),
        vec!["Simple.matching.pattern"]
    );
    assert_eq!(
        matched(&storage, &format!("Bracket.two.pattern 1 {NOW}")),
        vec!["Bracket.{one,two,three}.pattern"]
    );
    assert_eq!(
        matched(&storage, &format!("Complex.a.b 1 {NOW}")),
        vec!["Complex.*.*"]
    );
    assert!(matched(&storage, &format!("Star.single 1 {NOW}")).is_empty());
    assert!(matched(&storage, &format!("Question.at_begin 1 {NOW}")).is_empty());
}

#[test]
fn tag_predicates_route_tagged_metrics() {
    let (_, _, storage) = setup(&[
        "seriesByTag('name=cpu1')",
        "seriesByTag('name=~cpu')",
        "seriesByTag('name=~cpu', 'dc=')",
        "seriesByTag('name=~cpu', 'dc!=')",
        "seriesByTag('dc=ru1')",
        "seriesByTag('dc={ru1,ru2}')",
        "seriesByTag('name=cpu.*.test2', 'tag1=val1')",
        // Globs never see tagged metrics.
        "cpu1",
    ]);

    assert_eq!(
        matched(&storage, &format!("cpu1;dc=ru1 1 {NOW}")),
        vec![
            "seriesByTag('dc=ru1')",
            "seriesByTag('dc={ru1,ru2}')",
            "seriesByTag('name=cpu1')",
            "seriesByTag('name=~cpu')",
            "seriesByTag('name=~cpu', 'dc!=')",
        ]
    );
    assert_eq!(
        matched(&storage, &format!("cpu1;host=a 1 {NOW}")),
        vec![
            "seriesByTag('name=cpu1')",
            "seriesByTag('name=~cpu')",
            "seriesByTag('name=~cpu', 'dc=')",
        ]
    );
    assert_eq!(
        matched(&storage, &format!("cpu.x.test2;tag1=val1 1 {NOW}")),
        vec![
            "seriesByTag('name=cpu.*.test2', 'tag1=val1')",
            "seriesByTag('name=~cpu')",
            "seriesByTag('name=~cpu', 'dc=')",
        ]
    );
    assert!(matched(&storage, &format!("disk;dc=ru3 1 {NOW}")).is_empty());
    assert_eq!(matched(&storage, &format!("cpu1 1 {NOW}")), vec!["cpu1"]);
}

#[test]
fn matched_metric_carries_input_and_retention() {
    let (_, _, storage) = setup(&["a.b"]);
    let m = storage
        .process_incoming_metric(&format!("a.b 42.5 {}", NOW - 10), HOUR)
        .unwrap();
    assert_eq!(
        m,
        MatchedMetric {
            metric: "a.b".to_string(),
            patterns: vec!["a.b".to_string()],
            value: 42.5,
            timestamp: NOW - 10,
            retention_timestamp: NOW - 10,
            retention: 60,
        }
    );

    let json = serde_json::to_string(&m).unwrap();
    let back: MatchedMetric = serde_json::from_str(&json).unwrap();
    assert_eq!(back, m);
}

#[test]
fn too_old_metrics_never_match() {
    let (_, clock, storage) = setup(&["a.b"]);
    let max_age = Duration::from_secs(120);
    let line = format!("a.b 1 {NOW}");

    assert!(storage.process_incoming_metric(&line, max_age).is_some());
    clock.advance_secs(120);
    assert!(storage.process_incoming_metric(&line, max_age).is_some());
    clock.advance_secs(1);
    assert!(storage.process_incoming_metric(&line, max_age).is_none());

    let s = storage.metrics().snapshot();
    assert_eq!(s.too_old, 1);
    assert_eq!(s.matched, 2);
}

#[test]
fn malformed_lines_are_dropped_and_counted() {
    let (_, _, storage) = setup(&["a.b"]);
    for line in [
        "",
        "a.b",
        "a.b 1",
        "a.b 1 2 3",
        "a.b one 2",
        "a.b 1 two",
        "a.b;dc 1 2",
        "a.b\u{7f} 1 2",
    ] {
        assert!(storage.process_incoming_metric(line, HOUR).is_none(), "{line:?}");
    }
    let s = storage.metrics().snapshot();
    assert_eq!(s.total_received, 8);
    assert_eq!(s.parse_errors, 8);
    assert_eq!(s.valid_received, 0);
}

#[test]
fn refresh_is_idempotent() {
    let (_, _, storage) = setup(&["a.*", "seriesByTag('dc=ru1')"]);
    let before = matched(&storage, &format!("a.b 1 {NOW}"));
    let tagged_before = matched(&storage, &format!("cpu;dc=ru1 1 {NOW}"));
    assert_eq!(tagged_before, vec!["seriesByTag('dc=ru1')"]);

    let first = storage.refresh().unwrap();
    let second = storage.refresh().unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first,
        RefreshStats {
            glob_patterns: 1,
            tagged_patterns: 1,
            skipped_patterns: 0,
            newly_skipped: 0,
        }
    );
    assert_eq!(matched(&storage, &format!("a.b 1 {NOW}")), before);
    assert_eq!(matched(&storage, &format!("cpu;dc=ru1 1 {NOW}")), tagged_before);
    assert!(matched(&storage, &format!("cpu;dc=ru2 1 {NOW}")).is_empty());
}

#[test]
fn refresh_picks_up_added_and_removed_patterns() {
    let (store, _, storage) = setup(&["a.b"]);
    store.insert("a.*").unwrap();
    store.remove("a.b").unwrap();
    storage.refresh().unwrap();
    assert_eq!(matched(&storage, &format!("a.b 1 {NOW}")), vec!["a.*"]);

    store.replace(Vec::<String>::new()).unwrap();
    storage.refresh().unwrap();
    assert!(matched(&storage, &format!("a.b 1 {NOW}")).is_empty());
}

#[test]
fn invalid_patterns_do_not_block_valid_ones() {
    let (_, _, storage) = setup(&["a.b", "a.{b", "seriesByTag('dc=~(')", "seriesByTag('dc=ru1')"]);
    let snapshot = storage.snapshot();
    assert_eq!(snapshot.glob_patterns, 1);
    assert_eq!(snapshot.tagged_patterns, 1);
    assert_eq!(snapshot.metrics.skipped_patterns, 2);
    assert_eq!(matched(&storage, &format!("a.b 1 {NOW}")), vec!["a.b"]);
}

#[test]
fn storage_outage_keeps_published_indexes() {
    let (store, _, storage) = setup(&["a.b"]);
    store.set_unavailable(true);
    store.insert("c.d").unwrap();

    assert!(storage.refresh().unwrap_err().is_storage());
    assert_eq!(matched(&storage, &format!("a.b 1 {NOW}")), vec!["a.b"]);
    assert!(matched(&storage, &format!("c.d 1 {NOW}")).is_empty());

    store.set_unavailable(false);
    storage.refresh().unwrap();
    assert_eq!(matched(&storage, &format!("c.d 1 {NOW}")), vec!["c.d"]);
}

#[test]
fn readers_see_whole_generations_during_refresh() {
    let (store, _, storage) = setup(&["a.*"]);
    let storage = Arc::new(storage);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let storage = Arc::clone(&storage);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let line = format!("a.b 1 {NOW}");
                let mut seen = 0u64;
                while !done.load(Ordering::Relaxed) {
                    let m = storage.process_incoming_metric(&line, HOUR).unwrap();
                    let mut patterns = m.patterns;
                    patterns.sort();
                    assert!(
                        patterns == vec!["a.*"] || patterns == vec!["a.*", "a.b"],
                        "torn generation: {patterns:?}"
                    );
                    seen += 1;
                }
                seen
            })
        })
        .collect();

    for i in 0..200 {
        if i % 2 == 0 {
            store.insert("a.b").unwrap();
        } else {
            store.remove("a.b").unwrap();
        }
        storage.refresh().unwrap();
    }
    done.store(true, Ordering::Relaxed);

    let total: u64 = readers.into_iter().map(|r| r.join().unwrap()).sum();
    assert_eq!(storage.metrics().snapshot().matched, total);
}
