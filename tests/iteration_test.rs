//! Baseline, incremental and full pass tests

use std::collections::BTreeSet;

use kodegen_tools_harvest::iteration::{ChangeType, IterationError, IterationManager, IterationMode};
use serde_json::{Map, json};
use tempfile::TempDir;

const A: &str = "https://site.test/a";
const B: &str = "https://site.test/b";
const C: &str = "https://site.test/c";
const D: &str = "https://site.test/d";

fn urls(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Completed baseline holding A, B and C with etags
fn completed_baseline(manager: &IterationManager) -> String {
    let baseline = manager
        .create_iteration("c1", json!({ "depth": 1 }), IterationMode::Baseline)
        .unwrap();
    let id = baseline.iteration_id;
    for (url, body) in [(A, "alpha"), (B, "bravo"), (C, "charlie")] {
        let etag = format!("\"{body}-v1\"");
        let outcome = manager
            .record_document(&id, url, body.as_bytes(), Some(etag.as_str()), None)
            .unwrap();
        assert_eq!(outcome.change_type, ChangeType::New);
    }
    manager.complete_iteration(&id, Map::new()).unwrap();
    id
}

#[test]
fn test_incremental_pass_classifies_changes() {
    let dir = TempDir::new().unwrap();
    let manager = IterationManager::open(dir.path()).unwrap();
    let baseline_id = completed_baseline(&manager);

    let current = manager
        .create_iteration("c1", json!({}), IterationMode::Incremental)
        .unwrap();
    assert_eq!(current.baseline_iteration_id.as_deref(), Some(baseline_id.as_str()));
    assert_eq!(current.parent_iteration_id.as_deref(), Some(baseline_id.as_str()));
    let id = current.iteration_id;

    // A: same etag, skipped and carried forward
    let decision = manager.should_crawl_url(&id, A, Some("\"alpha-v1\""), None).unwrap();
    assert!(!decision.should_fetch);
    assert_eq!(decision.change_type, ChangeType::Unchanged);

    // B: new etag, fetched and found different
    let decision = manager.should_crawl_url(&id, B, Some("\"bravo-v2\""), None).unwrap();
    assert!(decision.should_fetch);
    assert_eq!(decision.change_type, ChangeType::Modified);
    let outcome = manager
        .record_document(&id, B, b"bravo, revised", Some("\"bravo-v2\""), None)
        .unwrap();
    assert_eq!(outcome.change_type, ChangeType::Modified);

    // D: never seen
    let decision = manager.should_crawl_url(&id, D, None, None).unwrap();
    assert!(decision.should_fetch);
    assert_eq!(decision.change_type, ChangeType::New);
    let outcome = manager.record_document(&id, D, b"delta", None, None).unwrap();
    assert_eq!(outcome.change_type, ChangeType::New);

    // C is never seen again
    let comparison = manager.compare_iterations(&baseline_id, &id).unwrap();
    assert_eq!(comparison.new, urls(&[D]));
    assert_eq!(comparison.modified, urls(&[B]));
    assert_eq!(comparison.unchanged, urls(&[A]));
    assert_eq!(comparison.removed, urls(&[C]));
    assert!(comparison.has_changes());

    let completed = manager.complete_iteration(&id, Map::new()).unwrap();
    assert!(completed.is_completed());
    assert_eq!(completed.stats["new"], 1);
    assert_eq!(completed.stats["modified"], 1);
    assert_eq!(completed.stats["unchanged"], 1);
    assert_eq!(completed.stats["removed"], 1);
    assert_eq!(completed.stats["documents"], 3);
}

#[test]
fn test_carried_fingerprint_belongs_to_current_iteration() {
    let dir = TempDir::new().unwrap();
    let manager = IterationManager::open(dir.path()).unwrap();
    completed_baseline(&manager);
    let id = manager
        .create_iteration("c1", json!({}), IterationMode::Incremental)
        .unwrap()
        .iteration_id;

    manager.should_crawl_url(&id, A, Some("\"alpha-v1\""), None).unwrap();

    let fingerprints = manager.get_fingerprints(&id);
    assert_eq!(fingerprints.len(), 1);
    assert_eq!(fingerprints[0].url, A);
    assert_eq!(fingerprints[0].iteration_id, id);
    assert_eq!(fingerprints[0].etag.as_deref(), Some("\"alpha-v1\""));
}

#[test]
fn test_incremental_requires_baseline() {
    let dir = TempDir::new().unwrap();
    let manager = IterationManager::open(dir.path()).unwrap();
    let err = manager
        .create_iteration("c1", json!({}), IterationMode::Incremental)
        .unwrap_err();
    assert!(matches!(err, IterationError::NoBaseline { crawl_id } if crawl_id == "c1"));
    assert!(manager.get_iterations_for_crawl("c1").is_empty());

    // A full pass has nothing to diff against but is allowed
    let full = manager
        .create_iteration("c1", json!({}), IterationMode::Full)
        .unwrap();
    assert!(full.baseline_iteration_id.is_none());
    let decision = manager.should_crawl_url(&full.iteration_id, A, None, None).unwrap();
    assert_eq!(decision.change_type, ChangeType::New);
}

#[test]
fn test_last_modified_validators() {
    let dir = TempDir::new().unwrap();
    let manager = IterationManager::open(dir.path()).unwrap();
    let baseline = manager
        .create_iteration("c1", json!({}), IterationMode::Baseline)
        .unwrap()
        .iteration_id;
    manager
        .record_document(&baseline, A, b"alpha", None, Some("Wed, 21 Oct 2015 07:28:00 GMT"))
        .unwrap();
    manager.complete_iteration(&baseline, Map::new()).unwrap();

    let id = manager
        .create_iteration("c1", json!({}), IterationMode::Incremental)
        .unwrap()
        .iteration_id;

    let newer = manager
        .should_crawl_url(&id, A, None, Some("Thu, 22 Oct 2015 07:28:00 GMT"))
        .unwrap();
    assert!(newer.should_fetch);

    // No validators at all cannot rule out a change
    let unknown = manager.should_crawl_url(&id, A, None, None).unwrap();
    assert!(unknown.should_fetch);
    assert_eq!(unknown.change_type, ChangeType::Modified);

    let same = manager
        .should_crawl_url(&id, A, None, Some("Wed, 21 Oct 2015 07:28:00 GMT"))
        .unwrap();
    assert!(!same.should_fetch);
}

#[test]
fn test_full_pass_fetches_everything() {
    let dir = TempDir::new().unwrap();
    let manager = IterationManager::open(dir.path()).unwrap();
    let baseline_id = completed_baseline(&manager);
    let id = manager
        .create_iteration("c1", json!({}), IterationMode::Full)
        .unwrap()
        .iteration_id;

    let decision = manager.should_crawl_url(&id, A, Some("\"alpha-v1\""), None).unwrap();
    assert!(decision.should_fetch);
    assert_eq!(decision.change_type, ChangeType::Modified);

    // Hash decides the final classification
    let outcome = manager.record_document(&id, A, b"alpha", None, None).unwrap();
    assert_eq!(outcome.change_type, ChangeType::Unchanged);

    let comparison = manager.compare_iterations(&baseline_id, &id).unwrap();
    assert_eq!(comparison.unchanged, urls(&[A]));
    assert_eq!(comparison.removed, urls(&[B, C]));
}

#[test]
fn test_completed_iteration_is_frozen() {
    let dir = TempDir::new().unwrap();
    let manager = IterationManager::open(dir.path()).unwrap();
    let baseline_id = completed_baseline(&manager);

    let err = manager.record_document(&baseline_id, D, b"late", None, None).unwrap_err();
    assert!(matches!(err, IterationError::Completed(_)));
    let err = manager.should_crawl_url(&baseline_id, D, None, None).unwrap_err();
    assert!(matches!(err, IterationError::Completed(_)));
    let err = manager.complete_iteration(&baseline_id, Map::new()).unwrap_err();
    assert!(matches!(err, IterationError::Completed(_)));

    let err = manager.record_document("missing_iter_1", D, b"x", None, None).unwrap_err();
    assert!(matches!(err, IterationError::NotFound(_)));
}

#[test]
fn test_rerecording_supersedes_within_iteration() {
    let dir = TempDir::new().unwrap();
    let manager = IterationManager::open(dir.path()).unwrap();
    let id = manager
        .create_iteration("c1", json!({}), IterationMode::Baseline)
        .unwrap()
        .iteration_id;
    manager.record_document(&id, A, b"first", None, None).unwrap();
    let second = manager.record_document(&id, A, b"second", None, None).unwrap();

    let fingerprints = manager.get_fingerprints(&id);
    assert_eq!(fingerprints.len(), 1);
    assert_eq!(fingerprints[0].content_hash, second.fingerprint.content_hash);
    assert_eq!(fingerprints[0].content_size, 6);
    assert_eq!(fingerprints[0].content_hash.len(), 64);
}

#[test]
fn test_chain_and_lineage_lookup() {
    let dir = TempDir::new().unwrap();
    let manager = IterationManager::open(dir.path()).unwrap();
    let baseline_id = completed_baseline(&manager);

    let second = manager
        .create_iteration("c1", json!({}), IterationMode::Incremental)
        .unwrap()
        .iteration_id;
    manager
        .record_document(&second, D, b"delta", Some("\"delta-v1\""), None)
        .unwrap();
    manager.complete_iteration(&second, Map::new()).unwrap();

    let third = manager
        .create_iteration("c1", json!({}), IterationMode::Incremental)
        .unwrap();
    assert_eq!(third.iteration_number, 3);
    assert_eq!(third.parent_iteration_id.as_deref(), Some(second.as_str()));
    assert_eq!(third.baseline_iteration_id.as_deref(), Some(baseline_id.as_str()));

    // D was first seen in the second pass; its etag is found through the parent
    let decision = manager
        .should_crawl_url(&third.iteration_id, D, Some("\"delta-v1\""), None)
        .unwrap();
    assert!(!decision.should_fetch);

    let chain: Vec<_> = manager
        .get_iteration_chain(&third.iteration_id)
        .into_iter()
        .map(|metadata| metadata.iteration_number)
        .collect();
    assert_eq!(chain, vec![1, 2, 3]);
    assert_eq!(
        manager.get_latest_iteration("c1").map(|m| m.iteration_id),
        Some(third.iteration_id)
    );
}

#[test]
fn test_reopen_restores_completed_iterations() {
    let dir = TempDir::new().unwrap();
    let baseline_id = {
        let manager = IterationManager::open(dir.path()).unwrap();
        let id = completed_baseline(&manager);
        manager
            .create_iteration("c1", json!({}), IterationMode::Incremental)
            .unwrap();
        id
    };

    let manager = IterationManager::open(dir.path()).unwrap();
    let iterations = manager.get_iterations_for_crawl("c1");
    assert_eq!(iterations.len(), 2);
    assert!(iterations[0].is_completed());
    assert!(!iterations[1].is_completed());
    assert_eq!(manager.get_fingerprints(&baseline_id).len(), 3);

    // Numbering continues after a reload
    let next = manager
        .create_iteration("c1", json!({}), IterationMode::Full)
        .unwrap();
    assert_eq!(next.iteration_number, 3);
}

#[test]
fn test_statistics_and_remove_crawl() {
    let dir = TempDir::new().unwrap();
    let manager = IterationManager::open(dir.path()).unwrap();
    completed_baseline(&manager);
    manager
        .create_iteration("c1", json!({}), IterationMode::Incremental)
        .unwrap();
    manager
        .create_iteration("c2", json!({}), IterationMode::Baseline)
        .unwrap();

    let stats = manager.get_statistics();
    assert_eq!(stats.total_iterations, 3);
    assert_eq!(stats.completed_iterations, 1);
    assert_eq!(stats.crawls, 2);
    assert_eq!(stats.total_fingerprints, 3);
    assert_eq!(stats.by_mode.get(&IterationMode::Baseline), Some(&2));

    assert_eq!(manager.remove_crawl("c1").unwrap(), 2);
    assert!(manager.get_iterations_for_crawl("c1").is_empty());
    assert!(!dir.path().join("c1_iter_1_metadata.json").exists());
    assert_eq!(manager.get_statistics().total_iterations, 1);
}

#[test]
fn test_incremental_accepts_open_baseline() {
    let dir = TempDir::new().unwrap();
    let manager = IterationManager::open(dir.path()).unwrap();
    let baseline = manager
        .create_iteration("c1", json!({}), IterationMode::Baseline)
        .unwrap();
    assert!(!baseline.is_completed());

    let current = manager
        .create_iteration("c1", json!({}), IterationMode::Incremental)
        .unwrap();
    assert_eq!(
        current.baseline_iteration_id.as_deref(),
        Some(baseline.iteration_id.as_str())
    );
}
