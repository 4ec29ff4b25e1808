//! Lifecycle transition table, pause/resume and substate tests

use std::sync::Arc;

use kodegen_tools_harvest::crawl_events::{CrawlEventBus, EventType, HistoryQuery};
use kodegen_tools_harvest::crawl_state::{
    CrawlState, CrawlStateMachine, CrawlSubstate, ProgressCategory, StateError,
};
use proptest::prelude::*;

/// Shortest path from QUEUED to `target`
fn path_to(target: CrawlState) -> Vec<CrawlState> {
    use CrawlState::*;
    match target {
        Queued => vec![],
        Initializing => vec![Initializing],
        Crawling => vec![Initializing, Crawling],
        Extracting => vec![Initializing, Crawling, Extracting],
        Processing => vec![Initializing, Crawling, Extracting, Processing],
        Paused => vec![Initializing, Crawling, Paused],
        Completed => vec![Initializing, Crawling, Extracting, Processing, Completed],
        Failed => vec![Initializing, Failed],
        Cancelled => vec![Cancelled],
    }
}

fn machine_in(state: CrawlState) -> (Arc<CrawlEventBus>, CrawlStateMachine) {
    let bus = Arc::new(CrawlEventBus::new());
    let mut machine = CrawlStateMachine::new("job", Arc::clone(&bus));
    for step in path_to(state) {
        machine.transition(step, None).unwrap();
    }
    assert_eq!(machine.current_state(), state);
    (bus, machine)
}

fn state_changes(bus: &CrawlEventBus) -> usize {
    bus.get_history("job", &HistoryQuery::recent(10_000).of_type(EventType::StateChange))
        .len()
}

fn is_edge(from: CrawlState, to: CrawlState) -> bool {
    // Paused in `path_to` is always entered from Crawling
    from.successors().contains(&to) || (from == CrawlState::Paused && to == CrawlState::Crawling)
}

#[test]
fn test_every_edge_appends_one_transition_and_one_event() {
    for from in CrawlState::ALL {
        for to in CrawlState::ALL {
            if !is_edge(from, to) {
                continue;
            }
            let (bus, mut machine) = machine_in(from);
            let history_before = machine.history().len();
            let events_before = state_changes(&bus);

            let transition = machine.transition(to, None).unwrap().clone();

            assert_eq!(transition.from_state, from);
            assert_eq!(transition.to_state, to);
            assert_eq!(machine.current_state(), to);
            assert_eq!(machine.history().len(), history_before + 1);
            assert_eq!(state_changes(&bus), events_before + 1, "{from} -> {to}");

            let latest = bus.get_history("job", &HistoryQuery::recent(1)).pop().unwrap();
            assert_eq!(latest.data["from_state"], from.as_str());
            assert_eq!(latest.data["to_state"], to.as_str());
        }
    }
}

#[test]
fn test_every_non_edge_is_rejected_without_change() {
    for from in CrawlState::ALL {
        for to in CrawlState::ALL {
            if is_edge(from, to) {
                continue;
            }
            let (bus, mut machine) = machine_in(from);
            let before = serde_json::to_value(machine.data()).unwrap();
            let events_before = state_changes(&bus);

            let err = machine.transition(to, None).unwrap_err();

            assert_eq!(err, StateError::InvalidTransition { from, to });
            assert_eq!(serde_json::to_value(machine.data()).unwrap(), before);
            assert_eq!(state_changes(&bus), events_before);
        }
    }
}

#[test]
fn test_terminal_states_reject_cancel() {
    for state in [CrawlState::Completed, CrawlState::Failed, CrawlState::Cancelled] {
        let (_bus, mut machine) = machine_in(state);
        assert!(machine.is_terminal());
        assert!(machine.transition(CrawlState::Cancelled, None).is_err());
    }
}

#[test]
fn test_pause_only_from_working_states() {
    for state in CrawlState::ALL {
        let (_bus, mut machine) = machine_in(state);
        let expected = matches!(
            state,
            CrawlState::Crawling | CrawlState::Extracting | CrawlState::Processing
        );
        assert_eq!(machine.can_pause(), expected, "{state}");
        assert_eq!(machine.transition(CrawlState::Paused, None).is_ok(), expected);
    }
}

#[test]
fn test_resume_returns_to_remembered_state_only() {
    for origin in [CrawlState::Crawling, CrawlState::Extracting, CrawlState::Processing] {
        let (_bus, mut machine) = machine_in(origin);
        machine.transition(CrawlState::Paused, None).unwrap();
        assert!(machine.can_resume());
        assert_eq!(machine.pre_pause_state(), Some(origin));

        for other in CrawlState::ALL {
            if other != origin && other != CrawlState::Cancelled {
                assert!(machine.transition(other, None).is_err(), "{origin} paused -> {other}");
            }
        }

        machine.transition(origin, None).unwrap();
        assert_eq!(machine.current_state(), origin);
        assert_eq!(machine.pre_pause_state(), None);
    }
}

#[test]
fn test_resume_restores_pre_pause_substate() {
    let (_bus, mut machine) = machine_in(CrawlState::Extracting);
    machine.transition_substate(CrawlSubstate::Ocr).unwrap();
    machine.transition(CrawlState::Paused, None).unwrap();
    assert_eq!(machine.current_substate(), None);

    machine.transition(CrawlState::Extracting, None).unwrap();
    assert_eq!(machine.current_substate(), Some(CrawlSubstate::Ocr));
}

#[test]
fn test_cancel_from_paused_discards_origin() {
    let (_bus, mut machine) = machine_in(CrawlState::Crawling);
    machine.transition_substate(CrawlSubstate::DownloadingPages).unwrap();
    machine.transition(CrawlState::Paused, None).unwrap();

    machine.transition(CrawlState::Cancelled, None).unwrap();

    assert_eq!(machine.current_state(), CrawlState::Cancelled);
    assert_eq!(machine.pre_pause_state(), None);
    assert_eq!(machine.current_substate(), None);
    assert!(machine.data().completed_at.is_some());
    assert!(machine.transition(CrawlState::Crawling, None).is_err());
}

#[test]
fn test_substate_must_belong_to_current_state() {
    let (bus, mut machine) = machine_in(CrawlState::Crawling);
    machine.transition_substate(CrawlSubstate::DiscoveringUrls).unwrap();

    let err = machine.transition_substate(CrawlSubstate::Curation).unwrap_err();
    assert_eq!(
        err,
        StateError::InvalidSubstate {
            state: CrawlState::Crawling,
            substate: CrawlSubstate::Curation,
        }
    );
    assert_eq!(machine.current_substate(), Some(CrawlSubstate::DiscoveringUrls));

    machine.transition_substate(CrawlSubstate::DownloadingPages).unwrap();
    let events = bus.get_history("job", &HistoryQuery::recent(10).of_type(EventType::SubstateChange));
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].data["from_substate"], "discovering_urls");
    assert_eq!(events[1].data["to_substate"], "downloading_pages");
}

#[test]
fn test_progress_percentages_stay_in_range() {
    let (_bus, mut machine) = machine_in(CrawlState::Crawling);
    let progress = machine.update_progress(ProgressCategory::Urls, Some(15), Some(2), Some(10));
    assert_eq!(progress.total, 17);
    assert!((0.0..=100.0).contains(&progress.percentage()));

    machine.add_to_total(ProgressCategory::Documents, 4);
    let progress = machine.increment_progress(ProgressCategory::Documents, 1, 0);
    assert!((progress.percentage() - 25.0).abs() < f64::EPSILON);

    let summary = machine.get_state_summary();
    assert_eq!(summary.current_state, CrawlState::Crawling);
    assert_eq!(summary.transition_count, 2);
    assert!((0.0..=100.0).contains(&summary.overall_progress));
}

#[test]
fn test_progress_counters_saturate() {
    let (_bus, mut machine) = machine_in(CrawlState::Crawling);
    let progress = machine.update_progress(ProgressCategory::Urls, Some(u64::MAX), Some(5), None);
    assert_eq!(progress.total, u64::MAX);

    let progress = machine.increment_progress(ProgressCategory::Urls, 1, 1);
    assert_eq!(progress.completed, u64::MAX);
    assert_eq!(progress.failed, 6);
    assert_eq!(progress.total, u64::MAX);
    assert_eq!(progress.remaining(), 0);
}

#[test]
fn test_record_error_counts() {
    let (_bus, mut machine) = machine_in(CrawlState::Crawling);
    machine.record_error("first");
    machine.record_error("second");
    assert_eq!(machine.data().error_count, 2);
    assert_eq!(machine.data().error_message.as_deref(), Some("second"));
}

fn any_state() -> impl Strategy<Value = CrawlState> {
    proptest::sample::select(CrawlState::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_random_requests_keep_history_consistent(requests in proptest::collection::vec(any_state(), 0..40)) {
        let bus = Arc::new(CrawlEventBus::new());
        let mut machine = CrawlStateMachine::new("job", bus);
        let mut accepted = 0;

        for to in requests {
            let before = machine.current_state();
            let allowed = machine.is_valid_transition(to);
            match machine.transition(to, None) {
                Ok(_) => {
                    prop_assert!(allowed);
                    accepted += 1;
                    prop_assert_eq!(machine.current_state(), to);
                }
                Err(_) => {
                    prop_assert!(!allowed);
                    prop_assert_eq!(machine.current_state(), before);
                }
            }
            prop_assert_eq!(machine.history().len(), accepted);
            if let Some(last) = machine.history().last() {
                prop_assert_eq!(last.to_state, machine.current_state());
            }
            prop_assert_eq!(machine.pre_pause_state().is_some(), machine.current_state() == CrawlState::Paused);
        }
    }
}
