//! End-to-end behavior of the engine through its public API.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use pv_core::{
    Clock, ManualClock, OptionSetError, SessionId, SessionState, SessionStore, TallyEngine,
    VoteAccepted, VoterId, VotingError,
};

fn options(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn setup() -> (TallyEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 2, 10, 8, 30, 0).unwrap(),
    ));
    let store = Arc::new(SessionStore::new(clock.clone()));
    (TallyEngine::new(store), clock)
}

/// Walks the contract-level flow: create, vote, duplicate, bad option.
#[test]
fn test_session_lifecycle() {
    let (engine, clock) = setup();
    let store = engine.store();
    let owner = VoterId::new("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap();
    let events = engine.subscribe();

    let id = store
        .create_session("Test Session", options(&["Option 1", "Option 2"]), 3600)
        .unwrap();
    assert_eq!(id, SessionId::new(0));
    assert_eq!(store.session_count(), 1);

    let event = engine.cast_vote_now(id, &owner, "Option 1").unwrap();
    assert_eq!(
        event,
        VoteAccepted {
            session_id: id,
            voter: owner.clone(),
            option: "Option 1".to_string(),
            cast_at: clock.now(),
        }
    );
    assert_eq!(events.try_recv().unwrap(), event);

    let results = engine.get_results(id).unwrap();
    assert_eq!(results.options, options(&["Option 1", "Option 2"]));
    assert_eq!(results.counts, vec![1, 0]);

    assert!(matches!(
        engine.cast_vote_now(id, &owner, "Option 1"),
        Err(VotingError::AlreadyVoted { .. })
    ));
    assert_eq!(engine.get_results(id).unwrap().counts, vec![1, 0]);

    let other = VoterId::new("0x7099").unwrap();
    assert!(matches!(
        engine.cast_vote_now(id, &other, "Option 3"),
        Err(VotingError::InvalidOption { .. })
    ));
    assert_eq!(engine.get_results(id).unwrap().counts, vec![1, 0]);
    assert!(events.try_recv().is_err());
}

#[test]
fn test_expired_session_rejects_votes() {
    let (engine, clock) = setup();
    let id = engine
        .store()
        .create_session("Flash poll", options(&["Yes", "No"]), 1)
        .unwrap();

    clock.advance(Duration::milliseconds(1500));

    let view = engine.store().get_session(id).unwrap();
    assert_eq!(view.state_at(clock.now()), SessionState::Closed);
    assert!(matches!(
        engine.cast_vote_now(id, &VoterId::new("late").unwrap(), "Yes"),
        Err(VotingError::SessionClosed { .. })
    ));
    assert_eq!(engine.get_results(id).unwrap().total(), 0);
}

#[test]
fn test_single_option_session_rejected() {
    let (engine, _) = setup();
    assert_eq!(
        engine
            .store()
            .create_session("T", options(&["OnlyOne"]), 100),
        Err(VotingError::InvalidOptions(OptionSetError::TooFew {
            count: 1
        }))
    );
    assert_eq!(engine.store().session_count(), 0);
}

/// Session count equals successful creations, whatever fails in between.
#[test]
fn test_session_count_tracks_successes_only() {
    let (engine, _) = setup();
    let store = engine.store();
    let attempts = [
        (options(&["a", "b"]), 10),
        (options(&["a"]), 10),
        (options(&["a", "b", "c"]), 0),
        (options(&["a", "a"]), 10),
        (options(&["x", "y", "z"]), 99),
    ];

    let successes = attempts
        .into_iter()
        .filter_map(|(opts, secs)| store.create_session("s", opts, secs).ok())
        .count();

    assert_eq!(successes, 2);
    assert_eq!(store.session_count(), 2);
    let ids: Vec<_> = store.list_sessions().iter().map(|view| view.id).collect();
    assert_eq!(ids, [SessionId::new(0), SessionId::new(1)]);
}
