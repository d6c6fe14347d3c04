mod common;

use calendarlink::components::account::scheduler::tick;
use calendarlink::components::account::{
    AccountHandle, AuthState, EventRequest, RefreshOutcome,
};
use calendarlink::calendar::models::CalendarIdentifier;
use calendarlink::error::Error;
use calendarlink::tree::{EntryFields, MaterializedTree, MemoryTree};
use common::{event, parts, MockAuthorizer, MockProvider};
use std::sync::Arc;
use std::time::Duration;

fn request(title: &str, range: &str) -> EventRequest {
    EventRequest {
        title: title.to_string(),
        time_range: range.to_string(),
        ..Default::default()
    }
}

/// After a refresh the tree holds exactly the provider's uids
#[tokio::test]
async fn test_refresh_matches_provider_uids() {
    let provider = Arc::new(MockProvider::with_events(vec![
        event("a", "Standup", 10, 9),
        event("b", "Review", 10, 13),
        event("c", "Retro", 11, 15),
    ]));
    let tree = Arc::new(MemoryTree::new());
    let stale = event("x", "Cancelled", 9, 9);
    tree.create_entry("x", EntryFields::from(&stale)).await.unwrap();
    tree.create_entry("b", EntryFields::from(&event("b", "Old title", 10, 13)))
        .await
        .unwrap();

    let handle = AccountHandle::new(parts("work", provider.clone(), tree.clone()));
    let outcome = handle.refresh().await.unwrap();

    let RefreshOutcome::Completed(report) = outcome else {
        panic!("refresh was skipped");
    };
    assert_eq!((report.created, report.updated, report.removed), (2, 1, 1));
    assert_eq!(tree.uids().await, provider.uids());
    let fields = tree.entry("b").await.unwrap().unwrap();
    assert_eq!(fields.title, "Review");

    handle.shutdown().await.unwrap();
}

/// A failed fetch leaves the tree exactly as it was
#[tokio::test]
async fn test_failed_fetch_keeps_tree() {
    let provider = Arc::new(MockProvider::with_events(vec![
        event("a", "Standup", 10, 9),
        event("b", "Review", 10, 13),
    ]));
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("work", provider.clone(), tree.clone()));
    handle.refresh().await.unwrap();
    let changes_before = tree.changes().await;

    provider.set_events(Vec::new());
    provider.fail_list(true);
    let err = handle.refresh().await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(tree.uids().await, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(tree.changes().await, changes_before);

    handle.shutdown().await.unwrap();
}

/// Editing replaces the provider event but keeps the tree slot
#[tokio::test]
async fn test_edit_keeps_slot_with_new_uid() {
    let provider = Arc::new(MockProvider::new());
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("work", provider.clone(), tree.clone()));

    let created = handle
        .create_event(&request("Lunch", "2024-06-10T11:00:00Z/2024-06-10T12:00:00Z"))
        .await
        .unwrap();
    assert_eq!(created.unique_id(), "mock-1");
    let slot = tree.slot_of("mock-1").await.unwrap();

    let edited = handle
        .edit_event(
            "mock-1",
            &request("Long lunch", "2024-06-10T11:00:00Z/2024-06-10T13:00:00Z"),
        )
        .await
        .unwrap();

    assert_eq!(edited.unique_id(), "mock-2");
    assert_eq!(tree.slot_of("mock-2").await, Some(slot));
    assert_eq!(tree.slot_of("mock-1").await, None);
    assert_eq!(provider.uids(), vec!["mock-2".to_string()]);
    assert_eq!(tree.entry("mock-2").await.unwrap().unwrap().title, "Long lunch");

    handle.shutdown().await.unwrap();
}

/// An edit without a calendar selection stays in the event's calendar
#[tokio::test]
async fn test_edit_keeps_sub_calendar() {
    let team = CalendarIdentifier::new("team@group", "Team");
    let provider = Arc::new(MockProvider::with_events(vec![
        event("old-1", "Planning", 10, 9).with_calendar(team.clone())
    ]));
    provider.set_multiple_calendars(true);
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("google", provider.clone(), tree.clone()));
    handle.refresh().await.unwrap();

    let edited = handle
        .edit_event(
            "old-1",
            &request("Planning", "2024-06-10T10:00:00Z/2024-06-10T11:00:00Z"),
        )
        .await
        .unwrap();

    assert_eq!(edited.calendar(), Some(&team));
    assert_eq!(provider.created_in(), vec![Some(team)]);
    let fields = tree.entry(edited.unique_id()).await.unwrap().unwrap();
    assert_eq!(fields.calendar_id.as_deref(), Some("team@group"));
    assert_eq!(fields.calendar_title.as_deref(), Some("Team"));

    handle.shutdown().await.unwrap();
}

/// An explicit selection moves the event to another calendar
#[tokio::test]
async fn test_edit_can_move_calendar() {
    let provider = Arc::new(MockProvider::with_events(vec![event("old-1", "Planning", 10, 9)
        .with_calendar(CalendarIdentifier::new("team@group", "Team"))]));
    provider.set_multiple_calendars(true);
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("google", provider.clone(), tree.clone()));
    handle.refresh().await.unwrap();

    let mut moved = request("Planning", "2024-06-10T10:00:00Z/2024-06-10T11:00:00Z");
    moved.calendar = Some("Personal|me@example.com".to_string());
    let edited = handle.edit_event("old-1", &moved).await.unwrap();

    let fields = tree.entry(edited.unique_id()).await.unwrap().unwrap();
    assert_eq!(fields.calendar_id.as_deref(), Some("me@example.com"));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_edit_unknown_event_fails() {
    let provider = Arc::new(MockProvider::new());
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("work", provider.clone(), tree.clone()));

    let err = handle
        .edit_event("ghost", &request("Lunch", "2024-06-10T11:00:00Z/2024-06-10T12:00:00Z"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(provider.uids().is_empty());

    handle.shutdown().await.unwrap();
}

/// Deleting an id the provider does not know is a successful no-op
#[tokio::test]
async fn test_delete_is_idempotent() {
    let provider = Arc::new(MockProvider::with_events(vec![event("a", "Standup", 10, 9)]));
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("work", provider.clone(), tree.clone()));
    handle.refresh().await.unwrap();

    handle.delete_event("a", true).await.unwrap();
    assert!(provider.uids().is_empty());
    assert!(tree.is_empty().await);

    handle.delete_event("a", true).await.unwrap();
    handle.delete_event("never-existed", false).await.unwrap();

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delete_can_keep_local_node() {
    let provider = Arc::new(MockProvider::with_events(vec![event("a", "Standup", 10, 9)]));
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("work", provider.clone(), tree.clone()));
    handle.refresh().await.unwrap();

    handle.delete_event("a", false).await.unwrap();
    assert!(provider.uids().is_empty());
    assert_eq!(tree.uids().await, vec!["a".to_string()]);

    handle.shutdown().await.unwrap();
}

/// Bad user input is rejected before anything is mutated
#[tokio::test]
async fn test_malformed_requests_change_nothing() {
    let provider = Arc::new(MockProvider::new());
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("work", provider.clone(), tree.clone()));

    let bad = [
        request("", "2024-06-10T11:00:00Z/2024-06-10T12:00:00Z"),
        request("Lunch", "tomorrow"),
        request("Lunch", "2024-06-10T11:00:00Z"),
        request("Lunch", "2024-06-10T12:00:00Z/2024-06-10T11:00:00Z"),
    ];
    for req in &bad {
        let err = handle.create_event(req).await.unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)), "{:?} gave {:?}", req, err);
    }

    assert!(matches!(
        handle.next_free_time("soon").await.unwrap_err(),
        Error::MalformedInput(_)
    ));
    assert!(matches!(
        handle.events_in_range("2024-06-10").await.unwrap_err(),
        Error::MalformedInput(_)
    ));
    assert!(matches!(
        handle.submit_auth_code("  ").await.unwrap_err(),
        Error::MalformedInput(_)
    ));

    assert!(provider.uids().is_empty());
    assert!(tree.is_empty().await);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_events_in_range() {
    let provider = Arc::new(MockProvider::with_events(vec![
        event("a", "Standup", 10, 9),
        event("b", "Review", 11, 13),
        event("c", "Retro", 12, 15),
    ]));
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("work", provider, tree));

    let events = handle
        .events_in_range("2024-06-10T00:00:00Z/2024-06-12T00:00:00Z")
        .await
        .unwrap();
    let uids: Vec<&str> = events.iter().map(|e| e.unique_id()).collect();
    assert_eq!(uids, vec!["a", "b"]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_next_free_time_without_upcoming_events() {
    let provider = Arc::new(MockProvider::with_events(vec![event("a", "Standup", 10, 9)]));
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("work", provider, tree));

    let before = chrono::Utc::now();
    let range = handle.next_free_time("1h 30m").await.unwrap();
    assert!(range.start >= before);
    assert_eq!(range.duration(), chrono::Duration::minutes(90));

    handle.shutdown().await.unwrap();
}

/// Durations that run past the end of the calendar are rejected, not a panic
#[tokio::test]
async fn test_next_free_time_with_huge_duration() {
    let provider = Arc::new(MockProvider::with_events(vec![event("a", "Standup", 10, 9)]));
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("work", provider, tree));

    let err = handle.next_free_time("100000000y").await.unwrap_err();
    assert!(matches!(err, Error::MalformedInput(_)), "{:?}", err);

    handle.shutdown().await.unwrap();
}

/// A refresh requested while one is running is dropped, not queued
#[tokio::test]
async fn test_refresh_skipped_while_busy() {
    let provider = Arc::new(MockProvider::with_events(vec![event("a", "Standup", 10, 9)]));
    provider.delay_list(Duration::from_millis(300));
    let tree = Arc::new(MemoryTree::new());
    let handle = AccountHandle::new(parts("work", provider.clone(), tree.clone()));

    let background = handle.clone();
    let first = tokio::spawn(async move { background.refresh().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(handle.is_refreshing());
    assert_eq!(handle.refresh().await.unwrap(), RefreshOutcome::Skipped);

    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, RefreshOutcome::Completed(_)));
    assert!(!handle.is_refreshing());
    assert_eq!(provider.list_calls(), 1);
    assert_eq!(tree.uids().await, vec!["a".to_string()]);

    handle.shutdown().await.unwrap();
}

/// The scheduler only reconciles once the account is authorized
#[tokio::test]
async fn test_tick_waits_for_authorization() {
    let provider = Arc::new(MockProvider::with_events(vec![event("a", "Standup", 10, 9)]));
    let tree = Arc::new(MemoryTree::new());
    let mut account = parts("google", provider.clone(), tree.clone());
    account.authorizer = Some(Arc::new(MockAuthorizer::default()));
    let handle = AccountHandle::new(account);
    assert_eq!(handle.auth_state(), AuthState::Unauthorized);

    tick(&handle).await;
    assert!(matches!(handle.auth_state(), AuthState::AwaitingCode { .. }));
    assert!(handle.refresh().await.unwrap_err().is_auth());
    assert_eq!(provider.list_calls(), 0);
    assert!(tree.is_empty().await);

    assert!(handle.submit_auth_code("wrong").await.unwrap_err().is_auth());
    assert_eq!(
        handle.submit_auth_code("letmein").await.unwrap(),
        AuthState::Authorized
    );

    tick(&handle).await;
    assert_eq!(tree.uids().await, vec!["a".to_string()]);

    // Revoked credentials send the account back to the start of the flow
    provider.reject_credentials(true);
    assert!(handle.refresh().await.unwrap_err().is_auth());
    assert_eq!(handle.auth_state(), AuthState::Unauthorized);
    assert_eq!(tree.uids().await, vec!["a".to_string()]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_accounts_without_authorizer_start_authorized() {
    let provider = Arc::new(MockProvider::new());
    let handle = AccountHandle::new(parts("caldav", provider, Arc::new(MemoryTree::new())));
    assert!(handle.auth_state().is_authorized());
    assert_eq!(handle.check_auth().await.unwrap(), AuthState::Authorized);
    handle.shutdown().await.unwrap();
}
