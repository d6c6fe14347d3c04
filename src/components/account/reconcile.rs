//! Syncing a provider snapshot into the materialized tree.

use crate::calendar::models::Event;
use crate::calendar::provider::CalendarProvider;
use crate::error::{not_found_error, CalendarResult};
use crate::tree::{EntryFields, MaterializedTree};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffKind::Create => write!(f, "+"),
            DiffKind::Update => write!(f, "~"),
            DiffKind::Delete => write!(f, "-"),
        }
    }
}

/// One tree mutation derived from a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDiff {
    pub kind: DiffKind,
    pub uid: String,
    /// Fields to write; `None` for deletions
    pub fields: Option<EntryFields>,
}

impl fmt::Display for EntryDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.uid)
    }
}

/// Counts of what a reconciliation cycle changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} removed",
            self.created, self.updated, self.removed
        )
    }
}

/// Compute the mutations that make `local` mirror `fetched`.
///
/// Entries present on both sides are always rewritten. Events without an id
/// cannot be keyed and are dropped; for duplicate ids the last one wins.
pub fn diff_entries(fetched: &[Event], local: &[(String, EntryFields)]) -> Vec<EntryDiff> {
    let mut remote_by_uid: BTreeMap<&str, &Event> = BTreeMap::new();
    for event in fetched {
        if event.unique_id().is_empty() {
            warn!("Skipping fetched event without an id: {}", event);
            continue;
        }
        remote_by_uid.insert(event.unique_id(), event);
    }

    let local_uids: BTreeMap<&str, ()> = local.iter().map(|(uid, _)| (uid.as_str(), ())).collect();

    let mut diffs = Vec::new();
    for (uid, event) in &remote_by_uid {
        let kind = if local_uids.contains_key(uid) {
            DiffKind::Update
        } else {
            DiffKind::Create
        };
        diffs.push(EntryDiff {
            kind,
            uid: uid.to_string(),
            fields: Some(EntryFields::from(*event)),
        });
    }

    for uid in local_uids.keys() {
        if !remote_by_uid.contains_key(uid) {
            diffs.push(EntryDiff {
                kind: DiffKind::Delete,
                uid: uid.to_string(),
                fields: None,
            });
        }
    }

    diffs
}

/// Write `diffs` into `tree`
pub async fn apply_diffs(
    tree: &dyn MaterializedTree,
    diffs: Vec<EntryDiff>,
) -> CalendarResult<ReconcileReport> {
    let mut report = ReconcileReport::default();
    for diff in diffs {
        match (diff.kind, diff.fields) {
            (DiffKind::Create, Some(fields)) => {
                tree.create_entry(&diff.uid, fields).await?;
                report.created += 1;
            }
            (DiffKind::Update, Some(fields)) => {
                tree.update_entry(&diff.uid, fields).await?;
                report.updated += 1;
            }
            (DiffKind::Delete, _) => {
                tree.remove_entry(&diff.uid).await?;
                report.removed += 1;
            }
            (kind, None) => {
                warn!("Ignoring {} diff for {} without fields", kind, diff.uid);
            }
        }
    }
    Ok(report)
}

/// Run one reconciliation cycle.
///
/// A failed fetch returns the error before the tree is read, so the tree is
/// left exactly as it was.
pub async fn reconcile(
    account: &str,
    provider: &dyn CalendarProvider,
    tree: &dyn MaterializedTree,
) -> CalendarResult<ReconcileReport> {
    let fetched = match provider.list_events().await {
        Ok(events) => events,
        Err(e) => {
            warn!("Skipping reconciliation of {}: {}", account, e);
            return Err(e);
        }
    };

    let local = tree.list_entries().await?;
    let diffs = diff_entries(&fetched, &local);
    let report = apply_diffs(tree, diffs).await?;

    info!("Reconciled {}: {}", account, report);
    Ok(report)
}

/// Replace the remote event `old_uid` with `replacement`, keeping the tree
/// entry in place.
///
/// The provider sees a delete followed by a create. The tree entry is moved
/// to the new id with its slot intact so listeners observe an update.
pub async fn replace_event(
    provider: &dyn CalendarProvider,
    tree: &dyn MaterializedTree,
    old_uid: &str,
    replacement: &mut Event,
) -> CalendarResult<()> {
    let existing = tree
        .entry(old_uid)
        .await?
        .ok_or_else(|| not_found_error(&format!("No event with id {}", old_uid)))?;

    let calendar = existing.calendar();
    // An edit stays in the calendar it came from unless the request moves it
    if replacement.calendar().is_none() {
        if let Some(calendar) = &calendar {
            replacement.set_calendar(calendar.clone());
        }
    }

    match provider.delete_event(old_uid, calendar.as_ref()).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            warn!("Event {} was already gone on the provider side", old_uid);
        }
        Err(e) => return Err(e),
    }

    provider.create_event(replacement).await?;

    tree.rekey_entry(
        old_uid,
        replacement.unique_id(),
        EntryFields::from(&*replacement),
    )
    .await
}
