//! The locally materialized view of an account's events.
//!
//! The tree is owned by the host; this crate only writes through
//! [`MaterializedTree`]. [`MemoryTree`] is the host used by the service
//! binary and the tests.

use crate::calendar::models::{CalendarIdentifier, Event, GuestRecord};
use crate::error::{component_error, not_found_error, CalendarResult};
use crate::utils::time::{format_instant, parse_instant};
use async_trait::async_trait;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Externally visible attributes of one event entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFields {
    pub title: String,
    pub description: String,
    pub start: String,
    pub end: String,
    pub time_zone: String,
    pub calendar_title: Option<String>,
    pub calendar_id: Option<String>,
    pub location: String,
    pub read_only: bool,
    pub guests: Vec<GuestRecord>,
}

impl From<&Event> for EntryFields {
    fn from(event: &Event) -> Self {
        Self {
            title: event.title().to_string(),
            description: event.description().to_string(),
            start: format_instant(&event.start()),
            end: format_instant(&event.end()),
            time_zone: event.time_zone().to_string(),
            calendar_title: event.calendar().map(|c| c.title.clone()),
            calendar_id: event.calendar().map(|c| c.uid.clone()),
            location: event.location().to_string(),
            read_only: event.is_read_only(),
            guests: event.serialize_guests(),
        }
    }
}

impl EntryFields {
    pub fn calendar(&self) -> Option<CalendarIdentifier> {
        self.calendar_id.as_ref().map(|uid| {
            CalendarIdentifier::new(uid.clone(), self.calendar_title.clone().unwrap_or_default())
        })
    }

    /// Rebuild the event this entry was written from
    pub fn to_event(&self, uid: &str) -> CalendarResult<Event> {
        let start = parse_instant(&self.start, Tz::UTC)?;
        let end = parse_instant(&self.end, Tz::UTC)?;
        let mut event = Event::new(self.title.clone(), start, end)?
            .with_unique_id(uid)
            .with_description(self.description.clone())
            .with_location(self.location.clone())
            .with_time_zone(self.time_zone.clone())
            .with_read_only(self.read_only);
        if let Some(calendar) = self.calendar() {
            event = event.with_calendar(calendar);
        }
        for guest in &self.guests {
            event = event.with_guest(guest.into());
        }
        Ok(event)
    }
}

/// Host-assigned identity of an entry, stable across re-keying
pub type EntrySlot = u64;

/// Mutation calls the core makes into the host's tree
#[async_trait]
pub trait MaterializedTree: Send + Sync {
    async fn create_entry(&self, uid: &str, fields: EntryFields) -> CalendarResult<()>;

    async fn update_entry(&self, uid: &str, fields: EntryFields) -> CalendarResult<()>;

    /// Removing an entry that does not exist is not an error
    async fn remove_entry(&self, uid: &str) -> CalendarResult<()>;

    async fn list_entries(&self) -> CalendarResult<Vec<(String, EntryFields)>>;

    /// Move an entry to a new key, keeping its slot, and replace its fields
    async fn rekey_entry(
        &self,
        old_uid: &str,
        new_uid: &str,
        fields: EntryFields,
    ) -> CalendarResult<()>;

    async fn entry(&self, uid: &str) -> CalendarResult<Option<EntryFields>> {
        Ok(self
            .list_entries()
            .await?
            .into_iter()
            .find(|(key, _)| key == uid)
            .map(|(_, fields)| fields))
    }

    /// Drop every entry, used when the owning account goes away
    async fn clear(&self) -> CalendarResult<()> {
        for (uid, _) in self.list_entries().await? {
            self.remove_entry(&uid).await?;
        }
        Ok(())
    }
}

/// A change observed by tree listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChange {
    Created { slot: EntrySlot, uid: String },
    Updated { slot: EntrySlot, uid: String },
    Rekeyed { slot: EntrySlot, old_uid: String, new_uid: String },
    Removed { slot: EntrySlot, uid: String },
}

#[derive(Debug, Default)]
struct MemoryTreeState {
    entries: BTreeMap<String, (EntrySlot, EntryFields)>,
    next_slot: EntrySlot,
    changes: Vec<TreeChange>,
}

/// In-memory tree host
#[derive(Debug, Default)]
pub struct MemoryTree {
    state: RwLock<MemoryTreeState>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot currently holding `uid`
    pub async fn slot_of(&self, uid: &str) -> Option<EntrySlot> {
        self.state.read().await.entries.get(uid).map(|(slot, _)| *slot)
    }

    pub async fn uids(&self) -> Vec<String> {
        self.state.read().await.entries.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Everything listeners have seen so far, oldest first
    pub async fn changes(&self) -> Vec<TreeChange> {
        self.state.read().await.changes.clone()
    }
}

#[async_trait]
impl MaterializedTree for MemoryTree {
    async fn create_entry(&self, uid: &str, fields: EntryFields) -> CalendarResult<()> {
        let mut state = self.state.write().await;
        if state.entries.contains_key(uid) {
            return Err(component_error(&format!("Entry {} already exists", uid)));
        }
        let slot = state.next_slot;
        state.next_slot += 1;
        state.entries.insert(uid.to_string(), (slot, fields));
        state.changes.push(TreeChange::Created {
            slot,
            uid: uid.to_string(),
        });
        Ok(())
    }

    async fn update_entry(&self, uid: &str, fields: EntryFields) -> CalendarResult<()> {
        let mut state = self.state.write().await;
        let slot = match state.entries.get_mut(uid) {
            Some((slot, existing)) => {
                *existing = fields;
                *slot
            }
            None => return Err(not_found_error(&format!("No entry for {}", uid))),
        };
        state.changes.push(TreeChange::Updated {
            slot,
            uid: uid.to_string(),
        });
        Ok(())
    }

    async fn remove_entry(&self, uid: &str) -> CalendarResult<()> {
        let mut state = self.state.write().await;
        if let Some((slot, _)) = state.entries.remove(uid) {
            state.changes.push(TreeChange::Removed {
                slot,
                uid: uid.to_string(),
            });
        }
        Ok(())
    }

    async fn list_entries(&self) -> CalendarResult<Vec<(String, EntryFields)>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .map(|(uid, (_, fields))| (uid.clone(), fields.clone()))
            .collect())
    }

    async fn rekey_entry(
        &self,
        old_uid: &str,
        new_uid: &str,
        fields: EntryFields,
    ) -> CalendarResult<()> {
        let mut state = self.state.write().await;
        if old_uid != new_uid && state.entries.contains_key(new_uid) {
            return Err(component_error(&format!("Entry {} already exists", new_uid)));
        }
        let (slot, _) = state
            .entries
            .remove(old_uid)
            .ok_or_else(|| not_found_error(&format!("No entry for {}", old_uid)))?;
        state.entries.insert(new_uid.to_string(), (slot, fields));
        state.changes.push(TreeChange::Rekeyed {
            slot,
            old_uid: old_uid.to_string(),
            new_uid: new_uid.to_string(),
        });
        Ok(())
    }

    async fn entry(&self, uid: &str) -> CalendarResult<Option<EntryFields>> {
        Ok(self
            .state
            .read()
            .await
            .entries
            .get(uid)
            .map(|(_, fields)| fields.clone()))
    }
}
