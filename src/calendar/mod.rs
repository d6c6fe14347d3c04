pub mod free_time;
pub mod models;
pub mod provider;

pub use free_time::{find_next_free_time_range, find_next_free_time_range_at};
pub use models::{CalendarIdentifier, Event, Guest, GuestRecord};
pub use provider::{AuthStart, Authorizer, CalendarProvider, TimeoutProvider};
