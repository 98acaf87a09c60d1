//! Calendar service collaborator.
//!
//! The agent only reaches the calendar through registered tool handlers,
//! which talk to a [`CalendarService`]. The production implementation is
//! the Google Calendar v3 REST API in [`google`].

mod google;

pub use google::{GoogleCalendar, DEFAULT_CALENDAR_BASE_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Credential;

/// Calendar used when a tool call does not name one.
pub const PRIMARY_CALENDAR: &str = "primary";

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Calendar API rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("Calendar API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Calendar request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode calendar response: {0}")]
    Decode(String),
}

/// An entry of the user's calendar list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

/// Start or end of an event. Timed events carry `date_time`, all-day
/// events carry `date`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn at(date_time: &str, time_zone: Option<&str>) -> Self {
        Self {
            date_time: Some(date_time.to_string()),
            date: None,
            time_zone: time_zone.map(str::to_string),
        }
    }

    /// The timed value, falling back to the all-day date.
    pub fn display(&self) -> &str {
        self.date_time
            .as_deref()
            .or(self.date.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
}

/// Event to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
}

/// Filter for listing events.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    /// RFC3339 lower bound on event end time.
    pub time_min: String,
    pub max_results: u32,
}

/// Calendar operations available to tool handlers.
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn list_calendars(&self, credential: &Credential)
        -> Result<Vec<CalendarEntry>, CalendarError>;

    /// Timezone configured on a calendar.
    async fn calendar_time_zone(
        &self,
        credential: &Credential,
        calendar_id: &str,
    ) -> Result<String, CalendarError>;

    async fn create_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        event: &NewEvent,
    ) -> Result<Event, CalendarError>;

    /// Create an event from free text, e.g. "Lunch with Sam tomorrow at noon".
    async fn quick_add_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        text: &str,
    ) -> Result<Event, CalendarError>;

    async fn list_events(
        &self,
        credential: &Credential,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<Event>, CalendarError>;
}
