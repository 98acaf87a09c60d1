//! Calendar tools: create, quick-add and list events, list calendars.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::{ParamType, Tool, ToolDeclaration, ToolError};
use crate::agent::RunContext;
use crate::auth::{AuthError, Credential, CredentialProvider};
use crate::calendar::{
    CalendarEntry, CalendarService, Event, EventQuery, EventTime, NewEvent, PRIMARY_CALENDAR,
};

const DEFAULT_MAX_RESULTS: u32 = 50;
const MAX_RESULTS_LIMIT: u32 = 250;

/// The calendar service plus the credentials to call it with.
#[derive(Clone)]
pub struct CalendarBackend {
    calendar: Arc<dyn CalendarService>,
    credentials: Arc<dyn CredentialProvider>,
}

impl CalendarBackend {
    pub fn new(
        calendar: Arc<dyn CalendarService>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            calendar,
            credentials,
        }
    }

    async fn credential(&self, ctx: &RunContext) -> Result<Credential, AuthError> {
        self.credentials.resolve(ctx.identity()).await
    }
}

fn decode<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::malformed(tool, e.to_string()))
}

/// Treat empty strings from the model the same as absent values.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn calendar_or_primary(calendar_id: Option<String>) -> String {
    non_empty(calendar_id).unwrap_or_else(|| PRIMARY_CALENDAR.to_string())
}

pub(crate) fn format_event(event: &Event) -> String {
    format!(
        "Summary: {}\nID: {}\nDescription: {}\nStart: {}\nEnd: {}\nTimezone: {}\n",
        event.summary,
        event.id,
        event.description.as_deref().unwrap_or(""),
        event.start.display(),
        event.end.display(),
        event.start.time_zone.as_deref().unwrap_or("")
    )
}

pub(crate) fn format_calendar(calendar: &CalendarEntry) -> String {
    format!(
        "Summary: {}\nID: {}\nDescription: {}\nTimezone: {}\nIsPrimary: {}\n",
        calendar.summary,
        calendar.id,
        calendar.description.as_deref().unwrap_or(""),
        calendar.time_zone.as_deref().unwrap_or(""),
        calendar.primary
    )
}

/// Create a timed event.
pub struct CreateEvent {
    backend: CalendarBackend,
}

impl CreateEvent {
    pub const NAME: &'static str = "create_event";

    pub fn new(backend: CalendarBackend) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct CreateEventArgs {
    summary: String,
    start: String,
    end: String,
    #[serde(default)]
    calendar_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
}

#[async_trait]
impl Tool for CreateEvent {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(Self::NAME, "Creates a new event in the user's calendar.")
            .required("summary", ParamType::String, "The title of the event.")
            .required(
                "start",
                ParamType::String,
                "The start time, as a combined date-time value (formatted according to RFC3339) with NO offset.",
            )
            .required(
                "end",
                ParamType::String,
                "The end time, as a combined date-time value (formatted according to RFC3339) with NO offset.",
            )
            .optional(
                "calendar_id",
                ParamType::String,
                "The ID of the calendar to create the event in. Defaults to the primary calendar.",
            )
            .optional("description", ParamType::String, "The description of the event.")
            .optional(
                "timezone",
                ParamType::String,
                "The IANA timezone the start and end times represent. Defaults to the calendar's timezone.",
            )
    }

    async fn execute(&self, ctx: &RunContext, args: Value) -> Result<String, ToolError> {
        let args: CreateEventArgs = decode(Self::NAME, args)?;
        let credential = self.backend.credential(ctx).await?;
        let calendar = &self.backend.calendar;
        let calendar_id = calendar_or_primary(args.calendar_id);

        let time_zone = match non_empty(args.timezone) {
            Some(tz) => tz,
            None => calendar
                .calendar_time_zone(&credential, &calendar_id)
                .await
                .map_err(|e| ToolError::from_calendar(Self::NAME, e))?,
        };

        let event = NewEvent {
            summary: args.summary,
            description: non_empty(args.description),
            start: EventTime::at(&args.start, Some(&time_zone)),
            end: EventTime::at(&args.end, Some(&time_zone)),
        };

        let created = calendar
            .create_event(&credential, &calendar_id, &event)
            .await
            .map_err(|e| ToolError::from_calendar(Self::NAME, e))?;

        Ok(format!(
            "Successfully created event \"{}\"\n{}",
            created.summary,
            format_event(&created)
        ))
    }
}

/// Create an event from a natural-language description.
pub struct QuickAddEvent {
    backend: CalendarBackend,
}

impl QuickAddEvent {
    pub const NAME: &'static str = "quick_add_event";

    pub fn new(backend: CalendarBackend) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct QuickAddArgs {
    query: String,
    #[serde(default)]
    calendar_id: Option<String>,
}

#[async_trait]
impl Tool for QuickAddEvent {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            Self::NAME,
            "Creates a new event in the user's calendar from a natural language description.",
        )
        .required(
            "query",
            ParamType::String,
            "The text describing the event, e.g. \"Lunch with Sam tomorrow at noon\".",
        )
        .optional(
            "calendar_id",
            ParamType::String,
            "The ID of the calendar to create the event in. Defaults to the primary calendar.",
        )
    }

    async fn execute(&self, ctx: &RunContext, args: Value) -> Result<String, ToolError> {
        let args: QuickAddArgs = decode(Self::NAME, args)?;
        let credential = self.backend.credential(ctx).await?;
        let calendar_id = calendar_or_primary(args.calendar_id);

        let created = self
            .backend
            .calendar
            .quick_add_event(&credential, &calendar_id, &args.query)
            .await
            .map_err(|e| ToolError::from_calendar(Self::NAME, e))?;

        Ok(format!(
            "Successfully created event \"{}\"\n{}",
            created.summary,
            format_event(&created)
        ))
    }
}

/// List the user's calendars.
pub struct ListCalendars {
    backend: CalendarBackend,
}

impl ListCalendars {
    pub const NAME: &'static str = "list_calendars";

    pub fn new(backend: CalendarBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ListCalendars {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(Self::NAME, "Lists all of the user's calendars.")
    }

    async fn execute(&self, ctx: &RunContext, _args: Value) -> Result<String, ToolError> {
        let credential = self.backend.credential(ctx).await?;
        let calendars = self
            .backend
            .calendar
            .list_calendars(&credential)
            .await
            .map_err(|e| ToolError::from_calendar(Self::NAME, e))?;

        let listing: String = calendars
            .iter()
            .map(|c| format!("{}\n", format_calendar(c)))
            .collect();
        Ok(format!("Calendars:\n{}", listing))
    }
}

/// List upcoming events of a calendar.
pub struct ListEvents {
    backend: CalendarBackend,
}

impl ListEvents {
    pub const NAME: &'static str = "list_events";

    pub fn new(backend: CalendarBackend) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct ListEventsArgs {
    #[serde(default)]
    calendar_id: Option<String>,
    #[serde(default)]
    time_min: Option<String>,
    #[serde(default)]
    max_results: Option<u32>,
}

#[async_trait]
impl Tool for ListEvents {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            Self::NAME,
            "Lists upcoming events in one of the user's calendars, ordered by start time.",
        )
        .optional(
            "calendar_id",
            ParamType::String,
            "The ID of the calendar to list. Defaults to the primary calendar.",
        )
        .optional(
            "time_min",
            ParamType::String,
            "Only list events ending after this RFC3339 date-time (with offset). Defaults to now.",
        )
        .optional(
            "max_results",
            ParamType::Integer,
            "Maximum number of events to return (default 50).",
        )
    }

    async fn execute(&self, ctx: &RunContext, args: Value) -> Result<String, ToolError> {
        let args: ListEventsArgs = decode(Self::NAME, args)?;
        let credential = self.backend.credential(ctx).await?;
        let calendar_id = calendar_or_primary(args.calendar_id);

        let query = EventQuery {
            time_min: non_empty(args.time_min)
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            max_results: args
                .max_results
                .unwrap_or(DEFAULT_MAX_RESULTS)
                .clamp(1, MAX_RESULTS_LIMIT),
        };

        let events = self
            .backend
            .calendar
            .list_events(&credential, &calendar_id, &query)
            .await
            .map_err(|e| ToolError::from_calendar(Self::NAME, e))?;

        if events.is_empty() {
            return Ok("No upcoming events found.".to_string());
        }

        let listing: String = events
            .iter()
            .map(|e| format!("{}\n", format_event(e)))
            .collect();
        Ok(format!("Upcoming events:\n{}", listing))
    }
}
