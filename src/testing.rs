//! Test doubles shared by unit tests across modules.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::auth::{AuthError, Credential, CredentialProvider};
use crate::calendar::{
    CalendarEntry, CalendarError, CalendarService, Event, EventQuery, NewEvent,
};
use crate::llm::{LlmError, ModelClient, ModelTurn, Turn};
use crate::tools::ToolDeclaration;

/// In-memory calendar that records writes.
#[derive(Default)]
pub struct FakeCalendar {
    created: Mutex<Vec<(String, NewEvent)>>,
    last_query: Mutex<Option<EventQuery>>,
    failure: Mutex<Option<CalendarError>>,
}

impl FakeCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call with `err`.
    pub fn failing(err: CalendarError) -> Self {
        Self {
            failure: Mutex::new(Some(err)),
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<(String, NewEvent)> {
        self.created.lock().unwrap().clone()
    }

    pub fn last_query(&self) -> Option<EventQuery> {
        self.last_query.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), CalendarError> {
        match self.failure.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CalendarService for FakeCalendar {
    async fn list_calendars(
        &self,
        _credential: &Credential,
    ) -> Result<Vec<CalendarEntry>, CalendarError> {
        self.check()?;
        Ok(vec![CalendarEntry {
            id: "primary".to_string(),
            summary: "sam@example.com".to_string(),
            description: None,
            time_zone: Some("America/Los_Angeles".to_string()),
            primary: true,
        }])
    }

    async fn calendar_time_zone(
        &self,
        _credential: &Credential,
        _calendar_id: &str,
    ) -> Result<String, CalendarError> {
        self.check()?;
        Ok("America/Los_Angeles".to_string())
    }

    async fn create_event(
        &self,
        _credential: &Credential,
        calendar_id: &str,
        event: &NewEvent,
    ) -> Result<Event, CalendarError> {
        self.check()?;
        let mut created = self.created.lock().unwrap();
        created.push((calendar_id.to_string(), event.clone()));
        Ok(Event {
            id: format!("ev-{}", created.len()),
            summary: event.summary.clone(),
            description: event.description.clone(),
            start: event.start.clone(),
            end: event.end.clone(),
            html_link: None,
        })
    }

    async fn quick_add_event(
        &self,
        _credential: &Credential,
        _calendar_id: &str,
        text: &str,
    ) -> Result<Event, CalendarError> {
        self.check()?;
        Ok(Event {
            id: "ev-quick".to_string(),
            summary: text.to_string(),
            ..Event::default()
        })
    }

    async fn list_events(
        &self,
        _credential: &Credential,
        _calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<Event>, CalendarError> {
        self.check()?;
        *self.last_query.lock().unwrap() = Some(query.clone());
        Ok(Vec::new())
    }
}

/// Credential provider that rejects every identity.
pub struct RejectingCredentials;

#[async_trait]
impl CredentialProvider for RejectingCredentials {
    async fn resolve(&self, identity: &str) -> Result<Credential, AuthError> {
        Err(AuthError::UnknownSession(identity.to_string()))
    }
}

/// Model client replaying a fixed script of turns.
///
/// Records the history length and tool count it sees on every call. Once
/// the script runs out it repeats `fallback`, or fails if there is none.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<ModelTurn, LlmError>>>,
    fallback: Option<ModelTurn>,
    hang: bool,
    seen: Mutex<Vec<(usize, usize)>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<ModelTurn, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            hang: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `turn`.
    pub fn repeating(turn: ModelTurn) -> Self {
        Self {
            fallback: Some(turn),
            ..Self::new(Vec::new())
        }
    }

    /// Never answer.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// History length passed on each call.
    pub fn history_lengths(&self) -> Vec<usize> {
        self.seen.lock().unwrap().iter().map(|(h, _)| *h).collect()
    }

    /// Tool declaration count passed on each call.
    pub fn tool_counts(&self) -> Vec<usize> {
        self.seen.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(
        &self,
        _model: &str,
        history: &[Turn],
        tools: &[ToolDeclaration],
    ) -> Result<ModelTurn, LlmError> {
        self.seen.lock().unwrap().push((history.len(), tools.len()));
        if self.hang {
            std::future::pending::<()>().await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(turn) => turn,
            None => self.fallback.clone().ok_or(LlmError::EmptyResponse),
        }
    }
}
