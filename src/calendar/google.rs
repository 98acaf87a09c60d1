//! Google Calendar v3 REST client.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{CalendarEntry, CalendarError, CalendarService, Event, EventQuery, NewEvent};
use crate::auth::Credential;

pub const DEFAULT_CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Calendar service backed by the Google Calendar REST API.
pub struct GoogleCalendar {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarResource {
    #[serde(default)]
    time_zone: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl GoogleCalendar {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CalendarError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("agc/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn calendar_url(&self, calendar_id: &str, suffix: &str) -> String {
        format!(
            "{}/calendars/{}{}",
            self.base_url,
            urlencoding::encode(calendar_id),
            suffix
        )
    }

    async fn read<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        credential: &Credential,
    ) -> Result<T, CalendarError> {
        let response = request.bearer_auth(credential.access_token()).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(classify_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| CalendarError::Decode(e.to_string()))
    }
}

/// Map a non-2xx response to a calendar error. 401 always means the token
/// is unusable; 403 only when Google reports an auth problem rather than a
/// permission or quota one.
fn classify_error(status: u16, body: &str) -> CalendarError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    let auth_problem = status == 401
        || (status == 403
            && (body.contains("insufficientPermissions")
                || body.contains("ACCESS_TOKEN_SCOPE_INSUFFICIENT")
                || body.contains("authError")));

    if auth_problem {
        CalendarError::Unauthorized(message)
    } else {
        CalendarError::Api { status, message }
    }
}

#[async_trait]
impl CalendarService for GoogleCalendar {
    async fn list_calendars(
        &self,
        credential: &Credential,
    ) -> Result<Vec<CalendarEntry>, CalendarError> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let list: ListResponse<CalendarEntry> =
            self.read(self.client.get(&url), credential).await?;
        Ok(list.items)
    }

    async fn calendar_time_zone(
        &self,
        credential: &Credential,
        calendar_id: &str,
    ) -> Result<String, CalendarError> {
        let url = self.calendar_url(calendar_id, "");
        let calendar: CalendarResource = self.read(self.client.get(&url), credential).await?;
        Ok(calendar.time_zone)
    }

    async fn create_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        event: &NewEvent,
    ) -> Result<Event, CalendarError> {
        let url = self.calendar_url(calendar_id, "/events");
        tracing::debug!(calendar_id, summary = %event.summary, "Inserting calendar event");
        self.read(self.client.post(&url).json(event), credential)
            .await
    }

    async fn quick_add_event(
        &self,
        credential: &Credential,
        calendar_id: &str,
        text: &str,
    ) -> Result<Event, CalendarError> {
        let url = self.calendar_url(calendar_id, "/events/quickAdd");
        self.read(self.client.post(&url).query(&[("text", text)]), credential)
            .await
    }

    async fn list_events(
        &self,
        credential: &Credential,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<Event>, CalendarError> {
        let url = self.calendar_url(calendar_id, "/events");
        let max_results = query.max_results.to_string();
        let request = self.client.get(&url).query(&[
            ("showDeleted", "false"),
            ("singleEvents", "true"),
            ("orderBy", "startTime"),
            ("timeMin", query.time_min.as_str()),
            ("maxResults", max_results.as_str()),
        ]);
        let list: ListResponse<Event> = self.read(request, credential).await?;
        Ok(list.items)
    }
}
