//! Clock tool, so the model can resolve "tomorrow" and "next Tuesday".

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use super::{Tool, ToolDeclaration, ToolError};
use crate::agent::RunContext;

pub struct GetCurrentTime;

impl GetCurrentTime {
    pub const NAME: &'static str = "get_current_time";
}

#[async_trait]
impl Tool for GetCurrentTime {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            Self::NAME,
            "Fetches the current time in UTC as an RFC3339 string.",
        )
    }

    async fn execute(&self, _ctx: &RunContext, _args: Value) -> Result<String, ToolError> {
        Ok(format!(
            "Current time: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_rfc3339_utc() {
        let out = GetCurrentTime
            .execute(&RunContext::new("u"), Value::Null)
            .await
            .unwrap();
        let stamp = out.strip_prefix("Current time: ").unwrap();
        assert!(stamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }
}
