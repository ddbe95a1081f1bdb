//! Auto-trigger schedule attached to a session at creation.
//!
//! The schedule is evaluated server-side; the SDK only checks its shape.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recurring start configuration sent as the `auto_trigger` block.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoTrigger {
    /// Minutes between runs. Zero means unset.
    pub interval: u32,
    /// RFC 3339 timestamp after which no more runs start.
    pub end_at: String,
    /// Start one run immediately instead of waiting for the first interval.
    #[serde(default)]
    pub start_now: bool,
    /// URL notified by the server when a triggered run starts.
    pub web_hook_url: String,
}

impl AutoTrigger {
    pub fn new(
        interval: u32,
        end_at: impl Into<String>,
        web_hook_url: impl Into<String>,
    ) -> Self {
        Self {
            interval,
            end_at: end_at.into(),
            start_now: false,
            web_hook_url: web_hook_url.into(),
        }
    }

    pub fn start_now(mut self, start_now: bool) -> Self {
        self.start_now = start_now;
        self
    }

    /// Checks required fields, timestamp syntax, and webhook URL syntax.
    pub fn validate(&self) -> Result<(), AutoTriggerError> {
        self.end_at_timestamp().map(|_| ())
    }

    /// Like [`validate`](Self::validate), and also rejects an `end_at` that
    /// lies before `now`.
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), AutoTriggerError> {
        let end_at = self.end_at_timestamp()?;
        if end_at < now {
            return Err(AutoTriggerError::EndAtInPast(self.end_at.clone()));
        }
        Ok(())
    }

    fn end_at_timestamp(&self) -> Result<DateTime<Utc>, AutoTriggerError> {
        if self.interval == 0
            || self.end_at.trim().is_empty()
            || self.web_hook_url.trim().is_empty()
        {
            return Err(AutoTriggerError::MissingFields);
        }

        let end_at = DateTime::parse_from_rfc3339(self.end_at.trim())
            .map_err(|err| AutoTriggerError::InvalidEndAt(format!("{}: {err}", self.end_at)))?;
        Url::parse(self.web_hook_url.trim()).map_err(|err| {
            AutoTriggerError::InvalidWebHookUrl(format!("{}: {err}", self.web_hook_url))
        })?;

        Ok(end_at.with_timezone(&Utc))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AutoTriggerError {
    #[error("Auto trigger must have a interval, end_at and web_hook_url")]
    MissingFields,

    #[error("auto trigger end_at is not an RFC 3339 timestamp: {0}")]
    InvalidEndAt(String),

    #[error("auto trigger end_at is in the past: {0}")]
    EndAtInPast(String),

    #[error("auto trigger web_hook_url is not a valid URL: {0}")]
    InvalidWebHookUrl(String),
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{AutoTrigger, AutoTriggerError};

    fn valid() -> AutoTrigger {
        AutoTrigger::new(30, "2030-01-20T00:00:00Z", "https://example.com/webhook")
    }

    #[test]
    fn accepts_complete_schedule() {
        assert_eq!(valid().validate(), Ok(()));
        assert!(!valid().start_now);
    }

    #[test]
    fn rejects_each_missing_required_field() {
        let missing_interval = AutoTrigger {
            interval: 0,
            ..valid()
        };
        let missing_end_at = AutoTrigger {
            end_at: String::new(),
            ..valid()
        };
        let missing_hook = AutoTrigger {
            web_hook_url: "  ".to_string(),
            ..valid()
        };

        for trigger in [missing_interval, missing_end_at, missing_hook] {
            assert_eq!(trigger.validate(), Err(AutoTriggerError::MissingFields));
        }
    }

    #[test]
    fn rejects_unparseable_end_at() {
        let trigger = AutoTrigger {
            end_at: "next tuesday".to_string(),
            ..valid()
        };
        assert!(matches!(
            trigger.validate(),
            Err(AutoTriggerError::InvalidEndAt(_))
        ));
    }

    #[test]
    fn rejects_invalid_web_hook_url() {
        let trigger = AutoTrigger {
            web_hook_url: "not a url".to_string(),
            ..valid()
        };
        assert!(matches!(
            trigger.validate(),
            Err(AutoTriggerError::InvalidWebHookUrl(_))
        ));
    }

    #[test]
    fn validate_at_rejects_past_end_at() {
        let now = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            valid().validate_at(now),
            Err(AutoTriggerError::EndAtInPast(_))
        ));

        let earlier = Utc.with_ymd_and_hms(2029, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(valid().validate_at(earlier), Ok(()));
    }

    #[test]
    fn serializes_as_auto_trigger_block() {
        let value = serde_json::to_value(valid().start_now(true)).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "interval": 30,
                "end_at": "2030-01-20T00:00:00Z",
                "start_now": true,
                "web_hook_url": "https://example.com/webhook"
            })
        );
    }
}
