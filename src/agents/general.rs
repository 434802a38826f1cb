//! Time, date, and free-form conversation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};

use super::Agent;
use crate::intent::{Intent, TextGenerator};

const CONVERSATION_PROMPT: &str = "You are Loki, a helpful voice assistant. \
Answer in one or two short spoken sentences. \
Use plain words only: no markdown, lists, or emojis.";

/// Handles the `general` intent type
pub struct GeneralAgent {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl GeneralAgent {
    /// Create an agent that answers conversation through a generator
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// Create an agent without conversation support
    #[must_use]
    pub const fn without_conversation() -> Self {
        Self { generator: None }
    }

    async fn converse(&self, query: &str) -> String {
        let Some(generator) = &self.generator else {
            return "I'm not able to chat right now.".to_string();
        };

        match generator.generate(CONVERSATION_PROMPT, query).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => "I'm sorry, I don't have an answer for that.".to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "conversation request failed");
                "I'm sorry, I couldn't come up with an answer right now.".to_string()
            }
        }
    }
}

/// Spoken form of a time, e.g. "It's 3:05 PM."
#[must_use]
pub fn format_time<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("It's {}.", now.format("%-I:%M %p"))
}

/// Spoken form of a date, e.g. "Today is Sunday, October 18."
#[must_use]
pub fn format_date<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("Today is {}.", now.format("%A, %B %-d"))
}

#[async_trait]
impl Agent for GeneralAgent {
    fn name(&self) -> &str {
        "general"
    }

    async fn execute(&self, intent: &Intent) -> String {
        match intent.action.as_str() {
            "get_time" => format_time(&Local::now()),
            "get_date" => format_date(&Local::now()),
            "conversation" => {
                let Some(query) = intent.parameter_str("query") else {
                    return "What would you like to talk about?".to_string();
                };
                self.converse(query).await
            }
            _ => "I don't know how to help with that yet.".to_string(),
        }
    }
}
