//! Syllabus parsing through an OpenAI-compatible chat completions endpoint
//! (Groq by default).
//!
//! ## Environment
//!
//! - `GROQ_API_KEY` (required)
//! - `GROQ_MODEL` (default `llama-3.3-70b-versatile`)
//! - `GROQ_API_URL` (default Groq's chat completions URL)

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::intake::parse_course_reply;
use crate::models::Course;

pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
/// Long syllabi are cut to keep the request within the model's context.
pub const MAX_SYLLABUS_CHARS: usize = 24_000;

pub trait SyllabusParser {
    fn parse_syllabus(
        &self,
        text: &str,
        semester_start: NaiveDate,
    ) -> impl Future<Output = Result<Course>> + Send;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

const SYSTEM_PROMPT: &str = "You extract coursework from course syllabi. \
Reply with a single JSON object and nothing else, shaped as: \
{\"course_name\": string, \"course_code\": string, \"instructor\": string, \
\"assignments\": [{\"name\": string, \"type\": \"quiz\"|\"homework\"|\"project\"|\"exam\"|\"presentation\"|\"other\", \
\"due_date\": \"YYYY-MM-DD\", \"weight\": number (percent of the course grade), \
\"estimated_hours\": number, \"description\": string}]}. \
Resolve relative dates such as \"week 3\" against the semester start date. \
Omit items that have no due date.";

#[derive(Clone)]
pub struct GroqParser {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GroqParser {
    pub fn new(api_key: String, model: String, endpoint: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model,
            endpoint,
        })
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::ParserUnavailable("GROQ_API_KEY is not set".into()))?;
        let model = std::env::var("GROQ_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let endpoint =
            std::env::var("GROQ_API_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Self::new(api_key, model, endpoint)
    }

    fn request_for(&self, text: &str, semester_start: NaiveDate) -> ChatRequest {
        let excerpt: String = text.chars().take(MAX_SYLLABUS_CHARS).collect();
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: format!(
                        "Semester start date: {}\n\nSyllabus:\n{}",
                        semester_start.format("%Y-%m-%d"),
                        excerpt
                    ),
                },
            ],
            temperature: 0.1,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
        }
    }
}

impl SyllabusParser for GroqParser {
    async fn parse_syllabus(&self, text: &str, semester_start: NaiveDate) -> Result<Course> {
        let request = self.request_for(text, semester_start);
        tracing::info!(model = %self.model, chars = text.len(), "sending syllabus to parser");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ParseFailed(format!(
                "parser returned {status}: {}",
                body.chars().take(300).collect::<String>()
            )));
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::ParseFailed("parser reply had no choices".into()))?;

        parse_course_reply(&content)
    }
}
