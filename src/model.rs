//! Data models for quiz requests, streamed records, and chat.

use std::num::NonZeroU32;
use std::sync::Arc;

use nonempty::NonEmpty;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ClientError;

/// Difficulty levels the quiz service understands.
///
/// The ingest layer passes difficulty through untouched; this list only
/// feeds help text and defaults.
pub const DIFFICULTY_LEVELS: [&str; 4] = ["easy", "medium", "hard", "very hard"];

pub const DEFAULT_DIFFICULTY: &str = "medium";

/// Parameters of one streamed fetch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    endpoint: Url,
    count: NonZeroU32,
    difficulty: String,
}

impl StreamRequest {
    /// Build a request, rejecting a zero `count`.
    pub fn new(endpoint: Url, count: u32, difficulty: impl Into<String>) -> Result<Self, ClientError> {
        let count = NonZeroU32::new(count)
            .ok_or_else(|| ClientError::Config("question count must be greater than zero".to_string()))?;

        Ok(Self {
            endpoint,
            count,
            difficulty: difficulty.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn count(&self) -> u32 {
        self.count.get()
    }

    pub fn difficulty(&self) -> &str {
        &self.difficulty
    }

    /// Endpoint with `num_questions` and `difficulty` appended as query
    /// parameters.
    pub fn url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("num_questions", &self.count.to_string())
            .append_pair("difficulty", &self.difficulty);
        url
    }
}

/// Typed view of a streamed question record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub question: String,
    pub answer_choice_list: NonEmpty<String>,
    pub answer: String,
    pub math_subject: String,
}

impl Question {
    /// Interpret a raw record as a question.
    pub fn from_record(record: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(record)
    }

    /// A choice is correct when its first character matches the answer's.
    ///
    /// Choices are formatted like `"B) 12"` with `answer` set to `"B"`.
    pub fn is_correct(&self, choice: &str) -> bool {
        match (choice.trim().chars().next(), self.answer.trim().chars().next()) {
            (Some(picked), Some(expected)) => picked == expected,
            _ => false,
        }
    }
}

/// Body of the one-shot batch endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionBatch {
    pub sat_questions: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

/// Consumer-facing state of one stream session.
///
/// `records` only grows while `generation` stays the same. Once `error` is
/// set it is terminal for that generation.
#[derive(Debug, Clone, Default)]
pub struct StreamResult {
    pub generation: u64,
    pub records: Vec<Value>,
    pub is_loading: bool,
    pub error: Option<Arc<ClientError>>,
}

impl StreamResult {
    pub(crate) fn loading(generation: u64) -> Self {
        Self {
            generation,
            records: Vec::new(),
            is_loading: true,
            error: None,
        }
    }

    /// Records that parse as questions; anything else is skipped.
    pub fn questions(&self) -> Vec<Question> {
        self.records
            .iter()
            .filter_map(|record| Question::from_record(record).ok())
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        !self.is_loading
    }
}
