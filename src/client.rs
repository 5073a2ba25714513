//! Quiz service client and error types.

use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::http::{add_extra_headers, build_http_client, check_status};
use crate::model::{ChatReply, ChatRequest, QuestionBatch, StreamRequest};
use crate::ndjson::{NdjsonResponseExt, TrailingLine};
use crate::options::TransportOptions;
use crate::transport::{ByteStream, Transport};

const STREAM_PATH: &str = "stream_questions";
const CHAT_PATH: &str = "chat";
const NDJSON_MIME: &str = "application/x-ndjson";

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Stream idle for more than {0:?}")]
    IdleTimeout(Duration),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the error came from the transport (status, network, or idle
    /// deadline) as opposed to local configuration or decoding.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Http(_) | ClientError::Status { .. } | ClientError::IdleTimeout(_)
        )
    }
}

/// HTTP client for the quiz service.
#[derive(Debug, Clone)]
pub struct QuizClient {
    http: reqwest::Client,
    options: TransportOptions,
}

impl QuizClient {
    pub fn new(options: TransportOptions) -> Result<Self, ClientError> {
        let http = build_http_client(&options)?;
        Ok(Self { http, options })
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Build a request for the streaming endpoint.
    pub fn stream_request(&self, count: u32, difficulty: &str) -> Result<StreamRequest, ClientError> {
        StreamRequest::new(self.options.endpoint(STREAM_PATH)?, count, difficulty)
    }

    /// Send the streaming request and check its status.
    async fn send_stream(&self, request: &StreamRequest) -> Result<reqwest::Response, ClientError> {
        let url = request.url();
        tracing::debug!(%url, "opening question stream");

        let req = self.http.get(url).header(ACCEPT, NDJSON_MIME);
        let req = add_extra_headers(req, &self.options.extra_headers);
        check_status(req.send().await?).await
    }

    /// Stream questions as parsed records, in the order the service emits
    /// them.
    ///
    /// # Example
    /// ```no_run
    /// use futures::StreamExt;
    /// use quizfeed::{QuizClient, TransportOptions, TrailingLine};
    ///
    /// # async fn run() -> Result<(), quizfeed::ClientError> {
    /// let client = QuizClient::new(TransportOptions::new("http://localhost:5000"))?;
    /// let request = client.stream_request(10, "medium")?;
    /// let records = client.stream_questions(&request, TrailingLine::Discard).await?;
    /// futures::pin_mut!(records);
    /// while let Some(record) = records.next().await {
    ///     println!("{}", record?);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn stream_questions(
        &self,
        request: &StreamRequest,
        trailing: TrailingLine,
    ) -> Result<impl Stream<Item = Result<Value, ClientError>> + Send, ClientError> {
        Ok(self.send_stream(request).await?.ndjson(trailing))
    }

    /// Fetch a whole batch in one response from the non-streaming endpoint.
    pub async fn fetch_batch(&self, count: u32, difficulty: &str) -> Result<Vec<Value>, ClientError> {
        let request = StreamRequest::new(self.options.endpoint("")?, count, difficulty)?;

        let req = add_extra_headers(self.http.get(request.url()), &self.options.extra_headers);
        let response = check_status(req.send().await?).await?;

        let body = response.bytes().await?;
        let batch: QuestionBatch = serde_json::from_slice(&body)?;
        tracing::debug!(count = batch.sat_questions.len(), "fetched question batch");
        Ok(batch.sat_questions)
    }

    /// Send one chat message and return the service's reply.
    pub async fn chat(&self, message: &str) -> Result<String, ClientError> {
        if message.trim().is_empty() {
            return Err(ClientError::Config("chat message must not be blank".to_string()));
        }

        let url = self.options.endpoint(CHAT_PATH)?;
        let body = ChatRequest {
            message: message.to_string(),
        };

        let req = add_extra_headers(self.http.post(url).json(&body), &self.options.extra_headers);
        let response = check_status(req.send().await?).await?;

        let body = response.bytes().await?;
        let reply: ChatReply = serde_json::from_slice(&body)?;
        Ok(reply.reply)
    }
}

#[async_trait]
impl Transport for QuizClient {
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, ClientError> {
        let response = self.send_stream(request).await?;
        Ok(response.bytes_stream().map_err(ClientError::from).boxed())
    }
}
