//! # quizfeed - streaming client for a multiple-choice quiz service
//!
//! The service emits questions as newline-delimited JSON over a chunked HTTP
//! response. This crate turns that byte stream into records as soon as each
//! line is complete, and keeps a consumer-facing result up to date while the
//! stream runs.
//!
//! ## Features
//! - Incremental NDJSON decoding that survives arbitrary chunk boundaries,
//!   including multi-byte characters split across chunks
//! - Malformed lines are logged and skipped; transport errors are terminal
//! - Cancellable sessions guarded by a request generation
//! - Optional idle deadline on the byte stream
//! - One-shot batch and chat endpoints, plus a small quiz session model
//!
//! ## Layers
//!
//! 1. **`ndjson`**: `LineBuffer` and `ndjson_records`, transport agnostic
//! 2. **`transport`** / **`client`**: the `Transport` seam and its HTTP
//!    implementation, `QuizClient`
//! 3. **`session`**: `QuestionFeed`, which publishes `StreamResult` updates
//!    through a `tokio::sync::watch` channel
//!
//! ## Example
//! ```no_run
//! use quizfeed::{FeedOptions, QuestionFeed, QuizClient, TransportOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), quizfeed::ClientError> {
//!     let client = QuizClient::new(TransportOptions::new("http://localhost:5000"))?;
//!     let request = client.stream_request(20, "medium")?;
//!
//!     let mut feed = QuestionFeed::new(client, FeedOptions::default());
//!     let mut updates = feed.subscribe();
//!     feed.request(request);
//!
//!     while updates.changed().await.is_ok() {
//!         let state = updates.borrow_and_update().clone();
//!         println!("{} questions so far", state.records.len());
//!         if !state.is_loading {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod model;
pub mod ndjson;
pub mod options;
pub mod quiz;
pub mod session;
pub mod telemetry;
pub mod transport;

// Re-exports for convenience
pub use client::{ClientError, QuizClient};
pub use model::{Question, StreamRequest, StreamResult};
pub use ndjson::{ndjson_records, LineBuffer, TrailingLine};
pub use options::{Config, FeedOptions, TransportOptions};
pub use quiz::QuizSession;
pub use session::QuestionFeed;
pub use transport::{ByteStream, Transport};
