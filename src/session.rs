//! Push-based question feed: one stream session per request, published
//! through a `watch` channel.
//!
//! Every write to the shared `StreamResult` happens under the channel lock
//! and checks the session's generation, so a superseded or cancelled session
//! can never overwrite the state of a newer request.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::client::ClientError;
use crate::model::{StreamRequest, StreamResult};
use crate::ndjson::ndjson_records;
use crate::options::FeedOptions;
use crate::transport::{with_idle_timeout, Transport};

/// Owns the active stream session for one consumer.
///
/// `request` must be called from inside a tokio runtime. Dropping the feed
/// cancels whatever session is still running.
pub struct QuestionFeed<T> {
    transport: Arc<T>,
    options: FeedOptions,
    state: Arc<watch::Sender<StreamResult>>,
    generation: u64,
    active: Option<CancellationToken>,
}

impl<T: Transport + 'static> QuestionFeed<T> {
    pub fn new(transport: T, options: FeedOptions) -> Self {
        Self::with_shared(Arc::new(transport), options)
    }

    pub fn with_shared(transport: Arc<T>, options: FeedOptions) -> Self {
        let (state, _) = watch::channel(StreamResult::default());
        Self {
            transport,
            options,
            state: Arc::new(state),
            generation: 0,
            active: None,
        }
    }

    /// Generation of the most recent request; 0 before the first one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamResult> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> StreamResult {
        self.state.borrow().clone()
    }

    /// Start a session for `request`, superseding any session in flight.
    ///
    /// Subscribers see an empty, loading result for the new generation
    /// before this returns.
    pub fn request(&mut self, request: StreamRequest) -> u64 {
        if let Some(previous) = self.active.take() {
            previous.cancel();
        }

        self.generation += 1;
        let generation = self.generation;
        self.state.send_replace(StreamResult::loading(generation));

        let cancel = CancellationToken::new();
        self.active = Some(cancel.clone());

        let publisher = Publisher {
            generation,
            state: Arc::clone(&self.state),
        };
        let span = tracing::info_span!(
            "question_stream",
            generation,
            count = request.count(),
            difficulty = %request.difficulty(),
        );
        tokio::spawn(
            run_session(Arc::clone(&self.transport), request, self.options, publisher, cancel)
                .instrument(span),
        );

        generation
    }

    /// Stop the current session. Records published so far stay visible and
    /// `is_loading` becomes false.
    pub fn cancel(&mut self) {
        stop(&mut self.active, &self.state, self.generation);
    }

    /// Wait until the current generation stops loading (or a newer request
    /// replaces it) and return that state.
    pub async fn settled(&self) -> StreamResult {
        let generation = self.generation;
        let mut rx = self.state.subscribe();
        let settled = match rx
            .wait_for(|state| state.generation != generation || !state.is_loading)
            .await
        {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        };
        settled
    }
}

impl<T> Drop for QuestionFeed<T> {
    fn drop(&mut self) {
        stop(&mut self.active, &self.state, self.generation);
    }
}

/// Cancel the running session and clear `is_loading` if `generation` is
/// still the published one.
fn stop(active: &mut Option<CancellationToken>, state: &watch::Sender<StreamResult>, generation: u64) {
    if let Some(active) = active.take() {
        active.cancel();
    }

    state.send_if_modified(|state| {
        if state.generation != generation || !state.is_loading {
            return false;
        }
        state.is_loading = false;
        true
    });
}

/// Write handle for one generation.
struct Publisher {
    generation: u64,
    state: Arc<watch::Sender<StreamResult>>,
}

impl Publisher {
    /// Apply `update` if this generation is still current and loading.
    /// Returns false once the session has been superseded or stopped.
    fn update(&self, update: impl FnOnce(&mut StreamResult)) -> bool {
        let mut live = false;
        self.state.send_if_modified(|state| {
            if state.generation != self.generation || !state.is_loading {
                return false;
            }
            update(state);
            live = true;
            true
        });
        live
    }

    fn push(&self, record: Value) -> bool {
        self.update(|state| state.records.push(record))
    }

    fn fail(&self, error: ClientError) {
        tracing::warn!(%error, "question stream failed");
        self.update(|state| {
            state.error = Some(Arc::new(error));
            state.is_loading = false;
        });
    }

    fn finish(&self) {
        self.update(|state| {
            tracing::info!(records = state.records.len(), "question stream finished");
            state.is_loading = false;
        });
    }
}

async fn run_session<T: Transport>(
    transport: Arc<T>,
    request: StreamRequest,
    options: FeedOptions,
    publisher: Publisher,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = transport.open(&request) => opened,
    };

    let bytes = match opened {
        Ok(bytes) => bytes,
        Err(e) => return publisher.fail(e),
    };
    let bytes = match options.idle_timeout {
        Some(idle) => with_idle_timeout(bytes, idle),
        None => bytes,
    };

    let records = ndjson_records(bytes, options.trailing_line);
    futures::pin_mut!(records);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("question stream cancelled");
                return;
            }
            next = records.next() => next,
        };

        match next {
            Some(Ok(record)) => {
                if !publisher.push(record) {
                    tracing::debug!("question stream superseded");
                    return;
                }
            }
            Some(Err(e)) => return publisher.fail(e),
            None => break,
        }
    }

    publisher.finish();
}
