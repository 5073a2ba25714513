use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use serde_json::json;

use quizfeed::{ByteStream, ClientError, FeedOptions, QuestionFeed, StreamRequest, Transport};

type Chunks = UnboundedSender<Result<Bytes, ClientError>>;

/// Hands out pre-registered responses in order, one per `open`.
#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<ByteStream, ClientError>>>,
}

impl ScriptedTransport {
    /// Register a streamed response and return the sender that feeds it.
    fn stream(&self) -> Chunks {
        let (tx, rx) = unbounded();
        self.responses.lock().unwrap().push_back(Ok(rx.boxed()));
        tx
    }

    fn fail(&self, error: ClientError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _request: &StreamRequest) -> Result<ByteStream, ClientError> {
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(ClientError::Config("no scripted response".to_string())))
    }
}

fn request(difficulty: &str) -> StreamRequest {
    let endpoint = Url::parse("http://quiz.test/stream_questions").unwrap();
    StreamRequest::new(endpoint, 10, difficulty).unwrap()
}

fn send(tx: &Chunks, text: &'static str) {
    tx.unbounded_send(Ok(Bytes::from_static(text.as_bytes()))).unwrap();
}

async fn wait_closed(tx: &Chunks) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !tx.is_closed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session should drop its byte stream");
}

#[tokio::test]
async fn test_records_published_incrementally() {
    let transport = ScriptedTransport::default();
    let tx = transport.stream();
    let mut feed = QuestionFeed::new(transport, FeedOptions::default());
    let mut updates = feed.subscribe();

    feed.request(request("easy"));
    assert!(updates.borrow().is_loading);

    send(&tx, "{\"a\":1}\n{\"b\"");
    let state = updates.wait_for(|s| s.records.len() == 1).await.unwrap().clone();
    assert!(state.is_loading);
    assert_eq!(state.records, vec![json!({"a": 1})]);

    send(&tx, ":2}\n");
    updates.wait_for(|s| s.records.len() == 2).await.unwrap();

    drop(tx);
    let state = feed.settled().await;
    assert!(!state.is_loading);
    assert!(state.error.is_none());
    assert_eq!(state.records, vec![json!({"a": 1}), json!({"b": 2})]);
}

#[tokio::test]
async fn test_failed_open_publishes_no_records() {
    let transport = ScriptedTransport::default();
    transport.fail(ClientError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "down".to_string(),
    });
    let mut feed = QuestionFeed::new(transport, FeedOptions::default());

    feed.request(request("hard"));
    let state = feed.settled().await;

    assert!(state.records.is_empty());
    assert!(!state.is_loading);
    let error = state.error.expect("error is set");
    assert!(error.is_transport());
    assert!(error.to_string().contains("503"));
}

#[tokio::test]
async fn test_transport_error_keeps_published_records() {
    let transport = ScriptedTransport::default();
    let tx = transport.stream();
    let mut feed = QuestionFeed::new(transport, FeedOptions::default());

    feed.request(request("medium"));
    send(&tx, "{\"n\":1}\n{\"n\":2}\n");
    tx.unbounded_send(Err(ClientError::Status {
        status: StatusCode::BAD_GATEWAY,
        body: String::new(),
    }))
    .unwrap();
    let _ = tx.unbounded_send(Ok(Bytes::from_static(b"{\"n\":3}\n")));

    let state = feed.settled().await;
    assert_eq!(state.records, vec![json!({"n": 1}), json!({"n": 2})]);
    assert!(matches!(state.error.as_deref(), Some(ClientError::Status { .. })));
    assert!(!state.is_loading);
}

#[tokio::test]
async fn test_cancel_stops_publication() {
    let transport = ScriptedTransport::default();
    let tx = transport.stream();
    let mut feed = QuestionFeed::new(transport, FeedOptions::default());
    let mut updates = feed.subscribe();

    feed.request(request("easy"));
    send(&tx, "{\"kept\":true}\n");
    updates.wait_for(|s| s.records.len() == 1).await.unwrap();

    feed.cancel();
    let state = feed.snapshot();
    assert!(!state.is_loading);
    assert!(state.error.is_none());

    let _ = tx.unbounded_send(Ok(Bytes::from_static(b"{\"late\":true}\n")));
    wait_closed(&tx).await;

    assert_eq!(feed.snapshot().records, vec![json!({"kept": true})]);
}

#[tokio::test]
async fn test_new_request_supersedes_stale_session() {
    let transport = ScriptedTransport::default();
    let old = transport.stream();
    let new = transport.stream();
    let mut feed = QuestionFeed::new(transport, FeedOptions::default());
    let mut updates = feed.subscribe();

    assert_eq!(feed.request(request("easy")), 1);
    send(&old, "{\"from\":\"old\"}\n");
    updates.wait_for(|s| s.records.len() == 1).await.unwrap();

    assert_eq!(feed.request(request("hard")), 2);
    {
        let state = updates.borrow_and_update();
        assert_eq!(state.generation, 2);
        assert!(state.records.is_empty());
        assert!(state.is_loading);
    }

    let _ = old.unbounded_send(Ok(Bytes::from_static(b"{\"from\":\"old\"}\n")));
    drop(old);
    send(&new, "{\"from\":\"new\"}\n");
    drop(new);

    let state = feed.settled().await;
    assert_eq!(state.generation, 2);
    assert_eq!(state.records, vec![json!({"from": "new"})]);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_idle_stream_times_out() {
    let transport = ScriptedTransport::default();
    let tx = transport.stream();
    let options = FeedOptions::default().with_idle_timeout(Duration::from_millis(50));
    let mut feed = QuestionFeed::new(transport, options);

    feed.request(request("easy"));
    send(&tx, "{\"n\":1}\n");

    let state = feed.settled().await;
    assert_eq!(state.records, vec![json!({"n": 1})]);
    assert!(matches!(state.error.as_deref(), Some(ClientError::IdleTimeout(_))));
}

#[tokio::test]
async fn test_empty_stream_finishes_cleanly() {
    let transport = ScriptedTransport::default();
    let tx = transport.stream();
    let mut feed = QuestionFeed::new(transport, FeedOptions::default());

    feed.request(request("easy"));
    drop(tx);

    let state = feed.settled().await;
    assert!(state.records.is_empty());
    assert!(state.error.is_none());
    assert!(!state.is_loading);
}

#[tokio::test]
async fn test_dropping_feed_abandons_session() {
    let transport = ScriptedTransport::default();
    let tx = transport.stream();
    let mut feed = QuestionFeed::new(transport, FeedOptions::default());
    let mut updates = feed.subscribe();

    feed.request(request("easy"));
    send(&tx, "{\"kept\":true}\n");
    updates.wait_for(|s| s.records.len() == 1).await.unwrap();
    drop(feed);

    let _ = tx.unbounded_send(Ok(Bytes::from_static(b"{\"late\":true}\n")));
    wait_closed(&tx).await;

    let state = updates.borrow();
    assert!(!state.is_loading);
    assert!(state.error.is_none());
    assert_eq!(state.records, vec![json!({"kept": true})]);
}
