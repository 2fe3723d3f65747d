//! End-to-end session flows against a scripted gateway.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use trellis_core::{ChatRequest, Message, Role, StreamEvent};
use trellis_llm::{ChatGateway, EventStream, GatewayError, Result as GatewayResult};
use trellis_session::{
    ConversationSession, ConversationStore, MemoryStore, SendOutcome, SessionError,
    SessionState, SharedAuth,
};

/// Gateway whose responses are scripted per call
struct MockGateway {
    responses: Mutex<VecDeque<GatewayResult<EventStream>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockGateway {
    fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script a reply made of the given deltas followed by completion
    fn push_deltas(&self, deltas: &[&str]) {
        let mut events: Vec<GatewayResult<StreamEvent>> =
            deltas.iter().map(|d| Ok(StreamEvent::delta(*d))).collect();
        events.push(Ok(StreamEvent::Done));
        self.push_stream(Box::pin(stream::iter(events)));
    }

    fn push_stream(&self, stream: EventStream) {
        self.responses.lock().push_back(Ok(stream));
    }

    fn push_error(&self, error: GatewayError) {
        self.responses.lock().push_back(Err(error));
    }

    fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn last_request(&self) -> ChatRequest {
        self.requests.lock().last().cloned().expect("no request was issued")
    }
}

#[async_trait]
impl ChatGateway for MockGateway {
    async fn stream_chat(&self, request: ChatRequest) -> GatewayResult<EventStream> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::transport("no scripted response")))
    }
}

/// An event stream driven by the test through a channel
fn channel_stream() -> (mpsc::UnboundedSender<GatewayResult<StreamEvent>>, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));
    (tx, stream)
}

fn session_with(
    gateway: &Arc<MockGateway>,
    store: &Arc<MemoryStore>,
    auth: &Arc<SharedAuth>,
) -> Arc<ConversationSession> {
    Arc::new(ConversationSession::new(
        gateway.clone(),
        store.clone(),
        auth.clone(),
    ))
}

async fn wait_until(probe: impl Fn() -> bool) {
    for _ in 0..500 {
        if probe() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_full_round_trip_with_prior_history() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(SharedAuth::signed_in("user-1"));
    let session = session_with(&gateway, &store, &auth);

    // one prior final user message "Hi" already on record
    let user = "user-1".to_string();
    let conversation = store.create_conversation(&user, "Hi").await.unwrap();
    store
        .save_message(&conversation.id, &Message::user("Hi"))
        .await
        .unwrap();
    session.select_conversation(&conversation.id).await.unwrap();

    gateway.push_deltas(&["GRE", ", TOEFL", ", IELTS."]);
    let outcome = session.send("What tests do I need?").await.unwrap();
    assert_eq!(outcome, SendOutcome::Completed);
    assert_eq!(session.state(), SessionState::Idle);

    // rendered transcript: Hi, question, streamed answer
    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].content, "GRE, TOEFL, IELTS.");
    assert!(!messages[2].is_streaming());

    // the request replayed the entire visible history
    let request = gateway.last_request();
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].content, "Hi");
    assert_eq!(request.messages[1].content, "What tests do I need?");

    // exactly two new saves, user then assistant, on the same conversation
    let saved = store.load_messages(&conversation.id).await.unwrap();
    assert_eq!(saved.len(), 3);
    assert_eq!(saved[1].role, Role::User);
    assert_eq!(saved[1].content, "What tests do I need?");
    assert_eq!(saved[2].role, Role::Assistant);
    assert_eq!(saved[2].content, "GRE, TOEFL, IELTS.");

    // reading back reproduces role/content/order of what was streamed
    assert_eq!(store.load_conversations(&user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_lazy_conversation_creation_and_title() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(SharedAuth::signed_in("user-1"));
    let session = session_with(&gateway, &store, &auth);

    assert!(session.conversation_id().is_none());

    gateway.push_deltas(&["sure"]);
    session.send("Tell me about F-1 visas please").await.unwrap();

    let conversation_id = session.conversation_id().expect("conversation was bound");
    let listed = session.list_conversations().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, conversation_id);
    assert_eq!(listed[0].title, "Tell me about F-1 visas please");

    // a second send reuses the record instead of creating another
    gateway.push_deltas(&["ok"]);
    session.send("And J-1?").await.unwrap();
    let listed = session.list_conversations().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Tell me about F-1 visas please");
}

#[tokio::test]
async fn test_rate_limited_surfaces_once_and_resets() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(SharedAuth::signed_in("user-1"));
    let session = session_with(&gateway, &store, &auth);

    gateway.push_error(GatewayError::RateLimited);
    let result = session.send("hello?").await;

    assert!(matches!(
        result,
        Err(SessionError::Gateway(GatewayError::RateLimited))
    ));
    assert_eq!(session.state(), SessionState::Idle);

    // the optimistic user message stays; no assistant message was added
    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(gateway.request_count(), 1);

    // the session recovered: a later send goes through
    gateway.push_deltas(&["hi"]);
    assert_eq!(session.send("hello again").await.unwrap(), SendOutcome::Completed);
}

#[tokio::test]
async fn test_empty_input_is_rejected() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(SharedAuth::signed_in("user-1"));
    let session = session_with(&gateway, &store, &auth);

    assert_eq!(session.send("   \n ").await.unwrap(), SendOutcome::Rejected);
    assert!(session.messages().is_empty());
    assert_eq!(gateway.request_count(), 0);
}

#[tokio::test]
async fn test_send_while_streaming_is_rejected() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(SharedAuth::signed_in("user-1"));
    let session = session_with(&gateway, &store, &auth);

    let (tx, stream) = channel_stream();
    gateway.push_stream(stream);

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.send("first question").await })
    };
    {
        let session = session.clone();
        wait_until(move || session.state() == SessionState::Streaming).await;
    }

    // second send while the first is still streaming: rejected outright
    assert_eq!(session.send("second question").await.unwrap(), SendOutcome::Rejected);
    assert_eq!(gateway.request_count(), 1);
    assert_eq!(session.messages().len(), 1);

    tx.send(Ok(StreamEvent::delta("answer"))).unwrap();
    tx.send(Ok(StreamEvent::Done)).unwrap();
    assert_eq!(first.await.unwrap().unwrap(), SendOutcome::Completed);
    assert_eq!(session.messages().len(), 2);
}

#[tokio::test]
async fn test_switching_conversation_abandons_stream() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(SharedAuth::signed_in("user-1"));
    let session = session_with(&gateway, &store, &auth);

    // a stored conversation to switch to mid-stream
    let user = "user-1".to_string();
    let other = store.create_conversation(&user, "Earlier chat").await.unwrap();
    store
        .save_message(&other.id, &Message::user("old question"))
        .await
        .unwrap();

    let (tx, stream) = channel_stream();
    gateway.push_stream(stream);

    let inflight = {
        let session = session.clone();
        tokio::spawn(async move { session.send("streaming question").await })
    };

    // let 2 of 5 deltas land
    tx.send(Ok(StreamEvent::delta("a"))).unwrap();
    tx.send(Ok(StreamEvent::delta("b"))).unwrap();
    {
        let session = session.clone();
        wait_until(move || {
            session
                .messages()
                .last()
                .is_some_and(|m| m.content == "ab")
        })
        .await;
    }

    session.select_conversation(&other.id).await.unwrap();

    // the remaining deltas must not touch the newly loaded transcript
    for delta in ["c", "d", "e"] {
        tx.send(Ok(StreamEvent::delta(delta))).unwrap();
    }
    tx.send(Ok(StreamEvent::Done)).unwrap();
    assert_eq!(inflight.await.unwrap().unwrap(), SendOutcome::Cancelled);

    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "old question");
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_no_signed_in_user_means_ephemeral() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(SharedAuth::new());
    let session = session_with(&gateway, &store, &auth);

    gateway.push_deltas(&["ephemeral reply"]);
    assert_eq!(session.send("anyone there?").await.unwrap(), SendOutcome::Completed);

    // rendered but never persisted
    assert_eq!(session.messages().len(), 2);
    assert!(session.conversation_id().is_none());
    assert!(session.list_conversations().await.unwrap().is_empty());

    let user = "user-1".to_string();
    assert!(store.load_conversations(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mid_stream_transport_failure_keeps_partial() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(SharedAuth::signed_in("user-1"));
    let session = session_with(&gateway, &store, &auth);

    gateway.push_stream(Box::pin(stream::iter(vec![
        Ok(StreamEvent::delta("partial ans")),
        Err(GatewayError::transport("connection reset")),
    ])));

    let result = session.send("question").await;
    assert!(matches!(
        result,
        Err(SessionError::Gateway(GatewayError::Transport { .. }))
    ));
    assert_eq!(session.state(), SessionState::Idle);

    // partial content stays rendered but is not persisted
    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "partial ans");
    assert!(!messages[1].is_streaming());

    let conversation_id = session.conversation_id().unwrap();
    let saved = store.load_messages(&conversation_id).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].role, Role::User);
}

#[tokio::test]
async fn test_delete_current_conversation_resets_session() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(SharedAuth::signed_in("user-1"));
    let session = session_with(&gateway, &store, &auth);

    gateway.push_deltas(&["bye"]);
    session.send("delete me after").await.unwrap();
    let conversation_id = session.conversation_id().unwrap();

    session.delete_conversation(&conversation_id).await.unwrap();

    assert!(session.conversation_id().is_none());
    assert!(session.messages().is_empty());
    assert!(session.list_conversations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_failure_never_blocks_the_stream() {
    /// A store that refuses every operation
    struct FailingStore;

    #[async_trait]
    impl ConversationStore for FailingStore {
        async fn create_conversation(
            &self,
            _user: &String,
            _title: &str,
        ) -> trellis_session::StoreResult<trellis_core::Conversation> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }
        async fn save_message(
            &self,
            _conversation_id: &String,
            _message: &Message,
        ) -> trellis_session::StoreResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }
        async fn load_conversations(
            &self,
            _user: &String,
        ) -> trellis_session::StoreResult<Vec<trellis_core::Conversation>> {
            Ok(Vec::new())
        }
        async fn load_messages(
            &self,
            _conversation_id: &String,
        ) -> trellis_session::StoreResult<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn delete_conversation(
            &self,
            _conversation_id: &String,
        ) -> trellis_session::StoreResult<()> {
            Ok(())
        }
        async fn touch_conversation(
            &self,
            _conversation_id: &String,
        ) -> trellis_session::StoreResult<()> {
            Ok(())
        }
    }

    let gateway = Arc::new(MockGateway::new());
    let auth = Arc::new(SharedAuth::signed_in("user-1"));
    let session = Arc::new(ConversationSession::new(
        gateway.clone(),
        Arc::new(FailingStore),
        auth,
    ));

    gateway.push_deltas(&["still works"]);
    let outcome = session.send("does persistence failure break this?").await.unwrap();

    // the user keeps the rendered conversation even though nothing saved
    assert_eq!(outcome, SendOutcome::Completed);
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[1].content, "still works");
}
