use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Poll;

use branch_canvas::{
    ChunkStream, CompletionChunk, CompletionProvider, CompletionRequest, Conversation,
    ConversationEngine, ConversationId, ManualClock, NodeId, NodePatch, ProviderConfig,
    ProviderError, ReplyOptions, Role,
};
use egui::Pos2;
use futures::stream::{self, StreamExt};

/// Replays a fixed script and records what it was asked.
struct ScriptedProvider {
    script: Vec<Result<CompletionChunk, ProviderError>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<CompletionChunk, ProviderError>>) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl CompletionProvider for ScriptedProvider {
    fn stream(&self, request: CompletionRequest) -> ChunkStream {
        self.requests.lock().unwrap().push(request);
        stream::iter(self.script.clone()).boxed()
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Sends one chunk, then hangs until dropped.
struct HangingProvider {
    dropped: Arc<AtomicBool>,
}

impl CompletionProvider for HangingProvider {
    fn stream(&self, _request: CompletionRequest) -> ChunkStream {
        let flag = DropFlag(Arc::clone(&self.dropped));
        let mut sent = false;
        stream::poll_fn(move |_| {
            let _keep = &flag;
            if sent {
                Poll::Pending
            } else {
                sent = true;
                Poll::Ready(Some(Ok(CompletionChunk::partial("thinking about it"))))
            }
        })
        .boxed()
    }
}

fn engine_with_prompt(text: &str) -> (ConversationEngine, NodeId) {
    let mut engine = ConversationEngine::new(Conversation::new(ConversationId::new("s")))
        .with_clock(ManualClock::new())
        .with_seed(8);
    let root = engine.create_root(Pos2::ZERO);
    engine.update_content(&root, NodePatch::content(text));
    (engine, root)
}

async fn drive(engine: &mut ConversationEngine, target: &NodeId) {
    for _ in 0..200 {
        tokio::task::yield_now().await;
        engine.tick();
        if !engine.is_streaming(target) {
            return;
        }
    }
}

fn options() -> ReplyOptions {
    ReplyOptions {
        model: "small".into(),
        provider: ProviderConfig {
            id: "local".into(),
            endpoint: None,
        },
        temperature: 0.2,
    }
}

#[tokio::test]
async fn submit_streams_into_placeholder() {
    let (mut engine, root) = engine_with_prompt("Hi");
    let provider = ScriptedProvider::new(vec![
        Ok(CompletionChunk::partial("Hel").with_thinking("hm", Some(0.5))),
        Err(ProviderError::Decode("garbled".into())),
        Ok(CompletionChunk::complete("Hello")),
    ]);

    let reply = engine.submit(&root, &provider, None, &options()).unwrap();
    assert!(engine.is_streaming(&reply));
    assert!(!engine.conversation().node(&root).unwrap().editing());

    drive(&mut engine, &reply).await;
    let node = engine.conversation().node(&reply).unwrap();
    assert_eq!(node.content(), "Hello");
    assert_eq!(node.role(), Role::Assistant);
    assert_eq!(node.thinking(), Some("hm"));
    assert_eq!(node.model(), Some("small"));
    assert_eq!(node.provider_id(), Some("local"));
    assert!(!engine.is_streaming(&reply));

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].history.len(), 1);
    assert_eq!(requests[0].history[0].content, "Hi");
    assert_eq!(requests[0].temperature, 0.2);
}

#[tokio::test]
async fn transport_failure_becomes_error_content() {
    let (mut engine, root) = engine_with_prompt("Hi");
    let provider = ScriptedProvider::new(vec![
        Ok(CompletionChunk::partial("Partial")),
        Err(ProviderError::Transport("connection reset".into())),
    ]);
    let reply = engine.submit(&root, &provider, None, &options()).unwrap();
    drive(&mut engine, &reply).await;
    assert_eq!(
        engine.conversation().node(&reply).unwrap().content(),
        "Partial\n\n**Error:** transport failure: connection reset"
    );
    let again = engine.add_child(&root, None, None);
    assert!(again.is_some());
}

#[tokio::test]
async fn cancelling_releases_the_stream() {
    let (mut engine, root) = engine_with_prompt("Hi");
    let dropped = Arc::new(AtomicBool::new(false));
    let provider = HangingProvider {
        dropped: Arc::clone(&dropped),
    };
    let reply = engine.submit(&root, &provider, None, &options()).unwrap();
    for _ in 0..10 {
        tokio::task::yield_now().await;
        engine.tick();
    }
    assert_eq!(
        engine.conversation().node(&reply).unwrap().content(),
        "thinking about it"
    );
    assert!(!dropped.load(Ordering::SeqCst));

    assert!(engine.cancel_reply(&reply));
    for _ in 0..50 {
        if dropped.load(Ordering::SeqCst) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn deleting_the_target_drops_its_stream() {
    let clock = ManualClock::new();
    let mut engine = ConversationEngine::new(Conversation::new(ConversationId::new("d")))
        .with_clock(clock.clone())
        .with_seed(8);
    let root = engine.create_root(Pos2::ZERO);
    engine.update_content(&root, NodePatch::content("Hi"));
    let dropped = Arc::new(AtomicBool::new(false));
    let provider = HangingProvider {
        dropped: Arc::clone(&dropped),
    };
    let reply = engine.submit(&root, &provider, None, &options()).unwrap();

    engine.delete_subtree(&root).unwrap();
    clock.advance_ms(5_000);
    engine.tick();
    assert!(!engine.conversation().contains(&reply));
    assert!(!engine.is_streaming(&reply));
    for _ in 0..50 {
        if dropped.load(Ordering::SeqCst) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(dropped.load(Ordering::SeqCst));
}

#[test]
fn submit_without_runtime_shows_error() {
    let (mut engine, root) = engine_with_prompt("Hi");
    let provider = ScriptedProvider::new(vec![Ok(CompletionChunk::complete("never"))]);
    let reply = engine.submit(&root, &provider, None, &options()).unwrap();
    let content = engine.conversation().node(&reply).unwrap().content().to_owned();
    assert!(content.starts_with("**Error:**"));
    assert!(!engine.is_streaming(&reply));
}
