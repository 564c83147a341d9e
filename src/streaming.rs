//! Reply streams from a completion provider.
//!
//! A reply runs as a tokio task that pumps the provider's stream into a crossbeam channel.
//! The engine drains the channel on every tick and turns each update into a content patch,
//! so the node store keeps a single writer. Dropping an [`ActiveReply`] aborts its task,
//! which drops the provider stream on every exit path.

use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::ProviderError;
use crate::{NodeId, NodePatch, Role};

/// One incremental event from a provider. Text fields are cumulative, not deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionChunk {
    pub cumulative_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_time_seconds: Option<f32>,
    #[serde(default)]
    pub is_thinking: bool,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionChunk {
    pub fn partial(content: impl Into<String>) -> Self {
        Self {
            cumulative_content: content.into(),
            ..Default::default()
        }
    }

    pub fn complete(content: impl Into<String>) -> Self {
        Self {
            cumulative_content: content.into(),
            is_complete: true,
            ..Default::default()
        }
    }

    /// Terminal chunk carrying a provider-side failure.
    pub fn failed(content: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            cumulative_content: content.into(),
            is_complete: true,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>, seconds: Option<f32>) -> Self {
        self.thinking = Some(thinking.into());
        self.thinking_time_seconds = seconds;
        self.is_thinking = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Everything a provider needs to produce one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Root-first conversation history up to and including the prompt.
    pub history: Vec<ChatMessage>,
    pub model: String,
    pub provider: ProviderConfig,
    pub temperature: f32,
}

/// Per-reply choices made by the user; the history is filled in by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyOptions {
    pub model: String,
    pub provider: ProviderConfig,
    pub temperature: f32,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            provider: ProviderConfig::default(),
            temperature: 0.7,
        }
    }
}

pub type ChunkStream = BoxStream<'static, Result<CompletionChunk, ProviderError>>;

/// Source of reply streams. Vendor, transport and auth live behind this trait.
pub trait CompletionProvider: Send + Sync {
    fn stream(&self, request: CompletionRequest) -> ChunkStream;
}

/// What the pump task forwards to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyUpdate {
    Chunk(CompletionChunk),
    /// The stream broke; the message is shown in place of the reply.
    Failed(String),
    /// The stream ended.
    Finished,
}

/// Forwards `stream` into `tx` until it completes, fails or the receiver goes away.
///
/// Malformed chunks are skipped. A stream that ends without a completion chunk still
/// produces [`ReplyUpdate::Finished`].
pub async fn pump(mut stream: ChunkStream, tx: Sender<ReplyUpdate>) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                let done = chunk.is_complete;
                if tx.send(ReplyUpdate::Chunk(chunk)).is_err() {
                    debug!("reply receiver dropped, stopping stream");
                    return;
                }
                if done {
                    break;
                }
            }
            Err(err) if err.is_recoverable() => {
                debug!("skipping chunk: {err}");
            }
            Err(err) => {
                warn!("reply stream failed: {err}");
                let _ = tx.send(ReplyUpdate::Failed(err.to_string()));
                return;
            }
        }
    }
    let _ = tx.send(ReplyUpdate::Finished);
}

/// An in-flight reply bound to its target node.
#[derive(Debug)]
pub struct ActiveReply {
    target: NodeId,
    updates: Receiver<ReplyUpdate>,
    task: Option<JoinHandle<()>>,
}

impl ActiveReply {
    /// Spawns the pump task on the current tokio runtime.
    ///
    /// # Errors
    /// [`ProviderError::Transport`] when called outside a tokio runtime.
    pub fn spawn(target: NodeId, stream: ChunkStream) -> Result<Self, ProviderError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ProviderError::Transport(format!("no async runtime: {e}")))?;
        let (tx, rx) = unbounded();
        let task = handle.spawn(pump(stream, tx));
        info!("reply stream started for {target}");
        Ok(Self {
            target,
            updates: rx,
            task: Some(task),
        })
    }

    /// Reply fed by the caller through the matching sender.
    pub fn detached(target: NodeId, updates: Receiver<ReplyUpdate>) -> Self {
        Self {
            target,
            updates,
            task: None,
        }
    }

    pub fn target(&self) -> &NodeId {
        &self.target
    }

    /// Drains every update that arrived so far. A disconnected channel yields `Finished`.
    pub fn drain(&self) -> Vec<ReplyUpdate> {
        let mut out = Vec::new();
        loop {
            match self.updates.try_recv() {
                Ok(update) => out.push(update),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !matches!(
                        out.last(),
                        Some(ReplyUpdate::Finished | ReplyUpdate::Failed(_))
                    ) {
                        out.push(ReplyUpdate::Finished);
                    }
                    break;
                }
            }
        }
        out
    }
}

impl Drop for ActiveReply {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!("aborting reply stream for {}", self.target);
            }
            task.abort();
        }
    }
}

/// Content patch mirroring a chunk. Error chunks are rendered through [`error_content`].
pub fn chunk_patch(chunk: &CompletionChunk) -> NodePatch {
    let content = match &chunk.error {
        Some(err) => error_content(&chunk.cumulative_content, err),
        None => chunk.cumulative_content.clone(),
    };
    NodePatch {
        content: Some(content),
        thinking: chunk.thinking.clone(),
        thinking_time_seconds: chunk.thinking_time_seconds,
        editing: None,
    }
}

/// Error label appended after whatever text already arrived.
pub fn error_content(partial: &str, message: &str) -> String {
    if partial.is_empty() {
        format!("**Error:** {message}")
    } else {
        format!("{partial}\n\n**Error:** {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn collect(rx: &Receiver<ReplyUpdate>) -> Vec<ReplyUpdate> {
        rx.try_iter().collect()
    }

    #[tokio::test]
    async fn pump_stops_after_completion() {
        let items = vec![
            Ok(CompletionChunk::partial("Hel")),
            Ok(CompletionChunk::complete("Hello")),
            Ok(CompletionChunk::partial("ignored")),
        ];
        let (tx, rx) = unbounded();
        pump(stream::iter(items).boxed(), tx).await;
        assert_eq!(
            collect(&rx),
            vec![
                ReplyUpdate::Chunk(CompletionChunk::partial("Hel")),
                ReplyUpdate::Chunk(CompletionChunk::complete("Hello")),
                ReplyUpdate::Finished,
            ]
        );
    }

    #[tokio::test]
    async fn malformed_chunks_are_skipped() {
        let items = vec![
            Ok(CompletionChunk::partial("a")),
            Err(ProviderError::Decode("bad json".into())),
            Ok(CompletionChunk::complete("ab")),
        ];
        let (tx, rx) = unbounded();
        pump(stream::iter(items).boxed(), tx).await;
        let updates = collect(&rx);
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[1], ReplyUpdate::Chunk(CompletionChunk::complete("ab")));
    }

    #[tokio::test]
    async fn transport_failure_is_terminal() {
        let items = vec![
            Ok(CompletionChunk::partial("a")),
            Err(ProviderError::Transport("reset".into())),
            Ok(CompletionChunk::complete("ab")),
        ];
        let (tx, rx) = unbounded();
        pump(stream::iter(items).boxed(), tx).await;
        assert_eq!(
            collect(&rx).last(),
            Some(&ReplyUpdate::Failed("transport failure: reset".into()))
        );
    }

    #[test]
    fn spawn_without_runtime_is_an_error() {
        let reply = ActiveReply::spawn(NodeId::new("n"), stream::empty().boxed());
        assert!(matches!(reply, Err(ProviderError::Transport(_))));
    }

    #[test]
    fn drain_reports_disconnect_once() {
        let (tx, rx) = unbounded();
        let reply = ActiveReply::detached(NodeId::new("n"), rx);
        tx.send(ReplyUpdate::Chunk(CompletionChunk::partial("x"))).unwrap();
        drop(tx);
        assert_eq!(
            reply.drain(),
            vec![
                ReplyUpdate::Chunk(CompletionChunk::partial("x")),
                ReplyUpdate::Finished
            ]
        );
    }

    #[test]
    fn error_chunks_keep_partial_text() {
        let patch = chunk_patch(&CompletionChunk::failed("Half an ans", "rate limited"));
        assert_eq!(
            patch.content.as_deref(),
            Some("Half an ans\n\n**Error:** rate limited")
        );
        assert_eq!(error_content("", "boom"), "**Error:** boom");
    }
}
