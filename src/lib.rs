mod cascade;
mod clock;
mod draw;
mod elements;
mod engine;
mod error;
mod persistence;
mod selection;
mod settings;
mod shell;
mod streaming;
mod viewport;

pub mod events;
pub mod graph;
pub mod layouts;
pub mod mutation;

pub use self::cascade::{CascadeId, CascadePhase, CascadeScheduler, CascadeStep};
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::draw::{EdgeCurve, SLOPE_EPSILON};
pub use self::elements::{
    Conversation, ConversationId, Node, NodeDraft, NodeId, NodePatch, Role, DEFAULT_TITLE,
};
pub use self::engine::ConversationEngine;
pub use self::error::{
    CascadeError, InvariantViolation, PersistenceError, ProviderError, WorkspaceError,
};
pub use self::graph::{check_invariants, structure_signature};
pub use self::persistence::{MemoryPersistence, Persistence};
pub use self::selection::{affordance, quote_block, ReplyAffordance, TextSelection};
pub use self::settings::{
    Settings, SettingsCascade, SettingsNavigation, SettingsPlacement, SettingsSelection,
};
pub use self::shell::Workspace;
pub use self::streaming::{
    chunk_patch, error_content, pump, ActiveReply, ChatMessage, ChunkStream, CompletionChunk,
    CompletionProvider, CompletionRequest, ProviderConfig, ReplyOptions, ReplyUpdate,
};
pub use self::viewport::{HitTarget, Viewport, ViewportAction};
