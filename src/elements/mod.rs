mod conversation;
mod node;

pub use conversation::{Conversation, ConversationId, DEFAULT_TITLE};
pub use node::{Node, NodeDraft, NodeId, NodePatch, Role};
