use std::collections::BTreeMap;

use crate::error::PersistenceError;
use crate::{Conversation, ConversationId};

/// Storage collaborator for whole conversations. The medium is up to the host.
pub trait Persistence {
    /// # Errors
    /// Storage or decoding failures.
    fn load_all(&self) -> Result<Vec<Conversation>, PersistenceError>;

    /// # Errors
    /// Storage or encoding failures.
    fn save(&mut self, conversation: &Conversation) -> Result<(), PersistenceError>;

    /// # Errors
    /// [`PersistenceError::NotFound`] if nothing is stored under `id`.
    fn delete(&mut self, id: &ConversationId) -> Result<(), PersistenceError>;
}

/// Keeps serialized conversations in memory. Round-trips through JSON like a real store.
#[derive(Debug, Default, Clone)]
pub struct MemoryPersistence {
    stored: BTreeMap<ConversationId, String>,
    saves: usize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.stored.contains_key(id)
    }
}

impl Persistence for MemoryPersistence {
    fn load_all(&self) -> Result<Vec<Conversation>, PersistenceError> {
        self.stored
            .values()
            .map(|json| serde_json::from_str(json).map_err(PersistenceError::from))
            .collect()
    }

    fn save(&mut self, conversation: &Conversation) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(conversation)?;
        self.stored.insert(conversation.id().clone(), json);
        self.saves += 1;
        Ok(())
    }

    fn delete(&mut self, id: &ConversationId) -> Result<(), PersistenceError> {
        self.stored
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PersistenceError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_delete() {
        let mut store = MemoryPersistence::new();
        let conv = Conversation::new(ConversationId::new("c1"));
        store.save(&conv).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![conv]);
        store.delete(&ConversationId::new("c1")).unwrap();
        assert!(matches!(
            store.delete(&ConversationId::new("c1")),
            Err(PersistenceError::NotFound(_))
        ));
        assert_eq!(store.save_count(), 1);
    }
}
