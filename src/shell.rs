use std::collections::{BTreeMap, HashMap};

use egui::Pos2;
use log::{info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::clock::{Clock, SystemClock};
use crate::error::WorkspaceError;
use crate::graph::check_invariants;
use crate::persistence::Persistence;
use crate::{Conversation, ConversationEngine, ConversationId, Settings};

/// Host shell: every open conversation, the active one, and the store behind them.
///
/// Any call that publishes a new revision of a conversation saves it before returning.
pub struct Workspace<P: Persistence, C: Clock + Clone + 'static = SystemClock> {
    persistence: P,
    settings: Settings,
    clock: C,
    rng: StdRng,
    engines: BTreeMap<ConversationId, ConversationEngine>,
    saved: HashMap<ConversationId, u64>,
    active: Option<ConversationId>,
}

impl<P: Persistence, C: Clock + Clone + 'static> Workspace<P, C> {
    /// Opens every stored conversation. Inconsistent ones are skipped with a warning.
    /// The most recently modified conversation becomes active.
    ///
    /// # Errors
    /// Fails if the store cannot be read.
    pub fn load(persistence: P, settings: Settings, clock: C) -> Result<Self, WorkspaceError> {
        let stored = persistence.load_all()?;
        let mut ws = Self {
            persistence,
            settings,
            clock,
            rng: StdRng::from_os_rng(),
            engines: BTreeMap::new(),
            saved: HashMap::new(),
            active: None,
        };

        let mut latest: Option<(i64, ConversationId)> = None;
        for conv in stored {
            if let Err(violation) = check_invariants(&conv) {
                warn!("skipping conversation {}: {violation}", conv.id());
                continue;
            }
            let id = conv.id().clone();
            if latest.as_ref().is_none_or(|(t, _)| conv.last_modified() > *t) {
                latest = Some((conv.last_modified(), id.clone()));
            }
            let engine = ws.open(conv);
            ws.saved.insert(id.clone(), engine.revision());
            ws.engines.insert(id, engine);
        }
        ws.active = latest.map(|(_, id)| id);
        info!("workspace loaded {} conversations", ws.engines.len());
        Ok(ws)
    }

    /// Makes conversation and node ids reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn open(&mut self, conv: Conversation) -> ConversationEngine {
        ConversationEngine::new(conv)
            .with_settings(self.settings.clone())
            .with_clock(self.clock.clone())
            .with_seed(self.rng.random())
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn conversation_ids(&self) -> impl Iterator<Item = &ConversationId> {
        self.engines.keys()
    }

    pub fn active_id(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn active(&self) -> Option<&ConversationEngine> {
        self.active.as_ref().and_then(|id| self.engines.get(id))
    }

    pub fn engine(&self, id: &ConversationId) -> Option<&ConversationEngine> {
        self.engines.get(id)
    }

    /// Starts an empty conversation, optionally with a first root, and activates it.
    ///
    /// # Errors
    /// Fails if the new conversation cannot be saved.
    pub fn create_conversation(
        &mut self,
        initial_pos: Option<Pos2>,
    ) -> Result<ConversationId, WorkspaceError> {
        let id = loop {
            let candidate = ConversationId::generate(&mut self.rng);
            if !self.engines.contains_key(&candidate) {
                break candidate;
            }
        };
        let mut engine = self.open(Conversation::new(id.clone()));
        if let Some(pos) = initial_pos {
            engine.create_root(pos);
        }
        self.persistence.save(engine.conversation())?;
        self.saved.insert(id.clone(), engine.revision());
        self.engines.insert(id.clone(), engine);
        self.active = Some(id.clone());
        info!("created conversation {id}");
        Ok(id)
    }

    /// Replaces a conversation wholesale with a host-provided snapshot.
    ///
    /// # Errors
    /// Unknown conversation, inconsistent snapshot or failed save.
    pub fn update_conversation(&mut self, snapshot: Conversation) -> Result<(), WorkspaceError> {
        let id = snapshot.id().clone();
        let engine = self
            .engines
            .get_mut(&id)
            .ok_or_else(|| WorkspaceError::UnknownConversation(id.clone()))?;
        engine.replace_snapshot(snapshot)?;
        self.persist(&id)
    }

    /// # Errors
    /// Unknown conversation.
    pub fn select_conversation(&mut self, id: &ConversationId) -> Result<(), WorkspaceError> {
        if !self.engines.contains_key(id) {
            return Err(WorkspaceError::UnknownConversation(id.clone()));
        }
        self.active = Some(id.clone());
        Ok(())
    }

    /// # Errors
    /// Unknown conversation or failed save.
    pub fn rename_conversation(
        &mut self,
        id: &ConversationId,
        title: &str,
    ) -> Result<bool, WorkspaceError> {
        let renamed = self
            .engines
            .get_mut(id)
            .ok_or_else(|| WorkspaceError::UnknownConversation(id.clone()))?
            .rename(title);
        self.persist(id)?;
        Ok(renamed)
    }

    /// Drops the conversation and its stored copy. Running replies are aborted.
    ///
    /// # Errors
    /// Unknown conversation or failed delete.
    pub fn delete_conversation(&mut self, id: &ConversationId) -> Result<(), WorkspaceError> {
        if !self.engines.contains_key(id) {
            return Err(WorkspaceError::UnknownConversation(id.clone()));
        }
        self.persistence.delete(id)?;
        self.engines.remove(id);
        self.saved.remove(id);
        if self.active.as_ref() == Some(id) {
            self.active = self.engines.keys().next().cloned();
        }
        info!("deleted conversation {id}");
        Ok(())
    }

    /// Runs `f` on the active conversation and saves it if it changed.
    ///
    /// # Errors
    /// Failed save.
    pub fn with_active<T>(
        &mut self,
        f: impl FnOnce(&mut ConversationEngine) -> T,
    ) -> Result<Option<T>, WorkspaceError> {
        let Some(id) = self.active.clone() else {
            return Ok(None);
        };
        let Some(engine) = self.engines.get_mut(&id) else {
            return Ok(None);
        };
        let out = f(engine);
        self.persist(&id)?;
        Ok(Some(out))
    }

    /// Ticks every conversation and saves the ones that changed.
    ///
    /// # Errors
    /// First failed save.
    pub fn tick(&mut self) -> Result<bool, WorkspaceError> {
        let mut changed = Vec::new();
        for (id, engine) in &mut self.engines {
            if engine.tick() {
                changed.push(id.clone());
            }
        }
        for id in &changed {
            self.persist(id)?;
        }
        Ok(!changed.is_empty())
    }

    fn persist(&mut self, id: &ConversationId) -> Result<(), WorkspaceError> {
        let Some(engine) = self.engines.get(id) else {
            return Ok(());
        };
        if self.saved.get(id) == Some(&engine.revision()) {
            return Ok(());
        }
        self.persistence.save(engine.conversation())?;
        self.saved.insert(id.clone(), engine.revision());
        Ok(())
    }
}
