use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use egui::{Pos2, Vec2};
use log::{debug, info, warn};
use rand::{rngs::StdRng, SeedableRng};

use crate::cascade::{CascadeId, CascadeScheduler, CascadeStep};
use crate::clock::{Clock, SystemClock};
use crate::draw::EdgeCurve;
use crate::error::{CascadeError, InvariantViolation};
use crate::events::{
    Event, EventSink, PayloadCascadeLevel, PayloadContentUpdated, PayloadLayoutSettled,
    PayloadNodeCreated, PayloadNodeMove, PayloadNodeRemoved, PayloadPan, PayloadReplyFinished,
    PayloadZoom,
};
use crate::graph::{check_invariants, path_to_root};
use crate::layouts::force_directed::ForceDirected;
use crate::layouts::Layout;
use crate::layouts::placement::node_rect;
use crate::mutation;
use crate::selection::{affordance, ReplyAffordance, TextSelection};
use crate::streaming::{
    chunk_patch, error_content, ActiveReply, ChatMessage, CompletionProvider, CompletionRequest,
    ReplyOptions, ReplyUpdate,
};
use crate::viewport::{HitTarget, Viewport, ViewportAction};
use crate::{Conversation, NodeDraft, NodeId, NodePatch, Role, Settings};

/// Single writer of one conversation.
///
/// Every operation reads the latest published snapshot, edits a copy-on-write clone and
/// publishes it with a bumped revision. Readers holding an older [`Arc`] keep a consistent
/// view. Background work (reply streams, cascade timers, layout) is folded in by [`Self::tick`].
pub struct ConversationEngine {
    snapshot: Arc<Conversation>,
    revision: u64,
    settings: Settings,
    rng: StdRng,
    clock: Box<dyn Clock>,
    viewport: Viewport,
    layout: ForceDirected,
    cascades: CascadeScheduler,
    cascade_targets: HashMap<CascadeId, NodeId>,
    replies: HashMap<NodeId, ActiveReply>,
    selection: Option<TextSelection>,
    deferred: HashMap<NodeId, NodePatch>,
    sink: Option<Box<dyn EventSink>>,
}

impl ConversationEngine {
    pub fn new(conversation: Conversation) -> Self {
        let settings = Settings::default();
        Self {
            snapshot: Arc::new(conversation),
            revision: 0,
            rng: StdRng::from_os_rng(),
            clock: Box::new(SystemClock::default()),
            viewport: Viewport::new(settings.navigation.clone()),
            layout: ForceDirected::new(settings.layout.clone(), settings.placement.clone()),
            cascades: CascadeScheduler::new(settings.cascade.clone()),
            cascade_targets: HashMap::new(),
            replies: HashMap::new(),
            selection: None,
            deferred: HashMap::new(),
            sink: None,
            settings,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.viewport = Viewport::new(settings.navigation.clone());
        self.layout = ForceDirected::new(settings.layout.clone(), settings.placement.clone());
        self.cascades = CascadeScheduler::new(settings.cascade.clone());
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Makes id generation reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<Conversation> {
        Arc::clone(&self.snapshot)
    }

    pub fn conversation(&self) -> &Conversation {
        &self.snapshot
    }

    /// Bumped on every published change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn layout(&self) -> &ForceDirected {
        &self.layout
    }

    fn emit(&self, event: Event) {
        if let Some(sink) = &self.sink {
            sink.publish(event);
        }
    }

    /// Runs `f` on the writable snapshot and publishes if it returns `Some`.
    fn edit<T>(
        &mut self,
        f: impl FnOnce(&mut Conversation, &mut StdRng, &Settings) -> Option<T>,
    ) -> Option<T> {
        let out = f(Arc::make_mut(&mut self.snapshot), &mut self.rng, &self.settings)?;
        self.publish();
        Some(out)
    }

    fn publish(&mut self) {
        Arc::make_mut(&mut self.snapshot).touch();
        self.revision += 1;
        debug_assert!(
            check_invariants(&self.snapshot).is_ok(),
            "published snapshot is inconsistent"
        );
    }

    fn emit_created(&self, id: &NodeId) {
        if let Some(node) = self.snapshot.node(id) {
            let loc = node.location();
            self.emit(Event::NodeCreated(PayloadNodeCreated {
                id: id.clone(),
                parent: node.parent_id().cloned(),
                pos: [loc.x, loc.y],
            }));
        }
    }

    pub fn create_root(&mut self, location: Pos2) -> NodeId {
        let id = mutation::create_root(Arc::make_mut(&mut self.snapshot), &mut self.rng, location);
        self.publish();
        self.emit_created(&id);
        id
    }

    /// Appends a child. No-op for unknown parents and for parents being deleted.
    pub fn add_child(
        &mut self,
        parent: &NodeId,
        hint: Option<Pos2>,
        draft: Option<NodeDraft>,
    ) -> Option<NodeId> {
        if self.cascades.in_cascade(parent) {
            debug!("ignoring new child under {parent}: it is being removed");
            return None;
        }
        let id = self.edit(|c, rng, s| {
            mutation::add_child(c, rng, &s.placement, parent, hint, draft)
        })?;
        self.emit_created(&id);
        Some(id)
    }

    /// Host-originated content change.
    ///
    /// While `id` anchors the active text selection the patch is queued and applied once the
    /// selection clears. Returns whether the snapshot changed now.
    pub fn update_content(&mut self, id: &NodeId, patch: NodePatch) -> bool {
        if self.selection.as_ref().is_some_and(|s| &s.node == id) && self.snapshot.contains(id) {
            debug!("deferring edit of {id} while it holds the selection");
            self.deferred.entry(id.clone()).or_default().merge(patch);
            return false;
        }
        self.apply_patch(id, &patch)
    }

    fn apply_patch(&mut self, id: &NodeId, patch: &NodePatch) -> bool {
        let changed = self
            .edit(|c, _, _| mutation::update_content(c, id, patch).then_some(()))
            .is_some();
        if changed {
            self.emit(Event::ContentUpdated(PayloadContentUpdated { id: id.clone() }));
        }
        changed
    }

    /// Manual drag: the node is pinned at `location` from now on.
    pub fn move_node(&mut self, id: &NodeId, location: Pos2) -> bool {
        let moved = self
            .edit(|c, _, _| mutation::move_node(c, id, location).then_some(()))
            .is_some();
        if moved {
            self.emit(Event::NodeMoved(PayloadNodeMove {
                id: id.clone(),
                new_pos: [location.x, location.y],
                pinned: true,
            }));
        }
        moved
    }

    /// Starts the staggered removal of `id` and its descendants.
    ///
    /// # Errors
    /// Fails for unknown nodes and for subtrees overlapping a running deletion.
    pub fn delete_subtree(&mut self, id: &NodeId) -> Result<CascadeId, CascadeError> {
        let now = self.clock.now();
        let cascade = self.cascades.schedule(&self.snapshot, id, now)?;
        self.cascade_targets.insert(cascade, id.clone());
        self.run_cascades();
        Ok(cascade)
    }

    /// Clones the root→`id` path into a new chain. Returns the new ids root-first.
    pub fn branch(&mut self, id: &NodeId) -> Option<Vec<NodeId>> {
        let ids = self.edit(|c, rng, s| mutation::branch(c, rng, &s.placement, id))?;
        for clone in &ids {
            self.emit_created(clone);
        }
        Some(ids)
    }

    pub fn rename(&mut self, title: &str) -> bool {
        self.edit(|c, _, _| mutation::rename(c, title).then_some(()))
            .is_some()
    }

    /// Replaces the whole snapshot, e.g. after the host reloaded it.
    ///
    /// # Errors
    /// Rejects conversations that break the structural invariants.
    pub fn replace_snapshot(
        &mut self,
        conversation: Conversation,
    ) -> Result<(), InvariantViolation> {
        check_invariants(&conversation)?;
        self.replies.retain(|id, _| conversation.contains(id));
        self.deferred.retain(|id, _| conversation.contains(id));
        if self
            .selection
            .as_ref()
            .is_some_and(|s| !conversation.contains(&s.node))
        {
            self.selection = None;
        }
        self.snapshot = Arc::new(conversation);
        self.revision += 1;
        self.layout.reset();
        Ok(())
    }

    /// Root-first messages leading to `id`, skipping empty bubbles.
    pub fn history_for(&self, id: &NodeId) -> Vec<ChatMessage> {
        path_to_root(&self.snapshot, id)
            .iter()
            .filter_map(|p| self.snapshot.node(p))
            .filter(|n| !n.content().trim().is_empty())
            .map(|n| ChatMessage {
                role: n.role(),
                content: n.content().to_owned(),
            })
            .collect()
    }

    /// Closes the prompt and creates the empty assistant placeholder a reply streams into.
    pub fn begin_reply(
        &mut self,
        prompt: &NodeId,
        hint: Option<Pos2>,
        options: &ReplyOptions,
    ) -> Option<NodeId> {
        if self.snapshot.node(prompt).is_none_or(|n| n.role() != Role::User)
            || self.cascades.in_cascade(prompt)
        {
            return None;
        }
        self.apply_patch(prompt, &NodePatch::default().with_editing(false));
        let draft = NodeDraft::assistant("")
            .with_model(options.model.clone())
            .with_provider(options.provider.id.clone());
        self.add_child(prompt, hint, Some(draft))
    }

    /// Submits `prompt` to `provider` and starts streaming into a new placeholder.
    ///
    /// Failing to start the stream is shown as error content in the placeholder.
    pub fn submit(
        &mut self,
        prompt: &NodeId,
        provider: &dyn CompletionProvider,
        hint: Option<Pos2>,
        options: &ReplyOptions,
    ) -> Option<NodeId> {
        let history = self.history_for(prompt);
        let target = self.begin_reply(prompt, hint, options)?;
        let request = CompletionRequest {
            history,
            model: options.model.clone(),
            provider: options.provider.clone(),
            temperature: options.temperature,
        };
        match ActiveReply::spawn(target.clone(), provider.stream(request)) {
            Ok(reply) => self.attach_reply(reply),
            Err(err) => {
                warn!("could not start reply for {prompt}: {err}");
                self.apply_patch(&target, &NodePatch::content(error_content("", &err.to_string())));
            }
        }
        Some(target)
    }

    /// Registers a running reply. A previous reply into the same node is aborted.
    pub fn attach_reply(&mut self, reply: ActiveReply) {
        let target = reply.target().clone();
        if !self.snapshot.contains(&target) {
            warn!("dropping reply for missing node {target}");
            return;
        }
        if self.replies.insert(target.clone(), reply).is_some() {
            info!("replaced running reply for {target}");
        }
    }

    pub fn is_streaming(&self, id: &NodeId) -> bool {
        self.replies.contains_key(id)
    }

    /// Aborts the reply streaming into `id`, keeping whatever text arrived.
    pub fn cancel_reply(&mut self, id: &NodeId) -> bool {
        let Some(reply) = self.replies.remove(id) else {
            return false;
        };
        drop(reply);
        info!("reply for {id} cancelled");
        self.emit(Event::ReplyFinished(PayloadReplyFinished {
            id: id.clone(),
            error: Some("cancelled".to_owned()),
        }));
        true
    }

    /// Folds one stream update into `target`. Returns whether the reply is still running.
    pub fn apply_stream_update(&mut self, target: &NodeId, update: ReplyUpdate) -> bool {
        match update {
            ReplyUpdate::Chunk(chunk) => {
                self.apply_patch(target, &chunk_patch(&chunk));
                if chunk.is_complete {
                    self.finish_reply(target, chunk.error);
                    return false;
                }
                true
            }
            ReplyUpdate::Failed(message) => {
                let partial = self
                    .snapshot
                    .node(target)
                    .map(|n| n.content().to_owned())
                    .unwrap_or_default();
                self.apply_patch(target, &NodePatch::content(error_content(&partial, &message)));
                self.finish_reply(target, Some(message));
                false
            }
            ReplyUpdate::Finished => {
                self.finish_reply(target, None);
                false
            }
        }
    }

    fn finish_reply(&mut self, target: &NodeId, error: Option<String>) {
        if self.replies.remove(target).is_none() {
            return;
        }
        match &error {
            Some(err) => warn!("reply for {target} failed: {err}"),
            None => info!("reply for {target} finished"),
        }
        self.emit(Event::ReplyFinished(PayloadReplyFinished {
            id: target.clone(),
            error,
        }));
    }

    fn drain_replies(&mut self) {
        let pending: Vec<(NodeId, Vec<ReplyUpdate>)> = self
            .replies
            .iter()
            .map(|(id, reply)| (id.clone(), reply.drain()))
            .filter(|(_, updates)| !updates.is_empty())
            .collect();
        for (target, updates) in pending {
            for update in updates {
                if !self.apply_stream_update(&target, update) {
                    break;
                }
            }
        }
    }

    /// World-space hit test against each node's estimated bounds. Later nodes win ties.
    pub fn node_at(&self, screen: Pos2) -> Option<NodeId> {
        let world = self.viewport.screen_to_world(screen);
        self.snapshot
            .nodes_iter()
            .filter(|(_, n)| node_rect(&self.settings.placement, n).contains(world))
            .map(|(id, _)| id.clone())
            .last()
    }

    /// Canvas or node under `screen`. Controls are reported by the host itself.
    pub fn hit_target(&self, screen: Pos2) -> HitTarget {
        self.node_at(screen).map_or(HitTarget::Canvas, HitTarget::Node)
    }

    pub fn pointer_down(&mut self, screen: Pos2, target: HitTarget) -> ViewportAction {
        let origin = match &target {
            HitTarget::Node(id) => self.snapshot.node(id).map(crate::Node::location),
            _ => None,
        };
        self.viewport.pointer_down(screen, target, origin)
    }

    pub fn pointer_move(&mut self, screen: Pos2) -> ViewportAction {
        let action = self.viewport.pointer_move(screen);
        match &action {
            ViewportAction::Panned(pan) => self.emit_pan(*pan),
            ViewportAction::MoveNode { id, to } => {
                self.move_node(id, *to);
            }
            _ => {}
        }
        action
    }

    pub fn pointer_up(&mut self) {
        self.viewport.pointer_up();
    }

    pub fn wheel(&mut self, delta_y: f32, target: &HitTarget) -> ViewportAction {
        let action = self.viewport.wheel(delta_y, target);
        if let ViewportAction::Zoomed(zoom) = action {
            self.emit(Event::Zoom(PayloadZoom { new_zoom: zoom }));
        }
        action
    }

    /// Double-click on empty canvas creates a root under the pointer.
    pub fn double_click(&mut self, screen: Pos2, target: &HitTarget) -> Option<NodeId> {
        match self.viewport.double_click(screen, target) {
            ViewportAction::CreateRoot(world) => Some(self.create_root(world)),
            _ => None,
        }
    }

    fn emit_pan(&self, pan: Vec2) {
        self.emit(Event::Pan(PayloadPan {
            new_pan: [pan.x, pan.y],
        }));
    }

    /// Records a text selection and returns the reply affordance for it.
    pub fn begin_selection(&mut self, selection: TextSelection) -> Option<ReplyAffordance> {
        if !self.snapshot.contains(&selection.node) {
            return None;
        }
        let offer = affordance(&selection, &self.settings.selection);
        let anchor = selection.node.clone();
        if let Some(previous) = self.selection.replace(selection) {
            if previous.node != anchor {
                self.flush_deferred(&previous.node);
            }
        }
        offer
    }

    pub fn selection(&self) -> Option<&TextSelection> {
        self.selection.as_ref()
    }

    /// Drops the selection and applies edits queued while it was active.
    pub fn clear_selection(&mut self) {
        if let Some(previous) = self.selection.take() {
            self.flush_deferred(&previous.node);
        }
    }

    fn flush_deferred(&mut self, id: &NodeId) {
        if let Some(patch) = self.deferred.remove(id) {
            self.apply_patch(id, &patch);
        }
    }

    /// Quotes the active selection into a new editing child of the selected node.
    pub fn reply_to_selection(&mut self) -> Option<NodeId> {
        let selection = self.selection.clone()?;
        let offer = affordance(&selection, &self.settings.selection)?;
        self.clear_selection();
        let hint = self.viewport.screen_to_world(offer.anchor);
        self.add_child(&offer.node, Some(hint), Some(NodeDraft::prompt(offer.quote)))
    }

    /// Whether `id` carries the cascade animation marker.
    pub fn is_animating(&self, id: &NodeId) -> bool {
        self.cascades.is_animating(id)
    }

    pub fn has_active_cascades(&self) -> bool {
        self.cascades.has_active()
    }

    fn frozen(&self) -> HashSet<NodeId> {
        let mut frozen = self.cascades.frozen();
        if let Some(sel) = &self.selection {
            frozen.insert(sel.node.clone());
        }
        frozen
    }

    fn run_cascades(&mut self) {
        let now = self.clock.now();
        for step in self.cascades.advance(now) {
            match step {
                CascadeStep::Animate { cascade, depth, .. } => {
                    if let Some(target) = self.cascade_targets.get(&cascade) {
                        self.emit(Event::CascadeLevel(PayloadCascadeLevel {
                            target: target.clone(),
                            depth,
                            removed: false,
                        }));
                    }
                }
                CascadeStep::Remove {
                    cascade,
                    depth,
                    ids,
                } => {
                    let removed = self
                        .edit(|c, _, _| {
                            let removed = mutation::remove_nodes(c, &ids);
                            (!removed.is_empty()).then_some(removed)
                        })
                        .unwrap_or_default();
                    debug!("cascade removed {} nodes at depth {depth}", removed.len());
                    for id in &removed {
                        self.replies.remove(id);
                        self.deferred.remove(id);
                        self.emit(Event::NodeRemoved(PayloadNodeRemoved { id: id.clone() }));
                    }
                    if self
                        .selection
                        .as_ref()
                        .is_some_and(|s| removed.contains(&s.node))
                    {
                        self.selection = None;
                    }
                    if let Some(target) = self.cascade_targets.get(&cascade) {
                        self.emit(Event::CascadeLevel(PayloadCascadeLevel {
                            target: target.clone(),
                            depth,
                            removed: true,
                        }));
                    }
                }
                CascadeStep::Finished { cascade, target } => {
                    self.cascade_targets.remove(&cascade);
                    debug!("deletion of {target} complete");
                }
            }
        }
    }

    fn run_layout(&mut self) {
        let now = self.clock.now();
        let frozen = self.frozen();
        let was_running = self.layout.is_running();
        let writes = self.layout.next(&self.snapshot, &frozen, now);
        if !writes.is_empty() {
            self.edit(|c, _, _| {
                let n = writes
                    .iter()
                    .filter(|(id, pos)| mutation::set_layout_location(c, id, *pos))
                    .count();
                (n > 0).then_some(n)
            });
        }
        if was_running && !self.layout.is_running() {
            self.emit(Event::LayoutSettled(PayloadLayoutSettled {
                steps: self.layout.state().step_count,
            }));
        }
    }

    /// Folds in reply chunks, due cascade steps and one layout step.
    /// Returns whether a new snapshot was published.
    pub fn tick(&mut self) -> bool {
        let before = self.revision;
        self.drain_replies();
        self.run_cascades();
        self.run_layout();
        self.revision != before
    }

    /// Whether another [`Self::tick`] may change something.
    pub fn is_active(&self) -> bool {
        self.layout.is_running() || self.cascades.has_active() || !self.replies.is_empty()
    }

    /// Parent→child curves for every link in the snapshot.
    pub fn edge_curves(&self) -> Vec<(NodeId, NodeId, EdgeCurve)> {
        let placement = &self.settings.placement;
        self.snapshot
            .nodes_iter()
            .flat_map(|(id, parent)| {
                let from = node_rect(placement, parent);
                self.snapshot.children(id).filter_map(move |child| {
                    EdgeCurve::between(from, node_rect(placement, child))
                        .map(|curve| (id.clone(), child.id().clone(), curve))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::streaming::CompletionChunk;
    use crate::ConversationId;
    use crossbeam::channel::unbounded;
    use egui::Rect;

    fn engine() -> (ConversationEngine, ManualClock) {
        let clock = ManualClock::new();
        let engine = ConversationEngine::new(Conversation::new(ConversationId::new("c")))
            .with_clock(clock.clone())
            .with_seed(42);
        (engine, clock)
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let (mut e, _) = engine();
        let before = e.snapshot();
        let root = e.create_root(Pos2::ZERO);
        assert!(before.is_empty());
        assert!(e.conversation().contains(&root));
        assert_eq!(e.revision(), 1);
    }

    #[test]
    fn no_op_edits_do_not_publish() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::ZERO);
        assert!(e.update_content(&root, NodePatch::content("X")));
        let rev = e.revision();
        assert!(!e.update_content(&root, NodePatch::content("X")));
        assert!(!e.move_node(&NodeId::new("ghost"), Pos2::ZERO));
        assert!(e.add_child(&NodeId::new("ghost"), None, None).is_none());
        assert_eq!(e.revision(), rev);
    }

    #[test]
    fn events_reach_the_sink() {
        let (tx, rx) = unbounded();
        let (e, _) = engine();
        let mut e = e.with_event_sink(tx);
        let root = e.create_root(Pos2::new(1.0, 2.0));
        e.move_node(&root, Pos2::new(3.0, 4.0));
        let events: Vec<Event> = rx.try_iter().collect();
        assert!(matches!(&events[0], Event::NodeCreated(p) if p.id == root && p.pos == [1.0, 2.0]));
        assert!(matches!(&events[1], Event::NodeMoved(p) if p.pinned && p.new_pos == [3.0, 4.0]));
    }

    #[test]
    fn selection_defers_host_edits_but_not_streams() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::ZERO);
        e.update_content(&root, NodePatch::content("Question").with_editing(false));
        let reply = e.begin_reply(&root, None, &ReplyOptions::default()).unwrap();
        let (tx, rx) = unbounded();
        e.attach_reply(ActiveReply::detached(reply.clone(), rx));

        let rect = Rect::from_min_size(Pos2::ZERO, Vec2::splat(10.0));
        e.begin_selection(TextSelection::new(root.clone(), "Question", vec![rect]));
        assert!(!e.update_content(&root, NodePatch::content("Edited")));
        assert_eq!(e.conversation().node(&root).unwrap().content(), "Question");

        tx.send(ReplyUpdate::Chunk(CompletionChunk::partial("Ans"))).unwrap();
        e.tick();
        assert_eq!(e.conversation().node(&reply).unwrap().content(), "Ans");

        e.clear_selection();
        assert_eq!(e.conversation().node(&root).unwrap().content(), "Edited");
    }

    #[test]
    fn reselecting_in_the_same_node_keeps_edits_queued() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::ZERO);
        e.update_content(&root, NodePatch::content("Question text").with_editing(false));
        let rect = Rect::from_min_size(Pos2::ZERO, Vec2::splat(10.0));

        e.begin_selection(TextSelection::new(root.clone(), "Question", vec![rect]));
        assert!(!e.update_content(&root, NodePatch::content("Edited")));
        e.begin_selection(TextSelection::new(root.clone(), "Question text", vec![rect]));
        assert!(e.selection().is_some());
        assert_eq!(e.conversation().node(&root).unwrap().content(), "Question text");

        let other = e.create_root(Pos2::new(900.0, 0.0));
        e.begin_selection(TextSelection::new(other, "x", vec![rect]));
        assert_eq!(e.conversation().node(&root).unwrap().content(), "Edited");
    }

    #[test]
    fn reply_to_selection_quotes_text() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::ZERO);
        e.update_content(&root, NodePatch::content("line one\nline two").with_editing(false));
        let rect = Rect::from_min_size(Pos2::new(5.0, 5.0), Vec2::new(40.0, 12.0));
        let offer = e
            .begin_selection(TextSelection::new(root.clone(), "line two", vec![rect]))
            .unwrap();
        assert_eq!(offer.anchor, Pos2::new(45.0, 17.0));

        let child = e.reply_to_selection().unwrap();
        let node = e.conversation().node(&child).unwrap();
        assert_eq!(node.content(), "> line two\n\n");
        assert!(node.editing());
        assert_eq!(node.parent_id(), Some(&root));
        assert!(e.selection().is_none());
    }

    #[test]
    fn stream_failure_is_shown_in_place() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::ZERO);
        e.update_content(&root, NodePatch::content("Hi"));
        let reply = e.begin_reply(&root, None, &ReplyOptions::default()).unwrap();
        let (tx, rx) = unbounded();
        e.attach_reply(ActiveReply::detached(reply.clone(), rx));
        tx.send(ReplyUpdate::Chunk(CompletionChunk::partial("Par"))).unwrap();
        tx.send(ReplyUpdate::Failed("transport failure: reset".into())).unwrap();
        e.tick();
        assert_eq!(
            e.conversation().node(&reply).unwrap().content(),
            "Par\n\n**Error:** transport failure: reset"
        );
        assert!(!e.is_streaming(&reply));
        assert!(!e.conversation().node(&root).unwrap().editing());
    }

    #[test]
    fn cancel_reply_keeps_partial_text() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::ZERO);
        let reply = e.begin_reply(&root, None, &ReplyOptions::default()).unwrap();
        let (tx, rx) = unbounded();
        e.attach_reply(ActiveReply::detached(reply.clone(), rx));
        tx.send(ReplyUpdate::Chunk(CompletionChunk::partial("so far"))).unwrap();
        e.tick();
        assert!(e.cancel_reply(&reply));
        assert!(!e.cancel_reply(&reply));
        tx.send(ReplyUpdate::Chunk(CompletionChunk::partial("so far and more"))).ok();
        e.tick();
        assert_eq!(e.conversation().node(&reply).unwrap().content(), "so far");
    }

    #[test]
    fn history_is_root_first_and_skips_empty() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::ZERO);
        e.update_content(&root, NodePatch::content("Q1"));
        let a = e
            .add_child(&root, None, Some(NodeDraft::assistant("A1")))
            .unwrap();
        let q2 = e.add_child(&a, None, None).unwrap();
        let history = e.history_for(&q2);
        assert_eq!(
            history,
            vec![
                ChatMessage {
                    role: Role::User,
                    content: "Q1".into()
                },
                ChatMessage {
                    role: Role::Assistant,
                    content: "A1".into()
                },
            ]
        );
    }

    #[test]
    fn children_of_deleted_nodes_are_refused() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::ZERO);
        e.delete_subtree(&root).unwrap();
        assert!(e.is_animating(&root));
        assert!(e.add_child(&root, None, None).is_none());
    }

    #[test]
    fn reply_to_deleting_prompt_changes_nothing() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::ZERO);
        e.update_content(&root, NodePatch::content("Hi"));
        e.delete_subtree(&root).unwrap();
        let rev = e.revision();
        assert!(e.begin_reply(&root, None, &ReplyOptions::default()).is_none());
        assert_eq!(e.revision(), rev);
        assert!(e.conversation().node(&root).unwrap().editing());
    }

    #[test]
    fn hit_testing_uses_viewport() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::new(100.0, 100.0));
        e.viewport_mut().set_zoom(2.0);
        assert_eq!(e.node_at(Pos2::new(210.0, 210.0)), Some(root.clone()));
        assert_eq!(e.node_at(Pos2::new(150.0, 150.0)), None);
        assert_eq!(e.hit_target(Pos2::new(210.0, 210.0)), HitTarget::Node(root));
    }

    #[test]
    fn dragging_a_node_pins_it() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::new(0.0, 0.0));
        e.pointer_down(Pos2::new(10.0, 10.0), HitTarget::Node(root.clone()));
        let action = e.pointer_move(Pos2::new(60.0, 30.0));
        assert_eq!(
            action,
            ViewportAction::MoveNode {
                id: root.clone(),
                to: Pos2::new(50.0, 20.0)
            }
        );
        e.pointer_up();
        let node = e.conversation().node(&root).unwrap();
        assert!(node.pinned());
        assert_eq!(node.location(), Pos2::new(50.0, 20.0));
    }

    #[test]
    fn replace_snapshot_rejects_broken_structure() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::ZERO);
        let json = serde_json::json!({
            "id": "c",
            "title": "t",
            "nodes": {
                "a": {
                    "id": "a",
                    "content": "",
                    "role": "user",
                    "x": 0.0,
                    "y": 0.0,
                    "childIds": ["b"],
                },
            },
        });
        let broken: Conversation = serde_json::from_value(json).unwrap();
        assert!(e.replace_snapshot(broken).is_err());
        assert!(e.conversation().contains(&root));
    }

    #[test]
    fn edge_curves_follow_links() {
        let (mut e, _) = engine();
        let root = e.create_root(Pos2::ZERO);
        let child = e.add_child(&root, None, None).unwrap();
        let curves = e.edge_curves();
        assert_eq!(curves.len(), 1);
        assert_eq!((&curves[0].0, &curves[0].1), (&root, &child));
    }
}
