//! Staggered, depth-ordered subtree deletion.
//!
//! A cascade walks `Pending → Animating(depth) → Removed`. Level `d` is marked as animating
//! at `start + d * stagger` and removed `animation` later. The scheduler only decides *when*;
//! the engine applies the returned [`CascadeStep`]s to the snapshot.

use std::collections::HashSet;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::CascadeError;
use crate::graph::subtree_levels;
use crate::settings::SettingsCascade;
use crate::{Conversation, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CascadeId(u64);

impl CascadeId {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadePhase {
    Pending,
    /// Deepest level currently marked.
    Animating { depth: usize },
    Removed,
}

/// Work the engine must carry out, in the order returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeStep {
    Animate {
        cascade: CascadeId,
        depth: usize,
        ids: Vec<NodeId>,
    },
    Remove {
        cascade: CascadeId,
        depth: usize,
        ids: Vec<NodeId>,
    },
    Finished {
        cascade: CascadeId,
        target: NodeId,
    },
}

#[derive(Debug, Clone)]
struct Cascade {
    id: CascadeId,
    target: NodeId,
    levels: Vec<Vec<NodeId>>,
    started: Duration,
    marked: usize,
    removed: usize,
}

impl Cascade {
    fn mark_at(&self, depth: usize, stagger: Duration) -> Duration {
        self.started + stagger * u32::try_from(depth).unwrap_or(u32::MAX)
    }

    fn contains(&self, id: &NodeId) -> bool {
        self.levels[self.removed..].iter().any(|l| l.contains(id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CascadeScheduler {
    settings: SettingsCascade,
    active: Vec<Cascade>,
    next_id: u64,
}

impl CascadeScheduler {
    pub fn new(settings: SettingsCascade) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    fn stagger(&self) -> Duration {
        Duration::from_millis(self.settings.stagger_ms)
    }

    fn animation(&self) -> Duration {
        Duration::from_millis(self.settings.animation_ms)
    }

    /// Starts a cascade for `target` and its descendants.
    ///
    /// Rejects the request if the target is unknown or if any collected node already
    /// belongs to a running cascade.
    pub fn schedule(
        &mut self,
        conv: &Conversation,
        target: &NodeId,
        now: Duration,
    ) -> Result<CascadeId, CascadeError> {
        if !conv.contains(target) {
            return Err(CascadeError::UnknownNode(target.clone()));
        }
        let levels = subtree_levels(conv, target);
        if let Some(clash) = levels.iter().flatten().find(|id| self.in_cascade(id)) {
            warn!("rejected deletion of {target}: {clash} is already being removed");
            return Err(CascadeError::Overlap(clash.clone()));
        }

        let id = CascadeId(self.next_id);
        self.next_id += 1;
        info!(
            "cascade {} scheduled for {target}: {} levels, {} nodes",
            id.0,
            levels.len(),
            levels.iter().map(Vec::len).sum::<usize>()
        );
        self.active.push(Cascade {
            id,
            target: target.clone(),
            levels,
            started: now,
            marked: 0,
            removed: 0,
        });
        Ok(id)
    }

    /// Returns every step that became due by `now`, ordered by due time.
    pub fn advance(&mut self, now: Duration) -> Vec<CascadeStep> {
        let (stagger, animation) = (self.stagger(), self.animation());
        let mut due: Vec<(Duration, CascadeStep)> = Vec::new();

        for cascade in &mut self.active {
            while cascade.marked < cascade.levels.len() {
                let at = cascade.mark_at(cascade.marked, stagger);
                if at > now {
                    break;
                }
                debug!("cascade {} animating depth {}", cascade.id.0, cascade.marked);
                due.push((
                    at,
                    CascadeStep::Animate {
                        cascade: cascade.id,
                        depth: cascade.marked,
                        ids: cascade.levels[cascade.marked].clone(),
                    },
                ));
                cascade.marked += 1;
            }
            while cascade.removed < cascade.marked {
                let at = cascade.mark_at(cascade.removed, stagger) + animation;
                if at > now {
                    break;
                }
                debug!("cascade {} removing depth {}", cascade.id.0, cascade.removed);
                due.push((
                    at,
                    CascadeStep::Remove {
                        cascade: cascade.id,
                        depth: cascade.removed,
                        ids: cascade.levels[cascade.removed].clone(),
                    },
                ));
                cascade.removed += 1;
            }
            if cascade.removed == cascade.levels.len() {
                let at = cascade.mark_at(cascade.removed.saturating_sub(1), stagger) + animation;
                info!("cascade {} finished", cascade.id.0);
                due.push((
                    at,
                    CascadeStep::Finished {
                        cascade: cascade.id,
                        target: cascade.target.clone(),
                    },
                ));
            }
        }

        self.active.retain(|c| c.removed < c.levels.len());
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, step)| step).collect()
    }

    pub fn phase(&self, id: CascadeId) -> CascadePhase {
        match self.active.iter().find(|c| c.id == id) {
            Some(c) if c.marked == 0 => CascadePhase::Pending,
            Some(c) => CascadePhase::Animating {
                depth: c.marked - 1,
            },
            None => CascadePhase::Removed,
        }
    }

    /// Whether `id` is waiting to be removed by a running cascade.
    pub fn in_cascade(&self, id: &NodeId) -> bool {
        self.active.iter().any(|c| c.contains(id))
    }

    /// Whether `id` carries the animating marker.
    pub fn is_animating(&self, id: &NodeId) -> bool {
        self.active
            .iter()
            .any(|c| c.levels[c.removed..c.marked].iter().any(|l| l.contains(id)))
    }

    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }

    /// Every node still owned by a running cascade; layout must not move these.
    pub fn frozen(&self) -> HashSet<NodeId> {
        self.active
            .iter()
            .flat_map(|c| c.levels[c.removed..].iter().flatten())
            .cloned()
            .collect()
    }
}
