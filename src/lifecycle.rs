//! Playback instances from launch to release.
//!
//! Each launched sound becomes a [`PlaybackInstance`] owned here until it is
//! released. The manager moves instances through
//! `Scheduled → Rendering → Completed → Released` as the clock advances and
//! tears down their nodes exactly once. Nodes are only torn down once an
//! instance has completed; releasing one that is still audible fades it out
//! first.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::Category;
use crate::dsp::patch::Patch;
use crate::error::{EarconError, Result};
use crate::graph::SignalGraph;
use crate::scheduler::{EnvelopeScheduler, Timeline};

/// Handle to a launched sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    /// Launched, start time not reached yet.
    Scheduled,
    Rendering,
    /// Every source has stopped; nodes still allocated.
    Completed,
    /// Nodes disconnected and freed.
    Released,
}

/// Called once when an instance completes.
pub type CompletionCallback = Box<dyn FnOnce(InstanceId) + Send>;

/// One in-flight rendering of a recipe.
pub struct PlaybackInstance {
    id: InstanceId,
    category: Option<Category>,
    graph: SignalGraph,
    timeline: Timeline,
    patch: Patch,
    state: PlaybackState,
    callbacks: Vec<CompletionCallback>,
    /// Release requested while still audible.
    releasing: bool,
}

impl fmt::Debug for PlaybackInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackInstance")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("state", &self.state)
            .field("releasing", &self.releasing)
            .field("end", &self.timeline.end())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl PlaybackInstance {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.graph
    }

    /// Nodes still allocated for this instance.
    pub fn live_nodes(&self) -> usize {
        self.patch.len()
    }

    fn is_audible(&self) -> bool {
        matches!(self.state, PlaybackState::Scheduled | PlaybackState::Rendering)
    }
}

/// Owner of every playback instance.
#[derive(Debug, Default)]
pub struct NodeLifecycleManager {
    instances: BTreeMap<InstanceId, PlaybackInstance>,
    next_id: u64,
    releases: u64,
}

impl NodeLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a scheduled graph. Allocates fresh DSP state,
    /// noise buffers included.
    pub fn launch(&mut self, graph: SignalGraph, timeline: Timeline) -> InstanceId {
        self.launch_category(None, graph, timeline)
    }

    pub(crate) fn launch_category(
        &mut self,
        category: Option<Category>,
        graph: SignalGraph,
        timeline: Timeline,
    ) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        let patch = Patch::new(&graph, &timeline);
        tracing::debug!(%id, nodes = graph.len(), start = timeline.start(), end = timeline.end(), "instance launched");
        self.instances.insert(
            id,
            PlaybackInstance {
                id,
                category,
                graph,
                timeline,
                patch,
                state: PlaybackState::Scheduled,
                callbacks: Vec::new(),
                releasing: false,
            },
        );
        id
    }

    /// Register `callback` to run when `id` completes. If it already has,
    /// the callback runs immediately.
    pub fn on_completion(&mut self, id: InstanceId, callback: CompletionCallback) -> Result<()> {
        let instance = self.instances.get_mut(&id).ok_or(EarconError::UnknownInstance(id.0))?;
        if instance.is_audible() {
            instance.callbacks.push(callback);
        } else {
            callback(id);
        }
        Ok(())
    }

    pub fn state(&self, id: InstanceId) -> Option<PlaybackState> {
        self.instances.get(&id).map(|i| i.state)
    }

    pub fn get(&self, id: InstanceId) -> Option<&PlaybackInstance> {
        self.instances.get(&id)
    }

    /// Instances not yet released.
    pub fn active(&self) -> usize {
        self.instances
            .values()
            .filter(|i| i.state != PlaybackState::Released)
            .count()
    }

    /// Total node teardowns performed.
    pub fn releases(&self) -> u64 {
        self.releases
    }

    /// Move every instance whose time has come to its next state. Returns
    /// the instances that completed during this call.
    pub fn advance(&mut self, now: f64) -> Vec<InstanceId> {
        let mut completed = Vec::new();
        for instance in self.instances.values_mut() {
            if instance.state == PlaybackState::Scheduled && now >= instance.timeline.start() {
                instance.state = PlaybackState::Rendering;
            }
            if instance.state == PlaybackState::Rendering && now >= instance.timeline.end() {
                instance.state = PlaybackState::Completed;
                tracing::debug!(id = %instance.id, now, "instance completed");
                for callback in instance.callbacks.drain(..) {
                    callback(instance.id);
                }
                completed.push(instance.id);
            }
        }
        completed
    }

    /// Sum every audible instance into `out`, one sample per entry, starting
    /// at clock time `start`.
    pub fn render_into(&mut self, out: &mut [f64], start: f64, sample_rate: f64) {
        for instance in self.instances.values_mut().filter(|i| i.is_audible()) {
            for (n, sample) in out.iter_mut().enumerate() {
                *sample += instance.patch.next_sample(start + n as f64 / sample_rate);
            }
        }
    }

    /// Fade `id` out from `now` and stop it early. Returns the new end
    /// time. Cancelling a finished instance does nothing.
    pub fn cancel(&mut self, id: InstanceId, now: f64) -> Result<f64> {
        let instance = self.instances.get_mut(&id).ok_or(EarconError::UnknownInstance(id.0))?;
        if !instance.is_audible() {
            return Ok(instance.timeline.end());
        }
        let end = EnvelopeScheduler::cancel(&instance.graph, &mut instance.timeline, now)?;
        instance.patch.load(&instance.graph, &instance.timeline);
        tracing::debug!(%id, now, end, "instance cancelled");
        Ok(end)
    }

    /// Release `id`. A completed instance has its nodes disconnected here;
    /// one still audible is faded out from `now` and torn down by
    /// [`release_completed`](Self::release_completed) once it completes.
    ///
    /// Returns `true` if this call started the release, `false` if the
    /// instance was already released or on its way out.
    pub fn release(&mut self, id: InstanceId, now: f64) -> Result<bool> {
        let instance = self.instances.get_mut(&id).ok_or(EarconError::UnknownInstance(id.0))?;
        match instance.state {
            PlaybackState::Released => Ok(false),
            PlaybackState::Completed => self.teardown(id),
            PlaybackState::Scheduled | PlaybackState::Rendering => {
                if instance.releasing {
                    return Ok(false);
                }
                instance.releasing = true;
                let end = self.cancel(id, now)?;
                tracing::debug!(%id, now, end, "release deferred until fade ends");
                Ok(true)
            }
        }
    }

    fn teardown(&mut self, id: InstanceId) -> Result<bool> {
        let instance = self.instances.get_mut(&id).ok_or(EarconError::UnknownInstance(id.0))?;
        if instance.state != PlaybackState::Completed {
            return Ok(false);
        }
        let nodes = instance.patch.len();
        if instance.patch.disconnect() {
            self.releases += 1;
        }
        instance.state = PlaybackState::Released;
        tracing::debug!(%id, nodes, "instance released");
        Ok(true)
    }

    /// Release every completed instance. Returns the ones torn down.
    pub fn release_completed(&mut self) -> Vec<InstanceId> {
        let done: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|i| i.state == PlaybackState::Completed)
            .map(|i| i.id)
            .collect();
        done.into_iter()
            .filter(|&id| matches!(self.teardown(id), Ok(true)))
            .collect()
    }

    /// Instances held, released ones included until reaped.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Forget released instances. Returns how many were dropped.
    pub fn reap(&mut self) -> usize {
        let before = self.instances.len();
        self.instances.retain(|_, i| i.state != PlaybackState::Released);
        before - self.instances.len()
    }
}
