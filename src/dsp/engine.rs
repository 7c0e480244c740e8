//! Audio Engine: Turns launch requests into rendered blocks.
//!
//! The engine ties the clock, the catalog and the lifecycle manager
//! together. The same `render_block` feeds a live device ring and an
//! offline buffer, so exported audio is exactly what a listener would hear.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::catalog::{Overrides, SoundCatalog};
use crate::clock::{ClockContext, ContextState, LiveOutput, Resume};
use crate::config::EngineConfig;
use crate::error::{EarconError, Result};
use crate::graph::SignalGraph;
use crate::lifecycle::{CompletionCallback, InstanceId, NodeLifecycleManager, PlaybackState};
use crate::rules::ValidationRules;
use crate::scheduler::{EnvelopeScheduler, Timeline};

use super::mixer::Mixer;

/// An engine shared between a control path and a render path. Every
/// mutation goes through the one lock.
pub type SharedEngine = Arc<Mutex<AudioEngine>>;

/// Lock a shared engine. A poisoned lock reads as a closed context.
pub fn lock(engine: &SharedEngine) -> Result<MutexGuard<'_, AudioEngine>> {
    engine.lock().map_err(|_| EarconError::ContextClosed)
}

#[derive(Debug)]
pub struct AudioEngine {
    config: EngineConfig,
    clock: ClockContext,
    catalog: SoundCatalog,
    lifecycle: NodeLifecycleManager,
    mixer: Mixer,
}

impl AudioEngine {
    /// An engine rendering into a plain buffer, already running.
    pub fn offline(config: EngineConfig) -> Self {
        let config = config.sanitized();
        let clock = ClockContext::offline(config.sample_rate_f64());
        Self::with_clock(config, clock)
    }

    /// An engine for a live `device`, suspended until [`resume`](Self::resume).
    /// `capacity` is the size of the ring between engine and device callback.
    pub fn live(device: impl Into<String>, config: EngineConfig, capacity: usize) -> Result<(Self, LiveOutput)> {
        let config = config.sanitized();
        let (clock, output) = ClockContext::open(device, config.sample_rate_f64(), capacity)?;
        Ok((Self::with_clock(config, clock), output))
    }

    fn with_clock(config: EngineConfig, clock: ClockContext) -> Self {
        AudioEngine {
            mixer: Mixer::new(config.master_gain),
            config,
            clock,
            catalog: SoundCatalog::new(),
            lifecycle: NodeLifecycleManager::new(),
        }
    }

    /// Wrap the engine for sharing between threads.
    pub fn shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &ClockContext {
        &self.clock
    }

    pub fn catalog(&self) -> &SoundCatalog {
        &self.catalog
    }

    pub fn lifecycle(&self) -> &NodeLifecycleManager {
        &self.lifecycle
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn resume(&mut self) -> Result<Resume> {
        self.clock.resume()
    }

    pub fn suspend(&mut self) {
        self.clock.suspend();
    }

    /// Resolve, build, check and schedule a sound, then hand it to the
    /// lifecycle manager. Nothing is registered unless every step succeeds.
    pub fn launch(&mut self, category: &str, overrides: &Overrides) -> Result<InstanceId> {
        if self.clock.state() == ContextState::Closed {
            return Err(EarconError::ContextClosed);
        }
        if self.lifecycle.active() >= self.config.max_instances {
            return Err(EarconError::InstanceLimit(self.config.max_instances));
        }

        let sound = self.catalog.resolve(category, overrides)?;
        let graph = SignalGraph::build(&sound.template, &sound.params, &self.clock)?;
        ValidationRules::check(sound.category, &graph, &sound.events, &sound.params)?;

        let now = self.clock.now();
        let timeline = EnvelopeScheduler::schedule(&graph, &sound.events, now)?;
        let id = self.lifecycle.launch_category(Some(sound.category), graph, timeline);
        tracing::debug!(%id, category = %sound.category, now, "sound launched");
        Ok(id)
    }

    pub fn state(&self, id: InstanceId) -> Option<PlaybackState> {
        self.lifecycle.state(id)
    }

    pub fn timeline(&self, id: InstanceId) -> Option<&Timeline> {
        self.lifecycle.get(id).map(|i| i.timeline())
    }

    pub fn on_completion(&mut self, id: InstanceId, callback: CompletionCallback) -> Result<()> {
        self.lifecycle.on_completion(id, callback)
    }

    /// Fade `id` out from the current clock time. Returns its new end.
    pub fn cancel(&mut self, id: InstanceId) -> Result<f64> {
        let now = self.clock.now();
        self.lifecycle.cancel(id, now)
    }

    /// Release `id`. A sound still playing fades out from the current clock
    /// time and its nodes go once the fade ends.
    pub fn release(&mut self, id: InstanceId) -> Result<bool> {
        let now = self.clock.now();
        self.lifecycle.release(id, now)
    }

    /// Forget released instances. [`render_block`](Self::render_block) also
    /// does this for instances released by the block before it.
    pub fn reap(&mut self) -> usize {
        self.lifecycle.reap()
    }

    /// No instance is waiting to play or playing.
    pub fn is_idle(&self) -> bool {
        self.lifecycle.active() == 0
    }

    /// Render `frames` frames into the sink and advance the clock. A
    /// suspended or closed context renders nothing. Returns the number of
    /// frames written.
    ///
    /// Instances released at the end of one block stay queryable until the
    /// next block starts, then are forgotten.
    pub fn render_block(&mut self, frames: usize) -> usize {
        if !self.clock.is_running() || frames == 0 {
            return 0;
        }
        let reaped = self.lifecycle.reap();
        let start = self.clock.now();
        self.lifecycle.advance(start);

        self.mixer.clear(frames);
        self.lifecycle
            .render_into(self.mixer.buffer_mut(), start, self.clock.sample_rate());
        let block = self.mixer.output();
        self.clock.write(&block);

        let now = self.clock.now();
        self.lifecycle.advance(now);
        let released = self.lifecycle.release_completed();
        tracing::trace!(start, frames, reaped, released = released.len(), "block rendered");
        frames
    }

    /// Samples collected by an offline engine since the last call.
    pub fn take_rendered(&mut self) -> Vec<f32> {
        self.clock.take_rendered()
    }
}

/// Render one sound on a fresh offline engine until it is released.
pub fn render_offline(category: &str, overrides: &Overrides, config: &EngineConfig) -> Result<Vec<f32>> {
    let mut engine = AudioEngine::offline(config.clone());
    engine.launch(category, overrides)?;
    let block = engine.config().block_size;
    while !engine.is_idle() {
        engine.render_block(block);
    }
    Ok(engine.take_rendered())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{CurveKind, FLOOR, ParamKind};

    fn engine() -> AudioEngine {
        AudioEngine::offline(EngineConfig::default())
    }

    #[test]
    fn launch_schedules_from_current_clock() {
        let mut e = engine();
        e.render_block(441);
        let id = e.launch("pop", &Overrides::new()).unwrap();
        let timeline = e.timeline(id).unwrap();
        assert!((timeline.start() - 0.01).abs() < 1e-12);
        assert!(timeline.events().iter().all(|ev| ev.start_time >= 0.01 - 1e-12));
    }

    #[test]
    fn failed_launch_registers_nothing() {
        let mut e = engine();
        assert!(e.launch("beep", &Overrides::new()).is_err());
        assert!(e.launch("click", &Overrides::new().with("loudness", 1.0)).is_err());
        assert!(e.is_idle());
        assert_eq!(e.render_block(128), 128);
        assert!(e.take_rendered().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn instance_limit_enforced() {
        let mut e = AudioEngine::offline(EngineConfig {
            max_instances: 2,
            ..EngineConfig::default()
        });
        e.launch("hover", &Overrides::new()).unwrap();
        e.launch("hover", &Overrides::new()).unwrap();
        assert_eq!(
            e.launch("hover", &Overrides::new()).unwrap_err(),
            EarconError::InstanceLimit(2)
        );
    }

    #[test]
    fn instance_completes_and_releases() {
        let mut e = engine();
        let id = e.launch("hover", &Overrides::new()).unwrap();
        assert_eq!(e.state(id), Some(PlaybackState::Scheduled));
        while !e.is_idle() {
            e.render_block(128);
        }
        assert_eq!(e.state(id), Some(PlaybackState::Released));
        assert!(!e.release(id).unwrap());
        assert_eq!(e.reap(), 1);
    }

    #[test]
    fn suspended_live_engine_renders_nothing() {
        let (mut e, mut out) =
            AudioEngine::live("engine-test-suspended", EngineConfig::default(), 4096).unwrap();
        assert_eq!(e.clock().state(), ContextState::Suspended);
        e.launch("pop", &Overrides::new()).unwrap();
        assert_eq!(e.render_block(128), 0);
        assert_eq!(e.now(), 0.0);

        e.resume().unwrap();
        assert_eq!(e.render_block(128), 128);
        let mut data = [0.0_f32; 128];
        assert_eq!(out.fill(&mut data), 128);
        assert!(data.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn cancel_fades_gain_to_floor() {
        let mut e = engine();
        let id = e.launch("notification", &Overrides::new()).unwrap();
        e.render_block(4410);
        let end = e.cancel(id).unwrap();
        assert!(end < 0.6);

        let timeline = e.timeline(id).unwrap();
        let last_gain = timeline
            .events()
            .iter()
            .filter(|ev| ev.target.param == ParamKind::Gain)
            .last()
            .unwrap();
        assert_eq!(last_gain.end_value, FLOOR);
        assert_eq!(last_gain.curve, CurveKind::Linear);
        assert!(last_gain.duration() > 0.0);

        while !e.is_idle() {
            e.render_block(128);
        }
        assert!(e.now() < 0.2, "cancelled sound ran until {}", e.now());
    }

    #[test]
    fn offline_render_covers_the_sound() {
        let samples = render_offline("success", &Overrides::new(), &EngineConfig::default()).unwrap();
        // Two 120 ms notes with a 50 ms gap.
        assert!(samples.len() as f64 >= 0.29 * 44100.0, "only {} samples", samples.len());
        let peak = samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.05 && peak <= 0.8, "peak {peak}");
    }

    #[test]
    fn finished_instances_do_not_pile_up() {
        let mut e = engine();
        let mut ids = Vec::new();
        for _ in 0..50 {
            ids.push(e.launch("click", &Overrides::new()).unwrap());
            while !e.is_idle() {
                e.render_block(128);
            }
            assert!(e.lifecycle().len() <= 1, "holding {} instances", e.lifecycle().len());
        }
        e.render_block(128);
        assert!(e.lifecycle().is_empty());
        assert_eq!(e.lifecycle().releases(), 50);
        assert!(ids.iter().all(|&id| e.state(id).is_none()));
    }

    #[test]
    fn release_while_playing_fades_without_a_step() {
        let mut e = engine();
        let id = e.launch("notification", &Overrides::new()).unwrap();
        e.render_block(4410);
        let before = e.take_rendered();
        let level = before.iter().rev().take(100).fold(0.0_f32, |m, s| m.max(s.abs()));
        let step_before = before.windows(2).rev().take(100).fold(0.0_f32, |m, w| m.max((w[1] - w[0]).abs()));

        assert!(e.release(id).unwrap());
        assert_eq!(e.state(id), Some(PlaybackState::Rendering));
        while !e.is_idle() {
            e.render_block(128);
        }
        assert_eq!(e.state(id), Some(PlaybackState::Released));

        let after = e.take_rendered();
        let mut joined = vec![before[before.len() - 1]];
        joined.extend_from_slice(&after);
        let worst = joined.windows(2).fold(0.0_f32, |m, w| m.max((w[1] - w[0]).abs()));
        assert!(level > 0.05, "sound too quiet to test: {level}");
        assert!(
            worst <= step_before * 1.5,
            "step of {worst} after release, {step_before} while playing"
        );
        assert!(after.len() as f64 <= 0.03 * 44100.0, "fade ran {} samples", after.len());
    }

    #[test]
    fn shared_engine_locks() {
        let shared = engine().shared();
        let id = lock(&shared).unwrap().launch("toggle", &Overrides::new()).unwrap();
        assert_eq!(lock(&shared).unwrap().state(id), Some(PlaybackState::Scheduled));
    }
}
