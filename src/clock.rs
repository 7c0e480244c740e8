//! The shared audio clock and output sink.
//!
//! One [`ClockContext`] exists per output device. It counts rendered frames
//! (the only notion of "now" the engine has) and owns the sink those frames
//! go to: a plain buffer for offline export, or a ring buffer drained by a
//! live device callback through [`LiveOutput`].

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use serde::{Deserialize, Serialize};

use crate::error::{EarconError, Result};

/// Devices that currently have an open context.
fn open_devices() -> &'static Mutex<HashSet<String>> {
    static OPEN: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    OPEN.get_or_init(|| Mutex::new(HashSet::new()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// Outcome of [`ClockContext::resume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// This call moved the context out of suspension and started output.
    Started,
    /// The context was already running; nothing happened.
    AlreadyRunning,
}

/// Where rendered frames go.
pub enum Sink {
    Offline(Vec<f32>),
    Live(HeapProd<f32>),
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sink::Offline(buf) => f.debug_tuple("Offline").field(&buf.len()).finish(),
            Sink::Live(prod) => f.debug_tuple("Live").field(&prod.occupied_len()).finish(),
        }
    }
}

/// Device-callback end of a live sink.
pub struct LiveOutput {
    consumer: HeapCons<f32>,
    underruns: u64,
}

impl std::fmt::Debug for LiveOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveOutput")
            .field("available", &self.consumer.occupied_len())
            .field("underruns", &self.underruns)
            .finish()
    }
}

impl LiveOutput {
    /// Copy pending frames into `data`, zero-filling whatever is missing.
    /// Returns the number of real frames delivered.
    pub fn fill(&mut self, data: &mut [f32]) -> usize {
        let read = self.consumer.pop_slice(data);
        if read < data.len() {
            data[read..].fill(0.0);
            self.underruns += 1;
        }
        read
    }

    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}

/// Monotonic render clock plus output sink.
#[derive(Debug)]
pub struct ClockContext {
    device: Option<String>,
    sample_rate: f64,
    frames: u64,
    state: ContextState,
    hardware_started: bool,
    dropped_frames: u64,
    sink: Sink,
}

impl ClockContext {
    /// Open the context for a live `device`, starting suspended.
    ///
    /// Fails with [`EarconError::DuplicateContext`] if the device already has
    /// one; callers should share the existing context instead.
    pub fn open(device: impl Into<String>, sample_rate: f64, capacity: usize) -> Result<(Self, LiveOutput)> {
        let device = device.into();
        {
            let mut open = open_devices().lock().map_err(|_| EarconError::ContextClosed)?;
            if !open.insert(device.clone()) {
                return Err(EarconError::DuplicateContext(device));
            }
        }
        tracing::info!(device = %device, sample_rate, "clock context opened");

        let (producer, consumer) = HeapRb::<f32>::new(capacity.max(1)).split();
        let ctx = ClockContext {
            device: Some(device),
            sample_rate,
            frames: 0,
            state: ContextState::Suspended,
            hardware_started: false,
            dropped_frames: 0,
            sink: Sink::Live(producer),
        };
        Ok((ctx, LiveOutput { consumer, underruns: 0 }))
    }

    /// A context rendering into a plain buffer. Offline contexts are not
    /// tied to a device and start running.
    pub fn offline(sample_rate: f64) -> Self {
        ClockContext {
            device: None,
            sample_rate,
            frames: 0,
            state: ContextState::Running,
            hardware_started: false,
            dropped_frames: 0,
            sink: Sink::Offline(Vec::new()),
        }
    }

    /// Current render time in seconds.
    pub fn now(&self) -> f64 {
        self.frames as f64 / self.sample_rate
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.state == ContextState::Running
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.sink, Sink::Offline(_))
    }

    pub fn hardware_started(&self) -> bool {
        self.hardware_started
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Move a suspended context to running. Idempotent.
    pub fn resume(&mut self) -> Result<Resume> {
        match self.state {
            ContextState::Closed => Err(EarconError::ContextClosed),
            ContextState::Running => Ok(Resume::AlreadyRunning),
            ContextState::Suspended => {
                self.state = ContextState::Running;
                if !self.is_offline() {
                    self.hardware_started = true;
                    tracing::info!(device = ?self.device, "hardware output started");
                }
                Ok(Resume::Started)
            }
        }
    }

    pub fn suspend(&mut self) {
        if self.state == ContextState::Running {
            self.state = ContextState::Suspended;
            self.hardware_started = false;
            tracing::debug!(device = ?self.device, "clock context suspended");
        }
    }

    /// Close the context and free its device for a new one.
    pub fn close(&mut self) {
        if self.state == ContextState::Closed {
            return;
        }
        self.state = ContextState::Closed;
        self.hardware_started = false;
        if let Some(device) = &self.device {
            if let Ok(mut open) = open_devices().lock() {
                open.remove(device);
            }
            tracing::info!(device = %device, "clock context closed");
        }
    }

    /// Hand a rendered block to the sink and advance the clock by its length.
    pub(crate) fn write(&mut self, block: &[f32]) {
        match &mut self.sink {
            Sink::Offline(buf) => buf.extend_from_slice(block),
            Sink::Live(prod) => {
                let written = prod.push_slice(block);
                if written < block.len() {
                    let dropped = (block.len() - written) as u64;
                    self.dropped_frames += dropped;
                    tracing::warn!(dropped, "live sink full, frames dropped");
                }
            }
        }
        self.frames += block.len() as u64;
    }

    /// Take everything an offline sink has collected so far.
    pub fn take_rendered(&mut self) -> Vec<f32> {
        match &mut self.sink {
            Sink::Offline(buf) => std::mem::take(buf),
            Sink::Live(_) => Vec::new(),
        }
    }

    /// Frames of space left in a live sink.
    pub fn vacant(&self) -> usize {
        match &self.sink {
            Sink::Offline(_) => usize::MAX,
            Sink::Live(prod) => prod.vacant_len(),
        }
    }
}

impl Drop for ClockContext {
    fn drop(&mut self) {
        self.close();
    }
}
