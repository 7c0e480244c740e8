//! Patch: The runtime form of one signal graph.
//!
//! A `Patch` owns one processor per graph node plus its automation lanes
//! and renders the graph sample by sample. Nodes are evaluated in index
//! order; graph building guarantees every edge points forward, so each
//! node's inputs are ready by the time it runs.

use crate::automation::{AutomationEvent, ParamKind, ParamTarget};
use crate::graph::{NodeId, Port, SignalGraph, SignalNode};
use crate::scheduler::Timeline;

use super::filter::BiquadFilter;
use super::noise::NoiseBuffer;
use super::oscillator::Oscillator;

/// Per-node DSP state.
#[derive(Debug, Clone)]
enum Processor {
    Oscillator {
        osc: Oscillator,
        frequency: f64,
    },
    Noise(NoiseBuffer),
    Filter {
        filter: BiquadFilter,
    },
    Gain {
        level: f64,
    },
    Fm {
        modulator: Oscillator,
        carrier: Oscillator,
        carrier_freq: f64,
        modulator_freq: f64,
        depth: f64,
    },
}

impl Processor {
    fn new(node: &SignalNode, sample_rate: f64) -> Self {
        match *node {
            SignalNode::Oscillator { waveform, frequency } => Processor::Oscillator {
                osc: Oscillator::new(waveform, sample_rate),
                frequency,
            },
            // Fresh buffer per instance; never shared with another play.
            SignalNode::NoiseSource { duration } => Processor::Noise(NoiseBuffer::new(duration, sample_rate)),
            SignalNode::BiquadFilter { kind, cutoff, q } => Processor::Filter {
                filter: BiquadFilter::new(kind, cutoff, q, sample_rate),
            },
            SignalNode::Gain { level } => Processor::Gain { level },
            SignalNode::FmPair {
                waveform,
                carrier_freq,
                modulator_freq,
                modulation_depth,
            } => Processor::Fm {
                modulator: Oscillator::new(waveform, sample_rate),
                carrier: Oscillator::new(waveform, sample_rate),
                carrier_freq,
                modulator_freq,
                depth: modulation_depth,
            },
        }
    }
}

/// Automation for one parameter, walked forward as time advances.
#[derive(Debug, Clone)]
struct Lane {
    target: ParamTarget,
    events: Vec<AutomationEvent>,
    /// Index of the last event that has started.
    current: Option<usize>,
}

impl Lane {
    fn value_at(&mut self, time: f64) -> Option<f64> {
        let mut next = self.current.map_or(0, |i| i + 1);
        while next < self.events.len() && self.events[next].start_time <= time {
            self.current = Some(next);
            next += 1;
        }
        self.current.map(|i| self.events[i].value_at(time))
    }
}

fn automated(lanes: &mut [Lane], target: ParamTarget, time: f64, fallback: f64) -> f64 {
    lanes
        .iter_mut()
        .find(|l| l.target == target)
        .and_then(|l| l.value_at(time))
        .unwrap_or(fallback)
}

/// Active window of a source node.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: f64,
    stop: f64,
}

/// One instance's graph, ready to render.
#[derive(Debug, Clone)]
pub struct Patch {
    processors: Vec<Processor>,
    audio_inputs: Vec<Vec<usize>>,
    freq_inputs: Vec<Vec<usize>>,
    outputs: Vec<usize>,
    windows: Vec<Option<Window>>,
    lanes: Vec<Lane>,
    values: Vec<f64>,
    connected: bool,
}

impl Patch {
    /// Allocate processors for `graph` and load `timeline`.
    pub fn new(graph: &SignalGraph, timeline: &Timeline) -> Self {
        let len = graph.len();
        let sample_rate = graph.sample_rate();
        let mut audio_inputs = vec![Vec::new(); len];
        let mut freq_inputs = vec![Vec::new(); len];
        for c in graph.connections() {
            match c.port {
                Port::Audio => audio_inputs[c.to.0].push(c.from.0),
                Port::Frequency => freq_inputs[c.to.0].push(c.from.0),
            }
        }

        let mut patch = Patch {
            processors: graph.nodes().iter().map(|n| Processor::new(n, sample_rate)).collect(),
            audio_inputs,
            freq_inputs,
            outputs: graph.outputs().iter().map(|id| id.0).collect(),
            windows: vec![None; len],
            lanes: Vec::new(),
            values: vec![0.0; len],
            connected: true,
        };
        patch.load(graph, timeline);
        patch
    }

    /// Replace the automation and stop times, keeping DSP state. Used when a
    /// running instance is cancelled.
    pub fn load(&mut self, graph: &SignalGraph, timeline: &Timeline) {
        for id in graph.sources() {
            self.windows[id.0] = Some(Window {
                start: timeline.start(),
                stop: timeline.stop_time(id).unwrap_or(timeline.start()),
            });
        }

        let mut lanes: Vec<Lane> = Vec::new();
        for e in timeline.events() {
            match lanes.iter_mut().find(|l| l.target == e.target) {
                Some(lane) => lane.events.push(*e),
                None => lanes.push(Lane {
                    target: e.target,
                    events: vec![*e],
                    current: None,
                }),
            }
        }
        self.lanes = lanes;
    }

    /// Number of nodes still held.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Render one sample at absolute clock `time`.
    pub fn next_sample(&mut self, time: f64) -> f64 {
        if !self.connected {
            return 0.0;
        }
        for i in 0..self.processors.len() {
            let id = NodeId(i);
            let audio_in: f64 = self.audio_inputs[i].iter().map(|&j| self.values[j]).sum();
            let freq_in: f64 = self.freq_inputs[i].iter().map(|&j| self.values[j]).sum();
            let active = self.windows[i].is_none_or(|w| time >= w.start && time < w.stop);

            let lanes = self.lanes.as_mut_slice();
            let out = match &mut self.processors[i] {
                _ if !active => 0.0,
                Processor::Oscillator { osc, frequency } => {
                    let f = automated(lanes, ParamTarget::frequency(id), time, *frequency);
                    osc.tick(f + freq_in)
                }
                Processor::Noise(buffer) => buffer.next_sample(),
                Processor::Filter { filter } => {
                    let cutoff = automated(lanes, ParamTarget::cutoff(id), time, filter.cutoff());
                    let q = automated(lanes, ParamTarget::new(id, ParamKind::Q), time, filter.q());
                    filter.set_params(cutoff, q);
                    filter.process(audio_in)
                }
                Processor::Gain { level } => audio_in * automated(lanes, ParamTarget::gain(id), time, *level),
                Processor::Fm {
                    modulator,
                    carrier,
                    carrier_freq,
                    modulator_freq,
                    depth,
                } => {
                    let mf = automated(lanes, ParamTarget::new(id, ParamKind::ModFrequency), time, *modulator_freq);
                    let d = automated(lanes, ParamTarget::new(id, ParamKind::ModDepth), time, *depth);
                    let cf = automated(lanes, ParamTarget::frequency(id), time, *carrier_freq);
                    let m = modulator.tick(mf);
                    carrier.tick(cf + m * d + freq_in)
                }
            };
            self.values[i] = out;
        }
        self.outputs.iter().map(|&o| self.values[o]).sum()
    }

    /// Disconnect every node and free its buffers. Returns `true` only for
    /// the call that actually tore the patch down.
    pub fn disconnect(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        self.connected = false;
        self.processors.clear();
        self.lanes.clear();
        self.values.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::FLOOR;
    use crate::catalog::{Overrides, SoundCatalog};
    use crate::scheduler::EnvelopeScheduler;

    const SR: f64 = 44100.0;

    fn patch_for(category: &str) -> (Patch, Timeline) {
        let sound = SoundCatalog::new().resolve(category, &Overrides::new()).unwrap();
        let graph = SignalGraph::build_at_rate(&sound.template, &sound.params, SR).unwrap();
        let timeline = EnvelopeScheduler::schedule(&graph, &sound.events, 0.0).unwrap();
        (Patch::new(&graph, &timeline), timeline)
    }

    fn render(patch: &mut Patch, seconds: f64) -> Vec<f64> {
        (0..(seconds * SR) as usize)
            .map(|i| patch.next_sample(i as f64 / SR))
            .collect()
    }

    #[test]
    fn hover_is_audible_then_silent() {
        let (mut patch, timeline) = patch_for("hover");
        let out = render(&mut patch, timeline.end() + 0.02);
        let peak = out.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        assert!(peak > 0.01, "hover too quiet: {peak}");
        assert!(peak <= 0.2, "hover above its volume bound: {peak}");
        let tail = (timeline.end() * SR) as usize + 1;
        assert!(out[tail..].iter().all(|&s| s == 0.0), "sources must be silent after stop");
    }

    #[test]
    fn fade_ends_near_floor() {
        let (mut patch, timeline) = patch_for("pop");
        let out = render(&mut patch, timeline.end());
        let stop = ((timeline.end() - 0.002) * SR) as usize;
        assert!(out[stop].abs() <= FLOOR * 2.0, "last samples before stop: {}", out[stop]);
    }

    #[test]
    fn disconnect_happens_once() {
        let (mut patch, _) = patch_for("click");
        assert!(patch.disconnect());
        assert!(!patch.disconnect());
        assert!(patch.is_empty());
        assert_eq!(patch.next_sample(0.0), 0.0);
    }

    #[test]
    fn noise_buffers_differ_between_instances() {
        let (a, _) = patch_for("whoosh");
        let (b, _) = patch_for("whoosh");
        let noise = |p: &Patch| match &p.processors[0] {
            Processor::Noise(buffer) => buffer.samples().to_vec(),
            other => panic!("expected noise, got {other:?}"),
        };
        assert_ne!(noise(&a), noise(&b));
    }
}
