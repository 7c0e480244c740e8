//! Signal graphs: typed nodes, their connections, and build-time validation.
//!
//! A recipe describes its topology as a [`GraphTemplate`] whose numeric
//! fields may refer to recipe parameters by name. [`SignalGraph::build`]
//! binds those names against resolved parameters, checks every node against
//! the stability and loudness limits, and checks the wiring before anything
//! can reach the sink.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::BoundParams;
use crate::clock::ClockContext;
use crate::dsp::filter::FilterKind;
use crate::dsp::oscillator::Waveform;
use crate::error::{EarconError, Result};

/// Highest level any gain may be set or automated to.
pub const MAX_GAIN: f64 = 0.8;

/// Stable filter resonance range. Above the top the biquad self-oscillates.
pub const Q_MIN: f64 = 0.5;
pub const Q_MAX: f64 = 15.0;

/// Index of a node inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A numeric field in a template: a literal, a recipe parameter times a
/// constant factor, or the product of two parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    Fixed(f64),
    Param { name: &'static str, scale: f64 },
    Product(&'static str, &'static str),
}

impl Value {
    pub fn param(name: &'static str) -> Self {
        Value::Param { name, scale: 1.0 }
    }

    pub fn scaled(name: &'static str, scale: f64) -> Self {
        Value::Param { name, scale }
    }

    fn bind(&self, params: &BoundParams) -> Result<f64> {
        let lookup = |name: &str| {
            params.get(name).ok_or_else(|| {
                EarconError::InvalidTopology(format!("template refers to unbound parameter '{name}'"))
            })
        };
        let v = match *self {
            Value::Fixed(v) => v,
            Value::Param { name, scale } => lookup(name)? * scale,
            Value::Product(a, b) => lookup(a)? * lookup(b)?,
        };
        if !v.is_finite() {
            return Err(EarconError::InvalidTopology(format!("non-finite value {v}")));
        }
        Ok(v)
    }
}

/// Node description with unbound values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeTemplate {
    Oscillator { waveform: Waveform, frequency: Value },
    NoiseSource { duration: Value },
    BiquadFilter { kind: FilterKind, cutoff: Value, q: Value },
    Gain { level: Value },
    FmPair { waveform: Waveform, carrier: Value, modulator: Value, depth: Value },
}

/// Which input of the destination node a connection feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Port {
    /// Audio input, summed with other audio inputs.
    Audio,
    /// Added to the destination oscillator's frequency, in Hz.
    Frequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
    pub port: Port,
}

/// Topology of a sound before parameters are bound.
///
/// Nodes must be added in processing order: every connection points from an
/// earlier node to a later one, which keeps the graph acyclic by construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphTemplate {
    pub nodes: Vec<NodeTemplate>,
    pub connections: Vec<Connection>,
    /// Nodes whose output goes to the sink.
    pub outputs: Vec<NodeId>,
}

impl GraphTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: NodeTemplate) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        self.connections.push(Connection { from, to, port: Port::Audio });
    }

    pub fn modulate(&mut self, from: NodeId, to: NodeId) {
        self.connections.push(Connection { from, to, port: Port::Frequency });
    }

    pub fn to_sink(&mut self, node: NodeId) {
        self.outputs.push(node);
    }

    /// Connect `nodes` in series and send the last one to the sink.
    pub fn chain(&mut self, nodes: &[NodeId]) {
        for pair in nodes.windows(2) {
            self.connect(pair[0], pair[1]);
        }
        if let Some(&last) = nodes.last() {
            self.to_sink(last);
        }
    }
}

/// A node with bound values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SignalNode {
    Oscillator {
        waveform: Waveform,
        frequency: f64,
    },
    NoiseSource {
        duration: f64,
    },
    BiquadFilter {
        kind: FilterKind,
        cutoff: f64,
        q: f64,
    },
    Gain {
        level: f64,
    },
    /// A modulator oscillator feeding the carrier's frequency. Only the
    /// carrier reaches the node's output.
    FmPair {
        waveform: Waveform,
        carrier_freq: f64,
        modulator_freq: f64,
        modulation_depth: f64,
    },
}

impl SignalNode {
    /// Nodes that generate signal and must be explicitly stopped.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            SignalNode::Oscillator { .. } | SignalNode::NoiseSource { .. } | SignalNode::FmPair { .. }
        )
    }

    pub fn is_oscillator(&self) -> bool {
        matches!(self, SignalNode::Oscillator { .. } | SignalNode::FmPair { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SignalNode::Oscillator { .. } => "oscillator",
            SignalNode::NoiseSource { .. } => "noise",
            SignalNode::BiquadFilter { .. } => "filter",
            SignalNode::Gain { .. } => "gain",
            SignalNode::FmPair { .. } => "fmPair",
        }
    }
}

/// A validated graph ready for scheduling.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalGraph {
    nodes: Vec<SignalNode>,
    connections: Vec<Connection>,
    outputs: Vec<NodeId>,
    sample_rate: f64,
}

impl SignalGraph {
    /// Bind `template` against `params` at the clock's sample rate.
    pub fn build(template: &GraphTemplate, params: &BoundParams, clock: &ClockContext) -> Result<Self> {
        Self::build_at_rate(template, params, clock.sample_rate())
    }

    pub fn build_at_rate(template: &GraphTemplate, params: &BoundParams, sample_rate: f64) -> Result<Self> {
        let mut nodes = Vec::with_capacity(template.nodes.len());
        for (i, t) in template.nodes.iter().enumerate() {
            let id = NodeId(i);
            let node = bind_node(t, params)?;
            check_node_limits(id, &node)?;
            nodes.push(node);
        }

        let graph = SignalGraph {
            nodes,
            connections: template.connections.clone(),
            outputs: template.outputs.clone(),
            sample_rate,
        };
        graph.check_topology()?;
        Ok(graph)
    }

    pub fn nodes(&self) -> &[SignalNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&SignalNode> {
        self.nodes.get(id.0)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of nodes that must be stopped.
    pub fn sources(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_source())
            .map(|(i, _)| NodeId(i))
    }

    /// Nodes feeding `id` through `port`.
    pub fn inputs_of(&self, id: NodeId, port: Port) -> impl Iterator<Item = NodeId> + '_ {
        self.connections
            .iter()
            .filter(move |c| c.to == id && c.port == port)
            .map(|c| c.from)
    }

    /// Gain nodes that `id`'s audio passes through on its way to the sink.
    pub fn downstream_gains(&self, id: NodeId) -> Vec<NodeId> {
        self.reachable(id)
            .into_iter()
            .filter(|n| matches!(self.nodes[n.0], SignalNode::Gain { .. }))
            .collect()
    }

    /// Nodes reachable from `id` along audio connections, `id` included.
    fn reachable(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([id]);
        let mut out = Vec::new();
        while let Some(n) = queue.pop_front() {
            if n.0 >= seen.len() || seen[n.0] {
                continue;
            }
            seen[n.0] = true;
            out.push(n);
            for c in &self.connections {
                if c.from == n && c.port == Port::Audio {
                    queue.push_back(c.to);
                }
            }
        }
        out
    }

    fn reaches_sink(&self, id: NodeId) -> bool {
        self.reachable(id).iter().any(|n| self.outputs.contains(n))
    }

    fn check_topology(&self) -> Result<()> {
        let len = self.nodes.len();
        if self.outputs.is_empty() {
            return Err(EarconError::InvalidTopology("graph has no output to the sink".into()));
        }
        if let Some(bad) = self.outputs.iter().find(|o| o.0 >= len) {
            return Err(EarconError::InvalidTopology(format!("output {bad} does not exist")));
        }

        for c in &self.connections {
            if c.from.0 >= len || c.to.0 >= len {
                return Err(EarconError::InvalidTopology(format!(
                    "connection {} -> {} refers to a missing node",
                    c.from, c.to
                )));
            }
            if c.from >= c.to {
                return Err(EarconError::InvalidTopology(format!(
                    "connection {} -> {} does not point forward",
                    c.from, c.to
                )));
            }
            let (src, dst) = (&self.nodes[c.from.0], &self.nodes[c.to.0]);
            match c.port {
                Port::Audio if dst.is_source() => {
                    return Err(EarconError::InvalidTopology(format!(
                        "{} is a {} and takes no audio input",
                        c.to,
                        dst.kind_name()
                    )));
                }
                Port::Frequency if !src.is_oscillator() || !dst.is_oscillator() => {
                    return Err(EarconError::InvalidTopology(format!(
                        "frequency modulation {} -> {} must join two oscillators",
                        c.from, c.to
                    )));
                }
                _ => {}
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            let id = NodeId(i);
            let modulates = self.connections.iter().any(|c| c.from == id && c.port == Port::Frequency);
            if modulates {
                if self.reaches_sink(id) {
                    return Err(EarconError::InvalidTopology(format!(
                        "modulator {id} must not also reach the sink"
                    )));
                }
            } else if node.is_source() && !self.reaches_sink(id) {
                return Err(EarconError::InvalidTopology(format!("{id} never reaches the sink")));
            }
        }
        Ok(())
    }
}

fn bind_node(t: &NodeTemplate, params: &BoundParams) -> Result<SignalNode> {
    Ok(match t {
        NodeTemplate::Oscillator { waveform, frequency } => SignalNode::Oscillator {
            waveform: *waveform,
            frequency: frequency.bind(params)?,
        },
        NodeTemplate::NoiseSource { duration } => SignalNode::NoiseSource {
            duration: duration.bind(params)?.max(0.0),
        },
        NodeTemplate::BiquadFilter { kind, cutoff, q } => SignalNode::BiquadFilter {
            kind: *kind,
            cutoff: cutoff.bind(params)?,
            q: q.bind(params)?,
        },
        NodeTemplate::Gain { level } => SignalNode::Gain {
            level: level.bind(params)?,
        },
        NodeTemplate::FmPair {
            waveform,
            carrier,
            modulator,
            depth,
        } => SignalNode::FmPair {
            waveform: *waveform,
            carrier_freq: carrier.bind(params)?,
            modulator_freq: modulator.bind(params)?,
            modulation_depth: depth.bind(params)?,
        },
    })
}

fn check_node_limits(id: NodeId, node: &SignalNode) -> Result<()> {
    match *node {
        SignalNode::BiquadFilter { q, .. } if !(Q_MIN..=Q_MAX).contains(&q) => {
            Err(EarconError::UnstableFilterQ { node: id, q })
        }
        SignalNode::Gain { level } if !(0.0..=MAX_GAIN).contains(&level) => {
            Err(EarconError::VolumeCeilingExceeded { node: id, level })
        }
        _ => Ok(()),
    }
}
