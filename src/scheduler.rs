//! Envelope scheduling: turns a sound's relative automation plan into an
//! absolute, validated timeline.
//!
//! Three rules keep playback free of clicks:
//!
//! - every ramp starts from the value its parameter already holds, so an
//!   earlier set-value or ramp of the same parameter must lead into it;
//! - exponential curves never start from or aim at zero; anything below
//!   [`FLOOR`] is raised to it;
//! - a source may not stop until [`STOP_PADDING`] after the last gain event
//!   its signal passes through.
//!
//! All times in a plan are offsets from the start of the sound. `schedule`
//! adds a single clock reading to all of them, so events of one instance can
//! never drift apart however late the control path runs.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::automation::{AutomationEvent, CurveKind, FLOOR, LINEAR_MAX, ParamKind, ParamTarget, StopEvent};
use crate::error::{EarconError, Result};
use crate::graph::{MAX_GAIN, NodeId, Q_MAX, Q_MIN, SignalGraph, SignalNode};

/// Minimum time between a source's last gain event and its stop.
pub const STOP_PADDING: f64 = 0.010;

/// Length of the fade applied when an instance is cancelled.
pub const CANCEL_WINDOW: f64 = 0.015;

/// Tolerance for comparing scheduled times.
const TIME_EPSILON: f64 = 1e-9;

/// Relative tolerance for comparing a ramp's start with the held value.
const VALUE_EPSILON: f64 = 1e-9;

/// Automation and stops for one sound, relative to its start.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPlan {
    pub automation: Vec<AutomationEvent>,
    pub stops: Vec<StopEvent>,
}

impl EventPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: AutomationEvent) -> &mut Self {
        self.automation.push(event);
        self
    }

    pub fn stop(&mut self, node: NodeId, time: f64) -> &mut Self {
        self.stops.push(StopEvent::new(node, time));
        self
    }

    /// Time of the last automation point touching `target`.
    pub fn last_time(&self, target: ParamTarget) -> Option<f64> {
        self.automation
            .iter()
            .filter(|e| e.target == target)
            .map(|e| e.end_time)
            .reduce(f64::max)
    }
}

/// A validated plan on the absolute clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    start: f64,
    events: Vec<AutomationEvent>,
    stops: Vec<StopEvent>,
}

impl Timeline {
    /// The clock reading every event is relative to.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Events in application order.
    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    pub fn stops(&self) -> &[StopEvent] {
        &self.stops
    }

    /// Time of the last stop, when the instance falls silent for good.
    pub fn end(&self) -> f64 {
        self.stops.iter().map(|s| s.time).fold(self.start, f64::max)
    }

    pub fn stop_time(&self, node: NodeId) -> Option<f64> {
        self.stops.iter().find(|s| s.node == node).map(|s| s.time)
    }

    pub fn events_for(&self, target: ParamTarget) -> impl Iterator<Item = &AutomationEvent> + '_ {
        self.events.iter().filter(move |e| e.target == target)
    }

    /// Automated value of `target` at `time`, if anything has set it yet.
    pub fn value_at(&self, target: ParamTarget, time: f64) -> Option<f64> {
        self.events_for(target)
            .filter(|e| e.start_time <= time)
            .last()
            .map(|e| e.value_at(time))
    }

    /// The same timeline relative to its own start, for comparing plans
    /// launched at different times.
    pub fn relative(&self) -> Timeline {
        Timeline {
            start: 0.0,
            events: self.events.iter().map(|e| e.shifted(-self.start)).collect(),
            stops: self
                .stops
                .iter()
                .map(|s| StopEvent::new(s.node, s.time - self.start))
                .collect(),
        }
    }
}

/// Validates and anchors automation plans against a graph.
pub struct EnvelopeScheduler;

impl EnvelopeScheduler {
    /// Validate `plan` against `graph` and place it at clock time `start`.
    pub fn schedule(graph: &SignalGraph, plan: &EventPlan, start: f64) -> Result<Timeline> {
        let mut events: Vec<AutomationEvent> = plan.automation.iter().map(normalize).collect();
        sort_events(&mut events);
        let mut stops = plan.stops.clone();
        stops.sort_by(|a, b| a.node.cmp(&b.node));

        check(graph, &events, &stops)?;

        let timeline = Timeline {
            start,
            events: events.into_iter().map(|e| e.shifted(start)).collect(),
            stops: stops
                .into_iter()
                .map(|s| StopEvent::new(s.node, s.time + start))
                .collect(),
        };
        tracing::debug!(
            start,
            events = timeline.events.len(),
            end = timeline.end(),
            "timeline scheduled"
        );
        Ok(timeline)
    }

    /// Rewrite `timeline` so the instance fades out from `now`.
    ///
    /// Every gain fed by a still-running source is anchored at its current
    /// value and ramped to [`FLOOR`] over [`CANCEL_WINDOW`]; those sources
    /// stop once the fade has had its padding. Other parameters are frozen at
    /// their current value. A timeline that would end within that window
    /// anyway is left as it is. Returns the new end time.
    pub fn cancel(graph: &SignalGraph, timeline: &mut Timeline, now: f64) -> Result<f64> {
        let fade_end = now + CANCEL_WINDOW;
        let stop_at = fade_end + STOP_PADDING;
        if timeline.end() <= stop_at {
            return Ok(timeline.end());
        }

        let running: Vec<NodeId> = timeline
            .stops
            .iter()
            .filter(|s| s.time > now)
            .map(|s| s.node)
            .collect();
        let fading: BTreeSet<NodeId> = running
            .iter()
            .flat_map(|&src| graph.downstream_gains(src))
            .collect();

        let mut anchors: BTreeMap<ParamTarget, f64> = BTreeMap::new();
        for &gain in &fading {
            let target = ParamTarget::gain(gain);
            let level = match graph.node(gain) {
                Some(SignalNode::Gain { level }) => *level,
                _ => 0.0,
            };
            anchors.insert(target, timeline.value_at(target, now).unwrap_or(level));
        }
        for e in &timeline.events {
            if e.target.param != ParamKind::Gain && e.start_time <= now && e.end_time > now {
                anchors.insert(e.target, e.value_at(now));
            }
        }

        timeline
            .events
            .retain(|e| e.end_time <= now || !anchors.contains_key(&e.target));
        for (&target, &value) in &anchors {
            if target.param == ParamKind::Gain {
                let from = value.clamp(0.0, MAX_GAIN);
                timeline.events.push(AutomationEvent::set(target, now, from));
                timeline
                    .events
                    .push(AutomationEvent::linear(target, now, from, fade_end, FLOOR));
            } else {
                timeline.events.push(AutomationEvent::set(target, now, value));
            }
        }
        sort_events(&mut timeline.events);

        for stop in &mut timeline.stops {
            if running.contains(&stop.node) {
                stop.time = stop_at;
            }
        }

        let relative = timeline.relative();
        check(graph, &relative.events, &relative.stops)?;
        tracing::debug!(now, end = timeline.end(), "timeline cancelled");
        Ok(timeline.end())
    }
}

/// Apply the curve policy and the exponential floor.
fn normalize(event: &AutomationEvent) -> AutomationEvent {
    let mut e = *event;
    if e.curve == CurveKind::Linear && e.duration() >= LINEAR_MAX {
        tracing::warn!(param = %e.target, duration = e.duration(), "linear ramp too long, using exponential");
        e.curve = CurveKind::Exponential;
    }
    if e.curve == CurveKind::Exponential {
        e.start_value = e.start_value.max(FLOOR);
        e.end_value = e.end_value.max(FLOOR);
    }
    e
}

/// Order by start time, set-values before ramps at the same instant.
fn sort_events(events: &mut [AutomationEvent]) {
    events.sort_by(|a, b| {
        a.start_time
            .partial_cmp(&b.start_time)
            .unwrap_or(Ordering::Equal)
            .then(a.is_ramp().cmp(&b.is_ramp()))
    });
}

fn check(graph: &SignalGraph, events: &[AutomationEvent], stops: &[StopEvent]) -> Result<()> {
    // Last event seen per parameter, in application order.
    let mut held: HashMap<ParamTarget, &AutomationEvent> = HashMap::new();
    for e in events {
        check_target(graph, e)?;
        if !(e.start_time.is_finite() && e.end_time.is_finite()) || e.end_time < e.start_time {
            return Err(EarconError::InvalidTopology(format!(
                "event on {} has an invalid time span",
                e.target
            )));
        }
        if e.target.param == ParamKind::Gain {
            for level in [e.start_value, e.end_value] {
                if !(0.0..=MAX_GAIN).contains(&level) {
                    return Err(EarconError::VolumeCeilingExceeded { node: e.target.node, level });
                }
            }
        }
        if e.target.param == ParamKind::Q {
            for q in [e.start_value, e.end_value] {
                if !(Q_MIN..=Q_MAX).contains(&q) {
                    return Err(EarconError::UnstableFilterQ { node: e.target.node, q });
                }
            }
        }
        if e.curve == CurveKind::Exponential && (e.start_value <= 0.0 || e.end_value <= 0.0) {
            return Err(EarconError::InvalidTopology(format!(
                "exponential ramp on {} reaches zero",
                e.target
            )));
        }
        if e.is_ramp() && !held.get(&e.target).is_some_and(|prev| continues(prev, e)) {
            return Err(EarconError::UnanchoredRamp {
                target: e.target,
                time: e.start_time,
            });
        }
        held.insert(e.target, e);
    }

    for source in graph.sources() {
        let Some(stop) = stops.iter().find(|s| s.node == source) else {
            return Err(EarconError::InvalidTopology(format!("{source} is never stopped")));
        };
        let last_gain = graph
            .downstream_gains(source)
            .into_iter()
            .filter_map(|g| {
                events
                    .iter()
                    .filter(|e| e.target == ParamTarget::gain(g))
                    .map(|e| e.end_time)
                    .reduce(f64::max)
            })
            .reduce(f64::max);
        if let Some(last) = last_gain {
            let earliest = last + STOP_PADDING;
            if stop.time + TIME_EPSILON < earliest {
                return Err(EarconError::PrematureStop {
                    node: source,
                    stop: stop.time,
                    earliest,
                });
            }
        }
    }
    if let Some(bad) = stops.iter().find(|s| !graph.node(s.node).is_some_and(SignalNode::is_source)) {
        return Err(EarconError::InvalidTopology(format!("{} is not a source and cannot stop", bad.node)));
    }
    Ok(())
}

/// Whether `ramp` starts from the value `prev` leaves its parameter at.
/// An exponential ramp may lift a value below [`FLOOR`] up to it.
fn continues(prev: &AutomationEvent, ramp: &AutomationEvent) -> bool {
    let mut from = prev.value_at(ramp.start_time);
    if ramp.curve == CurveKind::Exponential {
        from = from.max(FLOOR);
    }
    let scale = from.abs().max(ramp.start_value.abs()).max(1.0);
    (from - ramp.start_value).abs() <= VALUE_EPSILON * scale
}

fn check_target(graph: &SignalGraph, e: &AutomationEvent) -> Result<()> {
    let node = graph.node(e.target.node).ok_or_else(|| {
        EarconError::InvalidTopology(format!("automation targets missing {}", e.target.node))
    })?;
    let ok = match e.target.param {
        ParamKind::Gain => matches!(node, SignalNode::Gain { .. }),
        ParamKind::Frequency => node.is_oscillator(),
        ParamKind::Cutoff | ParamKind::Q => matches!(node, SignalNode::BiquadFilter { .. }),
        ParamKind::ModDepth | ParamKind::ModFrequency => matches!(node, SignalNode::FmPair { .. }),
    };
    if ok {
        Ok(())
    } else {
        Err(EarconError::InvalidTopology(format!(
            "{} has no parameter '{}'",
            node.kind_name(),
            e.target.param.as_str()
        )))
    }
}
