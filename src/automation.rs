//! Parameter automation: time-stamped set-value and ramp events.
//!
//! Events carry both endpoints explicitly, so a timeline can be evaluated at
//! any instant without replaying history. Times are seconds; before
//! scheduling they are offsets from the start of a sound, afterwards they are
//! absolute clock times.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::NodeId;

/// Smallest value an exponential curve may start from or reach.
pub const FLOOR: f64 = 0.001;

/// Transitions shorter than this may use a linear curve.
pub const LINEAR_MAX: f64 = 0.050;

/// Automatable parameter of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamKind {
    /// Gain node level.
    Gain,
    /// Oscillator (or FM carrier) frequency in Hz.
    Frequency,
    /// Filter cutoff / center frequency in Hz.
    Cutoff,
    /// Filter resonance.
    Q,
    /// FM modulator depth in Hz.
    ModDepth,
    /// FM modulator frequency in Hz.
    ModFrequency,
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Gain => "gain",
            ParamKind::Frequency => "frequency",
            ParamKind::Cutoff => "cutoff",
            ParamKind::Q => "q",
            ParamKind::ModDepth => "modDepth",
            ParamKind::ModFrequency => "modFrequency",
        }
    }
}

/// One parameter of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamTarget {
    pub node: NodeId,
    pub param: ParamKind,
}

impl ParamTarget {
    pub fn new(node: NodeId, param: ParamKind) -> Self {
        ParamTarget { node, param }
    }

    pub fn gain(node: NodeId) -> Self {
        Self::new(node, ParamKind::Gain)
    }

    pub fn frequency(node: NodeId) -> Self {
        Self::new(node, ParamKind::Frequency)
    }

    pub fn cutoff(node: NodeId) -> Self {
        Self::new(node, ParamKind::Cutoff)
    }
}

impl fmt::Display for ParamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.param.as_str())
    }
}

/// Shape of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CurveKind {
    /// Jump to the value at `start_time`.
    Step,
    Linear,
    Exponential,
}

/// A single automation event.
///
/// A `Step` has `start_time == end_time` and `start_value == end_value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationEvent {
    pub target: ParamTarget,
    pub start_time: f64,
    pub start_value: f64,
    pub end_time: f64,
    pub end_value: f64,
    pub curve: CurveKind,
}

impl AutomationEvent {
    /// Step-set `target` to `value` at `time`.
    pub fn set(target: ParamTarget, time: f64, value: f64) -> Self {
        AutomationEvent {
            target,
            start_time: time,
            start_value: value,
            end_time: time,
            end_value: value,
            curve: CurveKind::Step,
        }
    }

    pub fn linear(target: ParamTarget, t0: f64, v0: f64, t1: f64, v1: f64) -> Self {
        AutomationEvent {
            target,
            start_time: t0,
            start_value: v0,
            end_time: t1,
            end_value: v1,
            curve: CurveKind::Linear,
        }
    }

    pub fn exponential(target: ParamTarget, t0: f64, v0: f64, t1: f64, v1: f64) -> Self {
        AutomationEvent {
            target,
            start_time: t0,
            start_value: v0,
            end_time: t1,
            end_value: v1,
            curve: CurveKind::Exponential,
        }
    }

    /// Ramp using the default curve for its length: linear below
    /// [`LINEAR_MAX`], exponential otherwise.
    pub fn ramp(target: ParamTarget, t0: f64, v0: f64, t1: f64, v1: f64) -> Self {
        AutomationEvent {
            target,
            start_time: t0,
            start_value: v0,
            end_time: t1,
            end_value: v1,
            curve: curve_for(t1 - t0),
        }
    }

    pub fn is_ramp(&self) -> bool {
        self.curve != CurveKind::Step
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// The same event moved `offset` seconds later.
    pub fn shifted(mut self, offset: f64) -> Self {
        self.start_time += offset;
        self.end_time += offset;
        self
    }

    /// Value of the curve at `time`, holding its endpoints outside its span.
    pub fn value_at(&self, time: f64) -> f64 {
        if time <= self.start_time {
            return if self.curve == CurveKind::Step {
                self.end_value
            } else {
                self.start_value
            };
        }
        if time >= self.end_time || self.duration() <= 0.0 {
            return self.end_value;
        }
        let frac = (time - self.start_time) / self.duration();
        match self.curve {
            CurveKind::Step => self.end_value,
            CurveKind::Linear => self.start_value + (self.end_value - self.start_value) * frac,
            CurveKind::Exponential => {
                // Callers guarantee both ends are positive after scheduling.
                let v0 = self.start_value.max(FLOOR);
                let v1 = self.end_value.max(FLOOR);
                v0 * (v1 / v0).powf(frac)
            }
        }
    }
}

/// Default curve for a transition of `duration` seconds.
pub fn curve_for(duration: f64) -> CurveKind {
    if duration < LINEAR_MAX {
        CurveKind::Linear
    } else {
        CurveKind::Exponential
    }
}

/// Scheduled end of a source node (oscillator, noise, FM pair).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopEvent {
    pub node: NodeId,
    pub time: f64,
}

impl StopEvent {
    pub fn new(node: NodeId, time: f64) -> Self {
        StopEvent { node, time }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ParamTarget {
        ParamTarget::gain(NodeId(0))
    }

    #[test]
    fn step_holds_value() {
        let e = AutomationEvent::set(target(), 0.1, 0.5);
        assert_eq!(e.value_at(0.0), 0.5);
        assert_eq!(e.value_at(0.2), 0.5);
        assert!(!e.is_ramp());
    }

    #[test]
    fn linear_midpoint() {
        let e = AutomationEvent::linear(target(), 0.0, 0.0, 0.02, 1.0);
        assert!((e.value_at(0.01) - 0.5).abs() < 1e-12);
        assert_eq!(e.value_at(0.05), 1.0);
    }

    #[test]
    fn exponential_midpoint_is_geometric_mean() {
        let e = AutomationEvent::exponential(target(), 0.0, 500.0, 0.1, 700.0);
        let mid = e.value_at(0.05);
        assert!((mid - (500.0_f64 * 700.0).sqrt()).abs() < 1e-9, "got {mid}");
    }

    #[test]
    fn ramp_curve_policy() {
        assert_eq!(AutomationEvent::ramp(target(), 0.0, 0.1, 0.01, 0.2).curve, CurveKind::Linear);
        assert_eq!(
            AutomationEvent::ramp(target(), 0.0, 0.1, 0.05, 0.2).curve,
            CurveKind::Exponential
        );
    }

    #[test]
    fn display_target() {
        assert_eq!(ParamTarget::frequency(NodeId(3)).to_string(), "node#3.frequency");
    }
}
