//! Category rules a recipe must keep whatever its parameters.
//!
//! Parameter tables are checked on every resolve; graph structure is
//! checked on every launch, after the graph is built and before anything is
//! scheduled.

use crate::automation::{ParamKind, ParamTarget};
use crate::catalog::{BoundParams, Category, ParamSpec};
use crate::dsp::filter::FilterKind;
use crate::error::{EarconError, Result};
use crate::graph::{MAX_GAIN, NodeId, Q_MAX, Q_MIN, SignalGraph, SignalNode};
use crate::scheduler::EventPlan;

pub struct ValidationRules;

impl ValidationRules {
    /// Check a recipe's parameter table: defaults inside their bounds, and
    /// bounds inside the engine's hard limits.
    pub fn check_specs(category: Category, specs: &[ParamSpec]) -> Result<()> {
        for s in specs {
            if !(s.min <= s.default && s.default <= s.max) {
                return Err(rule(category, format!("default of '{}' lies outside its bounds", s.name)));
            }
            if s.name == "volume" && (s.min < 0.0 || s.max > MAX_GAIN) {
                return Err(rule(category, format!("volume bounds exceed [0, {MAX_GAIN}]")));
            }
            if s.name == "q" && (s.min < Q_MIN || s.max > Q_MAX) {
                return Err(rule(category, format!("q bounds exceed [{Q_MIN}, {Q_MAX}]")));
            }
        }
        Ok(())
    }

    /// Check a built graph and its plan against the category's structure.
    pub fn check(category: Category, graph: &SignalGraph, plan: &EventPlan, params: &BoundParams) -> Result<()> {
        let sources: Vec<(NodeId, &SignalNode)> = graph
            .sources()
            .filter_map(|id| graph.node(id).map(|n| (id, n)))
            .collect();

        match category {
            Category::Click | Category::Whoosh => {
                if sources.is_empty() || !sources.iter().all(|(_, n)| matches!(n, SignalNode::NoiseSource { .. })) {
                    return Err(rule(category, "sources must all be noise"));
                }
            }
            Category::Notification => {
                if !sources.iter().any(|(_, n)| matches!(n, SignalNode::FmPair { .. })) {
                    return Err(rule(category, "needs an FM pair"));
                }
            }
            Category::Toggle | Category::Hover | Category::Success | Category::Warning | Category::Pop => {
                if sources.is_empty() || !sources.iter().all(|(_, n)| matches!(n, SignalNode::Oscillator { .. })) {
                    return Err(rule(category, "sources must all be oscillators"));
                }
            }
            Category::Error => {}
        }

        match category {
            Category::Click => {
                let has_band = graph
                    .nodes()
                    .iter()
                    .any(|n| matches!(n, SignalNode::BiquadFilter { kind: FilterKind::Bandpass, .. }));
                if !has_band {
                    return Err(rule(category, "noise must pass a bandpass filter"));
                }
            }
            Category::Toggle => check_toggle_direction(category, plan, params)?,
            Category::Success => check_ascending_notes(category, graph, plan, &sources)?,
            Category::Warning => check_pulses(category, graph, plan, &sources)?,
            _ => {}
        }
        Ok(())
    }
}

fn rule(category: Category, rule: impl Into<String>) -> EarconError {
    EarconError::StructuralRule {
        category: category.to_string(),
        rule: rule.into(),
    }
}

/// Span of the gain envelope a source plays through.
fn envelope(graph: &SignalGraph, plan: &EventPlan, source: NodeId) -> Option<(f64, f64)> {
    graph
        .downstream_gains(source)
        .into_iter()
        .flat_map(move |g| plan.automation.iter().filter(move |e| e.target == ParamTarget::gain(g)))
        .map(|e| (e.start_time, e.end_time))
        .reduce(|(s0, e0), (s1, e1)| (s0.min(s1), e0.max(e1)))
}

/// Start frequency of an oscillator: its first automated value, or its
/// static one.
fn pitch(graph: &SignalGraph, plan: &EventPlan, id: NodeId) -> Option<f64> {
    let automated = plan
        .automation
        .iter()
        .filter(|e| e.target == ParamTarget::frequency(id))
        .min_by(|a, b| a.start_time.total_cmp(&b.start_time))
        .map(|e| e.start_value);
    automated.or(match graph.node(id) {
        Some(SignalNode::Oscillator { frequency, .. }) => Some(*frequency),
        Some(SignalNode::FmPair { carrier_freq, .. }) => Some(*carrier_freq),
        _ => None,
    })
}

fn check_toggle_direction(category: Category, plan: &EventPlan, params: &BoundParams) -> Result<()> {
    let sweep = plan
        .automation
        .iter()
        .find(|e| e.target.param == ParamKind::Frequency && e.is_ramp())
        .ok_or_else(|| rule(category, "needs a frequency sweep"))?;
    let rising = sweep.end_value > sweep.start_value;
    if rising != params.flag("isOn") {
        return Err(rule(category, "sweep must rise for on and fall for off"));
    }
    Ok(())
}

/// Sources ordered by the onset of their envelope, with that envelope.
fn notes(graph: &SignalGraph, plan: &EventPlan, sources: &[(NodeId, &SignalNode)]) -> Vec<(NodeId, f64, f64)> {
    let mut notes: Vec<(NodeId, f64, f64)> = sources
        .iter()
        .filter_map(|(id, _)| envelope(graph, plan, *id).map(|(start, end)| (*id, start, end)))
        .collect();
    notes.sort_by(|a, b| a.1.total_cmp(&b.1));
    notes
}

fn check_ascending_notes(
    category: Category,
    graph: &SignalGraph,
    plan: &EventPlan,
    sources: &[(NodeId, &SignalNode)],
) -> Result<()> {
    let notes = notes(graph, plan, sources);
    if notes.len() < 2 {
        return Err(rule(category, "needs at least two notes"));
    }
    for pair in notes.windows(2) {
        let (a, _, a_end) = pair[0];
        let (b, b_start, _) = pair[1];
        if b_start <= a_end {
            return Err(rule(category, format!("{b} starts before {a} has gone silent")));
        }
        match (pitch(graph, plan, a), pitch(graph, plan, b)) {
            (Some(fa), Some(fb)) if fb > fa => {}
            _ => return Err(rule(category, format!("{b} must sit above {a}"))),
        }
    }
    Ok(())
}

fn check_pulses(
    category: Category,
    graph: &SignalGraph,
    plan: &EventPlan,
    sources: &[(NodeId, &SignalNode)],
) -> Result<()> {
    let pulses = notes(graph, plan, sources);
    if pulses.len() < 2 {
        return Err(rule(category, "needs at least two pulses"));
    }
    let first = pitch(graph, plan, pulses[0].0);
    for pair in pulses.windows(2) {
        let (a, _, a_end) = pair[0];
        let (b, b_start, _) = pair[1];
        if b_start <= a_end {
            return Err(rule(category, format!("pulse {b} overlaps pulse {a}")));
        }
        if pitch(graph, plan, b) != first {
            return Err(rule(category, "pulses must share one frequency"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{AutomationEvent, FLOOR};
    use crate::catalog::{Overrides, SoundCatalog};
    use crate::dsp::oscillator::Waveform;
    use crate::graph::{GraphTemplate, NodeTemplate, Value};

    fn build(category: Category, overrides: Overrides) -> (SignalGraph, EventPlan, BoundParams) {
        let sound = SoundCatalog::new().resolve_category(category, &overrides).unwrap();
        let graph = SignalGraph::build_at_rate(&sound.template, &sound.params, 44100.0).unwrap();
        (graph, sound.events, sound.params)
    }

    #[test]
    fn bad_default_rejected() {
        let specs = [ParamSpec {
            name: "volume",
            default: 0.9,
            min: 0.0,
            max: 0.5,
            effect: "",
        }];
        let err = ValidationRules::check_specs(Category::Pop, &specs).unwrap_err();
        assert!(matches!(err, EarconError::StructuralRule { .. }), "got {err:?}");
    }

    #[test]
    fn loud_volume_bound_rejected() {
        let specs = [ParamSpec {
            name: "volume",
            default: 0.3,
            min: 0.0,
            max: 1.0,
            effect: "",
        }];
        assert!(ValidationRules::check_specs(Category::Hover, &specs).is_err());
    }

    #[test]
    fn tonal_click_rejected() {
        let mut t = GraphTemplate::new();
        let osc = t.add(NodeTemplate::Oscillator {
            waveform: Waveform::Sine,
            frequency: Value::Fixed(2000.0),
        });
        let gain = t.add(NodeTemplate::Gain { level: Value::Fixed(0.0) });
        t.chain(&[osc, gain]);
        let graph = SignalGraph::build_at_rate(&t, &BoundParams::default(), 44100.0).unwrap();
        let err = ValidationRules::check(Category::Click, &graph, &EventPlan::new(), &BoundParams::default())
            .unwrap_err();
        assert!(matches!(err, EarconError::StructuralRule { ref category, .. } if category == "click"));
    }

    #[test]
    fn reversed_toggle_rejected() {
        let (graph, plan, _) = build(Category::Toggle, Overrides::new().with("isOn", 1.0));
        let off = BoundParams::from_pairs(&[("isOn", 0.0)]);
        assert!(ValidationRules::check(Category::Toggle, &graph, &plan, &off).is_err());
    }

    #[test]
    fn overlapping_success_notes_rejected() {
        let (graph, mut plan, params) = build(Category::Success, Overrides::new());
        // Pull the second note's envelope back onto the first.
        let second_gain = NodeId(3);
        for e in plan.automation.iter_mut().filter(|e| e.target == ParamTarget::gain(second_gain)) {
            *e = e.shifted(-0.1);
        }
        let err = ValidationRules::check(Category::Success, &graph, &plan, &params).unwrap_err();
        assert!(matches!(err, EarconError::StructuralRule { .. }));
    }

    #[test]
    fn single_pulse_warning_rejected() {
        let (graph, plan, params) = build(Category::Warning, Overrides::new());
        let mut single = EventPlan::new();
        let g = ParamTarget::gain(NodeId(1));
        single
            .push(AutomationEvent::set(g, 0.0, FLOOR))
            .push(AutomationEvent::exponential(g, 0.0, 0.2, 0.08, FLOOR));
        assert!(ValidationRules::check(Category::Warning, &graph, &plan, &params).is_ok());
        assert!(ValidationRules::check(Category::Warning, &graph, &single, &params).is_err());
    }
}
