//! Property-based tests over random override sets for every category.
//!
//! Overrides are drawn well outside each parameter's bounds on purpose:
//! clamping must keep every scheduled plan click-free and under the volume
//! ceiling whatever the caller sends.

use std::collections::HashMap;

use earcon_core::automation::{AutomationEvent, CurveKind, FLOOR, ParamKind, ParamTarget};
use earcon_core::graph::{MAX_GAIN, SignalGraph};
use earcon_core::rules::ValidationRules;
use earcon_core::scheduler::{EnvelopeScheduler, STOP_PADDING, Timeline};
use earcon_core::{Category, EngineConfig, Overrides, SoundCatalog, render_offline};
use proptest::prelude::*;

/// Build overrides from (parameter index, position) pairs, where position 0
/// is a parameter's minimum and 1 its maximum.
fn overrides_for(category: Category, picks: &[(usize, f64)]) -> Overrides {
    let specs = SoundCatalog::new().describe(category);
    let mut overrides = Overrides::new();
    for &(index, position) in picks {
        let spec = &specs[index % specs.len()];
        overrides.set(spec.name, spec.min + position * (spec.max - spec.min));
    }
    overrides
}

fn schedule(category: Category, overrides: &Overrides, start: f64) -> (SignalGraph, Timeline) {
    let sound = SoundCatalog::new()
        .resolve_category(category, overrides)
        .unwrap_or_else(|e| panic!("{category} failed to resolve: {e}"));
    let graph = SignalGraph::build_at_rate(&sound.template, &sound.params, 44100.0)
        .unwrap_or_else(|e| panic!("{category} failed to build: {e}"));
    ValidationRules::check(category, &graph, &sound.events, &sound.params)
        .unwrap_or_else(|e| panic!("{category} broke a structural rule: {e}"));
    let timeline = EnvelopeScheduler::schedule(&graph, &sound.events, start)
        .unwrap_or_else(|e| panic!("{category} failed to schedule: {e}"));
    (graph, timeline)
}

fn picks() -> impl Strategy<Value = (usize, Vec<(usize, f64)>)> {
    (0usize..9, prop::collection::vec((0usize..8, -2.0f64..3.0), 0..6))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Exponential ramps never start from or aim at zero.
    #[test]
    fn exponential_ramps_stay_positive((index, picks) in picks(), start in 0.0f64..100.0) {
        let category = Category::ALL[index];
        let (_, timeline) = schedule(category, &overrides_for(category, &picks), start);
        for e in timeline.events().iter().filter(|e| e.curve == CurveKind::Exponential) {
            prop_assert!(
                e.start_value > 0.0 && e.end_value > 0.0,
                "{} exponential on {} spans {} -> {}",
                category, e.target, e.start_value, e.end_value
            );
        }
    }

    /// Every ramp starts where its parameter already is.
    #[test]
    fn ramps_are_anchored((index, picks) in picks()) {
        let category = Category::ALL[index];
        let (_, timeline) = schedule(category, &overrides_for(category, &picks), 0.0);
        let mut held: HashMap<ParamTarget, AutomationEvent> = HashMap::new();
        for e in timeline.events() {
            if e.is_ramp() {
                let prev = held.get(&e.target);
                prop_assert!(prev.is_some(), "{} ramp on {} unanchored", category, e.target);
                let mut from = prev.map_or(f64::NAN, |p| p.value_at(e.start_time));
                if e.curve == CurveKind::Exponential {
                    from = from.max(FLOOR);
                }
                prop_assert!(
                    (from - e.start_value).abs() <= 1e-9 * from.abs().max(1.0),
                    "{} ramp on {} starts at {} but the parameter holds {}",
                    category, e.target, e.start_value, from
                );
            }
            held.insert(e.target, *e);
        }
    }

    /// Sources outlive their gain envelopes by the stop padding.
    #[test]
    fn stops_trail_gain_envelopes((index, picks) in picks(), start in 0.0f64..10.0) {
        let category = Category::ALL[index];
        let (graph, timeline) = schedule(category, &overrides_for(category, &picks), start);
        for source in graph.sources() {
            let stop = timeline.stop_time(source);
            prop_assert!(stop.is_some(), "{} {} never stops", category, source);
            let stop = stop.unwrap_or_default();
            for gain in graph.downstream_gains(source) {
                let last = timeline
                    .events_for(ParamTarget::gain(gain))
                    .map(|e| e.end_time)
                    .fold(f64::NEG_INFINITY, f64::max);
                prop_assert!(
                    stop + 1e-9 >= last + STOP_PADDING,
                    "{}: {} stops at {} but gain {} moves until {}",
                    category, source, stop, gain, last
                );
            }
        }
    }

    /// No scheduled gain point exceeds the ceiling, however loud the request.
    #[test]
    fn gain_never_exceeds_ceiling((index, picks) in picks()) {
        let category = Category::ALL[index];
        let (_, timeline) = schedule(category, &overrides_for(category, &picks), 0.0);
        for e in timeline.events().iter().filter(|e| e.target.param == ParamKind::Gain) {
            prop_assert!(e.start_value <= MAX_GAIN && e.end_value <= MAX_GAIN);
            let mid = e.value_at((e.start_time + e.end_time) / 2.0);
            prop_assert!(mid <= MAX_GAIN, "{} gain {} mid-ramp", category, mid);
        }
    }

    /// Pitched recipes produce the same timeline every time.
    #[test]
    fn oscillator_recipes_are_deterministic((index, picks) in picks()) {
        let category = Category::ALL[index];
        prop_assume!(category.is_deterministic());
        let overrides = overrides_for(category, &picks);
        let (_, a) = schedule(category, &overrides, 0.5);
        let (_, b) = schedule(category, &overrides, 0.5);
        prop_assert_eq!(a, b);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Rendered audio stays finite and inside full scale.
    #[test]
    fn rendered_audio_is_bounded((index, picks) in picks()) {
        let category = Category::ALL[index];
        let config = EngineConfig::with_sample_rate(22050);
        let samples = render_offline(category.as_str(), &overrides_for(category, &picks), &config)
            .unwrap_or_else(|e| panic!("{category} failed to render: {e}"));
        prop_assert!(!samples.is_empty());
        for s in samples {
            prop_assert!(s.is_finite() && s.abs() <= 1.0, "{} produced {}", category, s);
        }
    }
}
