//! The built-in recipes.
//!
//! Every recipe starts its sound at offset 0 and ends each source
//! [`STOP_PADDING`] after the last gain event that source feeds.

use super::{BoundParams, Category, ParamSpec, Recipe};
use crate::automation::{AutomationEvent, FLOOR, ParamKind, ParamTarget};
use crate::dsp::filter::FilterKind;
use crate::dsp::oscillator::Waveform;
use crate::graph::{GraphTemplate, NodeId, NodeTemplate, Value};
use crate::scheduler::{EventPlan, STOP_PADDING};

/// All recipes in `Category` declaration order.
pub(super) fn all() -> Vec<Recipe> {
    vec![
        Recipe { category: Category::Click, params: CLICK, build: click },
        Recipe { category: Category::Toggle, params: TOGGLE, build: toggle },
        Recipe { category: Category::Hover, params: HOVER, build: hover },
        Recipe { category: Category::Success, params: SUCCESS, build: success },
        Recipe { category: Category::Error, params: ERROR, build: error },
        Recipe { category: Category::Warning, params: WARNING, build: warning },
        Recipe { category: Category::Notification, params: NOTIFICATION, build: notification },
        Recipe { category: Category::Whoosh, params: WHOOSH, build: whoosh },
        Recipe { category: Category::Pop, params: POP, build: pop },
    ]
}

const fn spec(name: &'static str, default: f64, min: f64, max: f64, effect: &'static str) -> ParamSpec {
    ParamSpec { name, default, min, max, effect }
}

/// Floor, fast rise to `peak`, exponential fall back to the floor at `end`.
fn percussive(plan: &mut EventPlan, gain: NodeId, start: f64, attack: f64, peak: f64, end: f64) {
    let g = ParamTarget::gain(gain);
    let attack = attack.min((end - start) / 4.0);
    plan.push(AutomationEvent::set(g, start, FLOOR))
        .push(AutomationEvent::ramp(g, start, FLOOR, start + attack, peak))
        .push(AutomationEvent::exponential(g, start + attack, peak, end, FLOOR));
}

/// Set-then-glide on an oscillator's frequency.
fn glide(plan: &mut EventPlan, target: ParamTarget, t0: f64, from: f64, t1: f64, to: f64) {
    plan.push(AutomationEvent::set(target, t0, from))
        .push(AutomationEvent::ramp(target, t0, from, t1, to));
}

fn oscillator(t: &mut GraphTemplate, waveform: Waveform, frequency: Value) -> NodeId {
    t.add(NodeTemplate::Oscillator { waveform, frequency })
}

fn silent_gain(t: &mut GraphTemplate) -> NodeId {
    t.add(NodeTemplate::Gain { level: Value::Fixed(0.0) })
}

// ── Click ───────────────────────────────────────────────────

const CLICK: &[ParamSpec] = &[
    spec("frequency", 2000.0, 500.0, 8000.0, "band center; higher sounds brighter and thinner"),
    spec("q", 2.0, 0.5, 10.0, "band resonance; higher sounds more focused and woody"),
    spec("decay", 0.03, 0.005, 0.1, "length of the tick; longer sounds softer"),
    spec("volume", 0.3, 0.0, 0.5, "peak level"),
];

fn click(p: &BoundParams) -> (GraphTemplate, EventPlan) {
    let decay = p.value("decay");
    let mut t = GraphTemplate::new();
    let noise = t.add(NodeTemplate::NoiseSource {
        duration: Value::Fixed(decay + STOP_PADDING),
    });
    let band = t.add(NodeTemplate::BiquadFilter {
        kind: FilterKind::Bandpass,
        cutoff: Value::param("frequency"),
        q: Value::param("q"),
    });
    let gain = silent_gain(&mut t);
    t.chain(&[noise, band, gain]);

    let mut plan = EventPlan::new();
    percussive(&mut plan, gain, 0.0, 0.001, p.value("volume"), decay);
    plan.stop(noise, decay + STOP_PADDING);
    (t, plan)
}

// ── Toggle ──────────────────────────────────────────────────

const TOGGLE: &[ParamSpec] = &[
    spec("isOn", 1.0, 0.0, 1.0, "1 plays the rising 'on' sweep, 0 the falling 'off' sweep"),
    spec("frequency", 500.0, 200.0, 1500.0, "low end of the sweep; higher sounds lighter"),
    spec("sweepRatio", 1.4, 1.1, 2.0, "how far the pitch travels"),
    spec("duration", 0.12, 0.05, 0.3, "sweep length"),
    spec("volume", 0.3, 0.0, 0.4, "peak level"),
];

fn toggle(p: &BoundParams) -> (GraphTemplate, EventPlan) {
    let duration = p.value("duration");
    let low = p.value("frequency");
    let high = low * p.value("sweepRatio");
    let (from, to) = if p.flag("isOn") { (low, high) } else { (high, low) };

    let mut t = GraphTemplate::new();
    let osc = oscillator(&mut t, Waveform::Sine, Value::Fixed(from));
    let gain = silent_gain(&mut t);
    t.chain(&[osc, gain]);

    let mut plan = EventPlan::new();
    glide(&mut plan, ParamTarget::frequency(osc), 0.0, from, duration, to);
    percussive(&mut plan, gain, 0.0, 0.005, p.value("volume"), duration);
    plan.stop(osc, duration + STOP_PADDING);
    (t, plan)
}

// ── Hover ───────────────────────────────────────────────────

const HOVER: &[ParamSpec] = &[
    spec("frequency", 1200.0, 400.0, 3000.0, "pitch of the blip"),
    spec("duration", 0.04, 0.02, 0.1, "blip length"),
    spec("volume", 0.1, 0.0, 0.2, "peak level; hover feedback stays quiet"),
];

fn hover(p: &BoundParams) -> (GraphTemplate, EventPlan) {
    let duration = p.value("duration");
    let mut t = GraphTemplate::new();
    let osc = oscillator(&mut t, Waveform::Sine, Value::param("frequency"));
    let gain = silent_gain(&mut t);
    t.chain(&[osc, gain]);

    let mut plan = EventPlan::new();
    percussive(&mut plan, gain, 0.0, 0.003, p.value("volume"), duration);
    plan.stop(osc, duration + STOP_PADDING);
    (t, plan)
}

// ── Success ─────────────────────────────────────────────────

const SUCCESS: &[ParamSpec] = &[
    spec("frequency", 523.25, 200.0, 1200.0, "pitch of the first note"),
    spec("ratio", 1.25, 1.05, 2.0, "interval up to the second note; 1.25 is a major third"),
    spec("noteDuration", 0.12, 0.05, 0.3, "length of each note"),
    spec("gap", 0.05, 0.04, 0.2, "silence between the notes"),
    spec("volume", 0.3, 0.0, 0.4, "peak level of each note"),
];

fn success(p: &BoundParams) -> (GraphTemplate, EventPlan) {
    let note = p.value("noteDuration");
    let second_start = note + p.value("gap");
    let volume = p.value("volume");

    let mut t = GraphTemplate::new();
    let first = oscillator(&mut t, Waveform::Sine, Value::param("frequency"));
    let first_gain = silent_gain(&mut t);
    t.chain(&[first, first_gain]);
    let second = oscillator(&mut t, Waveform::Sine, Value::Product("frequency", "ratio"));
    let second_gain = silent_gain(&mut t);
    t.chain(&[second, second_gain]);

    let mut plan = EventPlan::new();
    percussive(&mut plan, first_gain, 0.0, 0.005, volume, note);
    plan.stop(first, note + STOP_PADDING);
    percussive(&mut plan, second_gain, second_start, 0.005, volume, second_start + note);
    plan.stop(second, second_start + note + STOP_PADDING);
    (t, plan)
}

// ── Error ───────────────────────────────────────────────────

const ERROR: &[ParamSpec] = &[
    spec("frequency", 180.0, 80.0, 400.0, "base pitch; error sounds sit low"),
    spec("drop", 0.7, 0.5, 0.95, "fraction of the pitch it falls to; lower is more dejected"),
    spec("cutoff", 1200.0, 300.0, 4000.0, "lowpass cutoff; higher sounds harsher"),
    spec("duration", 0.25, 0.1, 0.5, "buzz length"),
    spec("volume", 0.3, 0.0, 0.4, "peak level"),
];

/// Detune of the second, sawtooth voice.
const ERROR_DETUNE: f64 = 1.015;

fn error(p: &BoundParams) -> (GraphTemplate, EventPlan) {
    let duration = p.value("duration");
    let frequency = p.value("frequency");
    let drop = p.value("drop");

    let mut t = GraphTemplate::new();
    let square = oscillator(&mut t, Waveform::Square, Value::param("frequency"));
    let saw = oscillator(&mut t, Waveform::Sawtooth, Value::scaled("frequency", ERROR_DETUNE));
    let lowpass = t.add(NodeTemplate::BiquadFilter {
        kind: FilterKind::Lowpass,
        cutoff: Value::param("cutoff"),
        q: Value::Fixed(1.0),
    });
    let gain = silent_gain(&mut t);
    t.connect(square, lowpass);
    t.connect(saw, lowpass);
    t.chain(&[lowpass, gain]);

    let mut plan = EventPlan::new();
    for (osc, f) in [(square, frequency), (saw, frequency * ERROR_DETUNE)] {
        glide(&mut plan, ParamTarget::frequency(osc), 0.0, f, duration, f * drop);
        plan.stop(osc, duration + STOP_PADDING);
    }
    percussive(&mut plan, gain, 0.0, 0.01, p.value("volume"), duration);
    (t, plan)
}

// ── Warning ─────────────────────────────────────────────────

const WARNING: &[ParamSpec] = &[
    spec("frequency", 880.0, 400.0, 1600.0, "pitch shared by every pulse"),
    spec("pulses", 2.0, 2.0, 4.0, "number of repeats"),
    spec("pulseDuration", 0.08, 0.04, 0.15, "length of each pulse"),
    spec("pulseGap", 0.06, 0.03, 0.2, "silence between pulses; shorter feels more urgent"),
    spec("volume", 0.25, 0.0, 0.4, "peak level of each pulse"),
];

fn warning(p: &BoundParams) -> (GraphTemplate, EventPlan) {
    let pulses = p.value("pulses").round() as usize;
    let length = p.value("pulseDuration");
    let period = length + p.value("pulseGap");
    let volume = p.value("volume");

    let mut t = GraphTemplate::new();
    let mut plan = EventPlan::new();
    for i in 0..pulses {
        let start = i as f64 * period;
        let osc = oscillator(&mut t, Waveform::Triangle, Value::param("frequency"));
        let gain = silent_gain(&mut t);
        t.chain(&[osc, gain]);
        percussive(&mut plan, gain, start, 0.005, volume, start + length);
        plan.stop(osc, start + length + STOP_PADDING);
    }
    (t, plan)
}

// ── Notification ────────────────────────────────────────────

const NOTIFICATION: &[ParamSpec] = &[
    spec("frequency", 880.0, 300.0, 2000.0, "carrier pitch, the note you hear"),
    spec("modRatio", 1.41, 0.5, 3.5, "modulator/carrier ratio; non-integer ratios sound metallic"),
    spec("modDepth", 300.0, 0.0, 800.0, "strike brightness"),
    spec("duration", 0.6, 0.2, 1.0, "ring length"),
    spec("volume", 0.25, 0.0, 0.4, "peak level"),
];

fn notification(p: &BoundParams) -> (GraphTemplate, EventPlan) {
    let duration = p.value("duration");
    let depth = p.value("modDepth");

    let mut t = GraphTemplate::new();
    let bell = t.add(NodeTemplate::FmPair {
        waveform: Waveform::Sine,
        carrier: Value::param("frequency"),
        modulator: Value::Product("frequency", "modRatio"),
        depth: Value::param("modDepth"),
    });
    let gain = silent_gain(&mut t);
    t.chain(&[bell, gain]);

    let mut plan = EventPlan::new();
    let brightness = ParamTarget::new(bell, ParamKind::ModDepth);
    plan.push(AutomationEvent::set(brightness, 0.0, depth))
        .push(AutomationEvent::exponential(brightness, 0.0, depth, duration, depth * 0.1));
    percussive(&mut plan, gain, 0.0, 0.005, p.value("volume"), duration);
    plan.stop(bell, duration + STOP_PADDING);
    (t, plan)
}

// ── Whoosh ──────────────────────────────────────────────────

const WHOOSH: &[ParamSpec] = &[
    spec("startFrequency", 300.0, 100.0, 2000.0, "band center at the start of the sweep"),
    spec("endFrequency", 3000.0, 500.0, 8000.0, "band center at the end; higher sounds airier"),
    spec("q", 2.0, 0.5, 10.0, "band resonance; higher sounds more whistly"),
    spec("duration", 0.35, 0.15, 0.8, "sweep length"),
    spec("volume", 0.2, 0.0, 0.4, "peak level"),
];

fn whoosh(p: &BoundParams) -> (GraphTemplate, EventPlan) {
    let duration = p.value("duration");
    let volume = p.value("volume");

    let mut t = GraphTemplate::new();
    let noise = t.add(NodeTemplate::NoiseSource {
        duration: Value::Fixed(duration + STOP_PADDING),
    });
    let band = t.add(NodeTemplate::BiquadFilter {
        kind: FilterKind::Bandpass,
        cutoff: Value::param("startFrequency"),
        q: Value::param("q"),
    });
    let gain = silent_gain(&mut t);
    t.chain(&[noise, band, gain]);

    let mut plan = EventPlan::new();
    glide(
        &mut plan,
        ParamTarget::cutoff(band),
        0.0,
        p.value("startFrequency"),
        duration,
        p.value("endFrequency"),
    );
    let g = ParamTarget::gain(gain);
    let swell = duration * 0.5;
    plan.push(AutomationEvent::set(g, 0.0, FLOOR))
        .push(AutomationEvent::exponential(g, 0.0, FLOOR, swell, volume))
        .push(AutomationEvent::exponential(g, swell, volume, duration, FLOOR));
    plan.stop(noise, duration + STOP_PADDING);
    (t, plan)
}

// ── Pop ─────────────────────────────────────────────────────

const POP: &[ParamSpec] = &[
    spec("frequency", 400.0, 150.0, 1200.0, "starting pitch"),
    spec("pitchRatio", 2.5, 1.2, 4.0, "how far the pitch jumps up; higher is bubblier"),
    spec("duration", 0.08, 0.03, 0.2, "pop length"),
    spec("volume", 0.3, 0.0, 0.4, "peak level"),
];

fn pop(p: &BoundParams) -> (GraphTemplate, EventPlan) {
    let duration = p.value("duration");
    let from = p.value("frequency");

    let mut t = GraphTemplate::new();
    let osc = oscillator(&mut t, Waveform::Sine, Value::param("frequency"));
    let gain = silent_gain(&mut t);
    t.chain(&[osc, gain]);

    let mut plan = EventPlan::new();
    glide(
        &mut plan,
        ParamTarget::frequency(osc),
        0.0,
        from,
        duration * 0.4,
        from * p.value("pitchRatio"),
    );
    percussive(&mut plan, gain, 0.0, 0.002, p.value("volume"), duration);
    plan.stop(osc, duration + STOP_PADDING);
    (t, plan)
}
