pub mod automation;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod dsp;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod rules;
pub mod scheduler;

pub use crate::catalog::{Category, Overrides, ParamSpec, ResolvedSound, SoundCatalog};
pub use crate::clock::{ClockContext, LiveOutput};
pub use crate::config::EngineConfig;
pub use crate::dsp::engine::{AudioEngine, SharedEngine, render_offline};
pub use crate::error::{EarconError, Result};
pub use crate::lifecycle::{InstanceId, PlaybackState};

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// Read a `{name: number | bool}` object; `undefined` and `null` mean none.
fn overrides_from_js(value: JsValue) -> std::result::Result<Overrides, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(Overrides::new());
    }
    let json: serde_json::Value = serde_wasm_bindgen::from_value(value).map_err(js_error)?;
    Overrides::from_json(&json).map_err(js_error)
}

fn config_from_js(value: JsValue) -> std::result::Result<EngineConfig, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(EngineConfig::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(js_error)
}

/// WASM-exposed: return the earcon-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: resolve a category and overrides into its template, bound
/// parameters and relative automation plan.
#[wasm_bindgen]
pub fn resolve_sound(category: &str, overrides: JsValue) -> std::result::Result<JsValue, JsValue> {
    let overrides = overrides_from_js(overrides)?;
    let sound = SoundCatalog::new().resolve(category, &overrides).map_err(js_error)?;
    serde_wasm_bindgen::to_value(&sound).map_err(js_error)
}

/// WASM-exposed: parameter names, bounds and effects of a category.
#[wasm_bindgen]
pub fn describe_sound(category: &str) -> std::result::Result<JsValue, JsValue> {
    let category: Category = category.parse().map_err(js_error)?;
    serde_wasm_bindgen::to_value(&SoundCatalog::new().describe(category).to_vec()).map_err(js_error)
}

/// WASM-exposed: render a sound to a 16-bit mono WAV byte array.
#[wasm_bindgen]
pub fn render_sound_wav(category: &str, overrides: JsValue, config: JsValue) -> std::result::Result<Vec<u8>, JsValue> {
    let overrides = overrides_from_js(overrides)?;
    let config = config_from_js(config)?;
    dsp::renderer::render_wav(category, &overrides, &config).map_err(js_error)
}

/// WASM-exposed: render a sound to mono f32 samples for AudioWorklet
/// playback.
#[wasm_bindgen]
pub fn render_sound_samples(
    category: &str,
    overrides: JsValue,
    config: JsValue,
) -> std::result::Result<Vec<f32>, JsValue> {
    let overrides = overrides_from_js(overrides)?;
    let config = config_from_js(config)?;
    render_offline(category, &overrides, &config).map_err(js_error)
}
