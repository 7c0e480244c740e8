//! DSP Engine: Pure Rust audio synthesis and processing.
//!
//! All DSP runs in Rust for deterministic, cross-platform audio output.
//! The same code powers both the WebAudio host (via AudioWorklet + WASM)
//! and offline WAV export.

pub mod engine;
pub mod filter;
pub mod mixer;
pub mod noise;
pub mod oscillator;
pub mod patch;
pub mod renderer;
