//! TTS Adapter - 合成后端实现

mod command_synthesizer;
mod engine;
mod http_synthesizer;
mod simulated_synthesizer;

pub use command_synthesizer::{CommandSynthesizer, CommandSynthesizerConfig};
pub use engine::{EngineSettings, SynthesisEngine};
pub use http_synthesizer::{HttpSynthesizer, HttpSynthesizerConfig};
pub use simulated_synthesizer::SimulatedSynthesizer;
