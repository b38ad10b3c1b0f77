//! 音频输出适配

mod simulated_sink;

pub use simulated_sink::SimulatedSink;
