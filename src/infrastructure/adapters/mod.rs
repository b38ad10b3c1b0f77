//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod codec;
pub mod sink;
pub mod tts;

pub use sink::*;
pub use tts::*;
