//! 外部进程管理

mod child;
mod supervisor;

pub use child::ChildProcess;
pub use supervisor::{ProcessGuard, ProcessSupervisor};
