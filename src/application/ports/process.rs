//! Process Port - 外部进程抽象
//!
//! 合成或格式转换时启动的子进程，由进程监管器统一跟踪

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// 进程错误
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("Failed to kill process {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },

    #[error("Process {0} has no pid (already reaped)")]
    NoPid(u32),

    #[error("IO error: {0}")]
    IoError(String),
}

/// 可被监管的进程
pub trait SupervisedProcess: Send + Sync {
    /// 进程 ID，注册表以此为 key
    fn id(&self) -> u32;

    /// 进程是否仍在运行
    fn is_alive(&self) -> bool;

    /// 强制结束进程
    fn kill(&self) -> Result<(), ProcessError>;
}

/// 进程注册记录
#[derive(Clone)]
pub struct ProcessRecord {
    pub process: Arc<dyn SupervisedProcess>,
    /// 启动该进程的引擎类型（如 "piper"）
    pub engine_type: String,
    pub description: String,
    pub registered_at: DateTime<Utc>,
}

impl ProcessRecord {
    pub fn new(
        process: Arc<dyn SupervisedProcess>,
        engine_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            process,
            engine_type: engine_type.into(),
            description: description.into(),
            registered_at: Utc::now(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    /// 记录是否指向同一个进程对象（pid 可能被系统复用）
    pub fn tracks(&self, process: &dyn SupervisedProcess) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.process), process as *const dyn SupervisedProcess)
    }
}

impl fmt::Debug for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRecord")
            .field("pid", &self.process.id())
            .field("engine_type", &self.engine_type)
            .field("description", &self.description)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}
