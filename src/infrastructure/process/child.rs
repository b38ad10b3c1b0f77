//! tokio 子进程适配
//!
//! 把 `tokio::process::Child` 包装为可被监管的进程

use std::process::ExitStatus;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Child;

use crate::application::ports::{ProcessError, SupervisedProcess};

/// 子进程句柄
pub struct ChildProcess {
    pid: u32,
    child: Mutex<Child>,
}

impl ChildProcess {
    /// 包装已启动的子进程，stdin / stdout 应在包装前取走
    pub fn new(child: Child) -> Result<Self, ProcessError> {
        let pid = child.id().ok_or(ProcessError::NoPid(0))?;
        Ok(Self {
            pid,
            child: Mutex::new(child),
        })
    }

    /// 非阻塞查询退出状态，`None` 表示仍在运行
    pub fn try_exit_status(&self) -> Result<Option<ExitStatus>, ProcessError> {
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        child
            .try_wait()
            .map_err(|e| ProcessError::IoError(e.to_string()))
    }

    /// 轮询等待进程退出，超时返回 `None`
    pub async fn wait_with_timeout(
        &self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<ExitStatus>, ProcessError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_exit_status()? {
                return Ok(Some(status));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

impl SupervisedProcess for ChildProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn is_alive(&self) -> bool {
        matches!(self.try_exit_status(), Ok(None))
    }

    fn kill(&self) -> Result<(), ProcessError> {
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        child.start_kill().map_err(|e| ProcessError::KillFailed {
            pid: self.pid,
            reason: e.to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::infrastructure::process::ProcessSupervisor;
    use std::sync::Arc;

    fn spawn_sleep(secs: &str) -> ChildProcess {
        let child = tokio::process::Command::new("sleep")
            .arg(secs)
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        ChildProcess::new(child).unwrap()
    }

    #[tokio::test]
    async fn test_real_process_is_terminated() {
        let supervisor = ProcessSupervisor::new().arc();
        let process = Arc::new(spawn_sleep("30"));
        assert!(process.is_alive());

        supervisor.register(process.clone(), "command", "sleep");
        assert_eq!(supervisor.terminate_all(), 1);

        let status = process
            .wait_with_timeout(Duration::from_secs(5), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(status.is_some());
        assert!(!process.is_alive());
    }

    #[tokio::test]
    async fn test_exited_process_is_detected_as_zombie() {
        let supervisor = ProcessSupervisor::new();
        let process = Arc::new(spawn_sleep("0"));
        supervisor.register(process.clone(), "command", "short");

        process
            .wait_with_timeout(Duration::from_secs(5), Duration::from_millis(20))
            .await
            .unwrap();

        assert_eq!(supervisor.detect_zombies().len(), 1);
        assert_eq!(supervisor.cleanup_zombies(), 1);
        assert_eq!(supervisor.active_count(), 0);
    }
}
