//! External Process Supervisor
//!
//! 跟踪所有为合成 / 转换而启动的子进程，回收僵尸进程，关闭时保证全部结束

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ProcessRecord, SupervisedProcess};

/// 进程监管器
///
/// 注册表以 pid 为 key，可在多个并发合成请求之间共享
pub struct ProcessSupervisor {
    registry: DashMap<u32, ProcessRecord>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            registry: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 注册进程
    pub fn register(
        &self,
        process: Arc<dyn SupervisedProcess>,
        engine_type: &str,
        description: &str,
    ) {
        let record = ProcessRecord::new(process, engine_type, description);
        let pid = record.pid();
        if let Some(previous) = self.registry.insert(pid, record) {
            tracing::warn!(
                pid = pid,
                previous_engine = %previous.engine_type,
                "Process id reused, replacing stale registry entry"
            );
        }
        tracing::debug!(pid = pid, engine_type = %engine_type, description = %description, "Process registered");
    }

    /// 注册进程并返回 guard，guard 释放时自动注销（必要时结束进程）
    pub fn register_guarded(
        self: &Arc<Self>,
        process: Arc<dyn SupervisedProcess>,
        engine_type: &str,
        description: &str,
    ) -> ProcessGuard {
        self.register(process.clone(), engine_type, description);
        ProcessGuard {
            supervisor: Arc::clone(self),
            process,
        }
    }

    /// 注销进程
    ///
    /// 只移除指向同一进程对象的记录，pid 已被新进程复用时保留新记录
    pub fn unregister(&self, process: &dyn SupervisedProcess) -> Option<ProcessRecord> {
        let pid = process.id();
        let removed = self
            .registry
            .remove_if(&pid, |_, record| record.tracks(process))
            .map(|(_, record)| record);
        if removed.is_some() {
            tracing::debug!(pid = pid, "Process unregistered");
        }
        removed
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    pub fn active_count_for(&self, engine_type: &str) -> usize {
        self.registry
            .iter()
            .filter(|entry| entry.engine_type == engine_type)
            .count()
    }

    /// 已退出但仍在注册表中的进程
    pub fn detect_zombies(&self) -> Vec<ProcessRecord> {
        self.registry
            .iter()
            .filter(|entry| !entry.process.is_alive())
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 清理僵尸进程，返回清理数量
    ///
    /// 清理时若进程又报告存活则先强制结束；无论结束是否成功都移出注册表
    pub fn cleanup_zombies(&self) -> usize {
        let zombies = self.detect_zombies();
        let mut cleaned = 0;

        for record in zombies {
            let pid = record.pid();
            if record.process.is_alive() {
                if let Err(e) = record.process.kill() {
                    tracing::warn!(pid = pid, error = %e, "Failed to kill zombie process");
                }
            }
            let removed = self
                .registry
                .remove_if(&pid, |_, current| current.tracks(record.process.as_ref()));
            if removed.is_some() {
                cleaned += 1;
                tracing::info!(
                    pid = pid,
                    engine_type = %record.engine_type,
                    description = %record.description,
                    "Zombie process reaped"
                );
            }
        }

        cleaned
    }

    /// 强制结束所有进程并清空注册表，返回成功结束的数量
    ///
    /// 单个进程结束失败只记录日志，不影响其余进程
    pub fn terminate_all(&self) -> usize {
        let pids: Vec<u32> = self.registry.iter().map(|entry| *entry.key()).collect();
        let mut terminated = 0;

        for pid in pids {
            let Some((_, record)) = self.registry.remove(&pid) else {
                continue;
            };
            match record.process.kill() {
                Ok(()) => terminated += 1,
                Err(e) => tracing::warn!(
                    pid = pid,
                    engine_type = %record.engine_type,
                    error = %e,
                    "Failed to terminate process"
                ),
            }
        }

        tracing::info!(terminated = terminated, "All supervised processes terminated");
        terminated
    }

    /// 按引擎类型统计活跃进程数
    pub fn statistics(&self) -> HashMap<String, usize> {
        let mut stats = HashMap::new();
        for entry in self.registry.iter() {
            *stats.entry(entry.engine_type.clone()).or_insert(0) += 1;
        }
        stats
    }

    /// 启动后台僵尸进程清理任务
    pub fn spawn_zombie_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(interval_secs = interval.as_secs(), "Zombie sweeper started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let cleaned = supervisor.cleanup_zombies();
                        if cleaned > 0 {
                            tracing::info!(cleaned = cleaned, "Zombie sweep finished");
                        }
                    }
                }
            }

            tracing::info!("Zombie sweeper stopped");
        })
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// 进程注册 guard
///
/// 释放时注销进程；进程仍在运行则强制结束（例如合成任务被取消）
pub struct ProcessGuard {
    supervisor: Arc<ProcessSupervisor>,
    process: Arc<dyn SupervisedProcess>,
}

impl ProcessGuard {
    pub fn pid(&self) -> u32 {
        self.process.id()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if self.process.is_alive() {
            if let Err(e) = self.process.kill() {
                tracing::warn!(pid = self.process.id(), error = %e, "Failed to kill guarded process");
            }
        }
        self.supervisor.unregister(self.process.as_ref());
    }
}
