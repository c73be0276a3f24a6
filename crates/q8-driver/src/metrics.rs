//! 运行指标
//!
//! 原子计数器，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 机器人运行指标
#[derive(Debug, Default)]
pub struct RobotMetrics {
    /// 收到的无线数据报总数
    pub datagrams_received: AtomicU64,
    /// 接收队列已满被丢弃的数据报
    pub queue_full_drops: AtomicU64,
    /// 格式错误的数据报（长度、类别、命令码）
    pub malformed_drops: AtomicU64,
    /// 已执行的命令
    pub commands_applied: AtomicU64,
    /// 校验失败被丢弃的命令
    pub commands_dropped: AtomicU64,
    /// 来自非受信对端的数据
    pub commands_ignored: AtomicU64,
    /// 写出的步态帧
    pub gait_frames: AtomicU64,
    /// 舵机总线故障
    pub bus_faults: AtomicU64,
    /// 心跳超时次数
    pub liveness_timeouts: AtomicU64,
    /// 发出的数据应答
    pub replies_sent: AtomicU64,
    /// 发送失败
    pub send_failures: AtomicU64,
}

impl RobotMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            queue_full_drops: self.queue_full_drops.load(Ordering::Relaxed),
            malformed_drops: self.malformed_drops.load(Ordering::Relaxed),
            commands_applied: self.commands_applied.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
            commands_ignored: self.commands_ignored.load(Ordering::Relaxed),
            gait_frames: self.gait_frames.load(Ordering::Relaxed),
            bus_faults: self.bus_faults.load(Ordering::Relaxed),
            liveness_timeouts: self.liveness_timeouts.load(Ordering::Relaxed),
            replies_sent: self.replies_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.datagrams_received,
            &self.queue_full_drops,
            &self.malformed_drops,
            &self.commands_applied,
            &self.commands_dropped,
            &self.commands_ignored,
            &self.gait_frames,
            &self.bus_faults,
            &self.liveness_timeouts,
            &self.replies_sent,
            &self.send_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub datagrams_received: u64,
    pub queue_full_drops: u64,
    pub malformed_drops: u64,
    pub commands_applied: u64,
    pub commands_dropped: u64,
    pub commands_ignored: u64,
    pub gait_frames: u64,
    pub bus_faults: u64,
    pub liveness_timeouts: u64,
    pub replies_sent: u64,
    pub send_failures: u64,
}

impl MetricsSnapshot {
    /// 被丢弃的数据报占比（百分比）
    pub fn drop_rate(&self) -> f64 {
        if self.datagrams_received == 0 {
            return 0.0;
        }
        let dropped = self.queue_full_drops + self.malformed_drops + self.commands_dropped;
        dropped as f64 / self.datagrams_received as f64 * 100.0
    }
}
