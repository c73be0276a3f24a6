//! 毫秒计时器
//!
//! 计数器为 32 位并会回绕（约 49.7 天），调用方必须用 `wrapping_sub` 或 [`elapsed_ms`] 计算间隔。

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// 毫秒时钟
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u32;
}

/// 进程启动锚点，首次访问时设置
static APP_START: OnceLock<Instant> = OnceLock::new();

/// 单调时钟（相对进程启动，不受系统时间调整影响）
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        APP_START.get_or_init(Instant::now);
        Self
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u32 {
        let start = APP_START.get_or_init(Instant::now);
        // 截断即回绕
        start.elapsed().as_millis() as u32
    }
}

/// 手动推进的时钟（测试和仿真使用）
///
/// 克隆共享同一个计数器。
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(start_ms: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u32) {
        self.now.store(ms, Ordering::Release);
    }

    /// 推进 `delta_ms` 毫秒（回绕）
    pub fn advance(&self, delta_ms: u32) {
        let _ = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| Some(t.wrapping_add(delta_ms)));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::Acquire)
    }
}

/// `since` 到 `now` 经过的毫秒数（回绕安全）
///
/// `since` 晚于 `now`（差值超过半个计数范围）时返回 0：
/// 调用方先读时间、其他线程随后写入更新的时间戳时会出现这种情况。
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    let elapsed = now.wrapping_sub(since);
    if elapsed > i32::MAX as u32 { 0 } else { elapsed }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}
