//! 后台任务循环
//!
//! - 接收：无线回调通过 [`Intake::push`] 非阻塞入队，队列满即丢弃
//! - 分发：从队列取出数据报交给 [`Dispatcher`]
//! - 步态：按步态频率驱动 [`MotionCore::tick`](crate::motion::MotionCore::tick)
//! - 存活：周期性检查心跳超时
//! - 状态：刷新状态灯并尝试 Paired → Started

use crate::context::RobotContext;
use crate::dispatch::Dispatcher;
use crate::error::DriverError;
use crate::metrics::RobotMetrics;
use crate::motion::TickOutcome;
use crate::status::StatusIndicator;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use q8_protocol::{MAX_DATAGRAM_LEN, MacAddress};
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 常见命令帧（MOVE 为 35 字节）不需要堆分配
pub type DatagramBytes = SmallVec<[u8; 64]>;

/// 排队中的入站数据报
#[derive(Debug, Clone)]
pub struct InboundDatagram {
    pub sender: MacAddress,
    pub bytes: DatagramBytes,
}

/// 分发线程等待队列的超时（用于观察退出标志）
const DISPATCH_POLL: Duration = Duration::from_millis(50);

/// 长周期线程的睡眠切片，保证退出时不被长时间阻塞
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// 接收队列的写入端
///
/// 可克隆，交给无线驱动的接收回调使用。
#[derive(Clone)]
pub struct Intake {
    tx: Sender<InboundDatagram>,
    capacity: usize,
    ctx: Arc<RobotContext>,
}

impl Intake {
    pub(crate) fn new(tx: Sender<InboundDatagram>, capacity: usize, ctx: Arc<RobotContext>) -> Self {
        Self { tx, capacity, ctx }
    }

    /// 入队一个数据报（不阻塞）
    ///
    /// # 错误
    /// - `InvalidInput`: 空数据报或超过最大长度
    /// - `ChannelFull`: 队列已满，数据报被丢弃
    /// - `ChannelClosed`: 机器人已关闭
    pub fn push(&self, sender: MacAddress, bytes: &[u8]) -> Result<(), DriverError> {
        if bytes.is_empty() || bytes.len() > MAX_DATAGRAM_LEN {
            RobotMetrics::incr(&self.ctx.metrics.malformed_drops);
            return Err(DriverError::InvalidInput(format!(
                "datagram length {} outside 1..={}",
                bytes.len(),
                MAX_DATAGRAM_LEN
            )));
        }
        let datagram = InboundDatagram {
            sender,
            bytes: SmallVec::from_slice(bytes),
        };
        match self.tx.try_send(datagram) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                RobotMetrics::incr(&self.ctx.metrics.queue_full_drops);
                debug!("Intake queue full, datagram from {} dropped", sender);
                Err(DriverError::ChannelFull {
                    capacity: self.capacity,
                })
            },
            Err(TrySendError::Disconnected(_)) => Err(DriverError::ChannelClosed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前排队数量
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// 分发循环
pub fn dispatch_loop(
    rx: Receiver<InboundDatagram>,
    ctx: Arc<RobotContext>,
    mut dispatcher: Dispatcher,
    is_running: Arc<AtomicBool>,
) {
    loop {
        // Acquire: 看到 false 时必须同时看到其他线程的清理写入
        if !is_running.load(Ordering::Acquire) {
            trace!("Dispatch thread: is_running flag is false, exiting");
            break;
        }
        match rx.recv_timeout(DISPATCH_POLL) {
            Ok(datagram) => {
                let outcome = dispatcher.handle_datagram(&ctx, datagram.sender, &datagram.bytes);
                trace!("Datagram from {}: {:?}", datagram.sender, outcome);
            },
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                trace!("Dispatch thread: intake closed, exiting");
                break;
            },
        }
    }
}

/// 步态循环
pub fn gait_loop(ctx: Arc<RobotContext>, is_running: Arc<AtomicBool>) {
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;
        use tracing::info;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => info!("Gait thread priority set to MAX (realtime)"),
            Err(e) => warn!(
                "Failed to set gait thread priority: {:?}. \
                On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                e
            ),
        }
    }

    let period = ctx.config.timing.gait_period();
    let mut next_tick = Instant::now();

    while is_running.load(Ordering::Acquire) {
        // 持锁后读取时间，不会早于分发线程写入的跳跃起始时间
        let outcome = {
            let mut motion = ctx.motion.lock();
            motion.tick(ctx.now_ms())
        };
        match outcome {
            Ok(TickOutcome::GaitFrame) => RobotMetrics::incr(&ctx.metrics.gait_frames),
            Ok(TickOutcome::JumpFinished) => ctx.refresh_snapshot(),
            Ok(TickOutcome::Idle | TickOutcome::Jumping(_)) => {},
            Err(fault) => {
                RobotMetrics::incr(&ctx.metrics.bus_faults);
                warn!("Gait tick failed: {}", fault);
            },
        }

        next_tick += period;
        let now = Instant::now();
        if next_tick > now {
            spin_sleep::sleep(next_tick - now);
        } else {
            // 超时后重置锚点，避免连续追赶
            trace!("Gait tick overrun by {:?}", now - next_tick);
            next_tick = now;
        }
    }
    trace!("Gait thread exiting");
}

/// 存活检查循环
pub fn liveness_loop(ctx: Arc<RobotContext>, is_running: Arc<AtomicBool>) {
    let period = Duration::from_millis(u64::from(ctx.config.timing.liveness_period_ms));
    while sleep_while_running(period, &is_running) {
        ctx.check_liveness();
    }
    trace!("Liveness thread exiting");
}

/// 状态灯循环
pub fn status_loop(
    ctx: Arc<RobotContext>,
    mut indicator: StatusIndicator,
    is_running: Arc<AtomicBool>,
) {
    let period = ctx.config.timing.status_period();
    let start_attempt_ms = ctx.config.timing.start_attempt_ms;
    let mut last_attempt = ctx.now_ms();

    while is_running.load(Ordering::Acquire) {
        let now = ctx.now_ms();
        indicator.tick(ctx.state(), now);
        if now.wrapping_sub(last_attempt) >= start_attempt_ms {
            last_attempt = now;
            ctx.try_start();
        }
        spin_sleep::sleep(period);
    }
    trace!("Status thread exiting");
}

/// 分片睡眠，退出标志变为 false 时提前返回 `false`
fn sleep_while_running(total: Duration, is_running: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if !is_running.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
