//! 机器人运行时（对外 API）
//!
//! 持有共享上下文和四个后台线程：分发、步态、存活检查、状态灯。
//! Drop 时清除运行标志并等待线程退出。

use crate::context::RobotContext;
use crate::dispatch::Dispatcher;
use crate::error::DriverError;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{
    InboundDatagram, Intake, dispatch_loop, gait_loop, liveness_loop, status_loop,
};
use crate::state::{RobotSnapshot, RobotState};
use crate::status::StatusIndicator;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info};

/// 带超时的线程 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        // 看门狗线程代为 join；超时后它会继续等待，进程退出时回收
        thread::spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Robot {
    ctx: Arc<RobotContext>,
    intake: Intake,
    is_running: Arc<AtomicBool>,
    threads: Vec<(&'static str, JoinHandle<()>)>,
}

impl Robot {
    /// 启动后台线程（由 [`RobotBuilder`](crate::RobotBuilder) 调用）
    pub(crate) fn spawn(
        ctx: Arc<RobotContext>,
        dispatcher: Dispatcher,
        indicator: StatusIndicator,
    ) -> Result<Self, DriverError> {
        let capacity = ctx.config.timing.intake_capacity;
        let (tx, rx) = crossbeam_channel::bounded::<InboundDatagram>(capacity);
        let intake = Intake::new(tx, capacity, Arc::clone(&ctx));
        let is_running = Arc::new(AtomicBool::new(true));

        let mut robot = Self {
            ctx,
            intake,
            is_running,
            threads: Vec::with_capacity(4),
        };
        // 任一线程启动失败时，已启动的线程由 Drop 回收
        robot.start_dispatch(rx, dispatcher)?;
        robot.start("q8-gait", gait_loop)?;
        robot.start("q8-liveness", liveness_loop)?;

        let ctx = Arc::clone(&robot.ctx);
        let running = Arc::clone(&robot.is_running);
        robot.push_thread("q8-status", move || status_loop(ctx, indicator, running))?;

        info!(
            "Robot runtime started (gait {} Hz, heartbeat timeout {} ms)",
            robot.ctx.config.timing.gait_hz, robot.ctx.config.timing.heartbeat_timeout_ms
        );
        Ok(robot)
    }

    fn start_dispatch(
        &mut self,
        rx: Receiver<InboundDatagram>,
        dispatcher: Dispatcher,
    ) -> Result<(), DriverError> {
        let ctx = Arc::clone(&self.ctx);
        let running = Arc::clone(&self.is_running);
        self.push_thread("q8-dispatch", move || dispatch_loop(rx, ctx, dispatcher, running))
    }

    fn start(
        &mut self,
        name: &'static str,
        body: fn(Arc<RobotContext>, Arc<AtomicBool>),
    ) -> Result<(), DriverError> {
        let ctx = Arc::clone(&self.ctx);
        let running = Arc::clone(&self.is_running);
        self.push_thread(name, move || body(ctx, running))
    }

    fn push_thread(
        &mut self,
        name: &'static str,
        body: impl FnOnce() + Send + 'static,
    ) -> Result<(), DriverError> {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|source| DriverError::Spawn { name, source })?;
        self.threads.push((name, handle));
        Ok(())
    }

    /// 接收队列写入端（交给无线驱动的接收回调）
    pub fn intake(&self) -> Intake {
        self.intake.clone()
    }

    /// 当前连接状态（无锁）
    pub fn state(&self) -> RobotState {
        self.ctx.state()
    }

    pub fn snapshot(&self) -> Arc<RobotSnapshot> {
        self.ctx.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// 强制解除配对（关闭力矩后清除对端）
    pub fn force_unpair(&self) {
        info!("Forced unpair requested");
        self.ctx.force_unpair();
    }

    /// 共享上下文
    pub fn context(&self) -> &Arc<RobotContext> {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        // Release: 之前的写入对退出中的线程可见
        self.is_running.store(false, Ordering::Release);

        for (name, handle) in self.threads.drain(..) {
            if handle.join_timeout(JOIN_TIMEOUT).is_err() {
                error!(
                    "{} thread panicked or failed to shut down within {:?}",
                    name, JOIN_TIMEOUT
                );
            }
        }
    }
}
