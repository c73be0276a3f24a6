//! 机器人运行上下文
//!
//! 所有线程共享同一个 [`RobotContext`]。加锁顺序固定为 `pairing` → `motion`，
//! 且发送无线数据前必须释放全部锁。

use crate::config::RobotConfig;
use crate::metrics::RobotMetrics;
use crate::motion::MotionCore;
use crate::pairing::PairingMachine;
use crate::state::{AtomicRobotState, RobotSnapshot, RobotState};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use q8_hal::{Clock, RadioLink};
use q8_protocol::MacAddress;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

pub struct RobotContext {
    radio: Arc<dyn RadioLink>,
    clock: Arc<dyn Clock>,
    /// 配对状态机
    pub pairing: Mutex<PairingMachine>,
    /// 执行器 + 步态 + 跳跃
    pub motion: Mutex<MotionCore>,
    state: Arc<AtomicRobotState>,
    snapshot: ArcSwap<RobotSnapshot>,
    pub metrics: RobotMetrics,
    pub config: RobotConfig,
}

impl RobotContext {
    pub fn new(
        radio: Arc<dyn RadioLink>,
        clock: Arc<dyn Clock>,
        pairing: PairingMachine,
        motion: MotionCore,
        config: RobotConfig,
    ) -> Self {
        let state = pairing.state_handle();
        let ctx = Self {
            radio,
            clock,
            pairing: Mutex::new(pairing),
            motion: Mutex::new(motion),
            state,
            snapshot: ArcSwap::from_pointee(RobotSnapshot::default()),
            metrics: RobotMetrics::new(),
            config,
        };
        ctx.refresh_snapshot();
        ctx
    }

    pub fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    /// 当前连接状态（无锁）
    pub fn state(&self) -> RobotState {
        self.state.get(Ordering::Acquire)
    }

    /// 最近发布的状态快照
    pub fn snapshot(&self) -> Arc<RobotSnapshot> {
        self.snapshot.load_full()
    }

    /// 修改快照中的部分字段并重新发布
    pub fn update_snapshot(&self, mut f: impl FnMut(&mut RobotSnapshot)) {
        self.snapshot.rcu(|old| {
            let mut next = RobotSnapshot::clone(old);
            f(&mut next);
            next
        });
    }

    /// 从配对状态机和运动核心重新采集快照
    ///
    /// 调用方不能持有任何锁。
    pub fn refresh_snapshot(&self) {
        let now = self.now_ms();
        let pairing = self.pairing.lock();
        let motion = self.motion.lock();
        let state = pairing.state();
        let peer = pairing.peer();
        let actuation = *motion.actuator().state();
        let cursor = motion.gait_cursor();
        let jumping = motion.is_jumping();
        drop(motion);
        drop(pairing);

        self.update_snapshot(|s| {
            s.state = state;
            s.peer = peer;
            s.torque_enabled = actuation.torque_enabled;
            s.profile_ms = actuation.profile_ms;
            s.gait = cursor.active.then_some(cursor.gait_id);
            s.jumping = jumping;
            s.updated_ms = now;
        });
    }

    /// 向对端发送数据报
    pub fn send(&self, peer: MacAddress, bytes: &[u8]) -> bool {
        match self.radio.send(peer, bytes) {
            Ok(()) => {
                RobotMetrics::incr(&self.metrics.replies_sent);
                true
            },
            Err(e) => {
                RobotMetrics::incr(&self.metrics.send_failures);
                warn!("Send to {} failed: {}", peer, e);
                false
            },
        }
    }

    /// 存活检查：心跳超时则关闭力矩并解除配对
    ///
    /// 在持有 pairing 锁后读取时间，与心跳刷新互斥。返回是否发生了超时。
    pub fn check_liveness(&self) -> bool {
        {
            let mut pairing = self.pairing.lock();
            let now_ms = self.now_ms();
            if !pairing.is_expired(now_ms) {
                return false;
            }
            warn!("Heartbeat timeout: {}ms since last heartbeat", pairing.silence_ms(now_ms));
            self.disconnect(&mut pairing);
        }
        RobotMetrics::incr(&self.metrics.liveness_timeouts);
        self.refresh_snapshot();
        true
    }

    /// 强制解除配对（操作员命令）
    pub fn force_unpair(&self) {
        {
            let mut pairing = self.pairing.lock();
            self.disconnect(&mut pairing);
        }
        self.refresh_snapshot();
    }

    /// 关闭力矩后解除配对（调用方已持有 pairing 锁）
    fn disconnect(&self, pairing: &mut PairingMachine) {
        {
            let mut motion = self.motion.lock();
            if let Err(e) = motion.shutdown_motion() {
                RobotMetrics::incr(&self.metrics.bus_faults);
                warn!("{}; torque state reset anyway", e);
            }
        }
        pairing.unpair();
    }

    /// 尝试 Paired → Started
    pub fn try_start(&self) -> bool {
        let started = {
            let mut pairing = self.pairing.lock();
            if pairing.state() != RobotState::Paired {
                return false;
            }
            let ready = self.motion.lock().actuator().comm_ready();
            pairing.try_start(ready)
        };
        if started {
            self.refresh_snapshot();
        } else {
            debug!("Start deferred: actuators not ready");
        }
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ActuatorController, JointCalibration, PoseSet};
    use crate::gait::GaitTable;
    use q8_hal::mock::{MockRadio, MockServoBus};
    use q8_hal::{ManualClock, MemoryPeerStore, ServoBus};

    const PEER: MacAddress = MacAddress([1, 2, 3, 4, 5, 6]);

    fn context(clock: ManualClock) -> (RobotContext, MockServoBus, MockRadio) {
        let config = RobotConfig::default();
        let bus = MockServoBus::new();
        let radio = MockRadio::default();
        let radio_link: Arc<dyn RadioLink> = Arc::new(radio.clone());
        let boxed: Box<dyn ServoBus> = Box::new(bus.clone());
        let actuator = ActuatorController::new(boxed, [11, 12, 13, 14, 15, 16, 17, 18], 400);
        let poses = PoseSet::from_degrees(&JointCalibration::default(), &config.poses);
        let motion = MotionCore::new(actuator, Arc::new(GaitTable::empty()), poses, &config);
        let pairing = PairingMachine::new(
            Arc::clone(&radio_link),
            Box::new(MemoryPeerStore::new()),
            config.timing.heartbeat_timeout_ms,
            false,
        );
        let ctx = RobotContext::new(radio_link, Arc::new(clock), pairing, motion, config);
        (ctx, bus, radio)
    }

    #[test]
    fn test_liveness_timeout_turns_torque_off_then_unpairs() {
        let clock = ManualClock::new(1000);
        let (ctx, bus, radio) = context(clock.clone());
        ctx.pairing.lock().handle_pairing(PEER, 1000);
        ctx.motion.lock().actuator_mut().set_torque(true).unwrap();
        assert!(ctx.try_start());
        assert_eq!(ctx.state(), RobotState::Started);

        clock.set(1000 + 2999);
        assert!(!ctx.check_liveness());
        assert_eq!(ctx.state(), RobotState::Started);

        clock.set(1000 + 3001);
        assert!(ctx.check_liveness());
        assert_eq!(ctx.state(), RobotState::Unpaired);
        assert!(!bus.torque());
        assert!(!radio.is_registered(PEER));
        assert_eq!(ctx.metrics.snapshot().liveness_timeouts, 1);

        let snap = ctx.snapshot();
        assert_eq!(snap.state, RobotState::Unpaired);
        assert_eq!(snap.peer, None);
        assert!(!snap.torque_enabled);
        assert_eq!(snap.updated_ms, 4001);
    }

    #[test]
    fn test_liveness_reads_clock_after_heartbeat_refresh() {
        let clock = ManualClock::new(4000);
        let (ctx, bus, _radio) = context(clock.clone());
        ctx.pairing.lock().handle_pairing(PEER, 4000);
        ctx.motion.lock().actuator_mut().set_torque(true).unwrap();
        assert!(ctx.try_start());

        // 心跳时间戳比存活线程上一次看到的时间更新
        clock.set(5001);
        assert!(ctx.pairing.lock().handle_heartbeat(PEER, 5001));
        assert!(!ctx.check_liveness());
        assert_eq!(ctx.state(), RobotState::Started);
        assert!(bus.torque());
        assert_eq!(ctx.metrics.snapshot().liveness_timeouts, 0);
    }

    #[test]
    fn test_try_start_waits_for_torque() {
        let (ctx, _bus, _radio) = context(ManualClock::new(0));
        assert!(!ctx.try_start());
        ctx.pairing.lock().handle_pairing(PEER, 0);
        assert!(!ctx.try_start());
        assert_eq!(ctx.state(), RobotState::Paired);
    }

    #[test]
    fn test_force_unpair() {
        let (ctx, _bus, _radio) = context(ManualClock::new(0));
        ctx.pairing.lock().handle_pairing(PEER, 0);
        ctx.force_unpair();
        assert_eq!(ctx.state(), RobotState::Unpaired);
        assert_eq!(ctx.metrics.snapshot().liveness_timeouts, 0);
    }

    #[test]
    fn test_send_counts_failures() {
        let (ctx, _bus, radio) = context(ManualClock::new(0));
        // 未注册对端
        assert!(!ctx.send(PEER, &[1, 0]));
        ctx.pairing.lock().handle_pairing(PEER, 0);
        assert!(ctx.send(PEER, &[1, 0]));
        radio.set_fail_sends(true);
        assert!(!ctx.send(PEER, &[1, 0]));
        let m = ctx.metrics.snapshot();
        assert_eq!((m.replies_sent, m.send_failures), (1, 2));
    }
}
