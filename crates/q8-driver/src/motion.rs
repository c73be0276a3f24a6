//! 运动核心
//!
//! 执行器、步态播放器和跳跃阶段机的组合，由一把锁统一保护，
//! 所有舵机访问都经过这里串行化。

use crate::actuator::{ActuatorController, JointGoals, PoseSet};
use crate::config::{JumpConfig, RobotConfig};
use crate::error::ActuatorFault;
use crate::gait::{GaitCursor, GaitPlayer, GaitTable};
use crate::jump::{JumpPhase, JumpProgress, JumpSequence};
use q8_hal::ServoBus;
use std::sync::Arc;
use tracing::info;

/// 一次 tick 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 无动作
    Idle,
    /// 写出了一帧步态
    GaitFrame,
    /// 跳跃进行中
    Jumping(JumpPhase),
    /// 跳跃刚刚结束
    JumpFinished,
}

pub struct MotionCore<B: ServoBus = Box<dyn ServoBus>> {
    actuator: ActuatorController<B>,
    gait: GaitPlayer,
    jump: Option<JumpSequence>,
    poses: PoseSet,
    jump_config: JumpConfig,
    launch_gain: u16,
}

impl<B: ServoBus> MotionCore<B> {
    pub fn new(
        actuator: ActuatorController<B>,
        table: Arc<GaitTable>,
        poses: PoseSet,
        config: &RobotConfig,
    ) -> Self {
        Self {
            actuator,
            gait: GaitPlayer::new(table),
            jump: None,
            poses,
            jump_config: config.jump.clone(),
            launch_gain: config.servo.launch_gain,
        }
    }

    /// 周期 tick：跳跃优先，其次步态
    ///
    /// 跳跃进行中步态游标不前进。
    pub fn tick(&mut self, now_ms: u32) -> Result<TickOutcome, ActuatorFault> {
        if let Some(jump) = self.jump.as_mut() {
            return match jump.tick(now_ms, &mut self.actuator, &self.poses)? {
                JumpProgress::Running(phase) => Ok(TickOutcome::Jumping(phase)),
                JumpProgress::Finished => {
                    self.jump = None;
                    info!("Jump finished");
                    Ok(TickOutcome::JumpFinished)
                },
            };
        }

        match self.gait.next_frame() {
            Some(frame) => {
                self.actuator.bulk_write_goals(&frame)?;
                Ok(TickOutcome::GaitFrame)
            },
            None => Ok(TickOutcome::Idle),
        }
    }

    /// 开始跳跃；已在跳跃中返回 `false`
    ///
    /// 第一步在下一次 tick 时执行。
    pub fn start_jump(&mut self, now_ms: u32) -> bool {
        if self.jump.is_some() {
            return false;
        }
        self.jump = Some(JumpSequence::new(&self.jump_config, self.launch_gain, now_ms));
        info!("Jump started");
        true
    }

    /// 取消进行中的跳跃
    pub fn cancel_jump(&mut self) -> bool {
        let cancelled = self.jump.take().is_some();
        if cancelled {
            info!("Jump cancelled");
        }
        cancelled
    }

    pub fn is_jumping(&self) -> bool {
        self.jump.is_some()
    }

    /// 开始播放步态；未知步态返回 `false`
    pub fn start_gait(&mut self, gait: u8) -> bool {
        self.gait.start(gait)
    }

    /// 停止步态并回到待机姿态
    pub fn stop_gait(&mut self) -> Result<(), ActuatorFault> {
        self.gait.stop();
        let idle = self.poses.idle;
        self.actuator.bulk_write_goals(&idle)
    }

    pub fn move_goals(&mut self, goals: &JointGoals) -> Result<(), ActuatorFault> {
        self.actuator.bulk_write_goals(goals)
    }

    /// 连接丢失：取消跳跃并停止步态（不写待机姿态），然后关闭力矩
    pub fn shutdown_motion(&mut self) -> Result<(), ActuatorFault> {
        self.cancel_jump();
        self.gait.stop();
        self.actuator.force_torque_off()
    }

    pub fn actuator(&self) -> &ActuatorController<B> {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut ActuatorController<B> {
        &mut self.actuator
    }

    pub fn gait_cursor(&self) -> GaitCursor {
        self.gait.cursor()
    }

    pub fn poses(&self) -> &PoseSet {
        &self.poses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::JointCalibration;
    use q8_hal::mock::MockServoBus;

    fn core() -> (MotionCore<MockServoBus>, MockServoBus) {
        let config = RobotConfig::default();
        let bus = MockServoBus::new();
        let actuator = ActuatorController::new(bus.clone(), [11, 12, 13, 14, 15, 16, 17, 18], 400);
        let frames = vec![[1; 8], [2; 8]];
        let table = Arc::new(GaitTable::from_parts(frames, vec![2]).unwrap());
        let poses = PoseSet::from_degrees(&JointCalibration::default(), &config.poses);
        (MotionCore::new(actuator, table, poses, &config), bus)
    }

    #[test]
    fn test_tick_plays_gait() {
        let (mut core, bus) = core();
        assert_eq!(core.tick(0).unwrap(), TickOutcome::Idle);
        assert!(core.start_gait(0));
        assert_eq!(core.tick(5).unwrap(), TickOutcome::GaitFrame);
        assert_eq!(core.tick(10).unwrap(), TickOutcome::GaitFrame);
        assert_eq!(core.tick(15).unwrap(), TickOutcome::GaitFrame);
        assert_eq!(bus.goal_writes(), vec![[1; 8], [2; 8], [1; 8]]);
    }

    #[test]
    fn test_jump_freezes_gait_cursor() {
        let (mut core, _bus) = core();
        core.start_gait(0);
        core.tick(0).unwrap();
        let cursor = core.gait_cursor();

        assert!(core.start_jump(10));
        assert!(!core.start_jump(11));
        for t in (10..2000).step_by(5) {
            assert!(matches!(core.tick(t).unwrap(), TickOutcome::Jumping(_)));
        }
        assert_eq!(core.gait_cursor(), cursor);
    }

    #[test]
    fn test_jump_finishes_and_gait_resumes() {
        let (mut core, _bus) = core();
        core.start_gait(0);
        core.start_jump(0);
        core.tick(0).unwrap();
        assert_eq!(core.tick(7400).unwrap(), TickOutcome::JumpFinished);
        assert!(!core.is_jumping());
        assert_eq!(core.tick(7405).unwrap(), TickOutcome::GaitFrame);
    }

    #[test]
    fn test_tick_older_than_jump_start_keeps_holds() {
        let (mut core, bus) = core();
        assert!(core.start_jump(1001));
        assert_eq!(core.tick(1000).unwrap(), TickOutcome::Jumping(JumpPhase::Crouch));
        assert!(bus.goal_writes().is_empty());
        assert!(core.is_jumping());
    }

    #[test]
    fn test_stop_gait_writes_idle() {
        let (mut core, bus) = core();
        core.start_gait(0);
        core.tick(0).unwrap();
        core.stop_gait().unwrap();
        assert_eq!(bus.last_goals(), Some(core.poses().idle));
        assert_eq!(core.gait_cursor().frame_index, 0);
        assert_eq!(core.tick(5).unwrap(), TickOutcome::Idle);
    }

    #[test]
    fn test_shutdown_cancels_jump_and_torque() {
        let (mut core, bus) = core();
        core.actuator_mut().set_torque(true).unwrap();
        core.start_gait(0);
        core.start_jump(0);
        let writes = bus.goal_writes().len();
        core.shutdown_motion().unwrap();
        assert!(!core.is_jumping());
        assert!(!core.gait_cursor().active);
        assert_eq!(bus.goal_writes().len(), writes);
        assert!(!bus.torque());
        assert!(!core.actuator().comm_ready());
    }
}
