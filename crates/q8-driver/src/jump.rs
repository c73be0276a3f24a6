//! 跳跃动作
//!
//! 由步态 tick 驱动的阶段机：Crouch → Launch → Rest → Idle。
//! 每一步执行一个动作后等待指定时间，tick 时执行所有已到期的步骤，
//! 不阻塞任何线程。

use crate::actuator::{ActuatorController, Pose, PoseSet};
use crate::config::JumpConfig;
use crate::error::ActuatorFault;
use q8_hal::{ServoBus, elapsed_ms};
use tracing::debug;

/// 跳跃阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpPhase {
    Crouch,
    Launch,
    Rest,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpAction {
    Profile(i32),
    Gain(u16),
    Pose(Pose),
}

#[derive(Debug, Clone, Copy)]
struct JumpStep {
    phase: JumpPhase,
    action: JumpAction,
    /// 相对跳跃开始的执行时间（毫秒）
    at_ms: u32,
}

/// tick 结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpProgress {
    Running(JumpPhase),
    Finished,
}

/// 进行中的跳跃
#[derive(Debug, Clone)]
pub struct JumpSequence {
    steps: Vec<JumpStep>,
    next: usize,
    started_ms: u32,
    duration_ms: u32,
}

impl JumpSequence {
    pub fn new(config: &JumpConfig, launch_gain: u16, now_ms: u32) -> Self {
        // (阶段, 动作, 执行后等待)
        let plan = [
            (JumpPhase::Crouch, JumpAction::Profile(config.crouch_profile_ms), config.settle_ms),
            (JumpPhase::Crouch, JumpAction::Pose(Pose::Crouch), config.crouch_hold_ms),
            (JumpPhase::Launch, JumpAction::Profile(0), 0),
            (JumpPhase::Launch, JumpAction::Gain(launch_gain), config.settle_ms),
            (JumpPhase::Launch, JumpAction::Pose(Pose::Launch), config.launch_hold_ms),
            (JumpPhase::Rest, JumpAction::Pose(Pose::Rest), config.rest_hold_ms),
            (JumpPhase::Idle, JumpAction::Profile(config.crouch_profile_ms), config.settle_ms),
            (JumpPhase::Idle, JumpAction::Pose(Pose::Idle), config.idle_hold_ms),
        ];

        let mut at_ms = 0u32;
        let mut steps = Vec::with_capacity(plan.len());
        for (phase, action, wait) in plan {
            steps.push(JumpStep {
                phase,
                action,
                at_ms,
            });
            at_ms = at_ms.saturating_add(wait);
        }

        Self {
            steps,
            next: 0,
            started_ms: now_ms,
            duration_ms: at_ms,
        }
    }

    /// 执行所有到期步骤
    ///
    /// 总线故障会中止本次 tick 并返回错误；故障步骤视为已执行，下次 tick 继续后续步骤。
    /// `now_ms` 早于起始时间时按 0 处理。
    pub fn tick<B: ServoBus>(
        &mut self,
        now_ms: u32,
        actuator: &mut ActuatorController<B>,
        poses: &PoseSet,
    ) -> Result<JumpProgress, ActuatorFault> {
        let elapsed = elapsed_ms(now_ms, self.started_ms);

        while let Some(step) = self.steps.get(self.next).copied() {
            if elapsed < step.at_ms {
                return Ok(JumpProgress::Running(step.phase));
            }
            self.next += 1;
            debug!("Jump {:?}: {:?}", step.phase, step.action);
            match step.action {
                JumpAction::Profile(ms) => actuator.apply_profile(ms)?,
                JumpAction::Gain(gain) => actuator.set_position_gain(gain)?,
                JumpAction::Pose(pose) => actuator.bulk_write_goals(poses.get(pose))?,
            }
        }

        if elapsed < self.duration_ms {
            Ok(JumpProgress::Running(JumpPhase::Idle))
        } else {
            Ok(JumpProgress::Finished)
        }
    }

    /// 当前所处阶段（最后执行的步骤）
    pub fn phase(&self) -> JumpPhase {
        self.next
            .checked_sub(1)
            .and_then(|i| self.steps.get(i))
            .map_or(JumpPhase::Crouch, |s| s.phase)
    }

    pub fn duration_ms(&self) -> u32 {
        self.duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::JointCalibration;
    use crate::config::PoseConfig;
    use q8_hal::ControlItem;
    use q8_hal::mock::MockServoBus;

    fn setup() -> (ActuatorController<MockServoBus>, MockServoBus, PoseSet) {
        let bus = MockServoBus::new();
        let act = ActuatorController::new(bus.clone(), [11, 12, 13, 14, 15, 16, 17, 18], 400);
        let poses = PoseSet::from_degrees(&JointCalibration::default(), &PoseConfig::default());
        (act, bus, poses)
    }

    #[test]
    fn test_full_sequence_timeline() {
        let (mut act, bus, poses) = setup();
        let start = 1_000;
        let mut jump = JumpSequence::new(&JumpConfig::default(), 800, start);
        assert_eq!(jump.duration_ms(), 7400);

        // t=0: 下蹲曲线
        assert_eq!(
            jump.tick(start, &mut act, &poses).unwrap(),
            JumpProgress::Running(JumpPhase::Crouch)
        );
        assert_eq!(act.state().profile_ms, 500);
        assert!(bus.goal_writes().is_empty());

        // t=100: 下蹲姿态
        jump.tick(start + 100, &mut act, &poses).unwrap();
        assert_eq!(bus.last_goals(), Some(poses.crouch));

        // t=1100: 曲线 0 + 起跳增益
        jump.tick(start + 1100, &mut act, &poses).unwrap();
        assert_eq!(act.state().profile_ms, 0);
        assert_eq!(act.state().position_gain, 800);
        assert_eq!(jump.phase(), JumpPhase::Launch);

        // t=1200 起跳，t=1300 落地
        jump.tick(start + 1200, &mut act, &poses).unwrap();
        assert_eq!(bus.last_goals(), Some(poses.launch));
        jump.tick(start + 1300, &mut act, &poses).unwrap();
        assert_eq!(bus.last_goals(), Some(poses.rest));

        // t=6400 回到待机
        jump.tick(start + 6400, &mut act, &poses).unwrap();
        assert_eq!(bus.last_goals(), Some(poses.idle));
        assert_eq!(act.state().profile_ms, 500);
        assert_eq!(bus.item(ControlItem::PositionPGain), Some(400));

        assert_eq!(
            jump.tick(start + 7399, &mut act, &poses).unwrap(),
            JumpProgress::Running(JumpPhase::Idle)
        );
        assert_eq!(
            jump.tick(start + 7400, &mut act, &poses).unwrap(),
            JumpProgress::Finished
        );
        assert_eq!(bus.goal_writes().len(), 4);
    }

    #[test]
    fn test_late_tick_catches_up() {
        let (mut act, bus, poses) = setup();
        let mut jump = JumpSequence::new(&JumpConfig::default(), 800, 0);
        jump.tick(1250, &mut act, &poses).unwrap();
        assert_eq!(bus.goal_writes(), vec![poses.crouch, poses.launch]);
    }

    #[test]
    fn test_tick_before_start_runs_only_first_step() {
        let (mut act, bus, poses) = setup();
        let mut jump = JumpSequence::new(&JumpConfig::default(), 800, 1001);
        assert_eq!(
            jump.tick(1000, &mut act, &poses).unwrap(),
            JumpProgress::Running(JumpPhase::Crouch)
        );
        assert!(bus.goal_writes().is_empty());
        assert_eq!(act.state().profile_ms, 500);

        jump.tick(1001 + 100, &mut act, &poses).unwrap();
        assert_eq!(bus.goal_writes(), vec![poses.crouch]);
    }

    #[test]
    fn test_sequence_across_clock_wrap() {
        let (mut act, bus, poses) = setup();
        let start = u32::MAX - 50;
        let mut jump = JumpSequence::new(&JumpConfig::default(), 800, start);
        jump.tick(start.wrapping_add(150), &mut act, &poses).unwrap();
        assert_eq!(bus.last_goals(), Some(poses.crouch));
    }
}
