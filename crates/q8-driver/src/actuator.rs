//! 舵机执行器控制
//!
//! 封装 8 个关节舵机的力矩、运动曲线、增益、批量写入和同步读取，
//! 并跟踪当前的关节执行状态（[`JointActuationState`]）。
//!
//! # 单位换算
//!
//! 舵机一圈为 4096 个单位，关节角度（度）与舵机单位的换算：
//!
//! ```text
//! step  = 360 / 4096 / gear_ratio
//! units = floor(deg / step + 0.5) + zero_offset
//! deg   = (units - zero_offset) * step
//! ```

use crate::config::{PoseConfig, ServoConfig};
use crate::error::ActuatorFault;
use q8_hal::{ControlItem, JointReading, OperatingMode, ServoBus};
use q8_protocol::{CURRENT_TELEMETRY_OFFSET, JOINT_COUNT, LEG_COUNT, TELEMETRY_SNAPSHOT_LEN};
use tracing::{debug, info, warn};

/// 8 个关节的目标位置（舵机单位）
pub type JointGoals = [i32; JOINT_COUNT];

/// 一次遥测快照编码后的数据（8 × (电流, 位置)）
pub type TelemetrySnapshot = [u16; TELEMETRY_SNAPSHOT_LEN];

/// 关节角度标定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointCalibration {
    pub gear_ratio: f32,
    pub zero_offset: i32,
}

impl Default for JointCalibration {
    fn default() -> Self {
        Self {
            gear_ratio: 1.0,
            zero_offset: 0,
        }
    }
}

impl JointCalibration {
    pub fn new(gear_ratio: f32, zero_offset: i32) -> Self {
        Self {
            gear_ratio,
            zero_offset,
        }
    }

    /// 每个舵机单位对应的关节角度（度）
    pub fn step(&self) -> f32 {
        360.0 / 4096.0 / self.gear_ratio
    }

    /// 角度 → 舵机单位（四舍五入，0.5 向上）
    pub fn deg_to_units(&self, deg: f32) -> i32 {
        (deg / self.step() + 0.5).floor() as i32 + self.zero_offset
    }

    /// 舵机单位 → 角度
    pub fn units_to_deg(&self, units: i32) -> f32 {
        (units - self.zero_offset) as f32 * self.step()
    }

    /// 将单腿的两个关节角度复制到 4 条腿
    pub fn expand_pose(&self, pair: [f32; 2]) -> JointGoals {
        let mut goals = [0; JOINT_COUNT];
        for leg in 0..LEG_COUNT {
            goals[leg * 2] = self.deg_to_units(pair[0]);
            goals[leg * 2 + 1] = self.deg_to_units(pair[1]);
        }
        goals
    }
}

/// 命名姿态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pose {
    Idle,
    Crouch,
    Launch,
    Rest,
}

/// 启动时预先换算好的命名姿态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoseSet {
    pub idle: JointGoals,
    pub crouch: JointGoals,
    pub launch: JointGoals,
    pub rest: JointGoals,
}

impl PoseSet {
    pub fn from_degrees(calibration: &JointCalibration, poses: &PoseConfig) -> Self {
        Self {
            idle: calibration.expand_pose(poses.idle),
            crouch: calibration.expand_pose(poses.crouch),
            launch: calibration.expand_pose(poses.launch),
            rest: calibration.expand_pose(poses.rest),
        }
    }

    pub fn get(&self, pose: Pose) -> &JointGoals {
        match pose {
            Pose::Idle => &self.idle,
            Pose::Crouch => &self.crouch,
            Pose::Launch => &self.launch,
            Pose::Rest => &self.rest,
        }
    }
}

/// 关节执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointActuationState {
    /// 最近一次写入的目标位置
    pub goals: JointGoals,
    pub torque_enabled: bool,
    /// 当前运动曲线时长（毫秒）
    pub profile_ms: i32,
    pub position_gain: u16,
}

/// 舵机执行器控制器
pub struct ActuatorController<B: ServoBus = Box<dyn ServoBus>> {
    bus: B,
    servo_ids: [u8; JOINT_COUNT],
    default_gain: u16,
    state: JointActuationState,
}

impl<B: ServoBus> ActuatorController<B> {
    pub fn new(bus: B, servo_ids: [u8; JOINT_COUNT], default_gain: u16) -> Self {
        Self {
            bus,
            servo_ids,
            default_gain,
            state: JointActuationState {
                goals: [0; JOINT_COUNT],
                torque_enabled: false,
                profile_ms: 0,
                position_gain: 0,
            },
        }
    }

    /// 按配置创建
    pub fn from_config(bus: B, servo_ids: [u8; JOINT_COUNT], config: &ServoConfig) -> Self {
        Self::new(bus, servo_ids, config.default_gain)
    }

    /// 启动初始化：检测舵机、设置多圈位置模式、设置初始运动曲线
    ///
    /// 未响应的舵机只记录警告，不中止启动。
    pub fn begin(&mut self, boot_profile_ms: i32) -> Result<(), ActuatorFault> {
        let mut missing = Vec::new();
        for id in self.servo_ids {
            if let Err(e) = self.bus.ping(id) {
                debug!("Ping servo {} failed: {}", id, e);
                missing.push(id);
            }
        }
        if !missing.is_empty() {
            warn!("Servos not responding: {:?}", missing);
        }

        self.set_operating_mode(OperatingMode::ExtendedPosition)?;
        self.apply_profile(boot_profile_ms)?;
        info!(
            "Actuators ready: ids={:?}, profile={}ms",
            self.servo_ids, boot_profile_ms
        );
        Ok(())
    }

    /// 切换运行模式（力矩开启时先关闭，切换后恢复）
    fn set_operating_mode(&mut self, mode: OperatingMode) -> Result<(), ActuatorFault> {
        let torque = self.state.torque_enabled;
        if torque {
            self.bus
                .set_torque(false)
                .map_err(|e| ActuatorFault::new("set_operating_mode", e))?;
        }
        self.bus
            .set_operating_mode(mode)
            .map_err(|e| ActuatorFault::new("set_operating_mode", e))?;
        if torque {
            self.bus
                .set_torque(true)
                .map_err(|e| ActuatorFault::new("set_operating_mode", e))?;
        }
        Ok(())
    }

    /// 力矩开关（与当前状态相同时不访问总线）
    ///
    /// 返回是否发生了切换。
    pub fn set_torque(&mut self, enabled: bool) -> Result<bool, ActuatorFault> {
        if enabled == self.state.torque_enabled {
            return Ok(false);
        }
        self.bus
            .set_torque(enabled)
            .map_err(|e| ActuatorFault::new("set_torque", e))?;
        self.state.torque_enabled = enabled;
        info!("Torque {}", if enabled { "on" } else { "off" });
        Ok(true)
    }

    /// 无条件关闭力矩（连接丢失时使用）
    pub fn force_torque_off(&mut self) -> Result<(), ActuatorFault> {
        let result = self
            .bus
            .set_torque(false)
            .map_err(|e| ActuatorFault::new("force_torque_off", e));
        self.reset_torque_state();
        result
    }

    /// 将力矩标志复位为关闭（不访问总线）
    pub fn reset_torque_state(&mut self) {
        self.state.torque_enabled = false;
    }

    /// 运动曲线设置（时长与当前相同时不访问总线）
    ///
    /// 返回是否发生了变化。
    pub fn set_motion_profile(&mut self, duration_ms: i32) -> Result<bool, ActuatorFault> {
        if duration_ms == self.state.profile_ms {
            return Ok(false);
        }
        self.apply_profile(duration_ms)?;
        info!("Profile changed: {}ms", duration_ms);
        Ok(true)
    }

    /// 无条件写入运动曲线：增益复位，速度 = 时长，加速度 = 时长 / 3
    pub fn apply_profile(&mut self, duration_ms: i32) -> Result<(), ActuatorFault> {
        self.set_position_gain(self.default_gain)?;
        self.bus
            .write_item(ControlItem::ProfileVelocity, duration_ms)
            .map_err(|e| ActuatorFault::new("apply_profile", e))?;
        self.bus
            .write_item(ControlItem::ProfileAcceleration, duration_ms / 3)
            .map_err(|e| ActuatorFault::new("apply_profile", e))?;
        self.state.profile_ms = duration_ms;
        Ok(())
    }

    pub fn set_position_gain(&mut self, gain: u16) -> Result<(), ActuatorFault> {
        self.bus
            .write_item(ControlItem::PositionPGain, i32::from(gain))
            .map_err(|e| ActuatorFault::new("set_position_gain", e))?;
        self.state.position_gain = gain;
        Ok(())
    }

    /// 一次总线事务写入 8 个关节目标位置
    pub fn bulk_write_goals(&mut self, goals: &JointGoals) -> Result<(), ActuatorFault> {
        self.bus
            .write_goals(goals)
            .map_err(|e| ActuatorFault::new("bulk_write_goals", e))?;
        self.state.goals = *goals;
        Ok(())
    }

    /// 同步读取全部关节遥测
    pub fn read_telemetry(&mut self) -> Result<[JointReading; JOINT_COUNT], ActuatorFault> {
        self.bus
            .read_state()
            .map_err(|e| ActuatorFault::new("read_telemetry", e))
    }

    /// 读取并编码遥测；读取失败时返回全零快照
    pub fn read_telemetry_or_zeroed(&mut self) -> TelemetrySnapshot {
        match self.read_telemetry() {
            Ok(readings) => encode_telemetry(&readings),
            Err(e) => {
                warn!("{}; recording zeroed snapshot", e);
                [0; TELEMETRY_SNAPSHOT_LEN]
            },
        }
    }

    /// 通信就绪（力矩已开启）
    pub fn comm_ready(&self) -> bool {
        self.state.torque_enabled
    }

    pub fn state(&self) -> &JointActuationState {
        &self.state
    }

    pub fn servo_ids(&self) -> &[u8; JOINT_COUNT] {
        &self.servo_ids
    }
}

/// 编码遥测：每个关节 `(current + 10000) as u16`, `position as u16`
pub fn encode_telemetry(readings: &[JointReading; JOINT_COUNT]) -> TelemetrySnapshot {
    let mut out = [0u16; TELEMETRY_SNAPSHOT_LEN];
    for (i, r) in readings.iter().enumerate() {
        out[i * 2] = (i32::from(r.current) + CURRENT_TELEMETRY_OFFSET) as u16;
        out[i * 2 + 1] = r.position as u16;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use q8_hal::mock::MockServoBus;

    const IDS: [u8; JOINT_COUNT] = [11, 12, 13, 14, 15, 16, 17, 18];

    fn controller() -> (ActuatorController<MockServoBus>, MockServoBus) {
        let bus = MockServoBus::new();
        (ActuatorController::new(bus.clone(), IDS, 400), bus)
    }

    #[test]
    fn test_deg_to_units() {
        let cal = JointCalibration::default();
        assert_eq!(cal.deg_to_units(0.0), 0);
        assert_eq!(cal.deg_to_units(90.0), 1024);
        assert_eq!(cal.deg_to_units(180.0), 2048);
        assert_eq!(cal.deg_to_units(-90.0), -1024);

        let geared = JointCalibration::new(2.0, 100);
        assert_eq!(geared.deg_to_units(90.0), 2048 + 100);
        assert!((geared.units_to_deg(2148) - 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_expand_pose_replicates_legs() {
        let cal = JointCalibration::default();
        let goals = cal.expand_pose([90.0, 180.0]);
        assert_eq!(goals, [1024, 2048, 1024, 2048, 1024, 2048, 1024, 2048]);
    }

    #[test]
    fn test_begin_sets_mode_and_profile() {
        let (mut act, bus) = controller();
        act.begin(1000).unwrap();

        let s = bus.state();
        assert_eq!(s.mode, Some(OperatingMode::ExtendedPosition));
        assert_eq!(s.items.get(&ControlItem::ProfileVelocity), Some(&1000));
        assert_eq!(s.items.get(&ControlItem::ProfileAcceleration), Some(&333));
        assert_eq!(s.items.get(&ControlItem::PositionPGain), Some(&400));
        drop(s);
        assert_eq!(act.state().profile_ms, 1000);
    }

    #[test]
    fn test_set_torque_only_on_change() {
        let (mut act, bus) = controller();
        assert!(!act.set_torque(false).unwrap());
        assert!(act.set_torque(true).unwrap());
        assert!(!act.set_torque(true).unwrap());
        assert_eq!(bus.state().torque_writes, vec![true]);
        assert!(act.comm_ready());
    }

    #[test]
    fn test_set_motion_profile_only_on_change() {
        let (mut act, bus) = controller();
        act.apply_profile(1000).unwrap();
        bus.clear_history();

        assert!(!act.set_motion_profile(1000).unwrap());
        assert!(bus.state().item_writes.is_empty());

        assert!(act.set_motion_profile(300).unwrap());
        assert_eq!(
            bus.state().item_writes,
            vec![
                (ControlItem::PositionPGain, 400),
                (ControlItem::ProfileVelocity, 300),
                (ControlItem::ProfileAcceleration, 100),
            ]
        );
    }

    #[test]
    fn test_force_torque_off_resets_flag_even_on_fault() {
        let (mut act, bus) = controller();
        act.set_torque(true).unwrap();
        bus.set_fail_writes(true);
        assert!(act.force_torque_off().is_err());
        assert!(!act.state().torque_enabled);
    }

    #[test]
    fn test_bulk_write_fault_keeps_state() {
        let (mut act, bus) = controller();
        act.bulk_write_goals(&[5; JOINT_COUNT]).unwrap();
        bus.set_fail_writes(true);
        let err = act.bulk_write_goals(&[9; JOINT_COUNT]).unwrap_err();
        assert_eq!(err.op, "bulk_write_goals");
        assert_eq!(act.state().goals, [5; JOINT_COUNT]);
    }

    #[test]
    fn test_telemetry_encoding() {
        let (mut act, bus) = controller();
        bus.set_currents([-20, 0, 15, 0, 0, 0, 0, 0]);
        act.bulk_write_goals(&[2048, 1024, 0, 0, 0, 0, 0, 0]).unwrap();

        let snap = act.read_telemetry_or_zeroed();
        assert_eq!(&snap[..4], &[9980, 2048, 10000, 1024]);
        assert_eq!(snap[4], 10015);
    }

    #[test]
    fn test_telemetry_zeroed_on_failure() {
        let (mut act, bus) = controller();
        act.bulk_write_goals(&[100; JOINT_COUNT]).unwrap();
        bus.set_fail_reads(true);
        assert!(act.read_telemetry().is_err());
        assert_eq!(act.read_telemetry_or_zeroed(), [0; TELEMETRY_SNAPSHOT_LEN]);
    }

    proptest! {
        /// 换算往返误差不超过一个量化步长
        #[test]
        fn prop_conversion_inverse_within_step(
            deg in -720.0f32..720.0,
            gear in 0.5f32..4.0,
            zero in -4096i32..4096,
        ) {
            let cal = JointCalibration::new(gear, zero);
            let back = cal.units_to_deg(cal.deg_to_units(deg));
            prop_assert!((back - deg).abs() <= cal.step(), "deg={} back={} step={}", deg, back, cal.step());
        }
    }
}
