//! Builder 模式实现
//!
//! 提供链式组装 [`Robot`] 的便捷方式：注入硬件接口、配置和步态表，
//! 然后执行启动初始化并启动后台线程。

use crate::actuator::{ActuatorController, JointCalibration, PoseSet};
use crate::config::RobotConfig;
use crate::context::RobotContext;
use crate::dispatch::Dispatcher;
use crate::error::DriverError;
use crate::gait::GaitTable;
use crate::motion::MotionCore;
use crate::pairing::PairingMachine;
use crate::robot::Robot;
use crate::status::{NoLed, StatusIndicator};
use q8_hal::{
    Clock, FuelGauge, MemoryPeerStore, MonotonicClock, PeerStore, RadioLink, ServoBus, StatusLed,
};
use std::sync::Arc;
use tracing::info;

/// Robot Builder（链式构造）
///
/// 舵机总线和无线链路必须提供，其余接口有默认值：
///
/// | 接口 | 默认 |
/// |------|------|
/// | 对端存储 | [`MemoryPeerStore`]（重启后不保留） |
/// | 时钟 | [`MonotonicClock`] |
/// | 电量计 | 无（电量查询返回 0） |
/// | 状态灯 | 无 |
/// | 步态表 | 空表 |
///
/// # Example
///
/// ```no_run
/// # use q8_driver::{RobotBuilder, RobotConfig};
/// # fn example(bus: Box<dyn q8_hal::ServoBus>, radio: std::sync::Arc<dyn q8_hal::RadioLink>)
/// #     -> Result<(), q8_driver::DriverError> {
/// let robot = RobotBuilder::new()
///     .config(RobotConfig::load("robot.toml")?)
///     .servo_bus(bus)
///     .radio(radio)
///     .build()?;
/// let intake = robot.intake();
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RobotBuilder {
    config: Option<RobotConfig>,
    servo_bus: Option<Box<dyn ServoBus>>,
    radio: Option<Arc<dyn RadioLink>>,
    peer_store: Option<Box<dyn PeerStore>>,
    fuel_gauge: Option<Box<dyn FuelGauge>>,
    status_led: Option<Box<dyn StatusLed>>,
    clock: Option<Arc<dyn Clock>>,
    gait_table: Option<Arc<GaitTable>>,
}

impl RobotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置配置（可选，默认 [`RobotConfig::default`]）
    pub fn config(mut self, config: RobotConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn servo_bus(mut self, bus: impl ServoBus + 'static) -> Self {
        self.servo_bus = Some(Box::new(bus));
        self
    }

    pub fn radio(mut self, radio: Arc<dyn RadioLink>) -> Self {
        self.radio = Some(radio);
        self
    }

    pub fn peer_store(mut self, store: impl PeerStore + 'static) -> Self {
        self.peer_store = Some(Box::new(store));
        self
    }

    pub fn fuel_gauge(mut self, gauge: impl FuelGauge + 'static) -> Self {
        self.fuel_gauge = Some(Box::new(gauge));
        self
    }

    pub fn status_led(mut self, led: impl StatusLed + 'static) -> Self {
        self.status_led = Some(Box::new(led));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn gait_table(mut self, table: GaitTable) -> Self {
        self.gait_table = Some(Arc::new(table));
        self
    }

    /// 构建并启动机器人
    ///
    /// 依次执行：配置校验 → 舵机初始化 → 恢复已保存的对端 → 启动后台线程。
    ///
    /// # Errors
    /// - `DriverError::Config`: 配置校验失败
    /// - `DriverError::InvalidInput`: 未提供舵机总线或无线链路
    /// - `DriverError::Actuator`: 舵机初始化失败
    /// - `DriverError::Spawn`: 后台线程启动失败
    pub fn build(self) -> Result<Robot, DriverError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let bus = self
            .servo_bus
            .ok_or_else(|| DriverError::InvalidInput("servo bus not set".to_string()))?;
        let radio = self
            .radio
            .ok_or_else(|| DriverError::InvalidInput("radio link not set".to_string()))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let store = self
            .peer_store
            .unwrap_or_else(|| Box::new(MemoryPeerStore::new()));
        let table = self.gait_table.unwrap_or_else(|| Arc::new(GaitTable::empty()));

        let calibration = JointCalibration::new(config.servo.gear_ratio, config.servo.zero_offset);
        let poses = PoseSet::from_degrees(&calibration, &config.poses);
        let mut actuator = ActuatorController::from_config(bus, config.servo_ids()?, &config.servo);
        actuator.begin(config.servo.boot_profile_ms)?;
        let motion = MotionCore::new(actuator, Arc::clone(&table), poses, &config);

        let mut pairing = PairingMachine::new(
            Arc::clone(&radio),
            store,
            config.timing.heartbeat_timeout_ms,
            config.pairing.permanent,
        );
        pairing.restore(clock.now_ms());

        info!(
            "Gait table: {} gaits, {} frames; permanent pairing: {}",
            table.gait_count(),
            table.total_frames(),
            config.pairing.permanent
        );

        let ctx = Arc::new(RobotContext::new(radio, clock, pairing, motion, config));
        let dispatcher = Dispatcher::new(self.fuel_gauge);
        let led = self.status_led.unwrap_or_else(|| Box::new(NoLed));
        Robot::spawn(ctx, dispatcher, StatusIndicator::new(led))
    }
}
