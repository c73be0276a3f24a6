//! # Q8 Hardware Abstraction Layer
//!
//! 机器人外部协作者的统一接口抽象：
//!
//! - [`ServoBus`]: 舵机总线（8 个关节，批量写目标位置、同步读遥测）
//! - [`RadioLink`]: 无线数据报通道（单一受信对端）
//! - [`PeerStore`]: 已配对地址的持久化存储
//! - [`FuelGauge`]: 电量计
//! - [`StatusLed`]: 状态指示灯
//! - [`Clock`]: 毫秒计时器（32 位回绕）
//!
//! 开启 `mock` feature 后，[`mock`] 模块提供全部接口的内存实现。

use std::fmt;
use thiserror::Error;

pub use q8_protocol::{JOINT_COUNT, MacAddress};

pub mod clock;
pub mod store;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use clock::{Clock, ManualClock, MonotonicClock, elapsed_ms};
pub use store::{FilePeerStore, MemoryPeerStore, PeerStore};

/// 舵机总线错误
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Servo {id} did not respond")]
    NoResponse { id: u8 },
    #[error("Bus transaction failed: {0}")]
    Transaction(String),
    #[error("Bus not started")]
    NotStarted,
}

/// 无线链路错误
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("Peer {0} is not registered")]
    PeerNotRegistered(MacAddress),
    #[error("Datagram too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// 持久化存储错误
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt peer record: {0}")]
    Corrupt(String),
}

/// 电量计错误
#[derive(Error, Debug)]
pub enum GaugeError {
    #[error("Fuel gauge not responding")]
    Unavailable,
    #[error("Fuel gauge read failed: {0}")]
    Read(String),
}

/// 舵机运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum OperatingMode {
    Current = 0,
    Velocity = 1,
    Position = 3,
    /// 多圈位置模式（关节默认使用）
    ExtendedPosition = 4,
}

/// 控制表条目（同步写到全部关节）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlItem {
    PositionPGain,
    ProfileAcceleration,
    ProfileVelocity,
}

impl ControlItem {
    /// 控制表地址
    pub fn address(self) -> u16 {
        match self {
            ControlItem::PositionPGain => 84,
            ControlItem::ProfileAcceleration => 108,
            ControlItem::ProfileVelocity => 112,
        }
    }
}

impl fmt::Display for ControlItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlItem::PositionPGain => "position_p_gain",
            ControlItem::ProfileAcceleration => "profile_acceleration",
            ControlItem::ProfileVelocity => "profile_velocity",
        };
        write!(f, "{}@{}", name, self.address())
    }
}

/// 单个关节的遥测读数（原始单位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointReading {
    /// 当前电流
    pub current: i16,
    /// 当前位置
    pub position: i32,
}

/// 舵机总线
///
/// 关节按索引 0..8 寻址（腿序 × 2）；`ping` 使用舵机 ID。
pub trait ServoBus: Send {
    fn ping(&mut self, id: u8) -> Result<(), BusError>;
    /// 广播力矩开关
    fn set_torque(&mut self, enabled: bool) -> Result<(), BusError>;
    fn set_operating_mode(&mut self, mode: OperatingMode) -> Result<(), BusError>;
    /// 将同一数值写入全部关节的控制表条目
    fn write_item(&mut self, item: ControlItem, value: i32) -> Result<(), BusError>;
    /// 一次总线事务写入全部关节目标位置
    fn write_goals(&mut self, goals: &[i32; JOINT_COUNT]) -> Result<(), BusError>;
    /// 一次总线事务读取全部关节电流与位置
    fn read_state(&mut self) -> Result<[JointReading; JOINT_COUNT], BusError>;
}

/// 无线数据报链路
///
/// 发送不可靠、无确认。接收由上层推送（见驱动的 `Intake`）。
pub trait RadioLink: Send + Sync {
    fn send(&self, peer: MacAddress, bytes: &[u8]) -> Result<(), RadioError>;
    fn register_peer(&self, peer: MacAddress) -> Result<(), RadioError>;
    fn forget_peer(&self, peer: MacAddress) -> Result<(), RadioError>;
    /// 本机地址（配对应答中发送）
    fn own_address(&self) -> MacAddress;
    /// 当前无线信道
    fn channel(&self) -> u8;
}

/// 电量计
pub trait FuelGauge: Send {
    /// 电量百分比（0–100）
    fn percent(&mut self) -> Result<u8, GaugeError>;
}

/// 状态指示灯
pub trait StatusLed: Send {
    /// 设置亮度（0 = 熄灭，255 = 最亮）
    fn set_brightness(&mut self, level: u8);
}

impl<T: ServoBus + ?Sized> ServoBus for Box<T> {
    fn ping(&mut self, id: u8) -> Result<(), BusError> {
        (**self).ping(id)
    }
    fn set_torque(&mut self, enabled: bool) -> Result<(), BusError> {
        (**self).set_torque(enabled)
    }
    fn set_operating_mode(&mut self, mode: OperatingMode) -> Result<(), BusError> {
        (**self).set_operating_mode(mode)
    }
    fn write_item(&mut self, item: ControlItem, value: i32) -> Result<(), BusError> {
        (**self).write_item(item, value)
    }
    fn write_goals(&mut self, goals: &[i32; JOINT_COUNT]) -> Result<(), BusError> {
        (**self).write_goals(goals)
    }
    fn read_state(&mut self) -> Result<[JointReading; JOINT_COUNT], BusError> {
        (**self).read_state()
    }
}
