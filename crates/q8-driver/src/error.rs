//! 驱动层错误类型定义

use crate::gait::GaitTableError;
use q8_hal::{BusError, RadioError, StorageError};
use q8_protocol::ProtocolError;
use thiserror::Error;

/// 舵机总线操作失败
///
/// `op` 标识失败的操作（如 `"bulk_write_goals"`），便于日志定位。
#[derive(Error, Debug)]
#[error("Actuator fault in {op}: {source}")]
pub struct ActuatorFault {
    pub op: &'static str,
    #[source]
    pub source: BusError,
}

impl ActuatorFault {
    pub fn new(op: &'static str, source: BusError) -> Self {
        Self { op, source }
    }
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// 字段取值非法
    #[error("Invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 舵机总线错误
    #[error(transparent)]
    Actuator(#[from] ActuatorFault),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 无线链路错误
    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    /// 持久化存储错误
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 步态表错误
    #[error("Gait table error: {0}")]
    GaitTable(#[from] GaitTableError),

    /// 接收队列已关闭（分发线程退出）
    #[error("Intake channel closed")]
    ChannelClosed,

    /// 接收队列已满（消息被丢弃）
    #[error("Intake channel full (capacity: {capacity})")]
    ChannelFull { capacity: usize },

    /// 线程启动失败
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
