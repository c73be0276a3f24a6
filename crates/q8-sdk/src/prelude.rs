//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use q8_sdk::prelude::*;
//! ```

// 机载运行时
pub use crate::driver::{Intake, Robot, RobotBuilder, RobotConfig, RobotSnapshot, RobotState};

// 主机端
pub use crate::client::{Controller, Paired, RobotReply, Unpaired, parse_reply};

// 硬件抽象（常用 Trait）
pub use crate::hal::{Clock, FuelGauge, PeerStore, RadioLink, ServoBus, StatusLed};

// 协议
pub use crate::protocol::{CommandType, MacAddress, Message};

// 错误类型
pub use crate::client::ClientError;
pub use crate::driver::DriverError;
pub use crate::protocol::ProtocolError;
