//! q8bot 主机端控制器
//!
//! 使用 Type State 模式在编译期区分配对前后的操作：
//!
//! ```text
//! Controller<Unpaired> ──pair(ack)──▶ Controller<Paired> ──unpair()──▶ Controller<Unpaired>
//! ```
//!
//! 只有 `Controller<Paired>` 可以发送运动命令。

pub mod controller;

pub use controller::{Controller, Paired, RobotReply, Unpaired, gait_id, parse_reply};

use q8_hal::RadioError;
use q8_protocol::ProtocolError;
use thiserror::Error;

/// 客户端错误
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    /// 收到的数据报不是机器人发出的配对应答
    #[error("Invalid pairing ack: {0}")]
    InvalidAck(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
