//! # Q8 Protocol
//!
//! 四足机器人无线命令协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量定义
//! - `message`: 命令帧编码/解码（`[cmd, N, payload…]`）
//! - `envelope`: 数据报外层封装（配对/心跳/数据三类）
//!
//! ## 字节序
//!
//! 协议使用小端字节序（Little Endian），与 ESP32 原生字节序一致。
//! 本模块提供了字节序转换工具函数。

pub mod constants;
pub mod envelope;
pub mod message;

// 重新导出常用类型
pub use constants::*;
pub use envelope::*;
pub use message::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Unknown command code: {0}")]
    UnknownCommand(u8),

    #[error("Unknown message class: {0}")]
    UnknownClass(u8),

    #[error("Arity mismatch for {command:?}: expected {expected}, got {actual}")]
    ArityMismatch {
        command: CommandType,
        expected: Arity,
        actual: usize,
    },

    #[error("Payload kind mismatch for {command:?}: declared {declared:?}")]
    PayloadKindMismatch {
        command: CommandType,
        declared: PayloadKind,
    },
}

/// 字节序转换工具函数
///
/// 协议使用小端字节序，这些函数用于在协议层进行字节序转换。
///
/// 小端字节序转 i32
pub fn bytes_to_i32_le(bytes: [u8; 4]) -> i32 {
    i32::from_le_bytes(bytes)
}

/// 小端字节序转 f32
pub fn bytes_to_f32_le(bytes: [u8; 4]) -> f32 {
    f32::from_le_bytes(bytes)
}

/// 小端字节序转 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// i32 转小端字节序
pub fn i32_to_bytes_le(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

/// f32 转小端字节序
pub fn f32_to_bytes_le(value: f32) -> [u8; 4] {
    value.to_le_bytes()
}

/// u16 转小端字节序
pub fn u16_to_bytes_le(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}
