//! 命令帧结构体定义
//!
//! 命令帧格式（小端）：
//!
//! ```text
//!   u8            u8                              [i32] 或 [f32]
//! +-------------+---------------------------+------------------------+
//! | Command     | Payload Length (elements) |  Payload (4 × N bytes) |
//! +-------------+---------------------------+------------------------+
//! ```
//!
//! 负载元素的解释方式（int32 / float32）由命令本身声明，
//! 解码时即确定为带标签的 [`Payload`] 变体，不存在未检查的别名访问。

use crate::constants::*;
use crate::{ProtocolError, bytes_to_f32_le, bytes_to_i32_le};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// 命令类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CommandType {
    /// 8 个关节目标位置批量写入
    Move = 0,
    /// 查询电池电量
    Battery = 1,
    /// 采集一次遥测快照
    Record = 2,
    /// 分块回传录制数据
    SendRecorded = 3,
    /// 跳跃动作
    Jump = 4,
    /// 力矩开关
    SetTorque = 5,
    /// 运动曲线（时长）设置
    SetProfile = 6,
    /// 步态播放开关
    SetGait = 7,
}

impl CommandType {
    /// 所有命令（按编码顺序）
    pub const ALL: [CommandType; 8] = [
        CommandType::Move,
        CommandType::Battery,
        CommandType::Record,
        CommandType::SendRecorded,
        CommandType::Jump,
        CommandType::SetTorque,
        CommandType::SetProfile,
        CommandType::SetGait,
    ];

    /// 从命令码解析（未知命令码返回 `UnknownCommand`）
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Self::try_from_primitive(code).map_err(|e| ProtocolError::UnknownCommand(e.number))
    }

    /// 命令声明的负载元素类型
    pub fn payload_kind(self) -> PayloadKind {
        // 现有命令全部使用 int32 负载
        PayloadKind::Int32
    }

    /// 命令要求的负载元素个数
    pub fn arity(self) -> Arity {
        match self {
            CommandType::Move => Arity::Exactly(JOINT_COUNT as u8),
            CommandType::SetTorque | CommandType::SetProfile => Arity::Exactly(1),
            CommandType::SetGait => Arity::AtMost(1),
            CommandType::Battery
            | CommandType::Record
            | CommandType::SendRecorded
            | CommandType::Jump => Arity::Any,
        }
    }
}

/// 负载元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PayloadKind {
    /// 有符号 32 位整数
    Int32,
    /// IEEE-754 单精度浮点
    Float32,
}

/// 负载元素个数约束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// 必须恰好为 N 个
    Exactly(u8),
    /// 不超过 N 个
    AtMost(u8),
    /// 不检查（负载被忽略）
    Any,
}

impl Arity {
    /// 检查元素个数是否满足约束
    pub fn accepts(self, len: usize) -> bool {
        match self {
            Arity::Exactly(n) => len == n as usize,
            Arity::AtMost(n) => len <= n as usize,
            Arity::Any => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "exactly {}", n),
            Arity::AtMost(n) => write!(f, "at most {}", n),
            Arity::Any => write!(f, "any"),
        }
    }
}

/// 带标签的负载
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Payload {
    Int32(Vec<i32>),
    Float32(Vec<f32>),
}

impl Payload {
    /// 空负载（int32）
    pub fn empty() -> Self {
        Payload::Int32(Vec::new())
    }

    /// 元素个数
    pub fn len(&self) -> usize {
        match self {
            Payload::Int32(v) => v.len(),
            Payload::Float32(v) => v.len(),
        }
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 负载类型
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Int32(_) => PayloadKind::Int32,
            Payload::Float32(_) => PayloadKind::Float32,
        }
    }

    /// int32 视图（类型不符时返回 None）
    pub fn as_ints(&self) -> Option<&[i32]> {
        match self {
            Payload::Int32(v) => Some(v),
            Payload::Float32(_) => None,
        }
    }

    /// float32 视图（类型不符时返回 None）
    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            Payload::Float32(v) => Some(v),
            Payload::Int32(_) => None,
        }
    }

    /// 按位重新解释为另一种元素类型（显式转换，保留原始比特）
    pub fn reinterpret(&self, kind: PayloadKind) -> Payload {
        match (self, kind) {
            (Payload::Int32(v), PayloadKind::Float32) => {
                Payload::Float32(v.iter().map(|x| f32::from_bits(*x as u32)).collect())
            },
            (Payload::Float32(v), PayloadKind::Int32) => {
                Payload::Int32(v.iter().map(|x| x.to_bits() as i32).collect())
            },
            _ => self.clone(),
        }
    }

    fn write_words(&self, out: &mut Vec<u8>) {
        match self {
            Payload::Int32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Payload::Float32(v) => {
                v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes()))
            },
        }
    }

    fn read_words(kind: PayloadKind, bytes: &[u8]) -> Payload {
        let words = bytes.chunks_exact(PAYLOAD_WORD_LEN).map(|c| [c[0], c[1], c[2], c[3]]);
        match kind {
            PayloadKind::Int32 => Payload::Int32(words.map(bytes_to_i32_le).collect()),
            PayloadKind::Float32 => Payload::Float32(words.map(bytes_to_f32_le).collect()),
        }
    }
}

/// 解码后的命令帧
///
/// 每个入站数据报解码一次，构造后不可变，分发结束即丢弃。
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    command: CommandType,
    payload: Payload,
}

impl Message {
    /// 最大负载元素个数（受数据报长度限制）
    pub const MAX_PAYLOAD_LEN: usize = (MAX_DATAGRAM_LEN - COMMAND_HEADER_LEN) / PAYLOAD_WORD_LEN;

    /// 创建命令帧
    ///
    /// # 错误
    /// - `PayloadKindMismatch`: 负载类型与命令声明不符
    /// - `FrameTooLarge`: 编码后超过数据报长度上限
    pub fn new(command: CommandType, payload: Payload) -> Result<Self, ProtocolError> {
        if payload.kind() != command.payload_kind() {
            return Err(ProtocolError::PayloadKindMismatch {
                command,
                declared: command.payload_kind(),
            });
        }
        let len = COMMAND_HEADER_LEN + payload.len() * PAYLOAD_WORD_LEN;
        if len > MAX_DATAGRAM_LEN {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: MAX_DATAGRAM_LEN,
            });
        }
        Ok(Self { command, payload })
    }

    /// 创建 int32 负载的命令帧
    pub fn with_ints(command: CommandType, values: &[i32]) -> Result<Self, ProtocolError> {
        Self::new(command, Payload::Int32(values.to_vec()))
    }

    /// 创建无负载的命令帧
    pub fn empty(command: CommandType) -> Self {
        Self {
            command,
            payload: Payload::Int32(Vec::new()),
        }
    }

    /// 从原始字节解码
    ///
    /// 允许尾部存在多余字节（传输层可能按固定槽位填充）。
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < COMMAND_HEADER_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: COMMAND_HEADER_LEN,
                actual: bytes.len(),
            });
        }
        if bytes.len() > MAX_DATAGRAM_LEN {
            return Err(ProtocolError::FrameTooLarge {
                len: bytes.len(),
                max: MAX_DATAGRAM_LEN,
            });
        }

        let command = CommandType::from_code(bytes[0])?;
        let count = bytes[1] as usize;
        let end = COMMAND_HEADER_LEN + count * PAYLOAD_WORD_LEN;
        if bytes.len() < end {
            return Err(ProtocolError::InvalidLength {
                expected: end,
                actual: bytes.len(),
            });
        }

        let payload = Payload::read_words(command.payload_kind(), &bytes[COMMAND_HEADER_LEN..end]);
        Ok(Self { command, payload })
    }

    /// 编码为字节
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.command.into());
        out.push(self.payload.len() as u8);
        self.payload.write_words(&mut out);
        out
    }

    /// 编码后的字节数
    pub fn encoded_len(&self) -> usize {
        COMMAND_HEADER_LEN + self.payload.len() * PAYLOAD_WORD_LEN
    }

    /// 命令类型
    pub fn command(&self) -> CommandType {
        self.command
    }

    /// 负载
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// 负载元素个数
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// 检查负载个数是否满足命令要求
    pub fn check_arity(&self) -> Result<(), ProtocolError> {
        let arity = self.command.arity();
        if arity.accepts(self.payload.len()) {
            Ok(())
        } else {
            Err(ProtocolError::ArityMismatch {
                command: self.command,
                expected: arity,
                actual: self.payload.len(),
            })
        }
    }

    /// int32 负载视图
    pub fn ints(&self) -> Result<&[i32], ProtocolError> {
        self.payload
            .as_ints()
            .ok_or(ProtocolError::PayloadKindMismatch {
                command: self.command,
                declared: self.command.payload_kind(),
            })
    }

    /// float32 负载视图
    ///
    /// 命令声明为 int32 时返回按位重新解释后的副本。
    pub fn floats(&self) -> Vec<f32> {
        match self.payload.reinterpret(PayloadKind::Float32) {
            Payload::Float32(v) => v,
            Payload::Int32(_) => Vec::new(),
        }
    }

    /// 以定长数组读取 int32 负载（个数必须恰好为 N）
    pub fn ints_array<const N: usize>(&self) -> Result<[i32; N], ProtocolError> {
        let ints = self.ints()?;
        <[i32; N]>::try_from(ints).map_err(|_| ProtocolError::ArityMismatch {
            command: self.command,
            expected: Arity::Exactly(N as u8),
            actual: ints.len(),
        })
    }
}
