//! 数据报外层封装
//!
//! 每个无线数据报的第 0 字节为消息类别：
//!
//! | 类别 | 值 | 布局 | 最小长度 |
//! |------|----|------|----------|
//! | `Pairing` | 0 | `[class, id, mac[6], channel]` | 9 |
//! | `Data` | 1 | `[class, 命令帧…]` | 3 |
//! | `Heartbeat` | 2 | `[class, id, …]` | 2 |
//!
//! 机器人发出的数据回复（电量、录制数据）不带命令帧头，
//! 而是固定大小的记录：`[class=Data, id=0, 100 × u16 LE]`。

use crate::constants::*;
use crate::message::Message;
use crate::{ProtocolError, bytes_to_u16_le, u16_to_bytes_le};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// 消息类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MessageClass {
    /// 配对请求/应答
    Pairing = 0,
    /// 命令数据
    Data = 1,
    /// 心跳
    Heartbeat = 2,
}

/// 6 字节硬件地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MacAddress(pub [u8; MAC_LEN]);

impl MacAddress {
    /// 全零地址（未设置）
    pub const ZERO: MacAddress = MacAddress([0; MAC_LEN]);

    /// 是否为全零地址
    pub fn is_zero(&self) -> bool {
        self.0 == [0; MAC_LEN]
    }

    /// 原始字节
    pub fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }
}

impl From<[u8; MAC_LEN]> for MacAddress {
    fn from(bytes: [u8; MAC_LEN]) -> Self {
        MacAddress(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// 配对消息
///
/// 控制器发送配对请求；机器人用自己的地址、无线信道和服务端 ID 0 回复同样的结构。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingMessage {
    /// 发送方 ID（机器人为 0）
    pub id: u8,
    /// 发送方硬件地址
    pub mac: MacAddress,
    /// 无线信道
    pub channel: u8,
}

impl PairingMessage {
    /// 编码后的长度
    pub const LEN: usize = 3 + MAC_LEN;

    /// 从字节解码（包含类别字节）
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < Self::LEN {
            return Err(ProtocolError::InvalidLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&bytes[2..2 + MAC_LEN]);
        Ok(Self {
            id: bytes[1],
            mac: MacAddress(mac),
            channel: bytes[2 + MAC_LEN],
        })
    }

    /// 编码（包含类别字节）
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(MessageClass::Pairing.into());
        out.push(self.id);
        out.extend_from_slice(&self.mac.0);
        out.push(self.channel);
        out
    }
}

/// 心跳消息最小长度（类别 + ID）
pub const HEARTBEAT_MIN_LEN: usize = 2;

/// 编码心跳消息
pub fn encode_heartbeat(id: u8) -> Vec<u8> {
    vec![MessageClass::Heartbeat.into(), id]
}

/// 将命令帧封装为 DATA 数据报
pub fn encode_data(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let len = 1 + message.encoded_len();
    if len > MAX_DATAGRAM_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_DATAGRAM_LEN,
        });
    }
    let mut out = Vec::with_capacity(len);
    out.push(MessageClass::Data.into());
    out.extend_from_slice(&message.encode());
    Ok(out)
}

/// 入站数据报（按类别拆分，借用原始字节）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inbound<'a> {
    /// 配对请求
    Pairing(PairingMessage),
    /// 心跳（原样保留，用于回显）
    Heartbeat(&'a [u8]),
    /// 命令帧（不含类别字节，尚未解码）
    Data(&'a [u8]),
}

impl<'a> Inbound<'a> {
    /// 按类别解析数据报
    ///
    /// 只校验外层长度；DATA 的命令帧由分发器解码。
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ProtocolError> {
        let Some(&class) = bytes.first() else {
            return Err(ProtocolError::InvalidLength {
                expected: 1,
                actual: 0,
            });
        };
        if bytes.len() > MAX_DATAGRAM_LEN {
            return Err(ProtocolError::FrameTooLarge {
                len: bytes.len(),
                max: MAX_DATAGRAM_LEN,
            });
        }

        match MessageClass::try_from_primitive(class) {
            Ok(MessageClass::Pairing) => Ok(Inbound::Pairing(PairingMessage::decode(bytes)?)),
            Ok(MessageClass::Heartbeat) => {
                if bytes.len() < HEARTBEAT_MIN_LEN {
                    return Err(ProtocolError::InvalidLength {
                        expected: HEARTBEAT_MIN_LEN,
                        actual: bytes.len(),
                    });
                }
                Ok(Inbound::Heartbeat(bytes))
            },
            Ok(MessageClass::Data) => {
                if bytes.len() < 1 + COMMAND_HEADER_LEN {
                    return Err(ProtocolError::InvalidLength {
                        expected: 1 + COMMAND_HEADER_LEN,
                        actual: bytes.len(),
                    });
                }
                Ok(Inbound::Data(&bytes[1..]))
            },
            Err(e) => Err(ProtocolError::UnknownClass(e.number)),
        }
    }

    /// 消息类别
    pub fn class(&self) -> MessageClass {
        match self {
            Inbound::Pairing(_) => MessageClass::Pairing,
            Inbound::Heartbeat(_) => MessageClass::Heartbeat,
            Inbound::Data(_) => MessageClass::Data,
        }
    }
}

/// 机器人发出的数据回复（固定 100 个 u16 元素）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataReply {
    /// 发送方 ID（机器人为 0）
    pub id: u8,
    /// 数据槽位，未使用部分为 0
    pub data: [u16; REPLY_SLOT_ELEMENTS],
}

impl DataReply {
    /// 编码后的长度
    pub const LEN: usize = 2 + REPLY_SLOT_ELEMENTS * 2;

    /// 创建全零回复
    pub fn new() -> Self {
        Self {
            id: SERVER_ID,
            data: [0; REPLY_SLOT_ELEMENTS],
        }
    }

    /// 创建电量回复（百分比放在第 0 个元素）
    pub fn battery(percent: u8) -> Self {
        let mut reply = Self::new();
        reply.data[0] = percent as u16;
        reply
    }

    /// 从样本切片创建回复，不足部分补零，多余部分截断
    pub fn from_samples(samples: &[u16]) -> Self {
        let mut reply = Self::new();
        let len = samples.len().min(REPLY_SLOT_ELEMENTS);
        reply.data[..len].copy_from_slice(&samples[..len]);
        reply
    }

    /// 编码（包含类别字节）
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(MessageClass::Data.into());
        out.push(self.id);
        for value in self.data {
            out.extend_from_slice(&u16_to_bytes_le(value));
        }
        out
    }

    /// 从字节解码（主机端使用）
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < Self::LEN {
            return Err(ProtocolError::InvalidLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        if bytes[0] != u8::from(MessageClass::Data) {
            return Err(ProtocolError::UnknownClass(bytes[0]));
        }
        let mut data = [0u16; REPLY_SLOT_ELEMENTS];
        for (i, chunk) in bytes[2..Self::LEN].chunks_exact(2).enumerate() {
            data[i] = bytes_to_u16_le([chunk[0], chunk[1]]);
        }
        Ok(Self { id: bytes[1], data })
    }
}

impl Default for DataReply {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CommandType;

    #[test]
    fn test_mac_display() {
        let mac = MacAddress([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
        assert_eq!(mac.to_string(), "DE:AD:BE:EF:00:01");
        assert!(!mac.is_zero());
        assert!(MacAddress::ZERO.is_zero());
    }

    #[test]
    fn test_pairing_roundtrip() {
        let msg = PairingMessage {
            id: 3,
            mac: MacAddress([1, 2, 3, 4, 5, 6]),
            channel: 11,
        };
        let bytes = msg.encode();
        assert_eq!(bytes.len(), PairingMessage::LEN);
        assert_eq!(bytes[0], 0);
        assert_eq!(PairingMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_parse_pairing_too_short() {
        let err = Inbound::parse(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength { expected: 9, .. }));
    }

    #[test]
    fn test_parse_heartbeat_keeps_bytes() {
        let bytes = [2u8, 7, 0xAA, 0xBB];
        match Inbound::parse(&bytes).unwrap() {
            Inbound::Heartbeat(raw) => assert_eq!(raw, &bytes),
            other => panic!("Expected Heartbeat, got {:?}", other),
        }
        assert!(Inbound::parse(&[2u8]).is_err());
    }

    #[test]
    fn test_parse_data_strips_class() {
        let msg = Message::with_ints(CommandType::SetTorque, &[1]).unwrap();
        let bytes = encode_data(&msg).unwrap();
        match Inbound::parse(&bytes).unwrap() {
            Inbound::Data(frame) => assert_eq!(Message::decode(frame).unwrap(), msg),
            other => panic!("Expected Data, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_class_and_empty() {
        assert_eq!(Inbound::parse(&[9, 0, 0]), Err(ProtocolError::UnknownClass(9)));
        assert!(Inbound::parse(&[]).is_err());
    }

    #[test]
    fn test_encode_data_size_limit() {
        let max = Message::with_ints(CommandType::Move, &vec![0; Message::MAX_PAYLOAD_LEN]).unwrap();
        assert!(matches!(
            encode_data(&max),
            Err(ProtocolError::FrameTooLarge { len: 251, .. })
        ));
    }

    #[test]
    fn test_data_reply_layout() {
        let reply = DataReply::battery(87);
        let bytes = reply.encode();
        assert_eq!(bytes.len(), DataReply::LEN);
        assert_eq!(bytes.len(), 202);
        assert_eq!(&bytes[..4], &[1, 0, 87, 0]);
        assert_eq!(DataReply::decode(&bytes).unwrap(), reply);
    }

    #[test]
    fn test_data_reply_from_samples_pads() {
        let samples: Vec<u16> = (1..=48).collect();
        let reply = DataReply::from_samples(&samples);
        assert_eq!(&reply.data[..48], samples.as_slice());
        assert!(reply.data[48..].iter().all(|&v| v == 0));
    }
}
