//! 协议常量定义

/// 传输层允许的最大数据报长度（ESP-NOW 限制）
pub const MAX_DATAGRAM_LEN: usize = 250;

/// 命令帧头长度（命令字节 + 元素个数字节）
pub const COMMAND_HEADER_LEN: usize = 2;

/// 单个负载元素的字节数（int32 / float32）
pub const PAYLOAD_WORD_LEN: usize = 4;

/// 关节数量（4 条腿 × 2 个关节）
pub const JOINT_COUNT: usize = 8;

/// 腿的数量
pub const LEG_COUNT: usize = 4;

/// 一次遥测快照的元素个数（8 个关节 × (电流, 位置)）
pub const TELEMETRY_SNAPSHOT_LEN: usize = JOINT_COUNT * 2;

/// 数据回复中 u16 元素的个数（一个传输槽位）
pub const REPLY_SLOT_ELEMENTS: usize = 100;

/// 机器人端（服务端）ID
pub const SERVER_ID: u8 = 0;

/// 硬件地址长度（MAC）
pub const MAC_LEN: usize = 6;

/// 遥测电流字段的偏移量（保证编码后为非负 u16）
pub const CURRENT_TELEMETRY_OFFSET: i32 = 10_000;
