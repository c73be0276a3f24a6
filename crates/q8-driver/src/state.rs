//! 机器人连接状态
//!
//! [`RobotState`] 由配对状态机独占写入；状态灯线程和外部观察者通过
//! [`AtomicRobotState`] 无锁读取，或读取 ArcSwap 发布的 [`RobotSnapshot`]。

use q8_protocol::MacAddress;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 连接状态
///
/// ```text
/// Unpaired ──pairing──▶ Paired ──torque ready──▶ Started
///     ▲                    │                        │
///     └────────── unpair / heartbeat timeout ───────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RobotState {
    #[default]
    Unpaired = 0,
    Paired = 1,
    Started = 2,
}

impl RobotState {
    /// 从 u8 转换，无效值视为 Unpaired
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Paired,
            2 => Self::Started,
            _ => Self::Unpaired,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 已配对（Paired 或 Started）
    pub fn is_paired(self) -> bool {
        self != Self::Unpaired
    }
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unpaired => "UNPAIRED",
            Self::Paired => "PAIRED",
            Self::Started => "STARTED",
        };
        f.write_str(s)
    }
}

/// 连接状态（原子版本，用于线程间共享）
#[derive(Debug, Default)]
pub struct AtomicRobotState {
    inner: AtomicU8,
}

impl AtomicRobotState {
    pub fn new(state: RobotState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> RobotState {
        RobotState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: RobotState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }
}

/// 机器人状态快照（只读，发布后不再修改）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotSnapshot {
    pub state: RobotState,
    pub peer: Option<MacAddress>,
    pub torque_enabled: bool,
    pub profile_ms: i32,
    /// 正在播放的步态
    pub gait: Option<u8>,
    pub jumping: bool,
    /// 录制缓冲区中的样本数
    pub recorded_samples: usize,
    /// 最近一次成功读取的电量
    pub battery_percent: Option<u8>,
    /// 发布时间（毫秒时钟）
    pub updated_ms: u32,
}
