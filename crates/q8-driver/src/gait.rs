//! 步态查找表与播放
//!
//! 查找表由离线工具生成：所有步态的帧按顺序拼接成一个扁平数组，
//! 每个步态记录其**结束**偏移（累计帧数）。步态 `g` 的帧范围为
//! `[offsets[g-1], offsets[g])`，步态 0 从 0 开始。

use crate::actuator::JointGoals;
use std::sync::Arc;
use thiserror::Error;

/// 步态表校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GaitTableError {
    #[error("Gait offsets must be non-decreasing (offset {index} is {value}, previous {previous})")]
    OffsetsNotMonotonic {
        index: usize,
        value: usize,
        previous: usize,
    },
    #[error("Last gait offset {last} does not match frame count {frames}")]
    OffsetMismatch { last: usize, frames: usize },
    #[error("Gait {0} has no frames")]
    EmptyGait(usize),
    #[error("Too many gaits: {0} (max 256)")]
    TooManyGaits(usize),
}

/// 只读步态查找表
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GaitTable {
    frames: Vec<JointGoals>,
    offsets: Vec<usize>,
}

impl GaitTable {
    /// 从扁平帧数组和结束偏移构造，并校验一致性
    pub fn from_parts(frames: Vec<JointGoals>, offsets: Vec<usize>) -> Result<Self, GaitTableError> {
        if offsets.len() > 256 {
            return Err(GaitTableError::TooManyGaits(offsets.len()));
        }
        let mut previous = 0;
        for (index, &value) in offsets.iter().enumerate() {
            if value < previous {
                return Err(GaitTableError::OffsetsNotMonotonic {
                    index,
                    value,
                    previous,
                });
            }
            if value == previous {
                return Err(GaitTableError::EmptyGait(index));
            }
            previous = value;
        }
        if previous != frames.len() {
            return Err(GaitTableError::OffsetMismatch {
                last: previous,
                frames: frames.len(),
            });
        }
        Ok(Self { frames, offsets })
    }

    /// 空表（不包含任何步态）
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn gait_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn contains(&self, gait: u8) -> bool {
        usize::from(gait) < self.offsets.len()
    }

    /// 步态的起始帧位置
    fn start(&self, gait: usize) -> usize {
        if gait == 0 { 0 } else { self.offsets[gait - 1] }
    }

    /// 步态的帧数
    pub fn frame_count(&self, gait: u8) -> Option<usize> {
        let g = usize::from(gait);
        let end = *self.offsets.get(g)?;
        Some(end - self.start(g))
    }

    /// 步态第 `index` 帧
    pub fn frame(&self, gait: u8, index: usize) -> Option<&JointGoals> {
        let g = usize::from(gait);
        let end = *self.offsets.get(g)?;
        let pos = self.start(g) + index;
        if pos >= end {
            return None;
        }
        self.frames.get(pos)
    }

    pub fn frames(&self) -> &[JointGoals] {
        &self.frames
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }
}

/// 步态播放游标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GaitCursor {
    pub active: bool,
    pub gait_id: u8,
    pub frame_index: usize,
}

/// 步态播放器
#[derive(Debug, Clone)]
pub struct GaitPlayer {
    table: Arc<GaitTable>,
    cursor: GaitCursor,
}

impl GaitPlayer {
    pub fn new(table: Arc<GaitTable>) -> Self {
        Self {
            table,
            cursor: GaitCursor::default(),
        }
    }

    /// 开始播放，游标归零；未知步态返回 `false` 且状态不变
    pub fn start(&mut self, gait: u8) -> bool {
        if !self.table.contains(gait) {
            return false;
        }
        self.cursor = GaitCursor {
            active: true,
            gait_id: gait,
            frame_index: 0,
        };
        true
    }

    /// 停止播放，游标归零
    pub fn stop(&mut self) {
        self.cursor.active = false;
        self.cursor.frame_index = 0;
    }

    /// 取出当前帧并推进游标，到达末尾时回到 0
    ///
    /// 未激活时返回 `None`。
    pub fn next_frame(&mut self) -> Option<JointGoals> {
        if !self.cursor.active {
            return None;
        }
        let count = self.table.frame_count(self.cursor.gait_id)?;
        let frame = *self.table.frame(self.cursor.gait_id, self.cursor.frame_index)?;
        self.cursor.frame_index += 1;
        if self.cursor.frame_index >= count {
            self.cursor.frame_index = 0;
        }
        Some(frame)
    }

    pub fn cursor(&self) -> GaitCursor {
        self.cursor
    }

    pub fn is_active(&self) -> bool {
        self.cursor.active
    }

    pub fn table(&self) -> &Arc<GaitTable> {
        &self.table
    }
}
