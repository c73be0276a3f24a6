//! 运动录制缓冲区
//!
//! 录制期间只追加遥测快照；回传时按 100 个元素分块，最后一块补零，全部发出后清空。

use crate::actuator::TelemetrySnapshot;
use q8_protocol::REPLY_SLOT_ELEMENTS;
use std::collections::TryReserveError;

/// 一个回传分块
pub type RecordChunk = [u16; REPLY_SLOT_ELEMENTS];

#[derive(Debug, Default)]
pub struct MotionRecorder {
    samples: Vec<u16>,
}

impl MotionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一次快照
    ///
    /// 内存分配失败时返回错误，缓冲区保持不变。
    pub fn record(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), TryReserveError> {
        self.samples.try_reserve(snapshot.len())?;
        self.samples.extend_from_slice(snapshot);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// 分块数（向上取整）
    pub fn chunk_count(&self) -> usize {
        self.samples.len().div_ceil(REPLY_SLOT_ELEMENTS)
    }

    /// 取出全部分块并清空缓冲区
    pub fn drain_chunks(&mut self) -> Vec<RecordChunk> {
        let chunks = self
            .samples
            .chunks(REPLY_SLOT_ELEMENTS)
            .map(|part| {
                let mut chunk = [0u16; REPLY_SLOT_ELEMENTS];
                chunk[..part.len()].copy_from_slice(part);
                chunk
            })
            .collect();
        self.clear();
        chunks
    }

    pub fn clear(&mut self) {
        self.samples = Vec::new();
    }
}
