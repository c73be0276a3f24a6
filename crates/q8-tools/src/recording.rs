//! # 遥测录制
//!
//! 机器人按 100 个元素一块回传录制缓冲区，最后一块补零。
//! [`RecordingAssembler`] 按主机发出的 RECORD 次数重组快照并去掉补零。

use anyhow::{Context, Result, ensure};
use q8_protocol::{
    CURRENT_TELEMETRY_OFFSET, DataReply, JOINT_COUNT, REPLY_SLOT_ELEMENTS, TELEMETRY_SNAPSHOT_LEN,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// 一次快照：8 × (电流 + 10000, 位置)
pub type Snapshot = [u16; TELEMETRY_SNAPSHOT_LEN];

/// 录制文件魔数
pub const MAGIC: &[u8; 8] = b"Q8RECV1\0";

const VERSION: u8 = 1;

/// 单个关节的解码样本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointSample {
    pub current: i32,
    pub position: u16,
}

/// 解码一次快照
pub fn decode_snapshot(snapshot: &Snapshot) -> [JointSample; JOINT_COUNT] {
    let mut out = [JointSample {
        current: 0,
        position: 0,
    }; JOINT_COUNT];
    for (joint, sample) in out.iter_mut().enumerate() {
        sample.current = i32::from(snapshot[joint * 2]) - CURRENT_TELEMETRY_OFFSET;
        sample.position = snapshot[joint * 2 + 1];
    }
    out
}

/// 分块重组器
#[derive(Debug, Clone)]
pub struct RecordingAssembler {
    expected_snapshots: usize,
    samples: Vec<u16>,
}

impl RecordingAssembler {
    /// `expected_snapshots` 为主机发出的 RECORD 次数
    pub fn new(expected_snapshots: usize) -> Self {
        Self {
            expected_snapshots,
            samples: Vec::with_capacity(expected_snapshots * TELEMETRY_SNAPSHOT_LEN),
        }
    }

    /// 预期的分块数
    pub fn expected_chunks(&self) -> usize {
        (self.expected_snapshots * TELEMETRY_SNAPSHOT_LEN).div_ceil(REPLY_SLOT_ELEMENTS)
    }

    pub fn received_chunks(&self) -> usize {
        self.samples.len() / REPLY_SLOT_ELEMENTS
    }

    pub fn push_reply(&mut self, reply: &DataReply) {
        self.samples.extend_from_slice(&reply.data);
    }

    pub fn is_complete(&self) -> bool {
        self.received_chunks() >= self.expected_chunks()
    }

    /// 去掉补零并拆分为快照
    pub fn finish(self) -> Result<TelemetryRecording> {
        let needed = self.expected_snapshots * TELEMETRY_SNAPSHOT_LEN;
        ensure!(
            self.samples.len() >= needed,
            "incomplete recording: {} of {} samples received",
            self.samples.len(),
            needed
        );
        let snapshots = self.samples[..needed]
            .chunks_exact(TELEMETRY_SNAPSHOT_LEN)
            .map(|chunk| {
                let mut snapshot = [0u16; TELEMETRY_SNAPSHOT_LEN];
                snapshot.copy_from_slice(chunk);
                snapshot
            })
            .collect();
        Ok(TelemetryRecording::new(snapshots))
    }
}

/// 录制文件
///
/// ```text
/// [MAGIC: 8 bytes]
/// [Version: 1 byte]
/// [Data: bincode serialized TelemetryRecording]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryRecording {
    pub version: u8,
    pub snapshots: Vec<Snapshot>,
}

impl TelemetryRecording {
    pub fn new(snapshots: Vec<Snapshot>) -> Self {
        Self {
            version: VERSION,
            snapshots,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// 某个关节在整个录制中的位置序列
    pub fn joint_positions(&self, joint: usize) -> Vec<u16> {
        self.snapshots
            .iter()
            .filter_map(|s| s.get(joint * 2 + 1).copied())
            .collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create recording {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC).context("Failed to write magic")?;
        writer.write_all(&[self.version]).context("Failed to write version")?;
        let data = bincode::serialize(self).context("Failed to serialize recording")?;
        writer.write_all(&data).context("Failed to write recording data")?;
        writer.flush().context("Failed to flush recording")?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open recording {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).context("Failed to read magic")?;
        ensure!(&magic == MAGIC, "Not a q8 recording (magic mismatch)");

        let mut version = [0u8; 1];
        reader.read_exact(&mut version).context("Failed to read version")?;
        ensure!(version[0] == VERSION, "Unsupported recording version: {}", version[0]);

        let mut data = Vec::new();
        reader.read_to_end(&mut data).context("Failed to read recording data")?;
        bincode::deserialize(&data).context("Failed to deserialize recording")
    }
}
