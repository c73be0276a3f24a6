//! # 步态查找表产物
//!
//! 离线生成的步态表：所有帧平铺存放，每个步态记录累计结束偏移。
//! 步态 `g` 的帧为 `frames[offsets[g-1]..offsets[g]]`（步态 0 从 0 开始）。
//!
//! 两种存储格式：
//! - 二进制：`[MAGIC: 8 bytes][Version: 1 byte][bincode]`
//! - TOML：便于手工编辑的小型表

use anyhow::{Context, Result, bail, ensure};
use q8_protocol::JOINT_COUNT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 步态表文件魔数
pub const MAGIC: &[u8; 8] = b"Q8LUTV1\0";

const VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GaitLut {
    /// 每个步态的名称（如 `"trot_forward"`），可以为空
    #[serde(default)]
    pub names: Vec<String>,
    /// 累计结束偏移
    pub offsets: Vec<usize>,
    pub frames: Vec<[i32; JOINT_COUNT]>,
}

impl GaitLut {
    /// 追加一个步态
    pub fn push_gait(&mut self, name: impl Into<String>, frames: &[[i32; JOINT_COUNT]]) {
        self.frames.extend_from_slice(frames);
        self.offsets.push(self.frames.len());
        self.names.push(name.into());
    }

    pub fn gait_count(&self) -> usize {
        self.offsets.len()
    }

    /// 按名称查找步态 ID
    pub fn id_of(&self, name: &str) -> Option<u8> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| u8::try_from(i).ok())
    }

    /// 某个步态的全部帧
    pub fn gait_frames(&self, gait: usize) -> Option<&[[i32; JOINT_COUNT]]> {
        let end = *self.offsets.get(gait)?;
        let start = if gait == 0 { 0 } else { self.offsets[gait - 1] };
        self.frames.get(start..end)
    }

    /// 校验偏移：非递减、非空步态、最后一个等于总帧数
    pub fn validate(&self) -> Result<()> {
        ensure!(self.offsets.len() <= 256, "too many gaits: {}", self.offsets.len());
        let mut previous = 0;
        for (i, &offset) in self.offsets.iter().enumerate() {
            if offset <= previous {
                bail!("gait {} is empty or offsets decrease ({} after {})", i, offset, previous);
            }
            previous = offset;
        }
        ensure!(
            previous == self.frames.len(),
            "last offset {} does not match frame count {}",
            previous,
            self.frames.len()
        );
        ensure!(
            self.names.is_empty() || self.names.len() == self.offsets.len(),
            "{} names for {} gaits",
            self.names.len(),
            self.offsets.len()
        );
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let mut out = Vec::with_capacity(9 + self.frames.len() * JOINT_COUNT * 4);
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend(bincode::serialize(self).context("Failed to serialize gait LUT")?);
        let path = path.as_ref();
        fs::write(path, out).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        ensure!(bytes.len() > MAGIC.len(), "Gait LUT file too short");
        ensure!(&bytes[..8] == MAGIC, "Not a q8 gait LUT (magic mismatch)");
        ensure!(bytes[8] == VERSION, "Unsupported gait LUT version: {}", bytes[8]);
        let lut: GaitLut = bincode::deserialize(&bytes[9..]).context("Failed to deserialize gait LUT")?;
        lut.validate()?;
        Ok(lut)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let lut: GaitLut = toml::from_str(s).context("Failed to parse gait LUT TOML")?;
        lut.validate()?;
        Ok(lut)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).context("Failed to serialize gait LUT TOML")
    }

    /// 按扩展名选择格式（`.toml` 为文本，其余为二进制）
    pub fn load_any<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.extension().is_some_and(|e| e == "toml") {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_toml_str(&text)
        } else {
            Self::load(path)
        }
    }
}
