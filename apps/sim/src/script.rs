//! 控制器脚本
//!
//! TOML 描述的命令序列，由模拟的主机端控制器依次执行：
//!
//! ```toml
//! name = "walk"
//!
//! [[steps]]
//! type = "torque"
//! on = true
//!
//! [[steps]]
//! type = "gait"
//! name = "trot_forward"
//!
//! [[steps]]
//! type = "wait"
//! ms = 2000
//! ```

use anyhow::{Context, Result, bail};
use q8_sdk::GaitLut;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 脚本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    pub steps: Vec<ScriptStep>,
}

/// 脚本命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptStep {
    /// 力矩开关
    Torque { on: bool },
    /// 移动全部关节；`duration_ms > 0` 时先设置运动时长，并采集一次快照
    Move {
        goals: [i32; 8],
        #[serde(default)]
        duration_ms: i32,
    },
    /// 单腿目标复制到 4 条腿
    Mirror { pair: [i32; 2] },
    Profile { ms: i32 },
    /// 按 ID 或名称开始步态
    Gait {
        #[serde(default)]
        id: Option<u8>,
        #[serde(default)]
        name: Option<String>,
    },
    StopGait,
    Jump,
    Battery,
    /// 采集一次遥测快照
    Record,
    /// 取回录制数据，可选保存到文件
    FinishRecording {
        #[serde(default)]
        out: Option<PathBuf>,
    },
    /// 等待（期间照常发送心跳）
    Wait { ms: u64 },
}

impl Script {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("Failed to parse script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// 内置演示：上电、蹲起、查询电量、跳跃、录制一小段动作
    pub fn demo() -> Self {
        Self {
            name: "demo".to_string(),
            steps: vec![
                ScriptStep::Torque { on: true },
                ScriptStep::Battery,
                ScriptStep::Mirror { pair: [1024, 3072] },
                ScriptStep::Wait { ms: 500 },
                ScriptStep::Move {
                    goals: [800, 3296, 800, 3296, 800, 3296, 800, 3296],
                    duration_ms: 300,
                },
                ScriptStep::Move {
                    goals: [1024, 3072, 1024, 3072, 1024, 3072, 1024, 3072],
                    duration_ms: 300,
                },
                ScriptStep::FinishRecording { out: None },
                ScriptStep::Jump,
                ScriptStep::Wait { ms: 1500 },
            ],
        }
    }

    /// 把按名称引用的步态解析为 ID
    pub fn resolve_gaits(&mut self, lut: Option<&GaitLut>) -> Result<()> {
        for step in &mut self.steps {
            if let ScriptStep::Gait { id, name } = step {
                match (id.as_ref(), name.as_deref()) {
                    (Some(_), _) => {},
                    (None, Some(gait_name)) => {
                        let Some(lut) = lut else {
                            bail!("Gait '{}' referenced by name but no gait table loaded", gait_name);
                        };
                        let Some(resolved) = lut.id_of(gait_name) else {
                            bail!("Unknown gait '{}'", gait_name);
                        };
                        *id = Some(resolved);
                    },
                    (None, None) => bail!("Gait step needs an id or a name"),
                }
            }
        }
        Ok(())
    }
}
