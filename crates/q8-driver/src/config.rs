//! # 机器人配置
//!
//! 通过 TOML 文件加载，所有字段都有默认值，文件中只需写出要覆盖的部分：
//!
//! ```toml
//! [timing]
//! gait_hz = 100
//! heartbeat_timeout_ms = 5000
//!
//! [servo]
//! gear_ratio = 1.5
//!
//! [poses]
//! idle = [40.0, 140.0]
//! ```

use crate::error::ConfigError;
use q8_protocol::JOINT_COUNT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 机器人配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RobotConfig {
    pub timing: TimingConfig,
    pub pairing: PairingConfig,
    pub servo: ServoConfig,
    pub poses: PoseConfig,
    pub jump: JumpConfig,
}

/// 周期任务与队列参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// 步态播放频率（Hz）
    pub gait_hz: u32,
    /// 心跳超时（毫秒）
    pub heartbeat_timeout_ms: u32,
    /// 存活检查周期（毫秒）
    pub liveness_period_ms: u32,
    /// 状态灯刷新周期（毫秒）
    pub status_period_ms: u32,
    /// Paired → Started 尝试间隔（毫秒）
    pub start_attempt_ms: u32,
    /// 接收队列容量
    pub intake_capacity: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            gait_hz: 200,
            heartbeat_timeout_ms: 3000,
            liveness_period_ms: 1000,
            status_period_ms: 20,
            start_attempt_ms: 2000,
            intake_capacity: 10,
        }
    }
}

impl TimingConfig {
    /// 步态 tick 周期
    pub fn gait_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.gait_hz.max(1)))
    }

    pub fn liveness_period(&self) -> Duration {
        Duration::from_millis(u64::from(self.liveness_period_ms))
    }

    pub fn status_period(&self) -> Duration {
        Duration::from_millis(u64::from(self.status_period_ms))
    }
}

/// 配对参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// 永久配对：心跳超时不解除配对
    pub permanent: bool,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            permanent: cfg!(feature = "permanent-pairing"),
        }
    }
}

/// 舵机参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// 舵机 ID（关节顺序）
    pub ids: Vec<u8>,
    /// 舵机到关节的减速比
    pub gear_ratio: f32,
    /// 关节零位（舵机单位）
    pub zero_offset: i32,
    /// 常规位置 P 增益
    pub default_gain: u16,
    /// 起跳时的位置 P 增益
    pub launch_gain: u16,
    /// 启动时的运动曲线时长（毫秒）
    pub boot_profile_ms: i32,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            ids: (11..=18).collect(),
            gear_ratio: 1.0,
            zero_offset: 0,
            default_gain: 400,
            launch_gain: 800,
            boot_profile_ms: 1000,
        }
    }
}

/// 命名姿态（每条腿两个关节的角度，单位：度）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub idle: [f32; 2],
    pub crouch: [f32; 2],
    pub launch: [f32; 2],
    pub rest: [f32; 2],
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            idle: [45.0, 135.0],
            crouch: [70.0, 110.0],
            launch: [15.0, 165.0],
            rest: [45.0, 135.0],
        }
    }
}

/// 跳跃时序（毫秒）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpConfig {
    /// 下蹲和回位时的运动曲线时长
    pub crouch_profile_ms: i32,
    /// 改变曲线/增益后等待生效的时间
    pub settle_ms: u32,
    /// 下蹲保持
    pub crouch_hold_ms: u32,
    /// 起跳姿态保持
    pub launch_hold_ms: u32,
    /// 落地后休息
    pub rest_hold_ms: u32,
    /// 回到待机姿态后保持
    pub idle_hold_ms: u32,
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            crouch_profile_ms: 500,
            settle_ms: 100,
            crouch_hold_ms: 1000,
            launch_hold_ms: 100,
            rest_hold_ms: 5000,
            idle_hold_ms: 1000,
        }
    }
}

impl JumpConfig {
    /// 整个跳跃动作的总时长（饱和加法，超大配置不会溢出）
    pub fn total_ms(&self) -> u32 {
        [
            self.settle_ms,
            self.settle_ms,
            self.settle_ms,
            self.crouch_hold_ms,
            self.launch_hold_ms,
            self.rest_hold_ms,
            self.idle_hold_ms,
        ]
        .into_iter()
        .fold(0u32, u32::saturating_add)
    }
}

impl RobotConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: RobotConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 保存到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timing;
        if !(1..=1000).contains(&t.gait_hz) {
            return Err(ConfigError::invalid("timing.gait_hz", "must be in 1..=1000"));
        }
        if t.heartbeat_timeout_ms == 0 || t.heartbeat_timeout_ms > i32::MAX as u32 {
            return Err(ConfigError::invalid(
                "timing.heartbeat_timeout_ms",
                "must be positive and below 2^31",
            ));
        }
        for (field, value) in [
            ("timing.liveness_period_ms", t.liveness_period_ms),
            ("timing.status_period_ms", t.status_period_ms),
            ("timing.start_attempt_ms", t.start_attempt_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }
        if t.intake_capacity == 0 {
            return Err(ConfigError::invalid("timing.intake_capacity", "must be positive"));
        }

        let s = &self.servo;
        if s.ids.len() != JOINT_COUNT {
            return Err(ConfigError::invalid(
                "servo.ids",
                format!("expected {} ids, got {}", JOINT_COUNT, s.ids.len()),
            ));
        }
        let mut sorted = s.ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != s.ids.len() {
            return Err(ConfigError::invalid("servo.ids", "ids must be unique"));
        }
        if !s.gear_ratio.is_finite() || s.gear_ratio <= 0.0 {
            return Err(ConfigError::invalid("servo.gear_ratio", "must be finite and positive"));
        }
        if s.boot_profile_ms < 0 {
            return Err(ConfigError::invalid("servo.boot_profile_ms", "must not be negative"));
        }

        let p = &self.poses;
        for (field, pose) in [
            ("poses.idle", p.idle),
            ("poses.crouch", p.crouch),
            ("poses.launch", p.launch),
            ("poses.rest", p.rest),
        ] {
            if pose.iter().any(|d| !d.is_finite()) {
                return Err(ConfigError::invalid(field, "angles must be finite"));
            }
        }

        if self.jump.crouch_profile_ms < 0 {
            return Err(ConfigError::invalid("jump.crouch_profile_ms", "must not be negative"));
        }
        Ok(())
    }

    /// 舵机 ID 数组（需先通过 `validate`）
    pub fn servo_ids(&self) -> Result<[u8; JOINT_COUNT], ConfigError> {
        <[u8; JOINT_COUNT]>::try_from(self.servo.ids.as_slice()).map_err(|_| {
            ConfigError::invalid(
                "servo.ids",
                format!("expected {} ids, got {}", JOINT_COUNT, self.servo.ids.len()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RobotConfig::default();
        config.validate().unwrap();
        assert_eq!(config.timing.gait_period(), Duration::from_millis(5));
        assert_eq!(config.servo_ids().unwrap(), [11, 12, 13, 14, 15, 16, 17, 18]);
        assert_eq!(config.pairing.permanent, cfg!(feature = "permanent-pairing"));
        assert_eq!(config.jump.total_ms(), 7400);
    }

    #[test]
    fn test_jump_total_saturates() {
        let jump = JumpConfig {
            rest_hold_ms: u32::MAX,
            ..JumpConfig::default()
        };
        assert_eq!(jump.total_ms(), u32::MAX);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = RobotConfig::from_toml_str(
            r#"
            [timing]
            gait_hz = 100

            [poses]
            idle = [40.0, 140.0]
            "#,
        )
        .unwrap();
        assert_eq!(config.timing.gait_hz, 100);
        assert_eq!(config.timing.heartbeat_timeout_ms, 3000);
        assert_eq!(config.poses.idle, [40.0, 140.0]);
        assert_eq!(config.poses.crouch, PoseConfig::default().crouch);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = RobotConfig::from_toml_str("[timing]\ngait_hz = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "timing.gait_hz", .. }));

        let err = RobotConfig::from_toml_str("[servo]\nids = [1, 2, 3]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "servo.ids", .. }));

        let err =
            RobotConfig::from_toml_str("[servo]\nids = [1, 1, 2, 3, 4, 5, 6, 7]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "servo.ids", .. }));

        let err = RobotConfig::from_toml_str("[servo]\ngear_ratio = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "servo.gear_ratio", .. }));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            RobotConfig::from_toml_str("[timing\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("robot.toml");

        let mut config = RobotConfig::default();
        config.timing.heartbeat_timeout_ms = 4500;
        config.pairing.permanent = true;
        config.save(&path).unwrap();

        let loaded = RobotConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
