//! 驱动层模块
//!
//! 本模块提供 q8bot 四足机器人的机载控制逻辑，包括：
//! - 配对与心跳存活状态机
//! - 命令分发（移动、电量、录制、跳跃、力矩、运动曲线、步态）
//! - 步态查表播放与跳跃阶段机
//! - 后台线程（分发、步态、存活检查、状态灯）
//! - 状态发布（ArcSwap 无锁读取）与运行指标
//!
//! 硬件通过 [`q8_hal`] 中的 trait 注入，使用 [`RobotBuilder`] 组装。

pub mod actuator;
mod builder;
pub mod config;
pub mod context;
pub mod dispatch;
mod error;
pub mod gait;
pub mod jump;
pub mod metrics;
pub mod motion;
pub mod pairing;
pub mod pipeline;
pub mod recorder;
mod robot;
pub mod state;
pub mod status;

pub use actuator::{
    ActuatorController, JointActuationState, JointCalibration, JointGoals, Pose, PoseSet,
    TelemetrySnapshot, encode_telemetry,
};
pub use builder::RobotBuilder;
pub use config::{JumpConfig, PairingConfig, PoseConfig, RobotConfig, ServoConfig, TimingConfig};
pub use context::RobotContext;
pub use dispatch::{DispatchOutcome, Dispatcher, DropReason};
pub use error::{ActuatorFault, ConfigError, DriverError};
pub use gait::{GaitCursor, GaitPlayer, GaitTable, GaitTableError};
pub use jump::{JumpPhase, JumpProgress, JumpSequence};
pub use metrics::{MetricsSnapshot, RobotMetrics};
pub use motion::{MotionCore, TickOutcome};
pub use pairing::PairingMachine;
pub use pipeline::{InboundDatagram, Intake};
pub use recorder::{MotionRecorder, RecordChunk};
pub use robot::Robot;
pub use state::{AtomicRobotState, RobotSnapshot, RobotState};
pub use status::{NoLed, StatusIndicator, pattern_brightness};
