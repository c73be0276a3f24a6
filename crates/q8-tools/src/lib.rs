//! # q8 Tools - 主机端共享数据格式
//!
//! **依赖原则**: 只依赖 `q8-protocol`，不依赖驱动层
//!
//! ## 包含模块
//!
//! - `recording` - 遥测录制的重组与文件格式
//! - `lut` - 步态查找表构建产物（bincode 或 TOML）

pub mod lut;
pub mod recording;

pub use lut::GaitLut;
pub use recording::{JointSample, RecordingAssembler, TelemetryRecording};
