//! q8 SDK - q8bot 四足机器人 Rust SDK
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 无线数据报与命令帧编码/解码
//! - **硬件抽象层** (`hal`): 舵机总线、无线链路、存储、电量计、状态灯、时钟
//! - **驱动层** (`driver`): 机载运行时（配对、命令分发、步态播放、后台线程）
//! - **客户端层** (`client`): 主机端类型安全的控制器
//! - **工具层** (`tools`): 录制与步态表文件格式
//!
//! # 快速开始
//!
//! ```rust
//! use q8_sdk::prelude::*;
//! ```
//!
//! 机载运行时通过 [`RobotBuilder`] 组装，主机端使用 [`Controller`]。

pub use q8_client as client;
pub use q8_driver as driver;
pub use q8_hal as hal;
pub use q8_protocol as protocol;
pub use q8_tools as tools;

pub mod prelude;

// --- 用户以此为界 ---

pub use q8_client::{ClientError, Controller, Paired, RobotReply, Unpaired};
pub use q8_driver::{
    DriverError, GaitTable, GaitTableError, MetricsSnapshot, Robot, RobotBuilder, RobotConfig,
    RobotSnapshot, RobotState,
};
pub use q8_protocol::{CommandType, MacAddress, ProtocolError};
pub use q8_tools::{GaitLut, TelemetryRecording};

use anyhow::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

/// 默认日志级别（可被 `RUST_LOG` 覆盖）
pub const DEFAULT_LOG_FILTER: &str = "info";

fn initial_filter(default_filter: &str) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Invalid log filter")
}

fn install_log_bridge() -> anyhow::Result<()> {
    tracing_log::LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init()
        .context("Global log bridge already set")
}

/// 初始化全局日志
///
/// - `RUST_LOG` 设置时优先使用，否则使用 `default_filter`
/// - 依赖 `log` crate 的库输出通过 `tracing-log` 桥接
///
/// 重复调用返回错误（全局订阅者只能设置一次）。
pub fn init_logging(default_filter: &str) -> anyhow::Result<()> {
    let subscriber = fmt()
        .with_env_filter(initial_filter(default_filter)?)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Global tracing subscriber already set")?;
    install_log_bridge()
}

/// 运行时可替换的日志过滤器
#[derive(Clone)]
pub struct LogFilterHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogFilterHandle {
    /// 替换过滤规则（如 `"debug"` 或 `"q8_driver=trace,info"`）
    pub fn set(&self, directives: &str) -> anyhow::Result<()> {
        let filter = EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid log filter '{}'", directives))?;
        self.handle.reload(filter).context("Log subscriber is gone")
    }
}

/// 初始化全局日志，并返回可在运行时切换级别的句柄
pub fn init_reloadable_logging(default_filter: &str) -> anyhow::Result<LogFilterHandle> {
    let (filter, handle) = reload::Layer::new(initial_filter(default_filter)?);
    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_thread_names(true));
    tracing::subscriber::set_global_default(subscriber)
        .context("Global tracing subscriber already set")?;
    install_log_bridge()?;
    Ok(LogFilterHandle { handle })
}

/// 将离线生成的步态表产物转换为运行时查找表
pub fn gait_table_from_lut(lut: &GaitLut) -> Result<GaitTable, GaitTableError> {
    GaitTable::from_parts(lut.frames.clone(), lut.offsets.clone())
}

/// 从文件加载步态表（`.toml` 为文本格式，其余为二进制格式）
pub fn load_gait_table(path: impl AsRef<std::path::Path>) -> anyhow::Result<GaitTable> {
    let path = path.as_ref();
    let lut = GaitLut::load_any(path)?;
    gait_table_from_lut(&lut).with_context(|| format!("Invalid gait table {}", path.display()))
}
