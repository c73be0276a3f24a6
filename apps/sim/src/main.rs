//! # q8 Sim
//!
//! 在桌面上运行完整的机载运行时：舵机、无线、电量计和状态灯都由 Mock 实现，
//! 主机端控制器按脚本发送命令。
//!
//! ```bash
//! # 内置演示脚本
//! q8-sim
//!
//! # 自定义配置、步态表和脚本
//! q8-sim --config robot.toml --gaits gaits.q8lut --script walk.toml
//! ```
//!
//! 运行中可在控制台输入 `p`（强制解除配对）、`d`（切换调试日志）、
//! `s`（打印状态）、`q`（退出）。

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, never, select};
use q8_sdk::hal::mock::{MockFuelGauge, MockLed, MockRadio, MockServoBus};
use q8_sdk::hal::{FilePeerStore, MemoryPeerStore};
use q8_sdk::{GaitLut, MacAddress, Robot, RobotBuilder, RobotConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

mod console;
mod host;
mod link;
mod script;

use console::{ConsoleCommand, HELP, spawn_console};
use host::{HostOptions, ScriptedHost};
use link::AirLink;
use script::Script;

const ROBOT_MAC: MacAddress = MacAddress([0x24, 0x6F, 0x28, 0x51, 0x08, 0x01]);
const HOST_MAC: MacAddress = MacAddress([0x34, 0x85, 0x18, 0x51, 0x08, 0x02]);

/// q8 Sim - 四足机器人运行时模拟器
#[derive(Parser, Debug)]
#[command(name = "q8-sim")]
#[command(about = "Run the q8bot runtime against mock hardware", long_about = None)]
#[command(version)]
struct Cli {
    /// 机器人配置文件（TOML）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 步态表（`.toml` 或二进制）
    #[arg(long)]
    gaits: Option<PathBuf>,

    /// 控制器脚本（TOML），默认使用内置演示
    #[arg(long)]
    script: Option<PathBuf>,

    /// 已配对地址的存储文件，不指定则只保存在内存中
    #[arg(long)]
    peer_file: Option<PathBuf>,

    /// 模拟电量百分比
    #[arg(long, default_value_t = 87)]
    battery: u8,

    /// 控制器心跳间隔（毫秒）
    #[arg(long, default_value_t = 500)]
    heartbeat_ms: u64,

    /// 脚本结束后停止心跳（观察心跳超时）
    #[arg(long)]
    drop_link: bool,

    /// 以调试日志级别启动
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut debug = cli.debug;
    let log = q8_sdk::init_reloadable_logging(level(debug))?;

    let config = match &cli.config {
        Some(path) => RobotConfig::load(path)?,
        None => RobotConfig::default(),
    };
    let lut = cli.gaits.as_deref().map(GaitLut::load_any).transpose()?;
    let mut script = match &cli.script {
        Some(path) => Script::load(path)?,
        None => Script::demo(),
    };
    script.resolve_gaits(lut.as_ref())?;

    let robot_radio = MockRadio::new(ROBOT_MAC, 1);
    let host_radio = MockRadio::new(HOST_MAC, 1);
    let robot = build_robot(&cli, config, lut.as_ref(), &robot_radio)?;

    let running = Arc::new(AtomicBool::new(true));
    let (inbox_tx, inbox_rx) = bounded(64);
    let air = AirLink {
        robot_radio,
        host_radio: host_radio.clone(),
        intake: robot.intake(),
        to_host: inbox_tx,
    }
    .spawn(Arc::clone(&running))
    .context("Failed to spawn air link thread")?;

    let options = HostOptions {
        heartbeat_interval: Duration::from_millis(cli.heartbeat_ms),
        keep_alive: !cli.drop_link,
        step_delay: Duration::from_millis(50),
    };
    let host = ScriptedHost::new(host_radio, ROBOT_MAC, inbox_rx, options, Arc::clone(&running));
    let (done_tx, done_rx) = bounded::<Result<()>>(1);
    let host_thread = thread::Builder::new()
        .name("sim-host".to_string())
        .spawn(move || {
            let _ = done_tx.send(host.run(&script));
        })
        .context("Failed to spawn host thread")?;

    let (signal_tx, signal_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    let mut console = spawn_console().context("Failed to spawn console thread")?;
    let mut host_done = done_rx;
    info!("{}", HELP);

    loop {
        let (mut console_closed, mut host_finished) = (false, false);
        select! {
            recv(console) -> cmd => match cmd {
                Ok(ConsoleCommand::Unpair) => {
                    warn!("Operator forced unpair");
                    robot.force_unpair();
                },
                Ok(ConsoleCommand::ToggleDebug) => {
                    debug = !debug;
                    log.set(level(debug))?;
                    let state = if debug { "on" } else { "off" };
                    info!("Debug logging {}", state);
                },
                Ok(ConsoleCommand::Status) => print_status(&robot),
                Ok(ConsoleCommand::Quit) => break,
                // stdin 已关闭，只等待信号或脚本结束
                Err(_) => console_closed = true,
            },
            recv(signal_rx) -> _ => {
                info!("Ctrl+C received, shutting down");
                break;
            },
            recv(host_done) -> result => {
                match result {
                    Ok(Ok(())) => info!("Controller finished; press q to quit"),
                    Ok(Err(e)) => error!("Controller failed: {:#}", e),
                    Err(_) => {},
                }
                host_finished = true;
            },
        }
        if console_closed {
            console = never();
        }
        if host_finished {
            host_done = never();
        }
    }

    running.store(false, Ordering::Release);
    if host_thread.join().is_err() {
        error!("Host thread panicked");
    }
    if air.join().is_err() {
        error!("Air link thread panicked");
    }
    print_status(&robot);
    // Robot 的 Drop 负责停止并回收后台线程
    drop(robot);
    Ok(())
}

fn level(debug: bool) -> &'static str {
    if debug { "debug" } else { q8_sdk::DEFAULT_LOG_FILTER }
}

fn build_robot(
    cli: &Cli,
    config: RobotConfig,
    lut: Option<&GaitLut>,
    radio: &MockRadio,
) -> Result<Robot> {
    let mut builder = RobotBuilder::new()
        .config(config)
        .servo_bus(MockServoBus::new())
        .radio(Arc::new(radio.clone()))
        .fuel_gauge(MockFuelGauge::new(cli.battery))
        .status_led(MockLed::new());
    builder = match &cli.peer_file {
        Some(path) => builder.peer_store(FilePeerStore::new(path)),
        None => builder.peer_store(MemoryPeerStore::new()),
    };
    if let Some(lut) = lut {
        builder = builder.gait_table(q8_sdk::gait_table_from_lut(lut)?);
    }
    Ok(builder.build()?)
}

fn print_status(robot: &Robot) {
    let snapshot = robot.snapshot();
    let metrics = robot.metrics();
    info!(
        "state={} peer={} torque={} gait={:?} jumping={} battery={:?} recorded={}",
        snapshot.state,
        snapshot.peer.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
        snapshot.torque_enabled,
        snapshot.gait,
        snapshot.jumping,
        snapshot.battery_percent,
        snapshot.recorded_samples
    );
    info!(
        "received={} applied={} dropped={} ignored={} malformed={} queue_full={} gait_frames={} bus_faults={} timeouts={} drop_rate={:.1}%",
        metrics.datagrams_received,
        metrics.commands_applied,
        metrics.commands_dropped,
        metrics.commands_ignored,
        metrics.malformed_drops,
        metrics.queue_full_drops,
        metrics.gait_frames,
        metrics.bus_faults,
        metrics.liveness_timeouts,
        metrics.drop_rate()
    );
}
