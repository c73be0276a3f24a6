//! 操作员控制台
//!
//! 专用输入线程读取 stdin，按行解析为命令后通过通道发给主循环。

use crossbeam_channel::{Receiver, bounded};
use std::io::BufRead;
use std::thread;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// 强制解除配对
    Unpair,
    /// 切换调试日志
    ToggleDebug,
    /// 打印状态
    Status,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "p" => Some(Self::Unpair),
            "d" => Some(Self::ToggleDebug),
            "s" => Some(Self::Status),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

pub const HELP: &str = "commands: p = force unpair, d = toggle debug log, s = status, q = quit";

/// 启动输入线程；stdin 关闭时通道随之关闭
pub fn spawn_console() -> std::io::Result<Receiver<ConsoleCommand>> {
    let (tx, rx) = bounded(8);
    thread::Builder::new()
        .name("sim-console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match ConsoleCommand::parse(&line) {
                    Some(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    },
                    None => warn!("Unknown command '{}'; {}", line.trim(), HELP),
                }
            }
        })?;
    Ok(rx)
}
