//! 脚本驱动的主机端控制器

use crate::script::{Script, ScriptStep};
use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use q8_sdk::client::parse_reply;
use q8_sdk::hal::mock::MockRadio;
use q8_sdk::tools::RecordingAssembler;
use q8_sdk::{Controller, MacAddress, Paired, RobotReply};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 控制器 ID（心跳和配对请求中携带）
const HOST_ID: u8 = 1;
const PAIRING_RETRY: Duration = Duration::from_secs(1);
const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct HostOptions {
    pub heartbeat_interval: Duration,
    /// 脚本结束后继续发送心跳
    pub keep_alive: bool,
    /// 相邻命令之间的间隔
    pub step_delay: Duration,
}

pub struct ScriptedHost {
    radio: MockRadio,
    robot: MacAddress,
    inbox: Receiver<Vec<u8>>,
    options: HostOptions,
    running: Arc<AtomicBool>,
    last_heartbeat: Instant,
    /// 已请求但尚未取回的快照数
    pending_snapshots: usize,
}

impl ScriptedHost {
    pub fn new(
        radio: MockRadio,
        robot: MacAddress,
        inbox: Receiver<Vec<u8>>,
        options: HostOptions,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            radio,
            robot,
            inbox,
            options,
            running,
            last_heartbeat: Instant::now(),
            pending_snapshots: 0,
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 配对并执行脚本
    pub fn run(mut self, script: &Script) -> Result<()> {
        let Some(mut ctl) = self.pair()? else {
            return Ok(());
        };
        info!("Running script '{}' ({} steps)", script.name, script.steps.len());

        for (index, step) in script.steps.iter().enumerate() {
            if !self.is_running() {
                return Ok(());
            }
            debug!("Step {}: {:?}", index, step);
            self.execute(&mut ctl, step)
                .with_context(|| format!("Script step {} failed", index))?;
            self.idle(&ctl, self.options.step_delay)?;
        }
        info!("Script '{}' finished", script.name);

        if self.options.keep_alive {
            while self.is_running() {
                self.idle(&ctl, self.options.heartbeat_interval)?;
            }
        } else {
            info!("Heartbeats stopped; the robot will unpair after its timeout");
        }
        Ok(())
    }

    /// 发送配对请求直到收到应答；退出时返回 `None`
    fn pair(&mut self) -> Result<Option<Controller<Paired>>> {
        let ctl = Controller::new(Arc::new(self.radio.clone()), HOST_ID);
        while self.is_running() {
            ctl.request_pairing(self.robot)?;
            let deadline = Instant::now() + PAIRING_RETRY;
            while let Some(reply) = self.next_reply(deadline)? {
                if let RobotReply::PairingAck(ack) = reply {
                    let paired = ctl.pair(&ack.encode())?;
                    info!("Controller paired with {}", paired.robot());
                    self.last_heartbeat = Instant::now();
                    return Ok(Some(paired));
                }
            }
            debug!("No pairing ack yet, retrying");
        }
        Ok(None)
    }

    fn execute(&mut self, ctl: &mut Controller<Paired>, step: &ScriptStep) -> Result<()> {
        match step {
            ScriptStep::Torque { on: true } => ctl.enable_torque()?,
            ScriptStep::Torque { on: false } => ctl.disable_torque()?,
            ScriptStep::Move { goals, duration_ms } => {
                if *duration_ms > 0 {
                    ctl.move_all_timed(*goals, *duration_ms)?;
                    self.pending_snapshots += 1;
                } else {
                    ctl.move_all(*goals)?;
                }
            },
            ScriptStep::Mirror { pair } => ctl.move_mirror(*pair)?,
            ScriptStep::Profile { ms } => ctl.set_profile(*ms)?,
            ScriptStep::Gait { id: Some(id), .. } => ctl.start_gait(*id)?,
            ScriptStep::Gait { id: None, name } => {
                bail!("Gait {:?} was not resolved to an id", name)
            },
            ScriptStep::StopGait => ctl.stop_gait()?,
            ScriptStep::Jump => ctl.jump()?,
            ScriptStep::Battery => {
                ctl.check_battery()?;
                match self.wait_data()? {
                    Some(reply) => info!("Battery: {}%", reply.data[0]),
                    None => warn!("No battery reply"),
                }
            },
            ScriptStep::Record => {
                ctl.record()?;
                self.pending_snapshots += 1;
            },
            ScriptStep::FinishRecording { out } => {
                self.finish_recording(ctl, out.as_deref())?;
            },
            ScriptStep::Wait { ms } => self.idle(ctl, Duration::from_millis(*ms))?,
        }
        Ok(())
    }

    fn finish_recording(
        &mut self,
        ctl: &Controller<Paired>,
        out: Option<&std::path::Path>,
    ) -> Result<()> {
        let expected = std::mem::take(&mut self.pending_snapshots);
        ctl.finish_recording()?;
        if expected == 0 {
            return Ok(());
        }

        let mut assembler = RecordingAssembler::new(expected);
        while !assembler.is_complete() {
            match self.wait_data()? {
                Some(reply) => assembler.push_reply(&reply),
                None => break,
            }
        }
        let recording = assembler.finish()?;
        info!("Received {} telemetry snapshots", recording.len());
        if let Some(path) = out {
            recording.save(path)?;
            info!("Recording saved to {}", path.display());
        }
        Ok(())
    }

    /// 等待一个数据回复（心跳回显不计入）
    fn wait_data(&mut self) -> Result<Option<q8_sdk::protocol::DataReply>> {
        let deadline = Instant::now() + REPLY_TIMEOUT;
        while let Some(reply) = self.next_reply(deadline)? {
            if let RobotReply::Data(data) = reply {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    /// 空闲等待，期间按间隔发送心跳并丢弃回显
    fn idle(&mut self, ctl: &Controller<Paired>, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        while self.is_running() && Instant::now() < deadline {
            if self.last_heartbeat.elapsed() >= self.options.heartbeat_interval {
                ctl.heartbeat()?;
                self.last_heartbeat = Instant::now();
            }
            let slice = (Instant::now() + Duration::from_millis(20)).min(deadline);
            while let Some(reply) = self.next_reply(slice)? {
                if ctl.is_heartbeat_echo(&reply) {
                    trace!("Heartbeat echoed");
                } else {
                    debug!("Unsolicited reply: {:?}", reply);
                }
            }
        }
        Ok(())
    }

    /// 取下一个可解析的回复；到达截止时间返回 `None`
    fn next_reply(&self, deadline: Instant) -> Result<Option<RobotReply>> {
        loop {
            let timeout = deadline.saturating_duration_since(Instant::now());
            match self.inbox.recv_timeout(timeout) {
                Ok(bytes) => match parse_reply(&bytes) {
                    Ok(reply) => return Ok(Some(reply)),
                    Err(e) => debug!("Unparseable reply: {}", e),
                },
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => bail!("Air link closed"),
            }
        }
    }
}
