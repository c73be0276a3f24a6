//! 命令分发
//!
//! 解析入站数据报并执行对应的副作用：
//!
//! - PAIRING：交给配对状态机，成功时回复一次应答
//! - HEARTBEAT：受信对端刷新存活时间戳并原样回显
//! - DATA：受信对端刷新存活时间戳，解码命令帧后按命令执行
//!
//! 被丢弃的命令不会修改关节执行状态、录制缓冲区和步态游标。

use crate::context::RobotContext;
use crate::metrics::RobotMetrics;
use crate::recorder::MotionRecorder;
use q8_hal::FuelGauge;
use q8_protocol::{CommandType, DataReply, Inbound, MacAddress, Message, ProtocolError};
use tracing::{debug, info, trace, warn};

/// 命令被丢弃的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// 数据报或命令帧格式错误
    Malformed(ProtocolError),
    /// 负载个数不符合命令要求
    Arity(ProtocolError),
    /// 步态表中没有该 ID
    UnknownGait(i32),
    /// 运动曲线时长为负
    NegativeProfile(i32),
    /// 上一次跳跃尚未结束
    JumpInProgress,
    /// 录制缓冲区内存分配失败
    RecordAllocation,
    /// 舵机总线故障
    BusFault,
}

/// 一次分发的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    /// 非受信来源或已配对时的配对请求
    Ignored,
    Dropped(DropReason),
}

/// 命令分发器
///
/// 录制缓冲区由分发器独占，不需要加锁。
pub struct Dispatcher {
    recorder: MotionRecorder,
    gauge: Option<Box<dyn FuelGauge>>,
    last_battery: Option<u8>,
}

impl Dispatcher {
    pub fn new(gauge: Option<Box<dyn FuelGauge>>) -> Self {
        Self {
            recorder: MotionRecorder::new(),
            gauge,
            last_battery: None,
        }
    }

    /// 处理一个入站数据报
    pub fn handle_datagram(
        &mut self,
        ctx: &RobotContext,
        sender: MacAddress,
        bytes: &[u8],
    ) -> DispatchOutcome {
        RobotMetrics::incr(&ctx.metrics.datagrams_received);

        let outcome = match Inbound::parse(bytes) {
            Err(e) => {
                debug!("Malformed datagram from {}: {}", sender, e);
                RobotMetrics::incr(&ctx.metrics.malformed_drops);
                return DispatchOutcome::Dropped(DropReason::Malformed(e));
            },
            Ok(Inbound::Pairing(_)) => {
                let ack = {
                    let mut pairing = ctx.pairing.lock();
                    pairing.handle_pairing(sender, ctx.now_ms())
                };
                match ack {
                    Some(ack) => {
                        ctx.send(sender, &ack.encode());
                        DispatchOutcome::Applied
                    },
                    None => DispatchOutcome::Ignored,
                }
            },
            Ok(Inbound::Heartbeat(raw)) => {
                // 时间戳在持锁后读取，存活检查看到的时间不会早于它
                let trusted = {
                    let mut pairing = ctx.pairing.lock();
                    pairing.handle_heartbeat(sender, ctx.now_ms())
                };
                if trusted {
                    trace!("Heartbeat from {}", sender);
                    ctx.send(sender, raw);
                    DispatchOutcome::Applied
                } else {
                    DispatchOutcome::Ignored
                }
            },
            Ok(Inbound::Data(frame)) => {
                {
                    let mut pairing = ctx.pairing.lock();
                    if !pairing.is_trusted(sender) {
                        drop(pairing);
                        debug!("Data from untrusted sender {} ignored", sender);
                        RobotMetrics::incr(&ctx.metrics.commands_ignored);
                        return DispatchOutcome::Ignored;
                    }
                    pairing.touch(ctx.now_ms());
                }
                match Message::decode(frame) {
                    Ok(msg) => self.dispatch_command(ctx, sender, &msg),
                    Err(e) => {
                        debug!("Malformed command frame from {}: {}", sender, e);
                        RobotMetrics::incr(&ctx.metrics.malformed_drops);
                        return DispatchOutcome::Dropped(DropReason::Malformed(e));
                    },
                }
            },
        };

        ctx.refresh_snapshot();
        let (samples, battery) = (self.recorder.len(), self.last_battery);
        ctx.update_snapshot(|s| {
            s.recorded_samples = samples;
            s.battery_percent = battery;
        });
        // 计数在快照发布之后，计数可见时快照已是最新
        match &outcome {
            DispatchOutcome::Applied => RobotMetrics::incr(&ctx.metrics.commands_applied),
            DispatchOutcome::Ignored => RobotMetrics::incr(&ctx.metrics.commands_ignored),
            DispatchOutcome::Dropped(_) => RobotMetrics::incr(&ctx.metrics.commands_dropped),
        }
        outcome
    }

    /// 执行一条已解码的命令（发送方已确认受信）
    pub fn dispatch_command(
        &mut self,
        ctx: &RobotContext,
        peer: MacAddress,
        msg: &Message,
    ) -> DispatchOutcome {
        if let Err(e) = msg.check_arity() {
            debug!("Dropping {:?}: {}", msg.command(), e);
            return DispatchOutcome::Dropped(DropReason::Arity(e));
        }
        let ints = match msg.ints() {
            Ok(ints) => ints,
            Err(e) => return DispatchOutcome::Dropped(DropReason::Malformed(e)),
        };

        let result = match msg.command() {
            CommandType::Move => {
                let goals = match msg.ints_array::<{ q8_protocol::JOINT_COUNT }>() {
                    Ok(goals) => goals,
                    Err(e) => return DispatchOutcome::Dropped(DropReason::Arity(e)),
                };
                ctx.motion.lock().move_goals(&goals)
            },
            CommandType::Battery => {
                let percent = self.read_battery();
                ctx.send(peer, &DataReply::battery(percent).encode());
                Ok(())
            },
            CommandType::Record => {
                let snapshot = ctx.motion.lock().actuator_mut().read_telemetry_or_zeroed();
                if let Err(e) = self.recorder.record(&snapshot) {
                    warn!("Record buffer allocation failed: {}; snapshot dropped", e);
                    return DispatchOutcome::Dropped(DropReason::RecordAllocation);
                }
                Ok(())
            },
            CommandType::SendRecorded => {
                if self.recorder.is_empty() {
                    debug!("SEND_RECORDED with empty buffer");
                    return DispatchOutcome::Applied;
                }
                let samples = self.recorder.len();
                let chunks = self.recorder.drain_chunks();
                info!("Sending {} recorded samples in {} chunks", samples, chunks.len());
                for chunk in &chunks {
                    ctx.send(peer, &DataReply::from_samples(chunk).encode());
                }
                Ok(())
            },
            CommandType::Jump => {
                if !ctx.motion.lock().start_jump(ctx.now_ms()) {
                    debug!("JUMP ignored: jump already in progress");
                    return DispatchOutcome::Dropped(DropReason::JumpInProgress);
                }
                Ok(())
            },
            CommandType::SetTorque => ctx
                .motion
                .lock()
                .actuator_mut()
                .set_torque(ints[0] != 0)
                .map(|_| ()),
            CommandType::SetProfile => {
                let duration = ints[0];
                if duration < 0 {
                    return DispatchOutcome::Dropped(DropReason::NegativeProfile(duration));
                }
                ctx.motion
                    .lock()
                    .actuator_mut()
                    .set_motion_profile(duration)
                    .map(|_| ())
            },
            CommandType::SetGait => match ints.first() {
                None => ctx.motion.lock().stop_gait(),
                Some(&id) => {
                    let started = u8::try_from(id)
                        .map(|gait| ctx.motion.lock().start_gait(gait))
                        .unwrap_or(false);
                    if !started {
                        debug!("SET_GAIT with unknown gait id {}", id);
                        return DispatchOutcome::Dropped(DropReason::UnknownGait(id));
                    }
                    Ok(())
                },
            },
        };

        match result {
            Ok(()) => DispatchOutcome::Applied,
            Err(fault) => {
                warn!("{:?} failed: {}", msg.command(), fault);
                RobotMetrics::incr(&ctx.metrics.bus_faults);
                DispatchOutcome::Dropped(DropReason::BusFault)
            },
        }
    }

    /// 读取电量；失败时返回上次成功的值（从未成功则为 0）
    fn read_battery(&mut self) -> u8 {
        let reading = match self.gauge.as_mut() {
            Some(gauge) => gauge.percent(),
            None => Err(q8_hal::GaugeError::Unavailable),
        };
        match reading {
            Ok(percent) => {
                self.last_battery = Some(percent);
                percent
            },
            Err(e) => {
                let fallback = self.last_battery.unwrap_or(0);
                warn!("Battery read failed: {}; reporting {}%", e, fallback);
                fallback
            },
        }
    }

    pub fn recorder(&self) -> &MotionRecorder {
        &self.recorder
    }

    pub fn last_battery(&self) -> Option<u8> {
        self.last_battery
    }
}
