//! 端到端会话测试
//!
//! 通过 Mock 硬件连接机载运行时和主机端控制器：
//! 控制器发出的数据报手动转发到机器人的接收队列，机器人的回复再交给控制器解析。

use q8_sdk::client::parse_reply;
use q8_sdk::hal::mock::{MockFuelGauge, MockLed, MockRadio, MockServoBus};
use q8_sdk::hal::{Clock, ManualClock, MemoryPeerStore, RadioLink};
use q8_sdk::tools::{GaitLut, RecordingAssembler};
use q8_sdk::{Controller, MacAddress, Paired, Robot, RobotBuilder, RobotConfig, RobotReply, RobotState};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const HOST: MacAddress = MacAddress([0x34, 0x85, 0x18, 0x00, 0x00, 0x42]);
const WAIT: Duration = Duration::from_secs(3);

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

struct Session {
    robot: Robot,
    bus: MockServoBus,
    robot_radio: MockRadio,
    host_radio: MockRadio,
    clock: ManualClock,
}

impl Session {
    fn start(config: RobotConfig, lut: Option<&GaitLut>, gauge: MockFuelGauge) -> Self {
        let bus = MockServoBus::new();
        let robot_radio = MockRadio::default();
        let clock = ManualClock::new(1_000);
        let clock_handle: Arc<dyn Clock> = Arc::new(clock.clone());

        let mut builder = RobotBuilder::new()
            .config(config)
            .servo_bus(bus.clone())
            .radio(Arc::new(robot_radio.clone()))
            .peer_store(MemoryPeerStore::new())
            .fuel_gauge(gauge)
            .status_led(MockLed::new())
            .clock(clock_handle);
        if let Some(lut) = lut {
            builder = builder.gait_table(q8_sdk::gait_table_from_lut(lut).unwrap());
        }

        Self {
            robot: builder.build().unwrap(),
            bus,
            robot_radio,
            host_radio: MockRadio::new(HOST, 1),
            clock,
        }
    }

    /// 把控制器发出的数据报逐个转发给机器人，每个都等待处理完
    fn forward(&self) {
        let intake = self.robot.intake();
        for (_, bytes) in self.host_radio.take_sent() {
            let expected = self.handled() + 1;
            intake.push(HOST, &bytes).unwrap();
            assert!(wait_until(|| self.handled() >= expected));
        }
    }

    fn handled(&self) -> u64 {
        let m = self.robot.metrics();
        m.commands_applied + m.commands_dropped + m.commands_ignored
    }

    fn pair(&self) -> Controller<Paired> {
        let ctl = Controller::new(Arc::new(self.host_radio.clone()), 1);
        ctl.request_pairing(self.robot_radio.own_address()).unwrap();
        self.forward();
        assert!(self.robot.state().is_paired());

        let (peer, ack) = self.robot_radio.take_sent().pop().unwrap();
        assert_eq!(peer, HOST);
        ctl.pair(&ack).unwrap()
    }

    fn replies(&self) -> Vec<RobotReply> {
        self.robot_radio
            .take_sent()
            .iter()
            .map(|(_, bytes)| parse_reply(bytes).unwrap())
            .collect()
    }
}

fn fast_config() -> RobotConfig {
    let mut config = RobotConfig::default();
    config.timing.liveness_period_ms = 20;
    config
}

#[test]
fn test_pair_enable_torque_and_start() {
    let session = Session::start(fast_config(), None, MockFuelGauge::new(87));
    let mut ctl = session.pair();
    assert_eq!(ctl.robot(), session.robot_radio.own_address());
    assert_eq!(session.robot.snapshot().peer, Some(HOST));

    ctl.enable_torque().unwrap();
    session.forward();
    assert!(session.bus.torque());
    assert!(session.robot.snapshot().torque_enabled);

    // 下一次启动尝试时进入 Started
    session.clock.advance(2_000);
    assert!(wait_until(|| session.robot.state() == RobotState::Started));
}

#[test]
fn test_battery_query_round_trip() {
    let session = Session::start(fast_config(), None, MockFuelGauge::new(87));
    let ctl = session.pair();

    ctl.check_battery().unwrap();
    session.forward();

    match session.replies().as_slice() {
        [RobotReply::Data(reply)] => assert_eq!(reply.data[0], 87),
        other => panic!("unexpected replies {:?}", other),
    }
    assert_eq!(session.robot.snapshot().battery_percent, Some(87));
}

#[test]
fn test_heartbeat_echo_keeps_link_alive() {
    let session = Session::start(fast_config(), None, MockFuelGauge::new(50));
    let ctl = session.pair();

    // 每次间隔都在超时之内；超时过的话心跳不会再被回显
    for _ in 0..3 {
        session.clock.advance(2_000);
        ctl.heartbeat().unwrap();
        session.forward();
        match session.replies().as_slice() {
            [reply] => assert!(ctl.is_heartbeat_echo(reply)),
            other => panic!("expected one heartbeat echo, got {:?}", other),
        }
    }
    assert!(session.robot.state().is_paired());
    assert_eq!(session.robot.metrics().liveness_timeouts, 0);

    // 超时从最后一次心跳开始计算
    session.clock.advance(3_001);
    assert!(wait_until(|| session.robot.state() == RobotState::Unpaired));
    assert_eq!(session.robot.metrics().liveness_timeouts, 1);
}

#[test]
fn test_liveness_timeout_unpairs_and_cuts_torque() {
    let session = Session::start(fast_config(), None, MockFuelGauge::new(50));
    let mut ctl = session.pair();
    ctl.enable_torque().unwrap();
    session.forward();
    assert!(session.bus.torque());

    session.clock.advance(3_001);
    assert!(wait_until(|| session.robot.state() == RobotState::Unpaired));
    assert!(!session.bus.torque());
    assert_eq!(session.robot.metrics().liveness_timeouts, 1);
    assert_eq!(session.robot.snapshot().peer, None);

    // 超时后的命令来自陌生对端，被忽略
    let ignored = session.robot.metrics().commands_ignored;
    ctl.jump().unwrap();
    session.forward();
    assert_eq!(session.robot.metrics().commands_ignored, ignored + 1);
}

#[test]
fn test_gait_playback_from_lut() {
    let mut lut = GaitLut::default();
    lut.push_gait("march", &[[100; 8], [200; 8], [300; 8]]);
    lut.push_gait("sway", &[[-5; 8]]);

    let session = Session::start(fast_config(), Some(&lut), MockFuelGauge::new(50));
    let ctl = session.pair();
    session.bus.clear_history();

    ctl.start_gait(lut.id_of("march").unwrap()).unwrap();
    session.forward();
    assert_eq!(session.robot.snapshot().gait, Some(0));

    // 循环播放：三帧都出现过
    assert!(wait_until(|| {
        let writes = session.bus.goal_writes();
        [[100; 8], [200; 8], [300; 8]]
            .iter()
            .all(|frame| writes.contains(frame))
    }));
    assert!(session.robot.metrics().gait_frames >= 3);

    ctl.stop_gait().unwrap();
    session.forward();
    assert_eq!(session.robot.snapshot().gait, None);
}

#[test]
fn test_recording_round_trip() {
    let session = Session::start(fast_config(), None, MockFuelGauge::new(50));
    let ctl = session.pair();
    session.bus.set_currents([-20, -10, 0, 10, 20, 30, 40, 50]);

    for step in 0..7 {
        ctl.move_all_timed([step * 10; 8], 0).unwrap();
    }
    ctl.finish_recording().unwrap();
    session.forward();

    let mut assembler = RecordingAssembler::new(7);
    for reply in session.replies() {
        if let RobotReply::Data(data) = reply {
            assembler.push_reply(&data);
        }
    }
    assert!(assembler.is_complete());
    let recording = assembler.finish().unwrap();
    assert_eq!(recording.len(), 7);

    let joints = q8_sdk::tools::recording::decode_snapshot(&recording.snapshots[6]);
    assert_eq!(joints[0].current, -20);
    assert_eq!(joints[7].current, 50);
    assert_eq!(joints[3].position, 60);
    assert_eq!(session.robot.snapshot().recorded_samples, 0);
}

#[test]
fn test_force_unpair_and_repair() {
    let session = Session::start(fast_config(), None, MockFuelGauge::new(50));
    let ctl = session.pair();

    session.robot.force_unpair();
    assert_eq!(session.robot.state(), RobotState::Unpaired);

    let ctl = ctl.unpair();
    ctl.request_pairing(session.robot_radio.own_address()).unwrap();
    session.forward();
    assert!(session.robot.state().is_paired());
}
