//! Type State 控制器

use crate::{ClientError, Result};
use q8_hal::RadioLink;
use q8_protocol::{
    CommandType, DataReply, Inbound, JOINT_COUNT, LEG_COUNT, MacAddress, Message, PairingMessage,
    SERVER_ID, encode_data, encode_heartbeat,
};
use std::sync::Arc;
use tracing::{debug, info};

/// 未配对状态
pub struct Unpaired;

/// 已配对状态
pub struct Paired {
    robot: MacAddress,
    channel: u8,
}

/// 机器人发来的数据报
#[derive(Debug, Clone, PartialEq)]
pub enum RobotReply {
    PairingAck(PairingMessage),
    /// 心跳回显（携带控制器 ID）
    Heartbeat(u8),
    Data(DataReply),
}

/// 解析机器人发来的数据报
pub fn parse_reply(bytes: &[u8]) -> Result<RobotReply> {
    match Inbound::parse(bytes)? {
        Inbound::Pairing(ack) => Ok(RobotReply::PairingAck(ack)),
        Inbound::Heartbeat(raw) => Ok(RobotReply::Heartbeat(raw[1])),
        Inbound::Data(_) => Ok(RobotReply::Data(DataReply::decode(bytes)?)),
    }
}

/// 步态 ID：`gait_index * direction_count + direction_index`
pub fn gait_id(gait_index: usize, direction_index: usize, direction_count: usize) -> Option<u8> {
    if direction_index >= direction_count {
        return None;
    }
    gait_index
        .checked_mul(direction_count)?
        .checked_add(direction_index)
        .and_then(|id| u8::try_from(id).ok())
}

/// 主机端控制器
pub struct Controller<State = Unpaired> {
    radio: Arc<dyn RadioLink>,
    id: u8,
    torque_on: bool,
    state: State,
}

impl Controller<Unpaired> {
    /// `id` 为控制器在心跳和配对请求中使用的 ID（不能为 0）
    pub fn new(radio: Arc<dyn RadioLink>, id: u8) -> Self {
        Self {
            radio,
            id,
            torque_on: false,
            state: Unpaired,
        }
    }

    /// 配对请求数据报
    pub fn pairing_request(&self) -> Vec<u8> {
        PairingMessage {
            id: self.id,
            mac: self.radio.own_address(),
            channel: self.radio.channel(),
        }
        .encode()
    }

    /// 向机器人发送配对请求
    pub fn request_pairing(&self, robot: MacAddress) -> Result<()> {
        self.radio.register_peer(robot)?;
        self.radio.send(robot, &self.pairing_request())?;
        debug!("Pairing request sent to {}", robot);
        Ok(())
    }

    /// 用机器人的配对应答完成配对
    pub fn pair(self, ack: &[u8]) -> Result<Controller<Paired>> {
        let ack = match parse_reply(ack)? {
            RobotReply::PairingAck(ack) => ack,
            other => return Err(ClientError::InvalidAck(format!("unexpected reply {:?}", other))),
        };
        if ack.id != SERVER_ID {
            return Err(ClientError::InvalidAck(format!(
                "sender id {} is not a robot",
                ack.id
            )));
        }
        self.radio.register_peer(ack.mac)?;
        info!("Paired with robot {} on channel {}", ack.mac, ack.channel);
        Ok(Controller {
            radio: self.radio,
            id: self.id,
            torque_on: false,
            state: Paired {
                robot: ack.mac,
                channel: ack.channel,
            },
        })
    }
}

impl Controller<Paired> {
    pub fn robot(&self) -> MacAddress {
        self.state.robot
    }

    pub fn channel(&self) -> u8 {
        self.state.channel
    }

    pub fn torque_on(&self) -> bool {
        self.torque_on
    }

    fn send_command(&self, command: CommandType, values: &[i32]) -> Result<()> {
        let datagram = encode_data(&Message::with_ints(command, values)?)?;
        self.radio.send(self.state.robot, &datagram)?;
        Ok(())
    }

    pub fn enable_torque(&mut self) -> Result<()> {
        self.send_command(CommandType::SetTorque, &[1])?;
        self.torque_on = true;
        Ok(())
    }

    pub fn disable_torque(&mut self) -> Result<()> {
        self.send_command(CommandType::SetTorque, &[0])?;
        self.torque_on = false;
        Ok(())
    }

    pub fn check_battery(&self) -> Result<()> {
        self.send_command(CommandType::Battery, &[])
    }

    /// 让机器人采集一次遥测快照
    pub fn record(&self) -> Result<()> {
        self.send_command(CommandType::Record, &[])
    }

    /// 让机器人回传全部录制数据
    pub fn finish_recording(&self) -> Result<()> {
        self.send_command(CommandType::SendRecorded, &[])
    }

    pub fn jump(&self) -> Result<()> {
        self.send_command(CommandType::Jump, &[])
    }

    pub fn set_profile(&self, duration_ms: i32) -> Result<()> {
        self.send_command(CommandType::SetProfile, &[duration_ms])
    }

    /// 开始步态（ID 按 4 字节 int32 发送）
    pub fn start_gait(&self, gait: u8) -> Result<()> {
        self.send_command(CommandType::SetGait, &[i32::from(gait)])
    }

    pub fn stop_gait(&self) -> Result<()> {
        self.send_command(CommandType::SetGait, &[])
    }

    /// 写入 8 个关节目标位置（舵机单位）
    pub fn move_all(&self, goals: [i32; JOINT_COUNT]) -> Result<()> {
        self.send_command(CommandType::Move, &goals)
    }

    /// 设置运动时长后移动，并采集一次快照
    pub fn move_all_timed(&self, goals: [i32; JOINT_COUNT], duration_ms: i32) -> Result<()> {
        if duration_ms > 0 {
            self.set_profile(duration_ms)?;
        }
        self.move_all(goals)?;
        self.record()
    }

    /// 单腿两个关节的目标复制到 4 条腿
    pub fn move_mirror(&self, pair: [i32; 2]) -> Result<()> {
        let mut goals = [0; JOINT_COUNT];
        for leg in 0..LEG_COUNT {
            goals[leg * 2] = pair[0];
            goals[leg * 2 + 1] = pair[1];
        }
        self.move_all(goals)
    }

    pub fn heartbeat(&self) -> Result<()> {
        self.radio.send(self.state.robot, &encode_heartbeat(self.id))?;
        Ok(())
    }

    /// 是否为本控制器心跳的回显
    pub fn is_heartbeat_echo(&self, reply: &RobotReply) -> bool {
        matches!(reply, RobotReply::Heartbeat(id) if *id == self.id)
    }

    /// 解除配对（仅本地注销对端，机器人在心跳超时后自行解除）
    pub fn unpair(self) -> Controller<Unpaired> {
        if let Err(e) = self.radio.forget_peer(self.state.robot) {
            debug!("Forget robot {}: {}", self.state.robot, e);
        }
        Controller {
            radio: self.radio,
            id: self.id,
            torque_on: false,
            state: Unpaired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use q8_hal::mock::MockRadio;

    const ROBOT: MacAddress = MacAddress([0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]);

    fn paired() -> (Controller<Paired>, MockRadio) {
        let radio = MockRadio::new(MacAddress([0x34, 0x85, 0x18, 0, 0, 9]), 1);
        let ctl = Controller::new(Arc::new(radio.clone()), 1);
        let ack = PairingMessage {
            id: SERVER_ID,
            mac: ROBOT,
            channel: 1,
        };
        let ctl = ctl.pair(&ack.encode()).unwrap();
        (ctl, radio)
    }

    fn last_message(radio: &MockRadio) -> Message {
        let sent = radio.take_sent();
        let (peer, bytes) = sent.last().unwrap();
        assert_eq!(*peer, ROBOT);
        match Inbound::parse(bytes).unwrap() {
            Inbound::Data(frame) => Message::decode(frame).unwrap(),
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_request_pairing() {
        let radio = MockRadio::default();
        let ctl = Controller::new(Arc::new(radio.clone()), 3);
        ctl.request_pairing(ROBOT).unwrap();

        let sent = radio.take_sent();
        let req = PairingMessage::decode(&sent[0].1).unwrap();
        assert_eq!(req.id, 3);
        assert_eq!(req.mac, radio.own_address());
    }

    #[test]
    fn test_pair_rejects_non_robot_ack() {
        let ctl = Controller::new(Arc::new(MockRadio::default()), 1);
        let ack = PairingMessage {
            id: 5,
            mac: ROBOT,
            channel: 1,
        };
        assert!(matches!(ctl.pair(&ack.encode()), Err(ClientError::InvalidAck(_))));

        let ctl = Controller::new(Arc::new(MockRadio::default()), 1);
        assert!(matches!(
            ctl.pair(&encode_heartbeat(0)),
            Err(ClientError::InvalidAck(_))
        ));
    }

    #[test]
    fn test_commands_encode() {
        let (mut ctl, radio) = paired();
        assert_eq!(ctl.robot(), ROBOT);

        ctl.enable_torque().unwrap();
        let msg = last_message(&radio);
        assert_eq!(msg.command(), CommandType::SetTorque);
        assert_eq!(msg.ints().unwrap(), &[1]);
        assert!(ctl.torque_on());

        ctl.start_gait(5).unwrap();
        let msg = last_message(&radio);
        assert_eq!(msg.command(), CommandType::SetGait);
        assert_eq!(msg.ints().unwrap(), &[5]);

        ctl.stop_gait().unwrap();
        assert_eq!(last_message(&radio).payload_len(), 0);

        ctl.move_mirror([100, 200]).unwrap();
        assert_eq!(
            last_message(&radio).ints().unwrap(),
            &[100, 200, 100, 200, 100, 200, 100, 200]
        );
    }

    #[test]
    fn test_move_all_timed_sends_profile_move_record() {
        let (ctl, radio) = paired();
        ctl.move_all_timed([1, 2, 3, 4, 5, 6, 7, 8], 300).unwrap();
        let commands: Vec<CommandType> = radio
            .take_sent()
            .iter()
            .map(|(_, b)| Message::decode(&b[1..]).unwrap().command())
            .collect();
        assert_eq!(
            commands,
            vec![CommandType::SetProfile, CommandType::Move, CommandType::Record]
        );
    }

    #[test]
    fn test_heartbeat_echo() {
        let (ctl, radio) = paired();
        ctl.heartbeat().unwrap();
        let (_, bytes) = radio.take_sent().pop().unwrap();
        let reply = parse_reply(&bytes).unwrap();
        assert!(ctl.is_heartbeat_echo(&reply));
        assert!(!ctl.is_heartbeat_echo(&RobotReply::Heartbeat(9)));
    }

    #[test]
    fn test_parse_data_reply() {
        let reply = parse_reply(&DataReply::battery(77).encode()).unwrap();
        match reply {
            RobotReply::Data(d) => assert_eq!(d.data[0], 77),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_gait_id() {
        // 4 个方向：gait 2 的第 3 个方向
        assert_eq!(gait_id(2, 3, 4), Some(11));
        assert_eq!(gait_id(0, 4, 4), None);
        assert_eq!(gait_id(100, 0, 4), None);
    }

    #[test]
    fn test_unpair_forgets_robot() {
        let (ctl, radio) = paired();
        assert!(radio.is_registered(ROBOT));
        let _ctl = ctl.unpair();
        assert!(!radio.is_registered(ROBOT));
    }
}
