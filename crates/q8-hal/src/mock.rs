//! 内存 Mock 实现
//!
//! 每个 Mock 都可克隆，克隆体共享同一份内部状态：
//! 把一个实例交给机器人运行时，保留另一个用于检查和注入故障。

use crate::{
    BusError, ControlItem, FuelGauge, GaugeError, JOINT_COUNT, JointReading, MacAddress,
    OperatingMode, RadioError, RadioLink, ServoBus, StatusLed,
};
use parking_lot::{Mutex, MutexGuard};
use q8_protocol::MAX_DATAGRAM_LEN;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Mock 舵机总线的内部状态
#[derive(Debug, Clone)]
pub struct ServoBusState {
    pub torque: bool,
    pub mode: Option<OperatingMode>,
    pub items: HashMap<ControlItem, i32>,
    pub goals: [i32; JOINT_COUNT],
    pub currents: [i16; JOINT_COUNT],
    /// 在线的舵机 ID
    pub online_ids: Vec<u8>,
    /// 每次批量写入的目标位置（按时间顺序）
    pub goal_writes: Vec<[i32; JOINT_COUNT]>,
    /// 每次控制表写入（按时间顺序）
    pub item_writes: Vec<(ControlItem, i32)>,
    /// 每次力矩广播（按时间顺序）
    pub torque_writes: Vec<bool>,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl Default for ServoBusState {
    fn default() -> Self {
        Self {
            torque: false,
            mode: None,
            items: HashMap::new(),
            goals: [0; JOINT_COUNT],
            currents: [0; JOINT_COUNT],
            online_ids: (11..=18).collect(),
            goal_writes: Vec::new(),
            item_writes: Vec::new(),
            torque_writes: Vec::new(),
            fail_reads: false,
            fail_writes: false,
        }
    }
}

/// Mock 舵机总线
///
/// 目标位置立即生效：读回的位置等于最近一次写入的目标。
#[derive(Debug, Clone, Default)]
pub struct MockServoBus {
    state: Arc<Mutex<ServoBusState>>,
}

impl MockServoBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 访问内部状态
    pub fn state(&self) -> MutexGuard<'_, ServoBusState> {
        self.state.lock()
    }

    pub fn goal_writes(&self) -> Vec<[i32; JOINT_COUNT]> {
        self.state.lock().goal_writes.clone()
    }

    pub fn last_goals(&self) -> Option<[i32; JOINT_COUNT]> {
        self.state.lock().goal_writes.last().copied()
    }

    pub fn torque(&self) -> bool {
        self.state.lock().torque
    }

    pub fn item(&self, item: ControlItem) -> Option<i32> {
        self.state.lock().items.get(&item).copied()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn set_currents(&self, currents: [i16; JOINT_COUNT]) {
        self.state.lock().currents = currents;
    }

    /// 清空写入历史
    pub fn clear_history(&self) {
        let mut s = self.state.lock();
        s.goal_writes.clear();
        s.item_writes.clear();
        s.torque_writes.clear();
    }
}

impl ServoBus for MockServoBus {
    fn ping(&mut self, id: u8) -> Result<(), BusError> {
        if self.state.lock().online_ids.contains(&id) {
            Ok(())
        } else {
            Err(BusError::NoResponse { id })
        }
    }

    fn set_torque(&mut self, enabled: bool) -> Result<(), BusError> {
        let mut s = self.state.lock();
        if s.fail_writes {
            return Err(BusError::Transaction("injected write failure".into()));
        }
        s.torque = enabled;
        s.torque_writes.push(enabled);
        Ok(())
    }

    fn set_operating_mode(&mut self, mode: OperatingMode) -> Result<(), BusError> {
        let mut s = self.state.lock();
        if s.fail_writes {
            return Err(BusError::Transaction("injected write failure".into()));
        }
        s.mode = Some(mode);
        Ok(())
    }

    fn write_item(&mut self, item: ControlItem, value: i32) -> Result<(), BusError> {
        let mut s = self.state.lock();
        if s.fail_writes {
            return Err(BusError::Transaction("injected write failure".into()));
        }
        s.items.insert(item, value);
        s.item_writes.push((item, value));
        Ok(())
    }

    fn write_goals(&mut self, goals: &[i32; JOINT_COUNT]) -> Result<(), BusError> {
        let mut s = self.state.lock();
        if s.fail_writes {
            return Err(BusError::Transaction("injected write failure".into()));
        }
        s.goals = *goals;
        s.goal_writes.push(*goals);
        Ok(())
    }

    fn read_state(&mut self) -> Result<[JointReading; JOINT_COUNT], BusError> {
        let s = self.state.lock();
        if s.fail_reads {
            return Err(BusError::Transaction("injected read failure".into()));
        }
        let mut out = [JointReading::default(); JOINT_COUNT];
        for (i, reading) in out.iter_mut().enumerate() {
            reading.current = s.currents[i];
            reading.position = s.goals[i];
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct RadioState {
    peers: HashSet<MacAddress>,
    sent: Vec<(MacAddress, Vec<u8>)>,
    fail_sends: bool,
}

/// Mock 无线链路
///
/// 记录所有发出的数据报；只能发给已注册的对端。
#[derive(Debug, Clone)]
pub struct MockRadio {
    own: MacAddress,
    channel: u8,
    state: Arc<Mutex<RadioState>>,
}

impl MockRadio {
    pub fn new(own: MacAddress, channel: u8) -> Self {
        Self {
            own,
            channel,
            state: Arc::new(Mutex::new(RadioState::default())),
        }
    }

    /// 已发送的数据报（快照）
    pub fn sent(&self) -> Vec<(MacAddress, Vec<u8>)> {
        self.state.lock().sent.clone()
    }

    /// 取出并清空已发送的数据报
    pub fn take_sent(&self) -> Vec<(MacAddress, Vec<u8>)> {
        std::mem::take(&mut self.state.lock().sent)
    }

    pub fn is_registered(&self, peer: MacAddress) -> bool {
        self.state.lock().peers.contains(&peer)
    }

    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new(MacAddress([0x24, 0x6F, 0x28, 0xAA, 0xBB, 0xCC]), 1)
    }
}

impl RadioLink for MockRadio {
    fn send(&self, peer: MacAddress, bytes: &[u8]) -> Result<(), RadioError> {
        if bytes.len() > MAX_DATAGRAM_LEN {
            return Err(RadioError::PayloadTooLarge {
                len: bytes.len(),
                max: MAX_DATAGRAM_LEN,
            });
        }
        let mut s = self.state.lock();
        if s.fail_sends {
            return Err(RadioError::SendFailed("injected send failure".into()));
        }
        if !s.peers.contains(&peer) {
            return Err(RadioError::PeerNotRegistered(peer));
        }
        s.sent.push((peer, bytes.to_vec()));
        Ok(())
    }

    fn register_peer(&self, peer: MacAddress) -> Result<(), RadioError> {
        self.state.lock().peers.insert(peer);
        Ok(())
    }

    fn forget_peer(&self, peer: MacAddress) -> Result<(), RadioError> {
        if self.state.lock().peers.remove(&peer) {
            Ok(())
        } else {
            Err(RadioError::PeerNotRegistered(peer))
        }
    }

    fn own_address(&self) -> MacAddress {
        self.own
    }

    fn channel(&self) -> u8 {
        self.channel
    }
}

/// Mock 电量计（`None` 表示读取失败）
#[derive(Debug, Clone)]
pub struct MockFuelGauge {
    level: Arc<Mutex<Option<u8>>>,
}

impl MockFuelGauge {
    pub fn new(percent: u8) -> Self {
        Self {
            level: Arc::new(Mutex::new(Some(percent))),
        }
    }

    pub fn set_percent(&self, percent: u8) {
        *self.level.lock() = Some(percent);
    }

    pub fn set_unavailable(&self) {
        *self.level.lock() = None;
    }
}

impl FuelGauge for MockFuelGauge {
    fn percent(&mut self) -> Result<u8, GaugeError> {
        let level = *self.level.lock();
        level.ok_or(GaugeError::Unavailable)
    }
}

/// Mock 状态灯（保留最近的亮度历史）
#[derive(Debug, Clone, Default)]
pub struct MockLed {
    history: Arc<Mutex<VecDeque<u8>>>,
}

impl MockLed {
    const HISTORY_CAP: usize = 4096;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<u8> {
        self.history.lock().back().copied()
    }

    pub fn history(&self) -> Vec<u8> {
        self.history.lock().iter().copied().collect()
    }
}

impl StatusLed for MockLed {
    fn set_brightness(&mut self, level: u8) {
        let mut h = self.history.lock();
        if h.len() == Self::HISTORY_CAP {
            h.pop_front();
        }
        h.push_back(level);
    }
}
