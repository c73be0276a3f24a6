//! 配对与存活状态机
//!
//! 只信任一个对端。配对成功后地址写入持久化存储，重启时自动恢复；
//! 心跳或数据流量刷新存活时间戳，超时后由调用方关闭力矩并调用 [`PairingMachine::unpair`]。
//!
//! 状态机只调用无线链路的注册/注销接口；需要发送的应答作为返回值交给调用方，
//! 在释放锁之后发送。

use crate::state::{AtomicRobotState, RobotState};
use q8_hal::{PeerStore, RadioLink, elapsed_ms};
use q8_protocol::{MacAddress, PairingMessage, SERVER_ID};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

pub struct PairingMachine {
    radio: Arc<dyn RadioLink>,
    store: Box<dyn PeerStore>,
    peer: Option<MacAddress>,
    last_heartbeat_ms: u32,
    state: RobotState,
    mirror: Arc<AtomicRobotState>,
    timeout_ms: u32,
    permanent: bool,
}

impl PairingMachine {
    pub fn new(
        radio: Arc<dyn RadioLink>,
        store: Box<dyn PeerStore>,
        timeout_ms: u32,
        permanent: bool,
    ) -> Self {
        Self {
            radio,
            store,
            peer: None,
            last_heartbeat_ms: 0,
            state: RobotState::Unpaired,
            mirror: Arc::new(AtomicRobotState::new(RobotState::Unpaired)),
            timeout_ms,
            permanent,
        }
    }

    fn set_state(&mut self, state: RobotState) {
        if self.state != state {
            info!("Robot state: {} -> {}", self.state, state);
        }
        self.state = state;
        self.mirror.set(state, Ordering::Release);
    }

    /// 启动时恢复已保存的对端
    pub fn restore(&mut self, now_ms: u32) -> Option<MacAddress> {
        let saved = match self.store.load() {
            Ok(saved) => saved?,
            Err(e) => {
                warn!("Failed to load saved peer: {}", e);
                return None;
            },
        };
        if let Err(e) = self.radio.register_peer(saved) {
            warn!("Failed to register saved peer {}: {}", saved, e);
            return None;
        }
        self.peer = Some(saved);
        self.last_heartbeat_ms = now_ms;
        self.set_state(RobotState::Paired);
        info!("Restored saved peer {}", saved);
        Some(saved)
    }

    /// 处理配对请求
    ///
    /// 未配对时接受请求并返回应答；已配对时忽略（返回 `None`）。
    pub fn handle_pairing(&mut self, sender: MacAddress, now_ms: u32) -> Option<PairingMessage> {
        if self.state.is_paired() {
            debug!("Pairing request from {} ignored: already paired", sender);
            return None;
        }
        if let Err(e) = self.radio.register_peer(sender) {
            warn!("Failed to register peer {}: {}", sender, e);
            return None;
        }
        if let Err(e) = self.store.save(sender) {
            // 配对仍在内存中生效，只是重启后不会恢复
            warn!("Failed to persist peer {}: {}", sender, e);
        }
        self.peer = Some(sender);
        self.last_heartbeat_ms = now_ms;
        self.set_state(RobotState::Paired);
        info!("Paired with {}", sender);

        Some(PairingMessage {
            id: SERVER_ID,
            mac: self.radio.own_address(),
            channel: self.radio.channel(),
        })
    }

    /// 是否为受信对端
    pub fn is_trusted(&self, sender: MacAddress) -> bool {
        self.peer == Some(sender)
    }

    /// 刷新存活时间戳
    pub fn touch(&mut self, now_ms: u32) {
        self.last_heartbeat_ms = now_ms;
    }

    /// 处理心跳：受信对端刷新时间戳并返回 `true`（调用方原样回显）
    pub fn handle_heartbeat(&mut self, sender: MacAddress, now_ms: u32) -> bool {
        if !self.is_trusted(sender) {
            return false;
        }
        self.touch(now_ms);
        true
    }

    /// 心跳是否已超时（永久配对模式下永不超时）
    ///
    /// `now_ms` 早于最近一次心跳时视为未超时。
    pub fn is_expired(&self, now_ms: u32) -> bool {
        if self.permanent || self.peer.is_none() {
            return false;
        }
        self.silence_ms(now_ms) > self.timeout_ms
    }

    /// 距最近一次心跳的毫秒数
    pub fn silence_ms(&self, now_ms: u32) -> u32 {
        elapsed_ms(now_ms, self.last_heartbeat_ms)
    }

    /// Paired → Started（需要执行器就绪）
    pub fn try_start(&mut self, comm_ready: bool) -> bool {
        if self.state == RobotState::Paired && comm_ready {
            self.set_state(RobotState::Started);
            return true;
        }
        false
    }

    /// 解除配对：注销对端、清除存储和内存中的地址
    pub fn unpair(&mut self) {
        if let Some(peer) = self.peer.take() {
            if let Err(e) = self.radio.forget_peer(peer) {
                debug!("Forget peer {}: {}", peer, e);
            }
            info!("Unpaired from {}", peer);
        }
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear saved peer: {}", e);
        }
        self.set_state(RobotState::Unpaired);
    }

    pub fn state(&self) -> RobotState {
        self.state
    }

    pub fn state_handle(&self) -> Arc<AtomicRobotState> {
        Arc::clone(&self.mirror)
    }

    pub fn peer(&self) -> Option<MacAddress> {
        self.peer
    }

    pub fn last_heartbeat_ms(&self) -> u32 {
        self.last_heartbeat_ms
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use q8_hal::MemoryPeerStore;
    use q8_hal::mock::MockRadio;

    const PEER: MacAddress = MacAddress([0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);
    const OTHER: MacAddress = MacAddress([0x99; 6]);

    fn machine(store: MemoryPeerStore, permanent: bool) -> (PairingMachine, MockRadio) {
        let radio = MockRadio::default();
        let m = PairingMachine::new(Arc::new(radio.clone()), Box::new(store), 3000, permanent);
        (m, radio)
    }

    #[test]
    fn test_pairing_request_pairs_once() {
        let (mut m, radio) = machine(MemoryPeerStore::new(), false);

        let ack = m.handle_pairing(PEER, 100).unwrap();
        assert_eq!(ack.id, 0);
        assert_eq!(ack.mac, radio.own_address());
        assert_eq!(ack.channel, radio.channel());
        assert_eq!(m.state(), RobotState::Paired);
        assert_eq!(m.peer(), Some(PEER));
        assert!(radio.is_registered(PEER));

        // 第二次请求不改变状态
        assert!(m.handle_pairing(OTHER, 200).is_none());
        assert_eq!(m.peer(), Some(PEER));
        assert_eq!(m.last_heartbeat_ms(), 100);
        assert!(!radio.is_registered(OTHER));
    }

    #[test]
    fn test_pairing_persists_and_unpair_clears_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("peer.bin");
        let radio = MockRadio::default();
        let mut m = PairingMachine::new(
            Arc::new(radio.clone()),
            Box::new(q8_hal::FilePeerStore::new(&path)),
            3000,
            false,
        );

        m.handle_pairing(PEER, 0);
        assert_eq!(q8_hal::FilePeerStore::new(&path).load().unwrap(), Some(PEER));

        m.unpair();
        assert_eq!(q8_hal::FilePeerStore::new(&path).load().unwrap(), None);
    }

    #[test]
    fn test_restore_saved_peer() {
        let (mut m, radio) = machine(MemoryPeerStore::with_peer(PEER), false);
        assert_eq!(m.restore(50), Some(PEER));
        assert_eq!(m.state(), RobotState::Paired);
        assert!(radio.is_registered(PEER));
        assert_eq!(m.state_handle().get(Ordering::Acquire), RobotState::Paired);
    }

    #[test]
    fn test_restore_without_saved_peer() {
        let (mut m, _radio) = machine(MemoryPeerStore::new(), false);
        assert_eq!(m.restore(50), None);
        assert_eq!(m.state(), RobotState::Unpaired);
    }

    #[test]
    fn test_heartbeat_only_from_trusted_peer() {
        let (mut m, _radio) = machine(MemoryPeerStore::new(), false);
        m.handle_pairing(PEER, 0);
        assert!(!m.handle_heartbeat(OTHER, 500));
        assert_eq!(m.last_heartbeat_ms(), 0);
        assert!(m.handle_heartbeat(PEER, 500));
        assert_eq!(m.last_heartbeat_ms(), 500);
    }

    #[test]
    fn test_expiry_boundary() {
        let (mut m, _radio) = machine(MemoryPeerStore::new(), false);
        let t0 = 10_000;
        m.handle_pairing(PEER, t0);
        assert!(!m.is_expired(t0 + 3000 - 1));
        assert!(!m.is_expired(t0 + 3000));
        assert!(m.is_expired(t0 + 3000 + 1));
    }

    #[test]
    fn test_expiry_across_wraparound() {
        let (mut m, _radio) = machine(MemoryPeerStore::new(), false);
        let t0 = u32::MAX - 1000;
        m.handle_pairing(PEER, t0);
        assert!(!m.is_expired(t0.wrapping_add(2999)));
        assert!(m.is_expired(t0.wrapping_add(3001)));
    }

    #[test]
    fn test_stale_reading_before_newer_heartbeat_not_expired() {
        let (mut m, _radio) = machine(MemoryPeerStore::new(), false);
        m.handle_pairing(PEER, 4000);
        let stale_now = 5000;
        assert!(m.handle_heartbeat(PEER, 5001));
        assert_eq!(m.silence_ms(stale_now), 0);
        assert!(!m.is_expired(stale_now));
        assert!(!m.is_expired(5001 + 3000));
        assert!(m.is_expired(5001 + 3001));
    }

    #[test]
    fn test_permanent_pairing_never_expires() {
        let (mut m, _radio) = machine(MemoryPeerStore::new(), true);
        m.handle_pairing(PEER, 0);
        assert!(!m.is_expired(1_000_000));
    }

    #[test]
    fn test_try_start_requires_paired_and_ready() {
        let (mut m, _radio) = machine(MemoryPeerStore::new(), false);
        assert!(!m.try_start(true));
        m.handle_pairing(PEER, 0);
        assert!(!m.try_start(false));
        assert!(m.try_start(true));
        assert_eq!(m.state(), RobotState::Started);
        // Started 状态下不再转换
        assert!(!m.try_start(true));
    }

    #[test]
    fn test_unpair_clears_everything() {
        let store = MemoryPeerStore::new();
        let (mut m, radio) = machine(store, false);
        m.handle_pairing(PEER, 0);
        m.try_start(true);

        m.unpair();
        assert_eq!(m.state(), RobotState::Unpaired);
        assert_eq!(m.peer(), None);
        assert!(!radio.is_registered(PEER));
        assert!(!m.is_expired(100_000));
        // 可以重新配对
        assert!(m.handle_pairing(OTHER, 0).is_some());
    }
}
