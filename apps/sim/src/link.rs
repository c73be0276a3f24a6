//! 模拟无线空口
//!
//! 两端都是 [`MockRadio`]，只记录发出的数据报。空口线程周期性取走两端发出的
//! 数据报：控制器 → 机器人的送入接收队列，机器人 → 控制器的送入主机收件箱。

use crossbeam_channel::{Sender, TrySendError};
use q8_sdk::MacAddress;
use q8_sdk::driver::Intake;
use q8_sdk::hal::RadioLink;
use q8_sdk::hal::mock::MockRadio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

const POLL: Duration = Duration::from_millis(2);

pub struct AirLink {
    pub robot_radio: MockRadio,
    pub host_radio: MockRadio,
    pub intake: Intake,
    pub to_host: Sender<Vec<u8>>,
}

impl AirLink {
    pub fn spawn(self, running: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("sim-air".to_string())
            .spawn(move || self.run(running))
    }

    fn run(self, running: Arc<AtomicBool>) {
        let host = self.host_radio.own_address();
        while running.load(Ordering::Acquire) {
            for (_, bytes) in self.host_radio.take_sent() {
                if let Err(e) = self.intake.push(host, &bytes) {
                    debug!("Robot intake rejected datagram: {}", e);
                }
            }
            for (peer, bytes) in self.robot_radio.take_sent() {
                if peer != host {
                    trace!("Datagram to unknown peer {} lost", peer);
                    continue;
                }
                match self.to_host.try_send(bytes) {
                    Ok(()) => {},
                    Err(TrySendError::Full(_)) => debug!("Host inbox full, reply lost"),
                    Err(TrySendError::Disconnected(_)) => return,
                }
            }
            thread::sleep(POLL);
        }
        trace!("Air link exiting");
    }
}
