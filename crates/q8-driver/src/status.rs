//! 状态指示灯
//!
//! | 状态 | 图案 |
//! |------|------|
//! | Unpaired | 每 2 秒亮 200ms |
//! | Paired | 每 2 秒快速闪两下 |
//! | Started | 10 秒周期呼吸 |
//!
//! 状态切换时图案从头开始。

use crate::state::RobotState;
use q8_hal::StatusLed;
use std::f32::consts::PI;

const BLINK_PERIOD_MS: u32 = 2000;
const BLINK_ON_MS: u32 = 200;
const DOUBLE_BLINK_ON_MS: u32 = 100;
const BREATH_PERIOD_MS: u32 = 10_000;

/// 图案在 `elapsed_ms` 时刻的亮度
pub fn pattern_brightness(state: RobotState, elapsed_ms: u32) -> u8 {
    match state {
        RobotState::Unpaired => {
            if elapsed_ms % BLINK_PERIOD_MS < BLINK_ON_MS {
                u8::MAX
            } else {
                0
            }
        },
        RobotState::Paired => {
            let t = elapsed_ms % BLINK_PERIOD_MS;
            let on = t < DOUBLE_BLINK_ON_MS
                || (2 * DOUBLE_BLINK_ON_MS..3 * DOUBLE_BLINK_ON_MS).contains(&t);
            if on { u8::MAX } else { 0 }
        },
        RobotState::Started => {
            let phase = (elapsed_ms % BREATH_PERIOD_MS) as f32 / BREATH_PERIOD_MS as f32;
            let level = (1.0 - (2.0 * PI * phase).cos()) / 2.0;
            (level * f32::from(u8::MAX)).round() as u8
        },
    }
}

/// 状态灯驱动
pub struct StatusIndicator {
    led: Box<dyn StatusLed>,
    shown: Option<RobotState>,
    pattern_start_ms: u32,
    last_level: Option<u8>,
}

impl StatusIndicator {
    pub fn new(led: Box<dyn StatusLed>) -> Self {
        Self {
            led,
            shown: None,
            pattern_start_ms: 0,
            last_level: None,
        }
    }

    /// 按当前状态刷新亮度（亮度不变时不写 LED）
    pub fn tick(&mut self, state: RobotState, now_ms: u32) {
        if self.shown != Some(state) {
            self.shown = Some(state);
            self.pattern_start_ms = now_ms;
        }
        let level = pattern_brightness(state, now_ms.wrapping_sub(self.pattern_start_ms));
        if self.last_level != Some(level) {
            self.led.set_brightness(level);
            self.last_level = Some(level);
        }
    }
}

/// 无指示灯
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLed;

impl StatusLed for NoLed {
    fn set_brightness(&mut self, _level: u8) {}
}
