//! A desktop stand-in for the panel's switches, backlight and buzzer.

use dashpanel_runtime::{DeviceIo, EngineConfig};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct SimulatedDevice {
    backlight: Option<bool>,
    switches: Vec<bool>,
}

impl SimulatedDevice {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            backlight: config.backlight.initial_signal(),
            switches: vec![false; config.buttons],
        }
    }
}

impl DeviceIo for SimulatedDevice {
    fn backlight(&self) -> Option<bool> {
        self.backlight
    }

    fn turn_backlight_on(&mut self) {
        if self.backlight == Some(false) {
            info!("backlight on");
            self.backlight = Some(true);
        }
    }

    fn switch_state(&self, index: usize) -> bool {
        self.switches.get(index).copied().unwrap_or(false)
    }

    fn toggle_switch(&mut self, index: usize) {
        if let Some(state) = self.switches.get_mut(index) {
            *state = !*state;
            debug!(index, on = *state, "switch toggled");
        }
    }

    fn play_tone(&mut self, song: &str) {
        info!(song, "buzzer");
    }
}
