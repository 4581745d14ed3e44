//! Engine settings read from the process environment.

use std::time::Duration;

pub const DEFAULT_SERVICE: &str = "dashpanel.event";
pub const DEFAULT_OUTBOUND_QUEUE_CAP: usize = 256;
pub const DEFAULT_BUTTON_BAR_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_ARENA_BYTES: usize = 1 << 20;
pub const DEFAULT_MEMORY_BUDGET_BYTES: usize = 4 << 20;
pub const DEFAULT_TICK_MS: u64 = 20;

/// Initial state of the display power signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacklightMode {
    On,
    Off,
    /// No signal configured; interactions are never gated.
    Absent,
}

impl BacklightMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            "none" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn initial_signal(self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            Self::Absent => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub service: String,
    pub outbound_queue_cap: usize,
    pub buttons: usize,
    pub button_bar_timeout: Duration,
    pub max_arena_bytes: usize,
    pub memory_budget_bytes: usize,
    pub tick: Duration,
    pub backlight: BacklightMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            outbound_queue_cap: DEFAULT_OUTBOUND_QUEUE_CAP,
            buttons: 0,
            button_bar_timeout: Duration::from_secs(DEFAULT_BUTTON_BAR_TIMEOUT_SECS),
            max_arena_bytes: DEFAULT_MAX_ARENA_BYTES,
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            tick: Duration::from_millis(DEFAULT_TICK_MS),
            backlight: BacklightMode::On,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unset or unparsable values fall back
    /// to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let positive = |name: &str| {
            lookup(name)
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .filter(|value| *value > 0)
        };
        let unsigned = |name: &str| lookup(name).and_then(|raw| raw.trim().parse::<u64>().ok());

        Self {
            service: lookup("DASHPANEL_SERVICE")
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
                .unwrap_or(defaults.service),
            outbound_queue_cap: positive("DASHPANEL_OUTBOUND_QUEUE_CAP")
                .unwrap_or(defaults.outbound_queue_cap),
            buttons: lookup("DASHPANEL_BUTTONS")
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .unwrap_or(defaults.buttons),
            button_bar_timeout: unsigned("DASHPANEL_BUTTON_BAR_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.button_bar_timeout),
            max_arena_bytes: positive("DASHPANEL_MAX_ARENA_BYTES")
                .unwrap_or(defaults.max_arena_bytes),
            memory_budget_bytes: positive("DASHPANEL_MEMORY_BUDGET_BYTES")
                .unwrap_or(defaults.memory_budget_bytes),
            tick: unsigned("DASHPANEL_TICK_MS")
                .filter(|value| *value > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick),
            backlight: lookup("DASHPANEL_BACKLIGHT")
                .and_then(|raw| BacklightMode::parse(&raw))
                .unwrap_or(defaults.backlight),
        }
    }
}
