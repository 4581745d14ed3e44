//! The button bar: one entry per device switch, plus its collapse timer.

use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::error::GlyphError;
use crate::glyph::{FontSet, IconRef};

/// What the toolkit draws for one bar button.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonView {
    pub left: Option<IconRef>,
    pub right: Option<IconRef>,
    pub switch_on: bool,
}

#[derive(Debug, Default)]
struct ButtonSlot {
    view: ButtonView,
    sound: Option<String>,
}

#[derive(Debug)]
pub struct ButtonBar {
    buttons: Vec<ButtonSlot>,
    expanded: bool,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl ButtonBar {
    /// `timeout` of zero disables the automatic re-expand.
    pub fn new(count: usize, timeout: Duration) -> Self {
        Self {
            buttons: (0..count).map(|_| ButtonSlot::default()).collect(),
            expanded: false,
            timeout: Some(timeout).filter(|timeout| !timeout.is_zero()),
            deadline: None,
        }
    }

    pub fn len(&self) -> usize {
        self.buttons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn has_timeout(&self) -> bool {
        self.timeout.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn view(&self, index: usize) -> Option<&ButtonView> {
        self.buttons.get(index).map(|slot| &slot.view)
    }

    pub fn sound(&self, index: usize) -> Option<&str> {
        self.buttons.get(index)?.sound.as_deref()
    }

    /// Apply `{left?: {icon}, right?: {icon}, sound?}`. A missing side hides
    /// it. Returns `false` when there is no such button.
    pub fn set_button(
        &mut self,
        index: usize,
        doc: &Value,
        fonts: &mut FontSet,
    ) -> Result<bool, GlyphError> {
        if index >= self.buttons.len() {
            debug!(index, buttons = self.buttons.len(), "no such button");
            return Ok(false);
        }

        let left = side_icon(doc, "left", fonts)?;
        let right = side_icon(doc, "right", fonts)?;
        let slot = &mut self.buttons[index];
        slot.view.left = left;
        slot.view.right = right;
        slot.sound = doc
            .get("sound")
            .and_then(Value::as_str)
            .filter(|song| !song.is_empty())
            .map(str::to_string);
        Ok(true)
    }

    /// Returns `true` when the indicator changed.
    pub fn set_switch_state(&mut self, index: usize, on: bool) -> bool {
        match self.buttons.get_mut(index) {
            Some(slot) if slot.view.switch_on != on => {
                slot.view.switch_on = on;
                true
            }
            _ => false,
        }
    }

    /// Expand or collapse. Any pending re-expand is cancelled first, and a
    /// collapse arms a new one. Returns the state to draw, or `None` when the
    /// bar has no buttons.
    pub fn show(&mut self, visible: bool, now: Instant) -> Option<bool> {
        self.deadline = None;
        if self.buttons.is_empty() {
            self.expanded = false;
            return None;
        }

        self.expanded = visible;
        if !visible {
            self.deadline = self.timeout.map(|timeout| now + timeout);
        }
        Some(visible)
    }

    /// Fire the re-expand deadline if it has passed. The bar stays collapsed
    /// while the detail overlay is open.
    pub fn tick(&mut self, now: Instant, overlay_open: bool) -> Option<bool> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        if overlay_open {
            return None;
        }
        self.show(true, now)
    }
}

fn side_icon(doc: &Value, side: &str, fonts: &mut FontSet) -> Result<Option<IconRef>, GlyphError> {
    match doc.get(side).and_then(|side| side.get("icon")) {
        Some(icon) if icon.is_object() => fonts.set_icon(icon).map(Some),
        _ => Ok(None),
    }
}
