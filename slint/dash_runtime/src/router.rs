//! Outbound events and the listener capabilities the toolkit layer calls.
//!
//! Every interaction passes the backlight gate first: while the display is
//! dark a gesture only wakes it and never produces an event.

use crate::item::ItemAddress;
use crate::toolkit::DeviceIo;

/// A flat, ordered list of string pairs. `type` always comes first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundEvent {
    pub data: Vec<(String, String)>,
}

impl OutboundEvent {
    pub fn new(kind: &str) -> Self {
        Self {
            data: vec![("type".to_string(), kind.to_string())],
        }
    }

    fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.data.push((key.to_string(), value.to_string()));
        self
    }

    /// An absent `page` or `item` is left out of the event.
    pub fn addressed(kind: &str, page: Option<usize>, item: Option<usize>) -> Self {
        let mut event = Self::new(kind);
        if let Some(page) = page {
            event = event.with("page", page);
        }
        if let Some(item) = item {
            event = event.with("item", item);
        }
        event
    }

    pub fn item(kind: &str, address: ItemAddress) -> Self {
        Self::addressed(kind, Some(address.page), Some(address.item))
    }

    pub fn page(index: usize) -> Self {
        Self::addressed("page", Some(index), None)
    }

    pub fn button(kind: &str, index: usize) -> Self {
        Self::addressed(kind, None, Some(index))
    }

    pub fn more(visible: bool) -> Self {
        Self::new("more").with("visible", if visible { "1" } else { "0" })
    }

    pub fn change(entity_id: &str, feature_id: &str, value: i32) -> Self {
        Self::new("change")
            .with("id", entity_id)
            .with("op", feature_id)
            .with("value", value)
    }

    pub fn feature_data_request(entity_id: &str, feature_id: &str) -> Self {
        Self::new("data_request")
            .with("id", entity_id)
            .with("op", feature_id)
    }

    pub fn kind(&self) -> &str {
        self.get("type").unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Where outbound events go.
pub trait EventSink {
    fn send(&mut self, event: OutboundEvent);
}

impl EventSink for Vec<OutboundEvent> {
    fn send(&mut self, event: OutboundEvent) {
        self.push(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Tap,
    LongPress,
}

/// Gestures on page items.
pub trait ItemEventListener {
    fn on_item_gesture(&mut self, address: ItemAddress, gesture: Gesture);
}

/// Gestures on bar buttons. Returns `true` when the gesture was consumed and
/// the button must not act on it locally.
pub trait ButtonEventListener {
    fn on_button_gesture(&mut self, index: usize, gesture: Gesture) -> bool;
}

/// Chrome around the pages: back, bar toggle, and the detail overlay.
pub trait PageEventListener {
    fn on_back(&mut self);
    fn on_dashboard_toggle(&mut self);
    fn on_overlay_close(&mut self);
    fn on_overlay_change(&mut self, feature: usize, value: i32);
}

/// Chrome input as the toolkit layer reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageInput {
    Back,
    DashboardToggle,
    OverlayClose,
    OverlayChange { feature: usize, value: i32 },
}

impl PageInput {
    pub fn deliver(self, listener: &mut impl PageEventListener) {
        match self {
            PageInput::Back => listener.on_back(),
            PageInput::DashboardToggle => listener.on_dashboard_toggle(),
            PageInput::OverlayClose => listener.on_overlay_close(),
            PageInput::OverlayChange { feature, value } => {
                listener.on_overlay_change(feature, value)
            }
        }
    }
}

/// Maps gestures and model side effects to outbound events.
#[derive(Debug)]
pub struct EventRouter<S: EventSink> {
    sink: S,
}

impl<S: EventSink> EventRouter<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// `true` when the interaction was swallowed to wake the display.
    pub fn backlight_gate(&self, device: &mut impl DeviceIo) -> bool {
        if device.backlight() == Some(false) {
            device.turn_backlight_on();
            return true;
        }
        false
    }

    pub fn item_gesture(&mut self, address: ItemAddress, gesture: Gesture) {
        let kind = match gesture {
            Gesture::Tap => "click",
            Gesture::LongPress => "long_press",
        };
        self.sink.send(OutboundEvent::item(kind, address));
    }

    pub fn button_gesture(&mut self, index: usize, gesture: Gesture) {
        let kind = match gesture {
            Gesture::Tap => "button",
            Gesture::LongPress => "long_button",
        };
        self.sink.send(OutboundEvent::button(kind, index));
    }

    pub fn data_request(&mut self, address: ItemAddress) {
        self.sink.send(OutboundEvent::item("data_request", address));
    }

    pub fn feature_data_request(&mut self, entity_id: &str, feature_id: &str) {
        self.sink
            .send(OutboundEvent::feature_data_request(entity_id, feature_id));
    }

    pub fn page_shown(&mut self, index: usize) {
        self.sink.send(OutboundEvent::page(index));
    }

    pub fn overlay_visibility(&mut self, visible: bool) {
        self.sink.send(OutboundEvent::more(visible));
    }

    pub fn change(&mut self, entity_id: &str, feature_id: &str, value: i32) {
        self.sink
            .send(OutboundEvent::change(entity_id, feature_id, value));
    }
}
