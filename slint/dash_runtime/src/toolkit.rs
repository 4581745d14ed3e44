//! Seams to the widget toolkit and the device.
//!
//! The engine never holds toolkit objects, only [`NodeHandle`]s the toolkit
//! hands out. Gestures travel the other way through the listener traits in
//! [`crate::router`].

use crate::buttons::ButtonView;
use crate::glyph::FontSet;
use crate::item::{ImageHeader, ItemAddress, ItemContent, ItemKind};
use crate::overlay::OverlayView;
use crate::theme::ThemeParameters;

/// Opaque reference to a toolkit subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub u64);

/// Grid cell an item occupies on its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpan {
    pub col: u16,
    pub row: u16,
    pub cols: u16,
    pub rows: u16,
}

pub trait Toolkit {
    /// Pages start hidden.
    fn create_page(&mut self, index: usize, cols: u16, rows: u16) -> NodeHandle;

    fn create_item(
        &mut self,
        page: NodeHandle,
        address: ItemAddress,
        kind: ItemKind,
        span: GridSpan,
    ) -> NodeHandle;

    /// Tear down `node` and everything below it.
    fn destroy(&mut self, node: NodeHandle);

    fn set_visible(&mut self, node: NodeHandle, visible: bool);

    fn render_item(&mut self, node: NodeHandle, content: &ItemContent, fonts: &FontSet);

    /// RGB565 pixels, big-endian per pixel.
    fn set_item_image(&mut self, node: NodeHandle, header: ImageHeader, pixels: &[u8]);

    fn apply_theme(&mut self, theme: &ThemeParameters);

    fn render_button(&mut self, index: usize, button: &ButtonView, fonts: &FontSet);

    fn set_button_bar_expanded(&mut self, expanded: bool);

    fn show_overlay(&mut self, overlay: &OverlayView);

    fn set_overlay_image(&mut self, feature: usize, header: ImageHeader, pixels: &[u8]);

    fn hide_overlay(&mut self);
}

/// Device collaborators: display power, switches and the buzzer.
pub trait DeviceIo {
    /// `None` when no backlight signal is configured.
    fn backlight(&self) -> Option<bool> {
        None
    }

    fn turn_backlight_on(&mut self) {}

    fn switch_state(&self, index: usize) -> bool;

    fn toggle_switch(&mut self, index: usize);

    fn play_tone(&mut self, song: &str);
}
