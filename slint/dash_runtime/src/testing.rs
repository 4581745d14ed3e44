//! Recording fakes for the toolkit and device seams.

use std::collections::HashMap;

use crate::buttons::ButtonView;
use crate::glyph::FontSet;
use crate::item::{ImageHeader, ItemAddress, ItemContent, ItemKind};
use crate::overlay::OverlayView;
use crate::theme::ThemeParameters;
use crate::toolkit::{DeviceIo, GridSpan, NodeHandle, Toolkit};

#[derive(Debug, Default)]
pub struct RecordingToolkit {
    next_node: u64,
    pub pages: HashMap<NodeHandle, (usize, u16, u16)>,
    pub items: HashMap<NodeHandle, (ItemAddress, ItemKind, GridSpan)>,
    pub visible: HashMap<NodeHandle, bool>,
    pub destroyed: Vec<NodeHandle>,
    pub rendered: HashMap<NodeHandle, ItemContent>,
    pub images: HashMap<NodeHandle, (ImageHeader, Vec<u8>)>,
    pub themes: Vec<ThemeParameters>,
    pub buttons: HashMap<usize, ButtonView>,
    pub bar_expanded: Vec<bool>,
    pub overlay: Option<OverlayView>,
    pub overlay_images: Vec<(usize, ImageHeader, Vec<u8>)>,
    pub overlay_hidden: usize,
}

impl RecordingToolkit {
    fn allocate(&mut self) -> NodeHandle {
        self.next_node += 1;
        NodeHandle(self.next_node)
    }

    /// A bare page root for item tests.
    pub fn create_page_node(&mut self) -> NodeHandle {
        self.create_page(0, 1, 1)
    }
}

impl Toolkit for RecordingToolkit {
    fn create_page(&mut self, index: usize, cols: u16, rows: u16) -> NodeHandle {
        let node = self.allocate();
        self.pages.insert(node, (index, cols, rows));
        self.visible.insert(node, false);
        node
    }

    fn create_item(
        &mut self,
        _page: NodeHandle,
        address: ItemAddress,
        kind: ItemKind,
        span: GridSpan,
    ) -> NodeHandle {
        let node = self.allocate();
        self.items.insert(node, (address, kind, span));
        node
    }

    fn destroy(&mut self, node: NodeHandle) {
        self.pages.remove(&node);
        self.items.remove(&node);
        self.rendered.remove(&node);
        self.images.remove(&node);
        self.destroyed.push(node);
    }

    fn set_visible(&mut self, node: NodeHandle, visible: bool) {
        self.visible.insert(node, visible);
    }

    fn render_item(&mut self, node: NodeHandle, content: &ItemContent, _fonts: &FontSet) {
        self.rendered.insert(node, content.clone());
    }

    fn set_item_image(&mut self, node: NodeHandle, header: ImageHeader, pixels: &[u8]) {
        self.images.insert(node, (header, pixels.to_vec()));
    }

    fn apply_theme(&mut self, theme: &ThemeParameters) {
        self.themes.push(theme.clone());
    }

    fn render_button(&mut self, index: usize, button: &ButtonView, _fonts: &FontSet) {
        self.buttons.insert(index, button.clone());
    }

    fn set_button_bar_expanded(&mut self, expanded: bool) {
        self.bar_expanded.push(expanded);
    }

    fn show_overlay(&mut self, overlay: &OverlayView) {
        self.overlay = Some(overlay.clone());
    }

    fn set_overlay_image(&mut self, feature: usize, header: ImageHeader, pixels: &[u8]) {
        self.overlay_images.push((feature, header, pixels.to_vec()));
    }

    fn hide_overlay(&mut self) {
        self.overlay = None;
        self.overlay_hidden += 1;
    }
}

#[derive(Debug, Default)]
pub struct FakeDevice {
    pub backlight: Option<bool>,
    pub switches: Vec<bool>,
    pub tones: Vec<String>,
}

impl FakeDevice {
    pub fn with_backlight(on: bool) -> Self {
        Self {
            backlight: Some(on),
            ..Self::default()
        }
    }

    pub fn with_switches(mut self, count: usize) -> Self {
        self.switches = vec![false; count];
        self
    }
}

impl DeviceIo for FakeDevice {
    fn backlight(&self) -> Option<bool> {
        self.backlight
    }

    fn turn_backlight_on(&mut self) {
        if self.backlight.is_some() {
            self.backlight = Some(true);
        }
    }

    fn switch_state(&self, index: usize) -> bool {
        self.switches.get(index).copied().unwrap_or(false)
    }

    fn toggle_switch(&mut self, index: usize) {
        if let Some(state) = self.switches.get_mut(index) {
            *state = !*state;
        }
    }

    fn play_tone(&mut self, song: &str) {
        self.tones.push(song.to_string());
    }
}
