//! [`Toolkit`] over the Slint window.
//!
//! Nodes live in a slot map; the window only ever shows the items of the
//! visible page, rebuilt into one flat model whenever something changes.

use std::rc::Rc;

use dashpanel_runtime::buttons::ButtonView;
use dashpanel_runtime::glyph::{FontSet, IconRef};
use dashpanel_runtime::item::{
    CellGrid, ImageHeader, ItemAddress, ItemContent, ItemKind,
};
use dashpanel_runtime::overlay::{FeatureControl, OverlayView};
use dashpanel_runtime::theme::{Color, ThemeParameters};
use dashpanel_runtime::toolkit::GridSpan;
use dashpanel_runtime::{NodeHandle, Toolkit};
use slint::{
    ComponentHandle, Image, Model, ModelRc, Rgba8Pixel, SharedPixelBuffer, SharedString, VecModel,
};
use slotmap::{Key, KeyData, SlotMap, new_key_type};
use tracing::{debug, warn};

use crate::{AppWindow, BarButton, CellView, FeatureView, ItemView, Palette};

new_key_type! {
    struct NodeKey;
}

impl From<NodeKey> for NodeHandle {
    fn from(key: NodeKey) -> Self {
        NodeHandle(key.data().as_ffi())
    }
}

impl From<NodeHandle> for NodeKey {
    fn from(handle: NodeHandle) -> Self {
        NodeKey::from(KeyData::from_ffi(handle.0))
    }
}

struct PageNode {
    index: usize,
    cols: u16,
    rows: u16,
    visible: bool,
    items: Vec<NodeKey>,
}

struct ItemNode {
    page: NodeKey,
    shown: bool,
    view: ItemView,
}

enum Node {
    Page(PageNode),
    Item(ItemNode),
}

pub struct SlintToolkit {
    ui: slint::Weak<AppWindow>,
    nodes: SlotMap<NodeKey, Node>,
    items: Rc<VecModel<ItemView>>,
    buttons: Rc<VecModel<BarButton>>,
    features: Rc<VecModel<FeatureView>>,
}

impl SlintToolkit {
    pub fn new(ui: &AppWindow) -> Self {
        let items = Rc::new(VecModel::default());
        let buttons = Rc::new(VecModel::default());
        let features = Rc::new(VecModel::default());
        ui.set_items(ModelRc::from(Rc::clone(&items)));
        ui.set_buttons(ModelRc::from(Rc::clone(&buttons)));
        ui.set_features(ModelRc::from(Rc::clone(&features)));

        Self {
            ui: ui.as_weak(),
            nodes: SlotMap::with_key(),
            items,
            buttons,
            features,
        }
    }

    fn item_mut(&mut self, node: NodeHandle) -> Option<&mut ItemNode> {
        match self.nodes.get_mut(NodeKey::from(node)) {
            Some(Node::Item(item)) => Some(item),
            _ => {
                debug!(?node, "not an item node");
                None
            }
        }
    }

    /// Push the visible page into the window.
    fn refresh(&mut self) {
        let Some(ui) = self.ui.upgrade() else {
            return;
        };

        let visible = self.nodes.values().find_map(|node| match node {
            Node::Page(page) if page.visible => Some(page),
            _ => None,
        });
        let Some(page) = visible else {
            self.items.set_vec(Vec::new());
            return;
        };

        let views: Vec<ItemView> = page
            .items
            .iter()
            .filter_map(|key| match self.nodes.get(*key) {
                Some(Node::Item(item)) if item.shown => Some(item.view.clone()),
                _ => None,
            })
            .collect();

        ui.set_page_cols(i32::from(page.cols.max(1)));
        ui.set_page_rows(i32::from(page.rows.max(1)));
        ui.set_can_go_back(page.index != 0);
        self.items.set_vec(views);
    }
}

impl Toolkit for SlintToolkit {
    fn create_page(&mut self, index: usize, cols: u16, rows: u16) -> NodeHandle {
        self.nodes
            .insert(Node::Page(PageNode {
                index,
                cols,
                rows,
                visible: false,
                items: Vec::new(),
            }))
            .into()
    }

    fn create_item(
        &mut self,
        page: NodeHandle,
        address: ItemAddress,
        kind: ItemKind,
        span: GridSpan,
    ) -> NodeHandle {
        let page_key = NodeKey::from(page);
        let view = ItemView {
            page: index_to_int(address.page),
            item: index_to_int(address.item),
            col: i32::from(span.col),
            row: i32::from(span.row),
            cols: i32::from(span.cols.max(1)),
            rows: i32::from(span.rows.max(1)),
            interactive: kind.is_interactive(),
            ..ItemView::default()
        };
        let key = self.nodes.insert(Node::Item(ItemNode {
            page: page_key,
            shown: true,
            view,
        }));

        match self.nodes.get_mut(page_key) {
            Some(Node::Page(page)) => page.items.push(key),
            _ => warn!(?page, "item created under a missing page"),
        }
        key.into()
    }

    fn destroy(&mut self, node: NodeHandle) {
        let key = NodeKey::from(node);
        match self.nodes.remove(key) {
            Some(Node::Page(page)) => {
                for item in page.items {
                    self.nodes.remove(item);
                }
            }
            Some(Node::Item(item)) => {
                if let Some(Node::Page(page)) = self.nodes.get_mut(item.page) {
                    page.items.retain(|child| *child != key);
                }
            }
            None => return,
        }
        self.refresh();
    }

    fn set_visible(&mut self, node: NodeHandle, visible: bool) {
        match self.nodes.get_mut(NodeKey::from(node)) {
            Some(Node::Page(page)) => page.visible = visible,
            Some(Node::Item(item)) => item.shown = visible,
            None => return,
        }
        self.refresh();
    }

    fn render_item(&mut self, node: NodeHandle, content: &ItemContent, fonts: &FontSet) {
        let Some(item) = self.item_mut(node) else {
            return;
        };

        let view = &mut item.view;
        view.icon = icon_image(fonts, content.icon);
        view.symbol = SharedString::from(content.symbol.as_str());
        view.label = SharedString::from(content.label.as_str());
        view.value = SharedString::from(content.value.as_str());
        view.unit = SharedString::from(content.unit.as_str());
        view.background = to_slint_color(content.background);
        view.foreground = to_slint_color(content.foreground);
        if !content.image_ready {
            view.picture = Image::default();
            view.has_picture = false;
        }
        match &content.grid {
            Some(grid) => {
                view.has_grid = true;
                view.cells = ModelRc::new(VecModel::from(cell_views(grid, fonts)));
            }
            None => {
                view.has_grid = false;
                view.cells = ModelRc::default();
            }
        }
        self.refresh();
    }

    fn set_item_image(&mut self, node: NodeHandle, header: ImageHeader, pixels: &[u8]) {
        let Some(item) = self.item_mut(node) else {
            return;
        };
        item.view.picture = Image::from_rgba8(rgb565_to_rgba(header, pixels));
        item.view.has_picture = true;
        self.refresh();
    }

    fn apply_theme(&mut self, theme: &ThemeParameters) {
        let Some(ui) = self.ui.upgrade() else {
            return;
        };
        let palette = ui.global::<Palette>();
        palette.set_bg(to_slint_color(theme.bg_color));
        palette.set_text(to_slint_color(theme.text_color));
        palette.set_text_on(to_slint_color(theme.text_on_color));
        palette.set_panel_bg(to_slint_color(theme.panel_bg_color));
        palette.set_btn_bg(to_slint_color(theme.btn_bg_color));
        palette.set_btn_pressed(to_slint_color(theme.btn_pressed_color));
        palette.set_btn_on(to_slint_color(theme.btn_on_color));
        palette.set_switch_line(to_slint_color(theme.switch_line_color));
        palette.set_switch_pressed_line(to_slint_color(theme.switch_pressed_line_color));
        palette.set_switch_on_line(to_slint_color(theme.switch_on_line_color));
        palette.set_padding(theme.padding as f32);
        palette.set_radius(theme.border_radius as f32);
        palette.set_press_translate_y(theme.press_translate_y as f32);
        palette.set_line_height(theme.btn_line_height as f32);
        palette.set_line_radius(theme.btn_line_radius as f32);
        palette.set_bar_height(theme.bar_height as f32);
    }

    fn render_button(&mut self, index: usize, button: &ButtonView, fonts: &FontSet) {
        while self.buttons.row_count() <= index {
            self.buttons.push(BarButton::default());
        }
        self.buttons.set_row_data(
            index,
            BarButton {
                left: icon_image(fonts, button.left),
                right: icon_image(fonts, button.right),
                switch_on: button.switch_on,
            },
        );
    }

    fn set_button_bar_expanded(&mut self, expanded: bool) {
        if let Some(ui) = self.ui.upgrade() {
            ui.set_bar_expanded(expanded);
        }
    }

    fn show_overlay(&mut self, overlay: &OverlayView) {
        let Some(ui) = self.ui.upgrade() else {
            return;
        };
        let features = overlay
            .features
            .iter()
            .map(|feature| {
                let mut view = FeatureView {
                    id: SharedString::from(feature.id.as_str()),
                    ..FeatureView::default()
                };
                match feature.control {
                    FeatureControl::Slider { min, max, value } => {
                        view.kind = "slider".into();
                        view.minimum = min;
                        view.maximum = max;
                        view.value = value;
                    }
                    FeatureControl::Toggle { on } => {
                        view.kind = "toggle".into();
                        view.on = on;
                    }
                    FeatureControl::Image(_) => view.kind = "image".into(),
                }
                view
            })
            .collect::<Vec<_>>();

        self.features.set_vec(features);
        ui.set_overlay_title(SharedString::from(overlay.title.as_str()));
        ui.set_overlay_visible(true);
    }

    fn set_overlay_image(&mut self, feature: usize, header: ImageHeader, pixels: &[u8]) {
        let Some(mut view) = self.features.row_data(feature) else {
            debug!(feature, "image for a missing overlay feature");
            return;
        };
        view.picture = Image::from_rgba8(rgb565_to_rgba(header, pixels));
        self.features.set_row_data(feature, view);
    }

    fn hide_overlay(&mut self) {
        self.features.set_vec(Vec::new());
        if let Some(ui) = self.ui.upgrade() {
            ui.set_overlay_visible(false);
        }
    }
}

fn index_to_int(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

fn to_slint_color(color: Color) -> slint::Color {
    slint::Color::from_rgb_u8(color.red(), color.green(), color.blue())
}

fn icon_image(fonts: &FontSet, icon: Option<IconRef>) -> Image {
    let Some(icon) = icon else {
        return Image::default();
    };
    let (Some(dsc), Some(bitmap)) = (fonts.glyph_dsc(icon), fonts.glyph_bitmap(icon)) else {
        return Image::default();
    };
    match glyph_to_rgba(u32::from(dsc.box_w), u32::from(dsc.box_h), bitmap) {
        Some(buffer) => Image::from_rgba8(buffer),
        None => Image::default(),
    }
}

/// Expand a 1bpp glyph into white-on-transparent pixels. Rows are not
/// padded: bit `n` of the bitmap is pixel `n`, most significant bit first.
fn glyph_to_rgba(width: u32, height: u32, bitmap: &[u8]) -> Option<SharedPixelBuffer<Rgba8Pixel>> {
    if width == 0 || height == 0 {
        return None;
    }
    let mut buffer = SharedPixelBuffer::<Rgba8Pixel>::new(width, height);
    for (bit, pixel) in buffer.make_mut_slice().iter_mut().enumerate() {
        let lit = bitmap
            .get(bit / 8)
            .is_some_and(|byte| byte & (0x80 >> (bit % 8)) != 0);
        *pixel = Rgba8Pixel {
            r: 0xFF,
            g: 0xFF,
            b: 0xFF,
            a: if lit { 0xFF } else { 0 },
        };
    }
    Some(buffer)
}

/// Big-endian RGB565 to opaque RGBA. Missing trailing bytes stay black.
fn rgb565_to_rgba(header: ImageHeader, pixels: &[u8]) -> SharedPixelBuffer<Rgba8Pixel> {
    let mut buffer =
        SharedPixelBuffer::<Rgba8Pixel>::new(u32::from(header.width), u32::from(header.height));
    for (out, raw) in buffer
        .make_mut_slice()
        .iter_mut()
        .zip(pixels.chunks_exact(ImageHeader::BYTES_PER_PIXEL))
    {
        let value = u16::from_be_bytes([raw[0], raw[1]]);
        let red = ((value >> 11) & 0x1F) as u8;
        let green = ((value >> 5) & 0x3F) as u8;
        let blue = (value & 0x1F) as u8;
        *out = Rgba8Pixel {
            r: (red << 3) | (red >> 2),
            g: (green << 2) | (green >> 4),
            b: (blue << 3) | (blue >> 2),
            a: 0xFF,
        };
    }
    buffer
}

/// Start and length of tracks `[start, start + span)` as fractions of the
/// whole grid. Tracks past the end count as one fraction each.
fn track_fraction(tracks: &[u16], start: u16, span: u16) -> (f32, f32) {
    let weight = |index: usize| f32::from(tracks.get(index).copied().unwrap_or(1));
    let end = usize::from(start) + usize::from(span);
    let total: f32 = (0..tracks.len().max(end)).map(weight).sum();
    if total <= 0.0 {
        return (0.0, 0.0);
    }
    let before: f32 = (0..usize::from(start)).map(weight).sum();
    let within: f32 = (usize::from(start)..end).map(weight).sum();
    (before / total, within / total)
}

fn cell_views(grid: &CellGrid, fonts: &FontSet) -> Vec<CellView> {
    grid.cells
        .iter()
        .map(|cell| {
            let (x, width) = track_fraction(&grid.columns, cell.col, cell.cols);
            let (y, height) = track_fraction(&grid.rows, cell.row, cell.rows);
            CellView {
                x,
                y,
                width,
                height,
                icon: icon_image(fonts, cell.icon),
                label: SharedString::from(cell.label.as_str()),
                foreground: to_slint_color(cell.foreground),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha(buffer: &SharedPixelBuffer<Rgba8Pixel>) -> Vec<u8> {
        buffer.as_slice().iter().map(|pixel| pixel.a).collect()
    }

    #[test]
    fn glyph_bits_run_across_rows() {
        // 3x2 box: bits 1 0 1 / 0 1 1 packed as 0b1010_1100.
        let buffer = glyph_to_rgba(3, 2, &[0b1010_1100]).expect("non-empty box");
        assert_eq!(alpha(&buffer), vec![0xFF, 0, 0xFF, 0, 0xFF, 0xFF]);
        assert!(buffer.as_slice().iter().all(|pixel| pixel.r == 0xFF));
    }

    #[test]
    fn short_glyph_bitmap_leaves_the_rest_clear() {
        let buffer = glyph_to_rgba(8, 2, &[0xFF]).expect("non-empty box");
        assert_eq!(alpha(&buffer)[..8], [0xFF; 8]);
        assert_eq!(alpha(&buffer)[8..], [0; 8]);
        assert!(glyph_to_rgba(0, 4, &[0xFF]).is_none());
    }

    #[test]
    fn rgb565_expands_to_full_range() {
        let header = ImageHeader {
            width: 3,
            height: 1,
        };
        let buffer = rgb565_to_rgba(header, &[0xF8, 0x00, 0x07, 0xE0, 0x00, 0x1F]);
        let pixels: Vec<(u8, u8, u8, u8)> = buffer
            .as_slice()
            .iter()
            .map(|p| (p.r, p.g, p.b, p.a))
            .collect();
        assert_eq!(
            pixels,
            vec![(0xFF, 0, 0, 0xFF), (0, 0xFF, 0, 0xFF), (0, 0, 0xFF, 0xFF)]
        );
    }

    #[test]
    fn tracks_are_weighted_by_fraction() {
        assert_eq!(track_fraction(&[1, 3], 0, 1), (0.0, 0.25));
        assert_eq!(track_fraction(&[1, 3], 1, 1), (0.25, 0.75));
        // A cell past the declared tracks widens the grid.
        assert_eq!(track_fraction(&[1, 1], 2, 2), (0.5, 0.5));
        assert_eq!(track_fraction(&[], 0, 1), (0.0, 1.0));
    }

    #[test]
    fn node_handles_round_trip_through_the_slot_map() {
        let mut nodes: SlotMap<NodeKey, u8> = SlotMap::with_key();
        let key = nodes.insert(7);
        let handle = NodeHandle::from(key);
        assert_eq!(nodes.get(NodeKey::from(handle)), Some(&7));
    }
}
