//! Items: the addressable cells of a page.
//!
//! The catalogue of kinds is closed. Each kind is one [`ItemVariant`] and
//! shares the same capabilities: build, take a value document, take data
//! fragments, react to visibility.

use serde_json::Value;
use tracing::{debug, warn};

use crate::assembler::ChunkedBufferAssembler;
use crate::error::{AssemblyError, GlyphError};
use crate::glyph::{FontSet, IconRef};
use crate::pool::BufferPool;
use crate::theme::{Color, ColorStyle, ThemeModel};
use crate::toolkit::{GridSpan, NodeHandle, Toolkit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    LocalStatus,
    Button,
    LayoutGrid,
    Sensor,
    Image,
    Tile,
    Heading,
}

impl ItemKind {
    pub fn from_layout(layout: &str) -> Option<Self> {
        Some(match layout {
            "local" => ItemKind::LocalStatus,
            "button" => ItemKind::Button,
            "layout" => ItemKind::LayoutGrid,
            "sensor" => ItemKind::Sensor,
            "picture" | "image" => ItemKind::Image,
            "tile" => ItemKind::Tile,
            "heading" => ItemKind::Heading,
            _ => return None,
        })
    }

    pub fn layout_tag(self) -> &'static str {
        match self {
            ItemKind::LocalStatus => "local",
            ItemKind::Button => "button",
            ItemKind::LayoutGrid => "layout",
            ItemKind::Sensor => "sensor",
            ItemKind::Image => "picture",
            ItemKind::Tile => "tile",
            ItemKind::Heading => "heading",
        }
    }

    /// Whether taps on this kind are routed to the controller.
    pub fn is_interactive(self) -> bool {
        matches!(
            self,
            ItemKind::Button | ItemKind::LayoutGrid | ItemKind::Image | ItemKind::Tile
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemAddress {
    pub page: usize,
    pub item: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDefinition {
    pub layout: String,
    pub col: u16,
    pub row: u16,
    pub cols: u16,
    pub rows: u16,
    pub icon: String,
    pub label: String,
}

impl ItemDefinition {
    pub fn kind(&self) -> Option<ItemKind> {
        ItemKind::from_layout(&self.layout)
    }

    pub fn span(&self) -> GridSpan {
        GridSpan {
            col: self.col,
            row: self.row,
            cols: self.cols,
            rows: self.rows,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u16,
    pub height: u16,
}

impl ImageHeader {
    /// RGB565.
    pub const BYTES_PER_PIXEL: usize = 2;

    pub fn from_doc(doc: &Value) -> Option<Self> {
        let width = u16_field(doc, "width").filter(|&w| w > 0)?;
        let height = u16_field(doc, "height").filter(|&h| h > 0)?;
        Some(Self { width, height })
    }

    pub fn byte_len(&self) -> usize {
        usize::from(self.width) * usize::from(self.height) * Self::BYTES_PER_PIXEL
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridCell {
    pub col: u16,
    pub row: u16,
    pub cols: u16,
    pub rows: u16,
    pub icon: Option<IconRef>,
    pub label: String,
    pub style: ColorStyle,
    pub foreground: Color,
}

/// Content of a layout-grid item: fractional tracks and placed cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellGrid {
    pub columns: Vec<u16>,
    pub rows: Vec<u16>,
    pub cells: Vec<GridCell>,
}

/// Everything the toolkit needs to draw one item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemContent {
    pub icon: Option<IconRef>,
    /// Literal icon text in the toolkit's own symbol font.
    pub symbol: String,
    pub label: String,
    pub value: String,
    pub unit: String,
    pub background: Color,
    pub foreground: Color,
    pub grid: Option<CellGrid>,
    pub image: Option<ImageHeader>,
    pub image_ready: bool,
}

/// Follow-up work an item asks of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRequest {
    ImageData(ItemAddress),
}

/// Shared state an item needs while taking a value.
pub struct ItemContext<'a> {
    pub fonts: &'a mut FontSet,
    pub theme: &'a ThemeModel,
    pub pool: &'a BufferPool,
}

#[derive(Debug)]
pub struct ImageState {
    assembler: ChunkedBufferAssembler,
    request_pending: bool,
}

#[derive(Debug)]
pub enum ItemVariant {
    LocalStatus,
    Button,
    LayoutGrid,
    Sensor,
    Image(ImageState),
    Tile,
    Heading,
}

impl ItemVariant {
    fn new(kind: ItemKind, pool: &BufferPool) -> Self {
        match kind {
            ItemKind::LocalStatus => ItemVariant::LocalStatus,
            ItemKind::Button => ItemVariant::Button,
            ItemKind::LayoutGrid => ItemVariant::LayoutGrid,
            ItemKind::Sensor => ItemVariant::Sensor,
            ItemKind::Image => ItemVariant::Image(ImageState {
                assembler: ChunkedBufferAssembler::new(pool.clone()),
                request_pending: false,
            }),
            ItemKind::Tile => ItemVariant::Tile,
            ItemKind::Heading => ItemVariant::Heading,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            ItemVariant::LocalStatus => ItemKind::LocalStatus,
            ItemVariant::Button => ItemKind::Button,
            ItemVariant::LayoutGrid => ItemKind::LayoutGrid,
            ItemVariant::Sensor => ItemKind::Sensor,
            ItemVariant::Image(_) => ItemKind::Image,
            ItemVariant::Tile => ItemKind::Tile,
            ItemVariant::Heading => ItemKind::Heading,
        }
    }
}

#[derive(Debug)]
pub struct ItemInstance {
    variant: ItemVariant,
    node: NodeHandle,
    address: ItemAddress,
    hidden: bool,
    visible: bool,
    style: ColorStyle,
    content: ItemContent,
}

impl ItemInstance {
    /// Build the toolkit subtree for `def`. Unknown layout tags build nothing.
    pub fn new_instance(
        def: &ItemDefinition,
        address: ItemAddress,
        page_node: NodeHandle,
        toolkit: &mut impl Toolkit,
        ctx: &mut ItemContext<'_>,
    ) -> Option<Self> {
        let Some(kind) = def.kind() else {
            debug!(layout = %def.layout, page = address.page, item = address.item, "unknown item kind");
            return None;
        };

        let node = toolkit.create_item(page_node, address, kind, def.span());
        let mut content = ItemContent::default();
        if kind == ItemKind::LocalStatus {
            content.symbol = def.icon.clone();
            content.label = def.label.clone();
        }

        let mut instance = Self {
            variant: ItemVariant::new(kind, ctx.pool),
            node,
            address,
            hidden: false,
            visible: false,
            style: ColorStyle::default(),
            content,
        };
        instance.resolve_colors(ctx.theme);
        toolkit.render_item(node, &instance.content, ctx.fonts);
        Some(instance)
    }

    pub fn kind(&self) -> ItemKind {
        self.variant.kind()
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }

    pub fn address(&self) -> ItemAddress {
        self.address
    }

    pub fn content(&self) -> &ItemContent {
        &self.content
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_interactive(&self) -> bool {
        self.kind().is_interactive()
    }

    /// Apply a value document. Nothing changes if an icon in it cannot be
    /// decoded.
    pub fn set_value(
        &mut self,
        doc: &Value,
        ctx: &mut ItemContext<'_>,
        toolkit: &mut impl Toolkit,
    ) -> Result<Option<ItemRequest>, GlyphError> {
        let mut content = self.content.clone();
        let mut request = None;
        let visible = self.visible;
        let address = self.address;

        match &mut self.variant {
            ItemVariant::LocalStatus => return Ok(None),
            ItemVariant::Button => {
                content.icon = icon_field(doc, ctx.fonts)?;
                content.label = text_field(doc, "name");
            }
            ItemVariant::Sensor | ItemVariant::Tile => {
                content.icon = icon_field(doc, ctx.fonts)?;
                content.label = text_field(doc, "name");
                content.value = text_field(doc, "value");
                content.unit = text_field(doc, "unit");
            }
            ItemVariant::Heading => {
                content.icon = icon_field(doc, ctx.fonts)?;
                content.label = text_field(doc, "name");
            }
            ItemVariant::LayoutGrid => {
                content.grid = Some(cell_grid(doc, ctx.fonts)?);
            }
            ItemVariant::Image(state) => {
                content.image = doc.get("image").and_then(ImageHeader::from_doc);
                content.image_ready = false;
                state.assembler.reset();
                state.request_pending = false;
                if content.image.is_some() {
                    if visible {
                        request = Some(ItemRequest::ImageData(address));
                    } else {
                        state.request_pending = true;
                    }
                }
            }
        }

        self.style = ColorStyle::from_doc(doc);
        self.content = content;
        self.resolve_colors(ctx.theme);
        toolkit.render_item(self.node, &self.content, ctx.fonts);
        Ok(request)
    }

    /// Feed an image fragment. Returns `true` once the image is complete and
    /// handed to the toolkit. Other kinds ignore data.
    pub fn set_data(
        &mut self,
        offset: usize,
        total: usize,
        data: &[u8],
        toolkit: &mut impl Toolkit,
    ) -> Result<bool, AssemblyError> {
        let ItemVariant::Image(state) = &mut self.variant else {
            debug!(page = self.address.page, item = self.address.item, "data for an item without image");
            return Ok(false);
        };

        if !state.assembler.begin_or_continue(offset, total, data)? {
            return Ok(false);
        }

        let (Some(header), Some(pixels)) = (self.content.image, state.assembler.assembled()) else {
            warn!(page = self.address.page, item = self.address.item, "image data without image header");
            return Ok(true);
        };
        if pixels.len() != header.byte_len() {
            warn!(
                expected = header.byte_len(),
                got = pixels.len(),
                "image data size does not match header"
            );
            return Ok(true);
        }

        toolkit.set_item_image(self.node, header, pixels);
        self.content.image_ready = true;
        Ok(true)
    }

    /// Record a visibility change. An image that got its header while hidden
    /// asks for its data now.
    pub fn on_visibility_changed(&mut self, visible: bool) -> Option<ItemRequest> {
        self.visible = visible;
        match &mut self.variant {
            ItemVariant::Image(state) if visible && state.request_pending => {
                state.request_pending = false;
                Some(ItemRequest::ImageData(self.address))
            }
            _ => None,
        }
    }

    pub fn set_hidden(&mut self, hidden: bool, toolkit: &mut impl Toolkit) {
        if self.hidden != hidden {
            self.hidden = hidden;
            toolkit.set_visible(self.node, !hidden);
        }
    }

    /// Resolve colors against the current theme and draw again.
    pub fn restyle(&mut self, theme: &ThemeModel, fonts: &FontSet, toolkit: &mut impl Toolkit) {
        self.resolve_colors(theme);
        toolkit.render_item(self.node, &self.content, fonts);
    }

    pub fn destroy(self, toolkit: &mut impl Toolkit) {
        toolkit.destroy(self.node);
    }

    fn resolve_colors(&mut self, theme: &ThemeModel) {
        let live = theme.live();
        let (background, foreground) = match self.kind() {
            ItemKind::LocalStatus | ItemKind::Sensor => (live.panel_bg_color, live.text_color),
            ItemKind::Heading => (live.bg_color, theme.foreground_for(&self.style)),
            ItemKind::Button | ItemKind::LayoutGrid | ItemKind::Image | ItemKind::Tile => (
                theme.background_for(&self.style),
                theme.foreground_for(&self.style),
            ),
        };
        self.content.background = background;
        self.content.foreground = foreground;
        if let Some(grid) = self.content.grid.as_mut() {
            for cell in &mut grid.cells {
                cell.foreground = theme.foreground_for(&cell.style);
            }
        }
    }
}

fn icon_field(doc: &Value, fonts: &mut FontSet) -> Result<Option<IconRef>, GlyphError> {
    match doc.get("icon") {
        Some(icon) if icon.is_object() => fonts.set_icon(icon).map(Some),
        _ => Ok(None),
    }
}

pub(crate) fn text_field(doc: &Value, key: &str) -> String {
    match doc.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn u16_field(doc: &Value, key: &str) -> Option<u16> {
    doc.get(key)
        .and_then(Value::as_u64)
        .and_then(|raw| u16::try_from(raw).ok())
}

fn fr_tracks(doc: &Value, key: &str) -> Vec<u16> {
    doc.get(key)
        .and_then(Value::as_array)
        .map(|tracks| {
            tracks
                .iter()
                .map(|fr| fr.as_u64().and_then(|fr| u16::try_from(fr).ok()).unwrap_or(1))
                .collect()
        })
        .unwrap_or_default()
}

/// Lay out a layout-grid document. The cursor wraps before placing a cell
/// once it has run past the last column; hidden cells still advance it.
fn cell_grid(doc: &Value, fonts: &mut FontSet) -> Result<CellGrid, GlyphError> {
    let columns = fr_tracks(doc, "cols");
    let rows = fr_tracks(doc, "rows");
    let mut cells = Vec::new();
    let (mut col, mut row) = (0_u16, 0_u16);

    let entries = doc.get("items").and_then(Value::as_array);
    for entry in entries.into_iter().flatten() {
        if usize::from(col) >= columns.len() {
            row = row.saturating_add(1);
            col = 0;
        }
        if let Some(x) = u16_field(entry, "x") {
            col = x;
        }
        if let Some(y) = u16_field(entry, "y") {
            row = y;
        }
        let span_cols = u16_field(entry, "w").unwrap_or(1);
        let span_rows = u16_field(entry, "h").unwrap_or(1);

        if entry.get("_h").and_then(Value::as_bool).unwrap_or(false) {
            col = col.saturating_add(span_cols);
            continue;
        }

        let icon = icon_field(entry, fonts)?;
        let label = if entry.get("icon").is_some() {
            String::new()
        } else {
            text_field(entry, "label")
        };
        cells.push(GridCell {
            col,
            row,
            cols: span_cols,
            rows: span_rows,
            icon,
            label,
            style: ColorStyle::from_doc(entry),
            foreground: Color::default(),
        });
        col = col.saturating_add(span_cols);
    }

    Ok(CellGrid {
        columns,
        rows,
        cells,
    })
}
