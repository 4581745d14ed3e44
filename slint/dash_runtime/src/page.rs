//! Pages: grids of items addressed by stable indices.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AssemblyError, PageError};
use crate::glyph::FontSet;
use crate::item::{ItemAddress, ItemContext, ItemDefinition, ItemInstance, ItemRequest, text_field, u16_field};
use crate::theme::ThemeModel;
use crate::toolkit::{NodeHandle, Toolkit};

pub const MAX_PAGES: usize = 16;
pub const MAX_ITEMS: usize = 32;

/// Page or item index meaning "every one".
pub const BROADCAST: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDefinition {
    pub title: String,
    pub cols: u16,
    pub rows: u16,
    pub portrait: bool,
    pub items: Vec<ItemDefinition>,
}

impl PageDefinition {
    /// The page shown before the controller has sent anything.
    pub fn boot() -> Self {
        Self {
            title: String::new(),
            cols: 5,
            rows: 3,
            portrait: false,
            items: vec![ItemDefinition {
                layout: "local".to_string(),
                col: 2,
                row: 1,
                cols: 1,
                rows: 1,
                icon: "\u{F0709}".to_string(),
                label: "Loading...".to_string(),
            }],
        }
    }

    /// Parse `{cols, rows, items}`. Items without `col`/`row` continue from a
    /// running cursor that advances by each span and wraps at the last column.
    /// One item outside the grid rejects the whole page.
    pub fn from_document(doc: &Value) -> Result<Self, PageError> {
        let raw_cols = doc.get("cols").and_then(Value::as_i64).unwrap_or(0);
        let raw_rows = doc.get("rows").and_then(Value::as_i64).unwrap_or(0);
        let (Ok(page_cols), Ok(page_rows)) = (u16::try_from(raw_cols), u16::try_from(raw_rows))
        else {
            return Err(PageError::EmptyGrid {
                cols: raw_cols,
                rows: raw_rows,
            });
        };
        if page_cols == 0 || page_rows == 0 {
            return Err(PageError::EmptyGrid {
                cols: raw_cols,
                rows: raw_rows,
            });
        }

        let entries = doc
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if entries.len() > MAX_ITEMS {
            warn!(
                items = entries.len(),
                max = MAX_ITEMS,
                "page has too many items, ignoring the rest"
            );
        }

        let mut items = Vec::with_capacity(entries.len().min(MAX_ITEMS));
        let (mut col, mut row) = (0_u16, 0_u16);
        for (index, entry) in entries.iter().take(MAX_ITEMS).enumerate() {
            col = u16_field(entry, "col").unwrap_or(col);
            row = u16_field(entry, "row").unwrap_or(row);
            let cols = u16_field(entry, "cols").unwrap_or(1).max(1);
            let rows = u16_field(entry, "rows").unwrap_or(1).max(1);

            let fits = u32::from(col) + u32::from(cols) <= u32::from(page_cols)
                && u32::from(row) + u32::from(rows) <= u32::from(page_rows);
            if !fits {
                return Err(PageError::OutOfBounds {
                    index,
                    col,
                    row,
                    cols,
                    rows,
                    page_cols,
                    page_rows,
                });
            }

            items.push(ItemDefinition {
                layout: text_field(entry, "layout"),
                col,
                row,
                cols,
                rows,
                icon: text_field(entry, "icon"),
                label: text_field(entry, "label"),
            });

            col += cols;
            if col >= page_cols {
                row = row.saturating_add(1);
                col = 0;
            }
        }

        Ok(Self {
            title: text_field(doc, "title"),
            cols: page_cols,
            rows: page_rows,
            portrait: doc.get("portrait").and_then(Value::as_bool).unwrap_or(false),
            items,
        })
    }
}

#[derive(Debug)]
pub struct PageInstance {
    def: PageDefinition,
    root: NodeHandle,
    items: Vec<Option<ItemInstance>>,
    visible: bool,
}

impl PageInstance {
    pub fn definition(&self) -> &PageDefinition {
        &self.def
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Item slots in definition order. Unknown kinds leave `None`.
    pub fn items(&self) -> &[Option<ItemInstance>] {
        &self.items
    }

    fn set_visible(&mut self, visible: bool, toolkit: &mut impl Toolkit) -> Vec<ItemRequest> {
        if self.visible == visible {
            return Vec::new();
        }
        self.visible = visible;
        toolkit.set_visible(self.root, visible);
        self.items
            .iter_mut()
            .flatten()
            .filter_map(|item| item.on_visibility_changed(visible))
            .collect()
    }

    fn destroy(self, toolkit: &mut impl Toolkit) {
        for item in self.items.into_iter().flatten() {
            item.destroy(toolkit);
        }
        toolkit.destroy(self.root);
    }
}

/// The page catalogue and its instantiated scene.
#[derive(Debug, Default)]
pub struct PageModel {
    pages: Vec<PageInstance>,
    active: usize,
}

impl PageModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn page(&self, index: usize) -> Option<&PageInstance> {
        self.pages.get(index)
    }

    pub fn item(&self, address: ItemAddress) -> Option<&ItemInstance> {
        self.pages.get(address.page)?.items.get(address.item)?.as_ref()
    }

    /// Append `def` and build its items. The new page starts hidden.
    pub fn add_page(
        &mut self,
        def: PageDefinition,
        toolkit: &mut impl Toolkit,
        ctx: &mut ItemContext<'_>,
    ) -> Result<usize, PageError> {
        if self.pages.len() >= MAX_PAGES {
            return Err(PageError::CatalogueFull { max: MAX_PAGES });
        }

        let page = self.pages.len();
        let root = toolkit.create_page(page, def.cols, def.rows);
        let mut items = Vec::with_capacity(def.items.len());
        for (item, item_def) in def.items.iter().enumerate() {
            let address = ItemAddress { page, item };
            items.push(ItemInstance::new_instance(item_def, address, root, toolkit, ctx));
        }

        debug!(page, cols = def.cols, rows = def.rows, items = def.items.len(), "page added");
        self.pages.push(PageInstance {
            def,
            root,
            items,
            visible: false,
        });
        Ok(page)
    }

    /// Tear down every page.
    pub fn clear(&mut self, toolkit: &mut impl Toolkit) {
        for page in self.pages.drain(..) {
            page.destroy(toolkit);
        }
        self.active = 0;
    }

    /// Rebuild the catalogue from `defs` and show page 0.
    pub fn replace_all(
        &mut self,
        defs: Vec<PageDefinition>,
        toolkit: &mut impl Toolkit,
        ctx: &mut ItemContext<'_>,
    ) -> Vec<ItemRequest> {
        self.clear(toolkit);
        if defs.len() > MAX_PAGES {
            warn!(pages = defs.len(), max = MAX_PAGES, "too many pages, ignoring the rest");
        }
        for def in defs.into_iter().take(MAX_PAGES) {
            if let Err(err) = self.add_page(def, toolkit, ctx) {
                warn!(%err, "page not added");
            }
        }
        self.show_page(0, toolkit).unwrap_or_default()
    }

    /// Make `index` the only visible page. `None` when there is no such page.
    pub fn show_page(
        &mut self,
        index: usize,
        toolkit: &mut impl Toolkit,
    ) -> Option<Vec<ItemRequest>> {
        if index >= self.pages.len() {
            return None;
        }
        let mut requests = Vec::new();
        for (page_index, page) in self.pages.iter_mut().enumerate() {
            if page_index != index {
                page.set_visible(false, toolkit);
            }
        }
        requests.extend(self.pages[index].set_visible(true, toolkit));
        self.active = index;
        Some(requests)
    }

    /// Route a value document to one item, or to every item when `page` or
    /// `item` is [`BROADCAST`]. `_h: true` hides the item without touching its
    /// content; any other value shows it again before being applied.
    pub fn set_item_value(
        &mut self,
        page: i64,
        item: i64,
        doc: &Value,
        toolkit: &mut impl Toolkit,
        ctx: &mut ItemContext<'_>,
    ) -> Vec<ItemRequest> {
        let hidden = doc.get("_h").and_then(Value::as_bool);
        let mut requests = Vec::new();
        let mut matched = 0_usize;

        for (page_index, instance) in self.pages.iter_mut().enumerate() {
            if !selects(page, page_index) {
                continue;
            }
            for (item_index, slot) in instance.items.iter_mut().enumerate() {
                let Some(target) = slot.as_mut().filter(|_| selects(item, item_index)) else {
                    continue;
                };
                matched += 1;

                if hidden == Some(true) {
                    target.set_hidden(true, toolkit);
                    continue;
                }
                target.set_hidden(false, toolkit);

                match target.set_value(doc, ctx, toolkit) {
                    Ok(Some(request)) => requests.push(request),
                    Ok(None) => {}
                    Err(err) => warn!(page = page_index, item = item_index, %err, "value not applied"),
                }
            }
        }

        if matched == 0 {
            debug!(page, item, "set_value matched no item");
        }
        requests
    }

    /// Feed an image fragment to one item. `None` when the item does not
    /// exist.
    pub fn set_item_data(
        &mut self,
        address: ItemAddress,
        offset: usize,
        total: usize,
        data: &[u8],
        toolkit: &mut impl Toolkit,
    ) -> Option<Result<bool, AssemblyError>> {
        let target = self
            .pages
            .get_mut(address.page)?
            .items
            .get_mut(address.item)?
            .as_mut()?;
        Some(target.set_data(offset, total, data, toolkit))
    }

    /// Resolve every item against the current theme and draw it again.
    pub fn restyle_all(&mut self, theme: &ThemeModel, fonts: &FontSet, toolkit: &mut impl Toolkit) {
        for page in &mut self.pages {
            for item in page.items.iter_mut().flatten() {
                item.restyle(theme, fonts, toolkit);
            }
        }
    }
}

/// Whether `index` is addressed by `wanted`.
pub(crate) fn selects(wanted: i64, index: usize) -> bool {
    wanted == BROADCAST || usize::try_from(wanted).is_ok_and(|wanted| wanted == index)
}
