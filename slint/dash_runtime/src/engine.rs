//! The dashboard engine: one owner for every model component.
//!
//! Commands arrive through [`DashboardEngine::dispatch`], gestures through the
//! listener traits, and time through [`DashboardEngine::tick`]. Nothing here
//! fails outward: a command that cannot be applied is logged and dropped.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::assembler::{WORD_BYTES, words_to_bytes};
use crate::buttons::ButtonBar;
use crate::config::EngineConfig;
use crate::decoder::ResilientDecoder;
use crate::glyph::FontSet;
use crate::item::{ItemAddress, ItemContext, ItemRequest};
use crate::overlay::DetailOverlay;
use crate::page::{PageDefinition, PageModel, selects};
use crate::pool::BufferPool;
use crate::protocol::ControllerEnvelope;
use crate::router::{
    ButtonEventListener, EventRouter, EventSink, Gesture, ItemEventListener, PageEventListener,
};
use crate::theme::ThemeModel;
use crate::toolkit::{DeviceIo, Toolkit};

pub struct DashboardEngine<T: Toolkit, S: EventSink, D: DeviceIo> {
    config: EngineConfig,
    toolkit: T,
    device: D,
    router: EventRouter<S>,
    decoder: ResilientDecoder,
    pool: BufferPool,
    fonts: FontSet,
    theme: ThemeModel,
    pages: PageModel,
    buttons: ButtonBar,
    overlay: DetailOverlay,
    now: Instant,
}

impl<T: Toolkit, S: EventSink, D: DeviceIo> DashboardEngine<T, S, D> {
    pub fn new(config: EngineConfig, toolkit: T, sink: S, device: D) -> Self {
        let pool = BufferPool::new(config.memory_budget_bytes);
        Self {
            toolkit,
            device,
            router: EventRouter::new(sink),
            decoder: ResilientDecoder::new(config.max_arena_bytes),
            fonts: FontSet::new(pool.clone()),
            theme: ThemeModel::default(),
            pages: PageModel::new(),
            buttons: ButtonBar::new(config.buttons, config.button_bar_timeout),
            overlay: DetailOverlay::new(pool.clone()),
            pool,
            config,
            now: Instant::now(),
        }
    }

    /// Draw the boot state: boot theme, the loading page, and the bar.
    pub fn start(&mut self, now: Instant) {
        self.now = now;
        self.toolkit.apply_theme(self.theme.live());

        let mut ctx = ItemContext {
            fonts: &mut self.fonts,
            theme: &self.theme,
            pool: &self.pool,
        };
        match self
            .pages
            .add_page(PageDefinition::boot(), &mut self.toolkit, &mut ctx)
        {
            Ok(index) => {
                self.pages.show_page(index, &mut self.toolkit);
            }
            Err(err) => warn!(%err, "boot page not added"),
        }

        for index in 0..self.buttons.len() {
            let on = self.device.switch_state(index);
            self.buttons.set_switch_state(index, on);
            self.render_button(index);
        }
        self.show_buttons(self.buttons.has_timeout());
        debug!(buttons = self.buttons.len(), "engine started");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }

    pub fn toolkit_mut(&mut self) -> &mut T {
        &mut self.toolkit
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn sink(&self) -> &S {
        self.router.sink()
    }

    pub fn sink_mut(&mut self) -> &mut S {
        self.router.sink_mut()
    }

    pub fn pages(&self) -> &PageModel {
        &self.pages
    }

    pub fn theme(&self) -> &ThemeModel {
        &self.theme
    }

    pub fn fonts(&self) -> &FontSet {
        &self.fonts
    }

    pub fn buttons(&self) -> &ButtonBar {
        &self.buttons
    }

    pub fn overlay(&self) -> &DetailOverlay {
        &self.overlay
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn dispatch(&mut self, envelope: ControllerEnvelope) {
        match envelope {
            ControllerEnvelope::SetTheme { json_value } => self.set_theme(&json_value),
            ControllerEnvelope::SetPages { jsons, page } => self.set_pages(&jsons, page),
            ControllerEnvelope::AddPage { json_value, reset } => self.add_page(&json_value, reset),
            ControllerEnvelope::SetValue {
                page,
                item,
                json_value,
            } => self.set_value(page, item, &json_value),
            ControllerEnvelope::SetData {
                page,
                item,
                data,
                offset,
                size,
            } => self.set_data(page, item, &data, offset, size),
            ControllerEnvelope::ShowPage { page } => self.service_show_page(page),
            ControllerEnvelope::SetButton { index, json_value } => {
                self.set_button(index, &json_value)
            }
            ControllerEnvelope::ShowMore { json_value } => self.show_more(&json_value),
            ControllerEnvelope::HideMore => self.hide_more(),
            ControllerEnvelope::SetDataMore { data, offset, size } => {
                self.set_data_more(&data, offset, size)
            }
            ControllerEnvelope::PlaySong { song } => self.device.play_tone(&song),
        }
    }

    /// Advance the clock and fire the button bar deadline.
    pub fn tick(&mut self, now: Instant) {
        self.now = now;
        if let Some(expanded) = self.buttons.tick(now, self.overlay.is_open()) {
            self.toolkit.set_button_bar_expanded(expanded);
        }
    }

    /// A press on bar button `index`. A short press the listener does not
    /// consume toggles the bound switch.
    pub fn press_button(&mut self, index: usize, gesture: Gesture) {
        let consumed = self.on_button_gesture(index, gesture);
        if !consumed && gesture == Gesture::Tap {
            self.device.toggle_switch(index);
            self.on_switch_changed(index);
        }
    }

    /// Re-read switch `index` and redraw its indicator if it changed.
    pub fn on_switch_changed(&mut self, index: usize) {
        let on = self.device.switch_state(index);
        if self.buttons.set_switch_state(index, on) {
            self.render_button(index);
        }
    }

    fn set_theme(&mut self, json: &str) {
        let decoder = self.decoder.clone();
        let Some(applied) = decoded(&decoder, "set_theme", json, |doc| {
            self.theme.apply_patch(doc)
        }) else {
            return;
        };
        debug!(applied, "theme patched");

        self.toolkit.apply_theme(self.theme.live());
        self.pages
            .restyle_all(&self.theme, &self.fonts, &mut self.toolkit);
        for index in 0..self.buttons.len() {
            self.render_button(index);
        }
    }

    fn set_pages(&mut self, jsons: &[String], page: i64) {
        let decoder = self.decoder.clone();
        let mut defs = Vec::with_capacity(jsons.len());
        for (index, json) in jsons.iter().enumerate() {
            match decoded(&decoder, "set_pages", json, PageDefinition::from_document) {
                Some(Ok(def)) => defs.push(def),
                Some(Err(err)) => warn!(index, %err, "page skipped"),
                None => {}
            }
        }
        if page != 0 {
            debug!(page, "set_pages always starts on page 0");
        }

        self.close_overlay();
        self.fonts.clear();
        let mut ctx = ItemContext {
            fonts: &mut self.fonts,
            theme: &self.theme,
            pool: &self.pool,
        };
        let requests = self.pages.replace_all(defs, &mut self.toolkit, &mut ctx);
        if !self.pages.is_empty() {
            self.router.page_shown(0);
        }
        self.send_requests(requests);
        self.router.overlay_visibility(false);
    }

    fn add_page(&mut self, json: &str, reset: bool) {
        let decoder = self.decoder.clone();
        let def = match decoded(&decoder, "add_page", json, PageDefinition::from_document) {
            Some(Ok(def)) => def,
            Some(Err(err)) => {
                warn!(%err, "page not added");
                return;
            }
            None => return,
        };

        if reset {
            self.close_overlay();
            self.pages.clear(&mut self.toolkit);
            self.fonts.clear();
        }

        let mut ctx = ItemContext {
            fonts: &mut self.fonts,
            theme: &self.theme,
            pool: &self.pool,
        };
        match self.pages.add_page(def, &mut self.toolkit, &mut ctx) {
            Ok(0) => {
                self.show_page(0);
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "page not added"),
        }
    }

    fn set_value(&mut self, page: i64, item: i64, json: &str) {
        let decoder = self.decoder.clone();
        let requests = decoded(&decoder, "set_value", json, |doc| {
            let mut ctx = ItemContext {
                fonts: &mut self.fonts,
                theme: &self.theme,
                pool: &self.pool,
            };
            self.pages
                .set_item_value(page, item, doc, &mut self.toolkit, &mut ctx)
        });
        if let Some(requests) = requests {
            self.send_requests(requests);
        }
    }

    fn set_data(&mut self, page: i64, item: i64, words: &[i32], offset: usize, size: usize) {
        let Some((offset, total)) = word_span(offset, size) else {
            warn!(offset, size, "set_data span overflows");
            return;
        };
        let bytes = words_to_bytes(words);

        for address in self.addresses(page, item) {
            match self
                .pages
                .set_item_data(address, offset, total, &bytes, &mut self.toolkit)
            {
                Some(Ok(true)) => debug!(page = address.page, item = address.item, "image complete"),
                Some(Ok(false)) | None => {}
                Some(Err(err)) => {
                    warn!(page = address.page, item = address.item, %err, "fragment rejected")
                }
            }
        }
    }

    fn service_show_page(&mut self, page: i64) {
        self.close_overlay();
        match usize::try_from(page) {
            Ok(index) if self.show_page(index) => {}
            _ => warn!(page, pages = self.pages.len(), "no such page"),
        }
        self.router.overlay_visibility(false);
    }

    fn set_button(&mut self, index: i64, json: &str) {
        let Ok(index) = usize::try_from(index) else {
            debug!(index, "no such button");
            return;
        };
        let decoder = self.decoder.clone();
        let result = decoded(&decoder, "set_button", json, |doc| {
            self.buttons.set_button(index, doc, &mut self.fonts)
        });
        match result {
            Some(Ok(true)) => self.render_button(index),
            Some(Ok(false)) | None => {}
            Some(Err(err)) => warn!(index, %err, "button not updated"),
        }
    }

    fn show_more(&mut self, json: &str) {
        let decoder = self.decoder.clone();
        let request = decoded(&decoder, "show_more", json, |doc| {
            let (view, request) = self.overlay.open(doc);
            self.toolkit.show_overlay(view);
            request
        });
        let Some(request) = request else {
            return;
        };

        if let Some(request) = request {
            self.router
                .feature_data_request(&request.entity_id, &request.feature_id);
        }
        self.show_buttons(false);
        self.router.overlay_visibility(true);
    }

    fn hide_more(&mut self) {
        self.close_overlay();
        self.show_page(self.pages.active());
        self.show_buttons(false);
        self.router.overlay_visibility(false);
    }

    fn set_data_more(&mut self, words: &[i32], offset: usize, size: usize) {
        if !self.overlay.is_open() {
            debug!("overlay data while closed");
            return;
        }
        let Some((offset, total)) = word_span(offset, size) else {
            warn!(offset, size, "set_data_more span overflows");
            return;
        };
        let bytes = words_to_bytes(words);
        if let Err(err) = self
            .overlay
            .set_data(offset, total, &bytes, &mut self.toolkit)
        {
            warn!(%err, "overlay fragment rejected");
        }
    }

    /// Show `index`, report it, and ask for any image data it now needs.
    fn show_page(&mut self, index: usize) -> bool {
        let Some(requests) = self.pages.show_page(index, &mut self.toolkit) else {
            return false;
        };
        self.router.page_shown(index);
        self.send_requests(requests);
        true
    }

    fn close_overlay(&mut self) {
        if self.overlay.is_open() {
            self.overlay.close();
            self.toolkit.hide_overlay();
        }
    }

    fn show_buttons(&mut self, visible: bool) {
        if let Some(expanded) = self.buttons.show(visible, self.now) {
            self.toolkit.set_button_bar_expanded(expanded);
        }
    }

    fn render_button(&mut self, index: usize) {
        if let Some(view) = self.buttons.view(index) {
            self.toolkit.render_button(index, view, &self.fonts);
        }
    }

    fn send_requests(&mut self, requests: Vec<ItemRequest>) {
        for request in requests {
            match request {
                ItemRequest::ImageData(address) => self.router.data_request(address),
            }
        }
    }

    fn addresses(&self, page: i64, item: i64) -> Vec<ItemAddress> {
        let mut addresses = Vec::new();
        for page_index in (0..self.pages.len()).filter(|index| selects(page, *index)) {
            let Some(instance) = self.pages.page(page_index) else {
                continue;
            };
            for item_index in (0..instance.items().len()).filter(|index| selects(item, *index)) {
                addresses.push(ItemAddress {
                    page: page_index,
                    item: item_index,
                });
            }
        }
        addresses
    }
}

impl<T: Toolkit, S: EventSink, D: DeviceIo> ItemEventListener for DashboardEngine<T, S, D> {
    fn on_item_gesture(&mut self, address: ItemAddress, gesture: Gesture) {
        if !self.pages.item(address).is_some_and(|item| item.is_interactive()) {
            debug!(page = address.page, item = address.item, "gesture on passive item");
            return;
        }
        if self.router.backlight_gate(&mut self.device) {
            return;
        }
        self.show_buttons(false);
        self.router.item_gesture(address, gesture);
    }
}

impl<T: Toolkit, S: EventSink, D: DeviceIo> ButtonEventListener for DashboardEngine<T, S, D> {
    fn on_button_gesture(&mut self, index: usize, gesture: Gesture) -> bool {
        if index >= self.buttons.len() {
            debug!(index, "gesture on unknown button");
            return true;
        }
        if self.router.backlight_gate(&mut self.device) {
            return true;
        }
        self.router.button_gesture(index, gesture);
        if gesture == Gesture::Tap {
            if let Some(song) = self.buttons.sound(index) {
                self.device.play_tone(song);
            }
        }
        false
    }
}

impl<T: Toolkit, S: EventSink, D: DeviceIo> PageEventListener for DashboardEngine<T, S, D> {
    fn on_back(&mut self) {
        if self.router.backlight_gate(&mut self.device) {
            return;
        }
        self.show_page(0);
    }

    fn on_dashboard_toggle(&mut self) {
        if self.router.backlight_gate(&mut self.device) {
            return;
        }
        self.show_buttons(!self.buttons.is_expanded());
    }

    fn on_overlay_close(&mut self) {
        if self.router.backlight_gate(&mut self.device) {
            return;
        }
        self.hide_more();
    }

    fn on_overlay_change(&mut self, feature: usize, value: i32) {
        match self.overlay.change(feature, value) {
            Some(change) => self
                .router
                .change(&change.entity_id, &change.feature_id, change.value),
            None => debug!(feature, "change on unknown overlay feature"),
        }
    }
}

/// Run `consumer` over the parsed `input`, logging and swallowing decode
/// failures.
fn decoded<R>(
    decoder: &ResilientDecoder,
    command: &'static str,
    input: &str,
    consumer: impl FnOnce(&Value) -> R,
) -> Option<R> {
    match decoder.decode(input, consumer) {
        Ok(result) => Some(result),
        Err(err) => {
            warn!(command, %err, len = input.len(), "command dropped");
            None
        }
    }
}

/// Word offset and total to bytes.
fn word_span(offset: usize, size: usize) -> Option<(usize, usize)> {
    Some((offset.checked_mul(WORD_BYTES)?, size.checked_mul(WORD_BYTES)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph::encode_glyph;
    use crate::router::{OutboundEvent, PageInput};
    use crate::testing::{FakeDevice, RecordingToolkit};
    use crate::theme::{Color, ThemeParameters};
    use serde_json::json;
    use std::time::Duration;

    type Engine = DashboardEngine<RecordingToolkit, Vec<OutboundEvent>, FakeDevice>;

    fn engine_with(device: FakeDevice, buttons: usize) -> Engine {
        let config = EngineConfig {
            buttons,
            button_bar_timeout: Duration::from_secs(10),
            ..EngineConfig::default()
        };
        let mut engine = DashboardEngine::new(
            config,
            RecordingToolkit::default(),
            Vec::new(),
            device.with_switches(buttons),
        );
        engine.start(Instant::now());
        engine
    }

    fn engine() -> Engine {
        engine_with(FakeDevice::default(), 0)
    }

    fn kinds(engine: &Engine) -> Vec<&str> {
        engine.sink().iter().map(OutboundEvent::kind).collect()
    }

    fn icon(name: &str, size: u16) -> Value {
        json!({"name": name, "size": size, "data": encode_glyph([0, 0, 1, 1], true, &[1, 0x80])})
    }

    fn add_page(engine: &mut Engine, doc: Value, reset: bool) {
        engine.dispatch(ControllerEnvelope::AddPage {
            json_value: doc.to_string(),
            reset,
        });
    }

    fn set_value(engine: &mut Engine, page: i64, item: i64, doc: Value) {
        engine.dispatch(ControllerEnvelope::SetValue {
            page,
            item,
            json_value: doc.to_string(),
        });
    }

    #[test]
    fn boot_state_shows_the_loading_page() {
        let engine = engine_with(FakeDevice::default(), 2);
        assert_eq!(engine.pages().len(), 1);
        assert_eq!(engine.toolkit().pages.len(), 1);
        let boot = engine
            .pages()
            .item(ItemAddress { page: 0, item: 0 })
            .expect("boot item");
        assert_eq!(boot.content().label, "Loading...");
        assert_eq!(engine.toolkit().themes.len(), 1);
        assert_eq!(engine.toolkit().buttons.len(), 2);
        assert_eq!(engine.toolkit().bar_expanded, vec![true]);
        assert!(engine.sink().is_empty());
    }

    #[test]
    fn added_button_takes_icon_and_label() {
        let mut engine = engine();
        add_page(
            &mut engine,
            json!({"cols": 2, "rows": 2, "items": [{"layout": "button"}]}),
            true,
        );
        set_value(&mut engine, 0, 0, json!({"icon": icon("a", 16), "name": "Light"}));

        let cache = engine.fonts().cache(16).expect("size 16 cache");
        assert_eq!(cache.len(), 1);
        assert!(cache.codepoint("a").is_some());
        let item = engine
            .pages()
            .item(ItemAddress { page: 0, item: 0 })
            .expect("button");
        assert_eq!(item.content().label, "Light");
        assert_eq!(kinds(&engine), vec!["page"]);
    }

    #[test]
    fn hidden_item_returns_with_its_next_value() {
        let mut engine = engine();
        add_page(
            &mut engine,
            json!({"cols": 2, "rows": 1, "items": [{"layout": "sensor"}, {"layout": "button", "col": 1}]}),
            true,
        );
        let address = ItemAddress { page: 0, item: 1 };

        set_value(&mut engine, 0, 1, json!({"_h": true}));
        assert!(engine.pages().item(address).expect("button").is_hidden());

        set_value(&mut engine, 0, 1, json!({"name": "Garage"}));
        let item = engine.pages().item(address).expect("button");
        assert!(!item.is_hidden());
        assert_eq!(item.content().label, "Garage");
        assert_eq!(engine.toolkit().visible.get(&item.node()), Some(&true));
    }

    #[test]
    fn dark_display_only_wakes_up() {
        let mut engine = engine_with(FakeDevice::with_backlight(false), 1);
        add_page(
            &mut engine,
            json!({"cols": 1, "rows": 1, "items": [{"layout": "button"}]}),
            true,
        );
        engine.sink_mut().clear();
        let address = ItemAddress { page: 0, item: 0 };

        engine.on_item_gesture(address, Gesture::Tap);
        assert!(engine.sink().is_empty());
        assert_eq!(engine.device().backlight, Some(true));

        engine.on_item_gesture(address, Gesture::Tap);
        assert_eq!(kinds(&engine), vec!["click"]);

        engine.device_mut().backlight = Some(false);
        engine.press_button(0, Gesture::Tap);
        assert_eq!(kinds(&engine), vec!["click"]);
        assert!(!engine.device().switch_state(0));

        engine.press_button(0, Gesture::LongPress);
        assert_eq!(kinds(&engine), vec!["click", "long_button"]);
    }

    #[test]
    fn item_gesture_collapses_the_bar_first() {
        let mut engine = engine_with(FakeDevice::default(), 1);
        add_page(
            &mut engine,
            json!({"cols": 2, "rows": 1, "items": [{"layout": "tile"}, {"layout": "sensor"}]}),
            true,
        );
        engine.sink_mut().clear();

        engine.on_item_gesture(ItemAddress { page: 0, item: 1 }, Gesture::Tap);
        assert!(engine.sink().is_empty());

        engine.on_item_gesture(ItemAddress { page: 0, item: 0 }, Gesture::LongPress);
        assert_eq!(engine.toolkit().bar_expanded.last(), Some(&false));
        let event = &engine.sink()[0];
        assert_eq!(event.kind(), "long_press");
        assert_eq!(event.get("page"), Some("0"));
        assert_eq!(event.get("item"), Some("0"));
    }

    #[test]
    fn set_pages_skips_bad_documents_and_reports_page_zero() {
        let mut engine = engine();
        set_value(&mut engine, 0, 0, json!({}));
        engine.dispatch(ControllerEnvelope::SetPages {
            jsons: vec![
                json!({"cols": 1, "rows": 1, "items": [{"layout": "button"}]}).to_string(),
                "{not json".to_string(),
                json!({"cols": 1, "rows": 1, "items": [{"cols": 2}]}).to_string(),
                json!({"cols": 2, "rows": 1}).to_string(),
            ],
            page: 1,
        });

        assert_eq!(engine.pages().len(), 2);
        assert_eq!(engine.pages().active(), 0);
        assert_eq!(kinds(&engine), vec!["page", "more"]);
        assert_eq!(engine.sink()[0].get("page"), Some("0"));
        assert_eq!(engine.sink()[1].get("visible"), Some("0"));
    }

    #[test]
    fn set_pages_drops_old_glyphs() {
        let mut engine = engine();
        add_page(
            &mut engine,
            json!({"cols": 1, "rows": 1, "items": [{"layout": "button"}]}),
            true,
        );
        set_value(&mut engine, 0, 0, json!({"icon": icon("a", 16)}));
        assert_eq!(engine.fonts().entry_count(), 1);

        engine.dispatch(ControllerEnvelope::SetPages {
            jsons: vec![json!({"cols": 1, "rows": 1}).to_string()],
            page: 0,
        });
        assert_eq!(engine.fonts().entry_count(), 0);
    }

    #[test]
    fn add_page_shows_only_the_first_page() {
        let mut engine = engine();
        add_page(&mut engine, json!({"cols": 1, "rows": 1}), true);
        add_page(&mut engine, json!({"cols": 1, "rows": 1}), false);
        assert_eq!(engine.pages().len(), 2);
        assert_eq!(kinds(&engine), vec!["page"]);

        add_page(&mut engine, json!({"cols": 0, "rows": 1}), true);
        assert_eq!(engine.pages().len(), 2);
    }

    #[test]
    fn show_page_requests_deferred_image_data() {
        let mut engine = engine();
        add_page(&mut engine, json!({"cols": 1, "rows": 1}), true);
        add_page(
            &mut engine,
            json!({"cols": 1, "rows": 1, "items": [{"layout": "picture"}]}),
            false,
        );
        set_value(&mut engine, 1, 0, json!({"image": {"width": 2, "height": 1}}));
        engine.sink_mut().clear();

        engine.dispatch(ControllerEnvelope::ShowPage { page: 1 });
        assert_eq!(kinds(&engine), vec!["page", "data_request", "more"]);
        assert_eq!(engine.sink()[1].get("page"), Some("1"));
        assert_eq!(engine.sink()[1].get("item"), Some("0"));

        let word = i32::from_le_bytes([0xF8, 0x00, 0x07, 0xE0]);
        engine.dispatch(ControllerEnvelope::SetData {
            page: 1,
            item: 0,
            data: vec![word],
            offset: 0,
            size: 1,
        });
        let node = engine
            .pages()
            .item(ItemAddress { page: 1, item: 0 })
            .expect("image")
            .node();
        assert_eq!(engine.toolkit().images[&node].1, vec![0xF8, 0x00, 0x07, 0xE0]);
    }

    #[test]
    fn missing_page_still_reports_overlay_closed() {
        let mut engine = engine();
        engine.dispatch(ControllerEnvelope::ShowPage { page: 9 });
        assert_eq!(kinds(&engine), vec!["more"]);
        assert_eq!(engine.pages().active(), 0);
    }

    #[test]
    fn theme_patch_resets_omitted_keys_and_restyles() {
        let mut engine = engine();
        add_page(
            &mut engine,
            json!({"cols": 1, "rows": 1, "items": [{"layout": "button"}]}),
            true,
        );
        let node = engine
            .pages()
            .item(ItemAddress { page: 0, item: 0 })
            .expect("button")
            .node();

        engine.dispatch(ControllerEnvelope::SetTheme {
            json_value: json!({"btn_bg_color": "#102030", "padding": 4}).to_string(),
        });
        assert_eq!(engine.toolkit().rendered[&node].background, Color(0x102030));
        assert_eq!(engine.theme().live().padding, 4);

        engine.dispatch(ControllerEnvelope::SetTheme {
            json_value: json!({"padding": 6}).to_string(),
        });
        let boot = ThemeParameters::default();
        assert_eq!(engine.theme().live().btn_bg_color, boot.btn_bg_color);
        assert_eq!(engine.toolkit().rendered[&node].background, boot.btn_bg_color);
        assert_eq!(engine.toolkit().themes.len(), 3);
    }

    #[test]
    fn undecodable_command_changes_nothing() {
        let mut engine = engine();
        engine.dispatch(ControllerEnvelope::SetTheme {
            json_value: "{\"bg_color\": ".to_string(),
        });
        assert_eq!(engine.toolkit().themes.len(), 1);

        add_page(&mut engine, json!({"cols": 1, "rows": 1}), true);
        engine.dispatch(ControllerEnvelope::AddPage {
            json_value: "[".to_string(),
            reset: true,
        });
        assert_eq!(engine.pages().len(), 1);
    }

    #[test]
    fn detail_overlay_round_trip() {
        let mut engine = engine_with(FakeDevice::default(), 1);
        add_page(&mut engine, json!({"cols": 1, "rows": 1}), true);
        engine.sink_mut().clear();

        let doc = json!({
            "id": "camera.door",
            "title": "Door",
            "features": [
                {"type": "image", "id": "image", "width": 2, "height": 1},
                {"type": "toggle", "id": "toggle", "value": false},
            ],
        });
        engine.dispatch(ControllerEnvelope::ShowMore {
            json_value: doc.to_string(),
        });
        assert_eq!(kinds(&engine), vec!["data_request", "more"]);
        assert_eq!(engine.sink()[0].get("id"), Some("camera.door"));
        assert_eq!(engine.sink()[0].get("op"), Some("image"));
        assert_eq!(engine.sink()[1].get("visible"), Some("1"));
        assert_eq!(engine.toolkit().bar_expanded.last(), Some(&false));
        assert!(engine.toolkit().overlay.is_some());

        engine.dispatch(ControllerEnvelope::SetDataMore {
            data: vec![7],
            offset: 0,
            size: 1,
        });
        assert_eq!(engine.toolkit().overlay_images.len(), 1);

        PageInput::OverlayChange { feature: 1, value: 1 }.deliver(&mut engine);
        let change = engine.sink().last().expect("change");
        assert_eq!(change.kind(), "change");
        assert_eq!(change.get("value"), Some("1"));

        engine.sink_mut().clear();
        PageInput::OverlayClose.deliver(&mut engine);
        assert_eq!(kinds(&engine), vec!["page", "more"]);
        assert_eq!(engine.sink()[1].get("visible"), Some("0"));
        assert!(engine.toolkit().overlay.is_none());
        assert_eq!(engine.toolkit().overlay_hidden, 1);
        assert!(!engine.overlay().is_open());

        engine.dispatch(ControllerEnvelope::SetDataMore {
            data: vec![7],
            offset: 0,
            size: 1,
        });
        assert_eq!(engine.toolkit().overlay_images.len(), 1);
    }

    #[test]
    fn button_tap_toggles_switch_and_plays_sound() {
        let mut engine = engine_with(FakeDevice::default(), 2);
        engine.dispatch(ControllerEnvelope::SetButton {
            index: 1,
            json_value: json!({"left": {"icon": icon("l", 24)}, "sound": "two:d=4:e"}).to_string(),
        });
        assert!(engine.toolkit().buttons[&1].left.is_some());

        engine.press_button(1, Gesture::Tap);
        assert_eq!(kinds(&engine), vec!["button"]);
        assert_eq!(engine.sink()[0].get("item"), Some("1"));
        assert_eq!(engine.sink()[0].get("page"), None);
        assert!(engine.device().switch_state(1));
        assert!(engine.toolkit().buttons[&1].switch_on);
        assert_eq!(engine.device().tones, vec!["two:d=4:e".to_string()]);

        engine.press_button(1, Gesture::LongPress);
        assert!(engine.device().switch_state(1));
        assert_eq!(engine.device().tones.len(), 1);

        engine.press_button(5, Gesture::Tap);
        assert_eq!(engine.sink().len(), 2);
    }

    #[test]
    fn bar_re_expands_unless_overlay_is_open() {
        let mut engine = engine_with(FakeDevice::default(), 1);
        let start = Instant::now();
        engine.tick(start);

        PageInput::DashboardToggle.deliver(&mut engine);
        assert!(!engine.buttons().is_expanded());
        engine.tick(start + Duration::from_secs(11));
        assert!(engine.buttons().is_expanded());

        engine.dispatch(ControllerEnvelope::ShowMore {
            json_value: json!({"id": "light.a", "features": []}).to_string(),
        });
        engine.tick(start + Duration::from_secs(30));
        assert!(!engine.buttons().is_expanded());
    }

    #[test]
    fn back_returns_to_the_first_page() {
        let mut engine = engine();
        add_page(&mut engine, json!({"cols": 1, "rows": 1}), true);
        add_page(&mut engine, json!({"cols": 1, "rows": 1}), false);
        engine.dispatch(ControllerEnvelope::ShowPage { page: 1 });
        engine.sink_mut().clear();

        PageInput::Back.deliver(&mut engine);
        assert_eq!(engine.pages().active(), 0);
        assert_eq!(kinds(&engine), vec!["page"]);
    }

    #[test]
    fn play_song_reaches_the_buzzer() {
        let mut engine = engine();
        engine.dispatch(ControllerEnvelope::PlaySong {
            song: "scale:d=4:c,d,e".to_string(),
        });
        assert_eq!(engine.device().tones, vec!["scale:d=4:c,d,e".to_string()]);
    }
}
