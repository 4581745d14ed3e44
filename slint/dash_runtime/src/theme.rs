//! Style parameters: an immutable boot table and a live table patched from
//! controller documents.
//!
//! A patch is not layered on the previous live table. Every key the patch
//! omits, or carries in a form that does not parse, goes back to its boot
//! value.

use std::fmt;

use serde_json::Value;
use tracing::debug;

/// 24-bit RGB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    pub const fn rgb(value: u32) -> Self {
        Self(value & 0x00FF_FFFF)
    }

    /// `"#rrggbb"` only.
    pub fn parse_hex(text: &str) -> Option<Self> {
        let hex = text.strip_prefix('#')?;
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(hex, 16).ok().map(Self)
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Self::parse_hex(text),
            Value::Number(number) => number
                .as_u64()
                .filter(|&raw| raw <= 0x00FF_FFFF)
                .map(|raw| Self(raw as u32)),
            _ => None,
        }
    }

    pub fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

fn dimension_from_json(value: &Value) -> Option<i32> {
    match value {
        Value::Number(number) => number.as_i64().and_then(|raw| i32::try_from(raw).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThemeKey {
    BgColor,
    TextColor,
    TextOnColor,
    PanelBgColor,
    BtnBgColor,
    BtnPressedColor,
    BtnOnColor,
    SwitchLineColor,
    SwitchPressedLineColor,
    SwitchOnLineColor,
    Padding,
    BorderRadius,
    PressTranslateY,
    BtnLineHeight,
    BtnLineRadius,
    BarHeight,
}

impl ThemeKey {
    pub const ALL: [ThemeKey; 16] = [
        ThemeKey::BgColor,
        ThemeKey::TextColor,
        ThemeKey::TextOnColor,
        ThemeKey::PanelBgColor,
        ThemeKey::BtnBgColor,
        ThemeKey::BtnPressedColor,
        ThemeKey::BtnOnColor,
        ThemeKey::SwitchLineColor,
        ThemeKey::SwitchPressedLineColor,
        ThemeKey::SwitchOnLineColor,
        ThemeKey::Padding,
        ThemeKey::BorderRadius,
        ThemeKey::PressTranslateY,
        ThemeKey::BtnLineHeight,
        ThemeKey::BtnLineRadius,
        ThemeKey::BarHeight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ThemeKey::BgColor => "bg_color",
            ThemeKey::TextColor => "text_color",
            ThemeKey::TextOnColor => "text_on_color",
            ThemeKey::PanelBgColor => "panel_bg_color",
            ThemeKey::BtnBgColor => "btn_bg_color",
            ThemeKey::BtnPressedColor => "btn_pressed_color",
            ThemeKey::BtnOnColor => "btn_on_color",
            ThemeKey::SwitchLineColor => "switch_line_color",
            ThemeKey::SwitchPressedLineColor => "switch_pressed_line_color",
            ThemeKey::SwitchOnLineColor => "switch_on_line_color",
            ThemeKey::Padding => "padding",
            ThemeKey::BorderRadius => "border_radius",
            ThemeKey::PressTranslateY => "press_translate_y",
            ThemeKey::BtnLineHeight => "btn_line_height",
            ThemeKey::BtnLineRadius => "btn_line_radius",
            ThemeKey::BarHeight => "bar_height",
        }
    }

    pub fn is_color(self) -> bool {
        !matches!(
            self,
            ThemeKey::Padding
                | ThemeKey::BorderRadius
                | ThemeKey::PressTranslateY
                | ThemeKey::BtnLineHeight
                | ThemeKey::BtnLineRadius
                | ThemeKey::BarHeight
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeValue {
    Color(Color),
    Dimension(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeParameters {
    pub bg_color: Color,
    pub text_color: Color,
    pub text_on_color: Color,
    pub panel_bg_color: Color,
    pub btn_bg_color: Color,
    pub btn_pressed_color: Color,
    pub btn_on_color: Color,
    pub switch_line_color: Color,
    pub switch_pressed_line_color: Color,
    pub switch_on_line_color: Color,
    pub padding: i32,
    pub border_radius: i32,
    pub press_translate_y: i32,
    pub btn_line_height: i32,
    pub btn_line_radius: i32,
    pub bar_height: i32,
}

impl Default for ThemeParameters {
    fn default() -> Self {
        Self {
            bg_color: Color::rgb(0x21_21_21),
            text_color: Color::rgb(0xFF_FF_FF),
            text_on_color: Color::rgb(0x00_00_00),
            panel_bg_color: Color::rgb(0x42_42_42),
            btn_bg_color: Color::rgb(0x61_61_61),
            btn_pressed_color: Color::rgb(0x75_75_75),
            btn_on_color: Color::rgb(0xFF_EB_3B),
            switch_line_color: Color::rgb(0x00_96_88),
            switch_pressed_line_color: Color::rgb(0x21_96_F3),
            switch_on_line_color: Color::rgb(0xFF_98_00),
            padding: 8,
            border_radius: 7,
            press_translate_y: 3,
            btn_line_height: 7,
            btn_line_radius: 3,
            bar_height: 35,
        }
    }
}

impl ThemeParameters {
    pub fn get(&self, key: ThemeKey) -> ThemeValue {
        match key {
            ThemeKey::BgColor => ThemeValue::Color(self.bg_color),
            ThemeKey::TextColor => ThemeValue::Color(self.text_color),
            ThemeKey::TextOnColor => ThemeValue::Color(self.text_on_color),
            ThemeKey::PanelBgColor => ThemeValue::Color(self.panel_bg_color),
            ThemeKey::BtnBgColor => ThemeValue::Color(self.btn_bg_color),
            ThemeKey::BtnPressedColor => ThemeValue::Color(self.btn_pressed_color),
            ThemeKey::BtnOnColor => ThemeValue::Color(self.btn_on_color),
            ThemeKey::SwitchLineColor => ThemeValue::Color(self.switch_line_color),
            ThemeKey::SwitchPressedLineColor => ThemeValue::Color(self.switch_pressed_line_color),
            ThemeKey::SwitchOnLineColor => ThemeValue::Color(self.switch_on_line_color),
            ThemeKey::Padding => ThemeValue::Dimension(self.padding),
            ThemeKey::BorderRadius => ThemeValue::Dimension(self.border_radius),
            ThemeKey::PressTranslateY => ThemeValue::Dimension(self.press_translate_y),
            ThemeKey::BtnLineHeight => ThemeValue::Dimension(self.btn_line_height),
            ThemeKey::BtnLineRadius => ThemeValue::Dimension(self.btn_line_radius),
            ThemeKey::BarHeight => ThemeValue::Dimension(self.bar_height),
        }
    }

    fn color_mut(&mut self, key: ThemeKey) -> Option<&mut Color> {
        Some(match key {
            ThemeKey::BgColor => &mut self.bg_color,
            ThemeKey::TextColor => &mut self.text_color,
            ThemeKey::TextOnColor => &mut self.text_on_color,
            ThemeKey::PanelBgColor => &mut self.panel_bg_color,
            ThemeKey::BtnBgColor => &mut self.btn_bg_color,
            ThemeKey::BtnPressedColor => &mut self.btn_pressed_color,
            ThemeKey::BtnOnColor => &mut self.btn_on_color,
            ThemeKey::SwitchLineColor => &mut self.switch_line_color,
            ThemeKey::SwitchPressedLineColor => &mut self.switch_pressed_line_color,
            ThemeKey::SwitchOnLineColor => &mut self.switch_on_line_color,
            _ => return None,
        })
    }

    fn dimension_mut(&mut self, key: ThemeKey) -> Option<&mut i32> {
        Some(match key {
            ThemeKey::Padding => &mut self.padding,
            ThemeKey::BorderRadius => &mut self.border_radius,
            ThemeKey::PressTranslateY => &mut self.press_translate_y,
            ThemeKey::BtnLineHeight => &mut self.btn_line_height,
            ThemeKey::BtnLineRadius => &mut self.btn_line_radius,
            ThemeKey::BarHeight => &mut self.bar_height,
            _ => return None,
        })
    }

    /// Store `value` under `key`. Returns false when the value has the wrong
    /// form for the key.
    fn set_from_json(&mut self, key: ThemeKey, value: &Value) -> bool {
        if let Some(slot) = self.color_mut(key) {
            if let Some(color) = Color::from_json(value) {
                *slot = color;
                return true;
            }
        } else if let Some(slot) = self.dimension_mut(key) {
            if let Some(dimension) = dimension_from_json(value) {
                *slot = dimension;
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThemeModel {
    boot: ThemeParameters,
    live: ThemeParameters,
}

impl ThemeModel {
    pub fn new(boot: ThemeParameters) -> Self {
        Self {
            live: boot.clone(),
            boot,
        }
    }

    pub fn boot(&self) -> &ThemeParameters {
        &self.boot
    }

    pub fn live(&self) -> &ThemeParameters {
        &self.live
    }

    /// Rebuild the live table from `doc` over the boot defaults. Returns the
    /// number of keys taken from the document.
    pub fn apply_patch(&mut self, doc: &Value) -> usize {
        let mut live = self.boot.clone();
        let mut applied = 0;
        for key in ThemeKey::ALL {
            let Some(value) = doc.get(key.name()) else {
                continue;
            };
            if live.set_from_json(key, value) {
                applied += 1;
            } else {
                debug!(key = key.name(), %value, "malformed theme value, using boot default");
            }
        }
        self.live = live;
        applied
    }

    /// Background of an item styled by `{ctype, col}`.
    pub fn background_for(&self, style: &ColorStyle) -> Color {
        let theme = &self.live;
        if style.color.is_empty() || style.mode == "text" {
            return theme.btn_bg_color;
        }
        if style.color == "on" {
            return theme.btn_on_color;
        }
        Color::parse_hex(&style.color).unwrap_or(theme.btn_bg_color)
    }

    /// Text color of an item styled by `{ctype, col}`. A colored background
    /// gets dark text.
    pub fn foreground_for(&self, style: &ColorStyle) -> Color {
        let theme = &self.live;
        if style.color.is_empty() {
            return theme.text_color;
        }
        if style.mode == "text" {
            if style.color == "on" {
                return theme.btn_on_color;
            }
            return Color::parse_hex(&style.color).unwrap_or(theme.text_color);
        }
        theme.bg_color
    }
}

/// The `ctype`/`col` pair an item document styles itself with. Kept as text
/// so a theme change can resolve it again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorStyle {
    pub mode: String,
    pub color: String,
}

impl ColorStyle {
    pub fn from_doc(doc: &Value) -> Self {
        let field = |key: &str| {
            doc.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            mode: field("ctype"),
            color: field("col"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn colors_parse_from_hex_and_integers() {
        assert_eq!(Color::parse_hex("#ff8000"), Some(Color(0xFF8000)));
        assert_eq!(Color::parse_hex("ff8000"), None);
        assert_eq!(Color::parse_hex("#ff80"), None);
        assert_eq!(Color::parse_hex("#gg0000"), None);
        assert_eq!(Color::from_json(&json!(0x123456)), Some(Color(0x123456)));
        assert_eq!(Color::from_json(&json!(0x1000000)), None);
        assert_eq!(Color(0x0a0b0c).to_string(), "#0a0b0c");
    }

    #[test]
    fn patch_sets_present_keys() {
        let mut theme = ThemeModel::default();
        let applied = theme.apply_patch(&json!({"bg_color": "#101010", "padding": 12}));
        assert_eq!(applied, 2);
        assert_eq!(theme.live().bg_color, Color(0x101010));
        assert_eq!(theme.live().padding, 12);
        assert_eq!(theme.live().text_color, theme.boot().text_color);
    }

    #[test]
    fn omitted_key_resets_to_boot_default() {
        let mut theme = ThemeModel::default();
        theme.apply_patch(&json!({"btn_on_color": "#00ff00", "bar_height": 50}));
        assert_eq!(theme.live().btn_on_color, Color(0x00ff00));

        theme.apply_patch(&json!({"bar_height": 50}));
        assert_eq!(theme.live().btn_on_color, theme.boot().btn_on_color);
        assert_eq!(theme.live().bar_height, 50);
    }

    #[test]
    fn malformed_values_fall_back_to_boot_default() {
        let mut theme = ThemeModel::default();
        theme.apply_patch(&json!({"text_color": "#00ff00", "padding": 4}));

        let applied = theme.apply_patch(&json!({
            "text_color": "green",
            "padding": "wide",
            "border_radius": "11",
        }));
        assert_eq!(applied, 1);
        assert_eq!(theme.live().text_color, theme.boot().text_color);
        assert_eq!(theme.live().padding, theme.boot().padding);
        assert_eq!(theme.live().border_radius, 11);
    }

    #[test]
    fn every_key_round_trips_through_get() {
        let theme = ThemeParameters::default();
        for key in ThemeKey::ALL {
            let value = theme.get(key);
            assert_eq!(matches!(value, ThemeValue::Color(_)), key.is_color(), "{}", key.name());
        }
    }

    #[test]
    fn item_colors_follow_ctype_and_col() {
        let theme = ThemeModel::default();
        let live = theme.live().clone();

        let style = |doc: serde_json::Value| ColorStyle::from_doc(&doc);

        let plain = style(json!({}));
        assert_eq!(theme.background_for(&plain), live.btn_bg_color);
        assert_eq!(theme.foreground_for(&plain), live.text_color);

        let on = style(json!({"col": "on"}));
        assert_eq!(theme.background_for(&on), live.btn_on_color);
        assert_eq!(theme.foreground_for(&on), live.bg_color);

        let literal = style(json!({"col": "#336699"}));
        assert_eq!(theme.background_for(&literal), Color(0x336699));
        assert_eq!(theme.foreground_for(&literal), live.bg_color);

        let text_on = style(json!({"ctype": "text", "col": "on"}));
        assert_eq!(theme.background_for(&text_on), live.btn_bg_color);
        assert_eq!(theme.foreground_for(&text_on), live.btn_on_color);

        let text_literal = style(json!({"ctype": "text", "col": "#336699"}));
        assert_eq!(theme.foreground_for(&text_literal), Color(0x336699));

        let garbage = style(json!({"col": "blue"}));
        assert_eq!(theme.background_for(&garbage), live.btn_bg_color);
    }
}
