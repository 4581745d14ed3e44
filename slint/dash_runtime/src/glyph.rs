//! Icon glyph codec and per-size glyph caches.
//!
//! Icons travel as base64 text. Decoded, the first four bytes are the glyph
//! header (left bearing, top bearing, box width, box height), the fifth is a
//! compression flag and the rest is the 1bpp bitmap, either literal or as
//! `(run, byte)` pairs.

use std::collections::{BTreeMap, HashMap};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::debug;

use crate::error::GlyphError;
use crate::pool::{BufferPool, PooledBuffer};

/// Code-points below this belong to ordinary printable text.
pub const CODEPOINT_BASE: u32 = 0x20;

const HEADER_LEN: usize = 5;
const FLAG_RLE: u8 = 1;

#[derive(Debug)]
pub struct GlyphRecord {
    pub left: u8,
    pub top: u8,
    pub box_width: u8,
    pub box_height: u8,
    pub bitmap: PooledBuffer,
}

/// What the font renderer needs to place one glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphDescriptor {
    pub adv_w: u16,
    pub box_w: u16,
    pub box_h: u16,
    pub ofs_x: i32,
    pub ofs_y: i32,
    pub bpp: u8,
}

/// A rendered icon: which size's cache and which code-point inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IconRef {
    pub size: u16,
    pub codepoint: u32,
}

impl IconRef {
    /// The icon as label text for a font bound to its size.
    pub fn text(&self) -> String {
        char::from_u32(self.codepoint).map(String::from).unwrap_or_default()
    }
}

pub fn decode_glyph(encoded: &str, pool: &BufferPool) -> Result<GlyphRecord, GlyphError> {
    let raw = STANDARD.decode(encoded.trim())?;
    if raw.len() < HEADER_LEN {
        return Err(GlyphError::Truncated {
            len: raw.len(),
            min: HEADER_LEN,
        });
    }

    let payload = &raw[HEADER_LEN..];
    let compressed = raw[4] == FLAG_RLE;
    let len = if compressed {
        rle_decoded_len(payload)
    } else {
        payload.len()
    };

    let mut bitmap = pool.acquire(len)?;
    if compressed {
        rle_decode_into(payload, &mut bitmap);
    } else {
        bitmap.copy_from_slice(payload);
    }

    Ok(GlyphRecord {
        left: raw[0],
        top: raw[1],
        box_width: raw[2],
        box_height: raw[3],
        bitmap,
    })
}

/// Total bytes `(run, byte)` pairs expand to. A trailing odd byte is ignored.
pub fn rle_decoded_len(payload: &[u8]) -> usize {
    payload
        .chunks_exact(2)
        .map(|pair| usize::from(pair[0]))
        .sum()
}

/// Expand `(run, byte)` pairs into `out`, stopping when `out` is full.
/// Returns the number of bytes written.
pub fn rle_decode_into(payload: &[u8], out: &mut [u8]) -> usize {
    let mut written = 0;
    for pair in payload.chunks_exact(2) {
        let end = (written + usize::from(pair[0])).min(out.len());
        out[written..end].fill(pair[1]);
        written = end;
        if written == out.len() {
            break;
        }
    }
    written
}

/// Glyphs of one pixel size, addressed by synthetic code-point.
#[derive(Debug)]
pub struct GlyphCache {
    size: u16,
    codes: HashMap<String, u32>,
    glyphs: BTreeMap<u32, GlyphRecord>,
}

impl GlyphCache {
    pub fn new(size: u16) -> Self {
        Self {
            size,
            codes: HashMap::new(),
            glyphs: BTreeMap::new(),
        }
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Register `name`, decoding it only the first time it is seen.
    pub fn add_glyph(
        &mut self,
        name: &str,
        encoded: &str,
        pool: &BufferPool,
    ) -> Result<u32, GlyphError> {
        if let Some(&code) = self.codes.get(name) {
            return Ok(code);
        }

        let record = decode_glyph(encoded, pool)?;
        let code = CODEPOINT_BASE + self.codes.len() as u32 + 1;
        debug!(
            size = self.size,
            name,
            code,
            bytes = record.bitmap.len(),
            "glyph added"
        );
        self.codes.insert(name.to_string(), code);
        self.glyphs.insert(code, record);
        Ok(code)
    }

    pub fn codepoint(&self, name: &str) -> Option<u32> {
        self.codes.get(name).copied()
    }

    pub fn glyph_dsc(&self, codepoint: u32) -> Option<GlyphDescriptor> {
        let glyph = self.glyphs.get(&codepoint)?;
        Some(GlyphDescriptor {
            adv_w: u16::from(glyph.left) + u16::from(glyph.box_width),
            box_w: u16::from(glyph.box_width),
            box_h: u16::from(glyph.box_height),
            ofs_x: i32::from(glyph.left),
            ofs_y: i32::from(self.size) - i32::from(glyph.box_height) - i32::from(glyph.top),
            bpp: 1,
        })
    }

    pub fn glyph_bitmap(&self, codepoint: u32) -> Option<&[u8]> {
        self.glyphs.get(&codepoint).map(|glyph| &*glyph.bitmap)
    }

    pub fn clear(&mut self) {
        self.codes.clear();
        self.glyphs.clear();
    }
}

/// Every glyph cache the engine owns, keyed by pixel size.
#[derive(Debug)]
pub struct FontSet {
    pool: BufferPool,
    fonts: BTreeMap<u16, GlyphCache>,
}

impl FontSet {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            pool,
            fonts: BTreeMap::new(),
        }
    }

    /// Register the icon described by `{name, size, data}`.
    pub fn set_icon(&mut self, icon: &Value) -> Result<IconRef, GlyphError> {
        let name = icon
            .get("name")
            .and_then(Value::as_str)
            .ok_or(GlyphError::MissingField("name"))?;
        let size = icon
            .get("size")
            .and_then(Value::as_u64)
            .and_then(|size| u16::try_from(size).ok())
            .ok_or(GlyphError::MissingField("size"))?;
        let data = icon
            .get("data")
            .and_then(Value::as_str)
            .ok_or(GlyphError::MissingField("data"))?;

        let cache = self
            .fonts
            .entry(size)
            .or_insert_with(|| GlyphCache::new(size));
        let codepoint = cache.add_glyph(name, data, &self.pool)?;
        Ok(IconRef { size, codepoint })
    }

    pub fn cache(&self, size: u16) -> Option<&GlyphCache> {
        self.fonts.get(&size)
    }

    pub fn glyph_dsc(&self, icon: IconRef) -> Option<GlyphDescriptor> {
        self.fonts.get(&icon.size)?.glyph_dsc(icon.codepoint)
    }

    pub fn glyph_bitmap(&self, icon: IconRef) -> Option<&[u8]> {
        self.fonts.get(&icon.size)?.glyph_bitmap(icon.codepoint)
    }

    /// Total glyphs across every size.
    pub fn entry_count(&self) -> usize {
        self.fonts.values().map(GlyphCache::len).sum()
    }

    pub fn clear(&mut self) {
        for cache in self.fonts.values_mut() {
            cache.clear();
        }
        self.fonts.clear();
    }
}

#[cfg(test)]
pub(crate) fn encode_glyph(header: [u8; 4], rle: bool, payload: &[u8]) -> String {
    let mut raw = header.to_vec();
    raw.push(u8::from(rle));
    raw.extend_from_slice(payload);
    STANDARD.encode(raw)
}
