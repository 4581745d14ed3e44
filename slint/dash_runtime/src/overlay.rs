//! The detail overlay: fine-grained controls for one entity.

use serde_json::Value;
use tracing::{debug, warn};

use crate::assembler::ChunkedBufferAssembler;
use crate::error::AssemblyError;
use crate::item::{ImageHeader, text_field};
use crate::pool::BufferPool;
use crate::toolkit::Toolkit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureControl {
    Slider { min: i32, max: i32, value: i32 },
    Toggle { on: bool },
    Image(ImageHeader),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayFeature {
    pub id: String,
    pub control: FeatureControl,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayView {
    pub entity_id: String,
    pub title: String,
    pub features: Vec<OverlayFeature>,
}

/// Image data the overlay wants from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDataRequest {
    pub entity_id: String,
    pub feature_id: String,
}

/// A control change to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureChange {
    pub entity_id: String,
    pub feature_id: String,
    pub value: i32,
}

#[derive(Debug)]
pub struct DetailOverlay {
    view: Option<OverlayView>,
    image_feature: Option<usize>,
    assembler: ChunkedBufferAssembler,
}

impl DetailOverlay {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            view: None,
            image_feature: None,
            assembler: ChunkedBufferAssembler::new(pool),
        }
    }

    pub fn is_open(&self) -> bool {
        self.view.is_some()
    }

    pub fn view(&self) -> Option<&OverlayView> {
        self.view.as_ref()
    }

    /// Replace the overlay content with `{id, title, features}`. Unknown
    /// feature types are skipped.
    pub fn open(&mut self, doc: &Value) -> (&OverlayView, Option<FeatureDataRequest>) {
        self.assembler.reset();
        self.image_feature = None;

        let entity_id = text_field(doc, "id");
        let mut features = Vec::new();
        let mut request = None;
        let entries = doc.get("features").and_then(Value::as_array);
        for entry in entries.into_iter().flatten() {
            let id = text_field(entry, "id");
            let control = match entry.get("type").and_then(Value::as_str) {
                Some("slider") => {
                    let min = i32_field(entry, "min").unwrap_or(0);
                    let max = i32_field(entry, "max").unwrap_or(100).max(min);
                    let value = i32_field(entry, "value").unwrap_or(min).clamp(min, max);
                    FeatureControl::Slider { min, max, value }
                }
                Some("toggle") => FeatureControl::Toggle {
                    on: entry.get("value").and_then(Value::as_bool).unwrap_or(false),
                },
                Some("image") => {
                    let Some(header) = ImageHeader::from_doc(entry) else {
                        debug!(feature = %id, "image feature without size");
                        continue;
                    };
                    if self.image_feature.is_none() {
                        self.image_feature = Some(features.len());
                        request = Some(FeatureDataRequest {
                            entity_id: entity_id.clone(),
                            feature_id: id.clone(),
                        });
                    }
                    FeatureControl::Image(header)
                }
                other => {
                    debug!(kind = ?other, "unknown overlay feature");
                    continue;
                }
            };
            features.push(OverlayFeature { id, control });
        }

        let view: &OverlayView = self.view.insert(OverlayView {
            entity_id,
            title: text_field(doc, "title"),
            features,
        });
        (view, request)
    }

    pub fn close(&mut self) {
        self.view = None;
        self.image_feature = None;
        self.assembler.reset();
    }

    /// Feed the overlay's image. Ignored while closed.
    pub fn set_data(
        &mut self,
        offset: usize,
        total: usize,
        data: &[u8],
        toolkit: &mut impl Toolkit,
    ) -> Result<bool, AssemblyError> {
        let Some(view) = self.view.as_ref() else {
            debug!("overlay data while closed");
            return Ok(false);
        };
        if !self.assembler.begin_or_continue(offset, total, data)? {
            return Ok(false);
        }

        let image = self.image_feature.and_then(|index| {
            match view.features.get(index).map(|feature| &feature.control) {
                Some(FeatureControl::Image(header)) => Some((index, *header)),
                _ => None,
            }
        });
        match (image, self.assembler.assembled()) {
            (Some((index, header)), Some(pixels)) if pixels.len() == header.byte_len() => {
                toolkit.set_overlay_image(index, header, pixels);
            }
            (Some((_, header)), Some(pixels)) => warn!(
                expected = header.byte_len(),
                got = pixels.len(),
                "overlay image size does not match header"
            ),
            _ => warn!("overlay data without an image feature"),
        }
        Ok(true)
    }

    /// Map a control change to its report. Toggles report 0 or 1, the `bri`
    /// and `value` sliders report their position, anything else reports 0.
    pub fn change(&mut self, feature: usize, value: i32) -> Option<FeatureChange> {
        let view = self.view.as_mut()?;
        let entry = view.features.get_mut(feature)?;
        let reported = match &mut entry.control {
            FeatureControl::Toggle { on } => {
                *on = value != 0;
                i32::from(*on)
            }
            FeatureControl::Slider { min, max, value: position } => {
                *position = value.clamp(*min, *max);
                if entry.id == "bri" || entry.id == "value" {
                    *position
                } else {
                    0
                }
            }
            FeatureControl::Image(_) => return None,
        };
        Some(FeatureChange {
            entity_id: view.entity_id.clone(),
            feature_id: entry.id.clone(),
            value: reported,
        })
    }
}

fn i32_field(doc: &Value, key: &str) -> Option<i32> {
    doc.get(key)
        .and_then(|raw| raw.as_i64().or_else(|| raw.as_f64().map(|f| f.round() as i64)))
        .and_then(|raw| i32::try_from(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingToolkit;
    use serde_json::json;

    fn overlay() -> DetailOverlay {
        DetailOverlay::new(BufferPool::new(1 << 12))
    }

    fn light_doc() -> Value {
        json!({
            "id": "light.kitchen",
            "title": "Kitchen",
            "features": [
                {"type": "slider", "id": "bri", "min": 0, "max": 255, "value": 128},
                {"type": "toggle", "id": "toggle", "value": true},
                {"type": "dial", "id": "hue"},
                {"type": "image", "id": "camera", "width": 2, "height": 1},
                {"type": "slider", "id": "color_temp", "min": 153, "max": 500},
            ],
        })
    }

    #[test]
    fn open_builds_features_and_requests_image() {
        let mut overlay = overlay();
        let (view, request) = overlay.open(&light_doc());
        assert_eq!(view.title, "Kitchen");
        assert_eq!(view.features.len(), 4);
        assert_eq!(
            view.features[0].control,
            FeatureControl::Slider { min: 0, max: 255, value: 128 }
        );
        assert_eq!(
            request,
            Some(FeatureDataRequest {
                entity_id: "light.kitchen".to_string(),
                feature_id: "camera".to_string(),
            })
        );
        assert!(overlay.is_open());
    }

    #[test]
    fn changes_map_feature_index_to_id() {
        let mut overlay = overlay();
        overlay.open(&light_doc());

        let bri = overlay.change(0, 200).expect("slider");
        assert_eq!((bri.feature_id.as_str(), bri.value), ("bri", 200));

        let toggle = overlay.change(1, 0).expect("toggle");
        assert_eq!((toggle.feature_id.as_str(), toggle.value), ("toggle", 0));
        assert_eq!(toggle.entity_id, "light.kitchen");

        let other = overlay.change(3, 300).expect("other slider");
        assert_eq!((other.feature_id.as_str(), other.value), ("color_temp", 0));

        assert_eq!(overlay.change(2, 1), None);
        assert_eq!(overlay.change(9, 1), None);
    }

    #[test]
    fn image_data_only_lands_while_open() {
        let mut overlay = overlay();
        let mut toolkit = RecordingToolkit::default();

        assert_eq!(overlay.set_data(0, 4, &[0; 4], &mut toolkit), Ok(false));
        assert!(toolkit.overlay_images.is_empty());

        overlay.open(&light_doc());
        assert_eq!(overlay.set_data(0, 4, &[1, 2, 3, 4], &mut toolkit), Ok(true));
        assert_eq!(toolkit.overlay_images.len(), 1);
        assert_eq!(toolkit.overlay_images[0].0, 2);

        overlay.close();
        assert!(!overlay.is_open());
        assert_eq!(overlay.change(0, 1), None);
    }
}
