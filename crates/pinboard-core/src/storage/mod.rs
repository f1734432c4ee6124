//! Board documents on disk.
//!
//! A document is JSON holding one record per item: its persistent save id,
//! transform, crop, filename and the source pixels as base64 PNG.

mod file;

pub use file::{DOCUMENT_EXTENSION, read_board_file, write_document};

use crate::item::{ExtraSaveData, Flip, Item, ItemId};
use image::RgbaImage;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Current document format version.
pub const FORMAT_VERSION: u32 = 1;

/// Top-level document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardFile {
    pub version: u32,
    pub items: Vec<ItemRecord>,
}

impl BoardFile {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// One stored item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub save_id: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub scale: f64,
    pub rotation: f64,
    /// 1 or -1.
    pub flip: f64,
    #[serde(flatten)]
    pub extra: ExtraSaveData,
    /// Base64 PNG of the source pixels.
    pub image: String,
}

impl ItemRecord {
    /// Decode the stored image and build a snapshot.
    pub fn decode(&self) -> StorageResult<ItemSnapshot> {
        use base64::{Engine, engine::general_purpose::STANDARD};

        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(StorageError::Serialization(format!(
                "Item {} has invalid scale {}",
                self.save_id, self.scale
            )));
        }
        let png = STANDARD
            .decode(&self.image)
            .map_err(|e| StorageError::Serialization(format!("Item {} image: {}", self.save_id, e)))?;
        let pixels = image::load_from_memory(&png)
            .map_err(|e| StorageError::Serialization(format!("Item {} image: {}", self.save_id, e)))?
            .to_rgba8();
        let [x, y, w, h] = self.extra.crop;

        Ok(ItemSnapshot {
            id: uuid::Uuid::new_v4(),
            save_id: Some(self.save_id),
            position: Point::new(self.x, self.y),
            z: self.z,
            scale: self.scale,
            rotation: self.rotation,
            flip: Flip::from_sign(self.flip),
            crop: Rect::new(x, y, x + w, y + h),
            filename: self.extra.filename.clone(),
            pixels: Arc::new(pixels),
        })
    }
}

/// Plain copy of an item's persistent state. Cheap to clone and safe to
/// send to a worker thread.
#[derive(Debug, Clone)]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub save_id: Option<i64>,
    pub position: Point,
    pub z: f64,
    pub scale: f64,
    pub rotation: f64,
    pub flip: Flip,
    pub crop: Rect,
    pub filename: Option<String>,
    pub pixels: Arc<RgbaImage>,
}

impl ItemSnapshot {
    pub fn from_item(item: &Item) -> Self {
        Self {
            id: item.id(),
            save_id: item.save_id(),
            position: item.position,
            z: item.z,
            scale: item.scale(),
            rotation: item.rotation(),
            flip: item.flip(),
            crop: item.crop(),
            filename: item.filename.clone(),
            pixels: item.shared_pixels(),
        }
    }

    /// Build a fresh item. The runtime id is new; the save id carries over.
    pub fn into_item(self) -> Item {
        let mut item = Item::from_shared(self.pixels, self.filename);
        item.position = self.position;
        item.z = self.z;
        item.set_scale(self.scale);
        item.set_rotation(self.rotation);
        item.set_flip(self.flip);
        item.set_crop(self.crop);
        if let Some(save_id) = self.save_id {
            item.assign_save_id(save_id);
        }
        item
    }

    fn extra_save_data(&self) -> ExtraSaveData {
        ExtraSaveData {
            filename: self.filename.clone(),
            crop: [self.crop.x0, self.crop.y0, self.crop.width(), self.crop.height()],
        }
    }

    fn to_record(&self, save_id: i64, image: String) -> ItemRecord {
        ItemRecord {
            save_id,
            x: self.position.x,
            y: self.position.y,
            z: self.z,
            scale: self.scale,
            rotation: self.rotation,
            flip: self.flip.sign(),
            extra: self.extra_save_data(),
            image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_into_item() {
        let mut item = Item::new(RgbaImage::new(20, 10), Some("a.png".to_string()));
        item.position = Point::new(3.0, 4.0);
        item.z = 2.0;
        item.set_scale(1.5);
        item.set_rotation(45.0);
        item.set_flip(Flip::Mirrored);
        item.set_crop(Rect::new(1.0, 1.0, 10.0, 9.0));
        item.assign_save_id(7);

        let restored = ItemSnapshot::from_item(&item).into_item();
        assert_ne!(restored.id(), item.id());
        assert_eq!(restored.save_id(), Some(7));
        assert_eq!(restored.placement(), item.placement());
        assert_eq!(restored.crop(), item.crop());
        assert_eq!(restored.z, 2.0);
        assert_eq!(restored.filename.as_deref(), Some("a.png"));
    }

    #[test]
    fn test_record_json_layout() {
        let item = Item::new(RgbaImage::new(2, 2), Some("b.png".to_string()));
        let record = ItemSnapshot::from_item(&item).to_record(3, "AAAA".to_string());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["save_id"], 3);
        assert_eq!(json["flip"], 1.0);
        assert_eq!(json["filename"], "b.png");
        assert_eq!(json["crop"], serde_json::json!([0.0, 0.0, 2.0, 2.0]));
    }

    #[test]
    fn test_decode_rejects_bad_records() {
        let item = Item::new(RgbaImage::new(2, 2), None);
        let mut record = ItemSnapshot::from_item(&item).to_record(1, "%%%".to_string());
        assert!(matches!(record.decode(), Err(StorageError::Serialization(_))));

        record.image = String::new();
        record.scale = 0.0;
        assert!(matches!(record.decode(), Err(StorageError::Serialization(_))));
    }
}
