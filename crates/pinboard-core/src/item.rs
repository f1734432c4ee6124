//! Image items placed on the board.

use image::RgbaImage;
use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Runtime identifier for items. Stable for the lifetime of a session,
/// unlike [`Item::save_id`] which is stable across save/load.
pub type ItemId = Uuid;

/// Horizontal mirroring of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Flip {
    #[default]
    Normal,
    Mirrored,
}

impl Flip {
    /// The sign applied to the x axis (1 or -1).
    pub fn sign(self) -> f64 {
        match self {
            Flip::Normal => 1.0,
            Flip::Mirrored => -1.0,
        }
    }

    /// Build from a stored sign. Anything negative is mirrored.
    pub fn from_sign(sign: f64) -> Self {
        if sign < 0.0 { Flip::Mirrored } else { Flip::Normal }
    }

    pub fn toggled(self) -> Self {
        match self {
            Flip::Normal => Flip::Mirrored,
            Flip::Mirrored => Flip::Normal,
        }
    }
}

/// The transform-related part of an item's state.
///
/// Commands snapshot this before changing rotation, flip or scale so the
/// inverse can restore it bit for bit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Point,
    pub scale: f64,
    pub rotation: f64,
    pub flip: Flip,
}

/// Extra per-item data stored alongside the transform in a saved board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraSaveData {
    pub filename: Option<String>,
    pub crop: [f64; 4],
}

/// A placed image on the board.
#[derive(Debug, Clone)]
pub struct Item {
    pub(crate) id: ItemId,
    /// Scene position of the item's local origin.
    pub position: Point,
    /// Stacking order, higher is drawn on top.
    pub z: f64,
    scale: f64,
    /// Rotation in degrees, normalized to `[0, 360)`.
    rotation: f64,
    flip: Flip,
    /// Visible region in local, unscaled pixel coordinates.
    crop: Rect,
    save_id: Option<i64>,
    pixels: Arc<RgbaImage>,
    /// Where the image came from, if known.
    pub filename: Option<String>,
}

impl Item {
    /// Create an item from decoded pixels. The crop covers the whole image.
    pub fn new(pixels: RgbaImage, filename: Option<String>) -> Self {
        Self::from_shared(Arc::new(pixels), filename)
    }

    pub(crate) fn from_shared(pixels: Arc<RgbaImage>, filename: Option<String>) -> Self {
        let crop = Rect::new(0.0, 0.0, pixels.width() as f64, pixels.height() as f64);
        Self {
            id: Uuid::new_v4(),
            position: Point::ZERO,
            z: 0.0,
            scale: 1.0,
            rotation: 0.0,
            flip: Flip::Normal,
            crop,
            save_id: None,
            pixels,
            filename,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Pixel width of the source image.
    pub fn width(&self) -> f64 {
        self.pixels.width() as f64
    }

    /// Pixel height of the source image.
    pub fn height(&self) -> f64 {
        self.pixels.height() as f64
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub(crate) fn shared_pixels(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.pixels)
    }

    /// Full unscaled bounds of the source pixels.
    pub fn full_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width(), self.height())
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Set the scale factor, leaving the position untouched.
    ///
    /// # Panics
    /// If `scale` is not a finite positive number.
    pub fn set_scale(&mut self, scale: f64) {
        assert!(
            scale.is_finite() && scale > 0.0,
            "item scale must be positive, got {scale}"
        );
        self.scale = scale;
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Set the rotation in degrees around the local origin.
    pub fn set_rotation(&mut self, degrees: f64) {
        self.rotation = degrees.rem_euclid(360.0);
    }

    pub fn flip(&self) -> Flip {
        self.flip
    }

    pub fn set_flip(&mut self, flip: Flip) {
        self.flip = flip;
    }

    pub fn crop(&self) -> Rect {
        self.crop
    }

    /// Set the crop rect. It is clipped to the pixel bounds; an empty
    /// result falls back to the full image.
    pub fn set_crop(&mut self, crop: Rect) {
        let clipped = crop.abs().intersect(self.full_rect());
        self.crop = if clipped.width() > 0.0 && clipped.height() > 0.0 {
            clipped
        } else {
            self.full_rect()
        };
    }

    pub fn reset_crop(&mut self) {
        self.crop = self.full_rect();
    }

    pub fn save_id(&self) -> Option<i64> {
        self.save_id
    }

    /// Assign the persistent id. Once set it never changes; returns
    /// `false` if a different id was already assigned.
    pub fn assign_save_id(&mut self, save_id: i64) -> bool {
        match self.save_id {
            None => {
                self.save_id = Some(save_id);
                true
            }
            Some(existing) => existing == save_id,
        }
    }

    pub fn placement(&self) -> Placement {
        Placement {
            position: self.position,
            scale: self.scale,
            rotation: self.rotation,
            flip: self.flip,
        }
    }

    pub fn set_placement(&mut self, placement: Placement) {
        self.position = placement.position;
        self.set_scale(placement.scale);
        self.set_rotation(placement.rotation);
        self.flip = placement.flip;
    }

    /// Local-to-scene transform.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.position.to_vec2())
            * Affine::rotate(self.rotation.to_radians())
            * Affine::scale(self.scale)
            * Affine::scale_non_uniform(self.flip.sign(), 1.0)
    }

    pub fn map_to_scene(&self, local: Point) -> Point {
        self.transform() * local
    }

    pub fn map_from_scene(&self, scene: Point) -> Point {
        self.transform().inverse() * scene
    }

    /// Axis-aligned scene bounds of the visible (cropped) region.
    pub fn bounds(&self) -> Rect {
        self.transform().transform_rect_bbox(self.crop)
    }

    /// Size of the cropped region after scaling, ignoring rotation.
    pub fn rendered_size(&self) -> Size {
        Size::new(self.crop.width() * self.scale, self.crop.height() * self.scale)
    }

    /// Scene position of the center of the visible region.
    pub fn center(&self) -> Point {
        self.map_to_scene(self.crop.center())
    }

    /// Local bounds used for layout and painting.
    ///
    /// While cropping, the whole image is shown plus half a unit on each
    /// side so the crop frame is never clipped.
    pub fn bounding_rect_unselected(&self, crop_mode: bool) -> Rect {
        if crop_mode {
            self.full_rect().inflate(0.5, 0.5)
        } else {
            self.crop
        }
    }

    /// Move the item so the center of its visible region lands on `center`.
    pub fn set_pos_center(&mut self, center: Point) {
        let offset = self.center() - self.position;
        self.position = center - offset;
    }

    pub fn move_by(&mut self, delta: Vec2) {
        self.position += delta;
    }

    /// Apply `change` while keeping the visual center in place.
    fn keep_center(&mut self, change: impl FnOnce(&mut Self)) {
        let before = self.center();
        change(self);
        let after = self.center();
        self.position += before - after;
    }

    pub fn set_rotation_about_center(&mut self, degrees: f64) {
        self.keep_center(|item| item.set_rotation(degrees));
    }

    pub fn set_scale_about_center(&mut self, scale: f64) {
        self.keep_center(|item| item.set_scale(scale));
    }

    pub fn set_flip_about_center(&mut self, flip: Flip) {
        self.keep_center(|item| item.flip = flip);
    }

    /// Mirror the item in place. A vertical flip is a horizontal flip
    /// followed by a half turn.
    pub fn flip_about_center(&mut self, vertical: bool) {
        self.keep_center(|item| {
            item.flip = item.flip.toggled();
            if vertical {
                item.set_rotation(item.rotation + 180.0);
            }
        });
    }

    /// Hit test in scene coordinates against the visible region.
    pub fn contains(&self, scene_point: Point) -> bool {
        self.crop.contains(self.map_from_scene(scene_point))
    }

    pub fn extra_save_data(&self) -> ExtraSaveData {
        ExtraSaveData {
            filename: self.filename.clone(),
            crop: [self.crop.x0, self.crop.y0, self.crop.width(), self.crop.height()],
        }
    }

    /// A copy with a fresh id and no save id. Pixels are shared.
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4();
        copy.save_id = None;
        copy
    }

    /// Encode the source pixels as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, png::EncodingError> {
        encode_png(&self.pixels)
    }
}

/// Encode RGBA pixels as an 8-bit PNG.
pub fn encode_png(pixels: &RgbaImage) -> Result<Vec<u8>, png::EncodingError> {
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, pixels.width(), pixels.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(pixels.as_raw())?;
    }
    Ok(png_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(width: u32, height: u32) -> Item {
        Item::new(RgbaImage::new(width, height), Some("test.png".to_string()))
    }

    fn assert_point_eq(a: Point, b: Point) {
        assert!((a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9, "{a:?} != {b:?}");
    }

    #[test]
    fn test_new_item() {
        let item = item(3, 3);
        assert_eq!(item.save_id(), None);
        assert_eq!(item.width(), 3.0);
        assert_eq!(item.height(), 3.0);
        assert_eq!(item.scale(), 1.0);
        assert_eq!(item.crop(), Rect::new(0.0, 0.0, 3.0, 3.0));
        assert_eq!(item.filename.as_deref(), Some("test.png"));
    }

    #[test]
    fn test_set_pos_center() {
        let mut item = item(200, 100);
        item.set_pos_center(Point::ZERO);
        assert_point_eq(item.position, Point::new(-100.0, -50.0));
    }

    #[test]
    fn test_set_pos_center_when_scaled() {
        let mut item = item(200, 100);
        item.set_scale(2.0);
        item.set_pos_center(Point::ZERO);
        assert_point_eq(item.position, Point::new(-200.0, -100.0));
    }

    #[test]
    fn test_set_pos_center_when_rotated() {
        let mut item = item(200, 100);
        item.set_rotation(90.0);
        item.set_pos_center(Point::ZERO);
        assert_point_eq(item.position, Point::new(50.0, -100.0));
    }

    #[test]
    fn test_bounding_rect_unselected() {
        let mut item = item(3, 3);
        item.set_crop(Rect::new(1.0, 1.0, 3.0, 3.0));
        assert_eq!(item.bounding_rect_unselected(false), Rect::new(1.0, 1.0, 3.0, 3.0));
        assert_eq!(item.bounding_rect_unselected(true), Rect::new(-0.5, -0.5, 3.5, 3.5));
    }

    #[test]
    fn test_set_crop_clips_to_pixels() {
        let mut item = item(100, 80);
        item.set_crop(Rect::new(-10.0, 20.0, 150.0, 60.0));
        assert_eq!(item.crop(), Rect::new(0.0, 20.0, 100.0, 60.0));

        item.set_crop(Rect::new(200.0, 200.0, 300.0, 300.0));
        assert_eq!(item.crop(), item.full_rect());
    }

    #[test]
    fn test_reset_crop() {
        let mut item = item(3, 3);
        item.set_crop(Rect::new(1.0, 1.0, 2.0, 2.0));
        item.reset_crop();
        assert_eq!(item.crop(), Rect::new(0.0, 0.0, 3.0, 3.0));
    }

    #[test]
    fn test_extra_save_data() {
        let mut item = item(100, 100);
        item.filename = Some("foobar.png".to_string());
        item.set_crop(Rect::new(10.0, 20.0, 40.0, 60.0));
        assert_eq!(
            item.extra_save_data(),
            ExtraSaveData {
                filename: Some("foobar.png".to_string()),
                crop: [10.0, 20.0, 30.0, 40.0],
            }
        );
    }

    #[test]
    fn test_save_id_is_immutable() {
        let mut item = item(2, 2);
        assert!(item.assign_save_id(3));
        assert!(item.assign_save_id(3));
        assert!(!item.assign_save_id(4));
        assert_eq!(item.save_id(), Some(3));
    }

    #[test]
    fn test_flip_keeps_center() {
        let mut item = item(40, 20);
        item.position = Point::new(5.0, 7.0);
        item.set_rotation(30.0);
        let center = item.center();
        let bounds = item.bounds();

        item.flip_about_center(false);
        assert_eq!(item.flip(), Flip::Mirrored);
        assert_point_eq(item.center(), center);

        item.flip_about_center(true);
        assert_eq!(item.flip(), Flip::Normal);
        assert!((item.rotation() - 210.0).abs() < 1e-9);
        assert_point_eq(item.center(), center);
        assert!((item.bounds().width() - bounds.width()).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_normalized() {
        let mut item = item(2, 2);
        item.set_rotation(-90.0);
        assert_eq!(item.rotation(), 270.0);
        item.set_rotation(720.0);
        assert_eq!(item.rotation(), 0.0);
    }

    #[test]
    fn test_contains_respects_crop_and_transform() {
        let mut item = item(100, 50);
        item.position = Point::new(10.0, 10.0);
        item.set_scale(2.0);
        assert!(item.contains(Point::new(200.0, 100.0)));
        assert!(!item.contains(Point::new(215.0, 100.0)));

        item.set_crop(Rect::new(50.0, 0.0, 100.0, 50.0));
        assert!(!item.contains(Point::new(50.0, 50.0)));
        assert!(item.contains(Point::new(150.0, 50.0)));
    }

    #[test]
    fn test_duplicate_gets_new_identity() {
        let mut item = item(2, 2);
        item.assign_save_id(9);
        item.position = Point::new(20.0, 30.0);
        let copy = item.duplicate();
        assert_ne!(copy.id(), item.id());
        assert_eq!(copy.save_id(), None);
        assert_eq!(copy.position, item.position);
    }

    #[test]
    fn test_to_png() {
        let item = item(3, 3);
        let png = item.to_png().unwrap();
        assert!(png.starts_with(&[0x89, 0x50, 0x4E, 0x47]));
    }

    #[test]
    #[should_panic]
    fn test_non_positive_scale_panics() {
        let mut item = item(2, 2);
        item.set_scale(0.0);
    }
}
