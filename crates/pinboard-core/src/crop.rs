//! Crop editing state machine.
//!
//! An item enters crop mode with its current crop copied into a working
//! rect. Pointer drags on the corner handles or edge zones resize the
//! working rect; pressing inside it confirms, pressing outside cancels.
//! Nothing touches the item itself until the edit is confirmed, at which
//! point the board pushes a single crop command.
//!
//! All coordinates here are item-local and unscaled.

use crate::item::ItemId;
use kurbo::{Point, Rect, Size};

/// Smallest width/height a crop rect can be dragged to.
pub const MIN_CROP_SIZE: f64 = 1.0;

/// Draggable parts of the crop frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CropHandle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
}

impl CropHandle {
    /// Corners first so they win where they overlap the edge zones.
    pub const ALL: [CropHandle; 8] = [
        CropHandle::TopLeft,
        CropHandle::TopRight,
        CropHandle::BottomLeft,
        CropHandle::BottomRight,
        CropHandle::Top,
        CropHandle::Bottom,
        CropHandle::Left,
        CropHandle::Right,
    ];

    pub fn is_corner(self) -> bool {
        matches!(
            self,
            CropHandle::TopLeft | CropHandle::TopRight | CropHandle::BottomLeft | CropHandle::BottomRight
        )
    }

    fn moves_left(self) -> bool {
        matches!(self, CropHandle::TopLeft | CropHandle::BottomLeft | CropHandle::Left)
    }

    fn moves_right(self) -> bool {
        matches!(self, CropHandle::TopRight | CropHandle::BottomRight | CropHandle::Right)
    }

    fn moves_top(self) -> bool {
        matches!(self, CropHandle::TopLeft | CropHandle::TopRight | CropHandle::Top)
    }

    fn moves_bottom(self) -> bool {
        matches!(self, CropHandle::BottomLeft | CropHandle::BottomRight | CropHandle::Bottom)
    }

    /// Hit area of this handle for the given crop rect.
    pub fn rect(self, crop: Rect, size: f64) -> Rect {
        let square = Size::new(size, size);
        match self {
            CropHandle::TopLeft => Rect::from_origin_size((crop.x0, crop.y0), square),
            CropHandle::TopRight => Rect::from_origin_size((crop.x1 - size, crop.y0), square),
            CropHandle::BottomLeft => Rect::from_origin_size((crop.x0, crop.y1 - size), square),
            CropHandle::BottomRight => {
                Rect::from_origin_size((crop.x1 - size, crop.y1 - size), square)
            }
            CropHandle::Top => Rect::new(crop.x0 + size, crop.y0, crop.x1 - size, crop.y0 + size),
            CropHandle::Bottom => Rect::new(crop.x0 + size, crop.y1 - size, crop.x1 - size, crop.y1),
            CropHandle::Left => Rect::new(crop.x0, crop.y0 + size, crop.x0 + size, crop.y1 - size),
            CropHandle::Right => Rect::new(crop.x1 - size, crop.y0 + size, crop.x1, crop.y1 - size),
        }
    }

    /// Find the handle under `point`, if any.
    pub fn at(crop: Rect, size: f64, point: Point) -> Option<CropHandle> {
        Self::ALL
            .into_iter()
            .find(|handle| handle.rect(crop, size).contains(point))
    }
}

/// Resize cursors shown while hovering the crop frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorShape {
    Arrow,
    SizeHor,
    SizeVer,
    /// Diagonal from top-left to bottom-right.
    SizeFDiag,
    /// Diagonal from bottom-left to top-right.
    SizeBDiag,
}

/// Cursor for a handle on an item rotated by `rotation` degrees.
///
/// Rotations near 90 or 270 degrees swap the horizontal and vertical
/// cursors (and the two diagonals).
pub fn cursor_for(handle: CropHandle, rotation: f64) -> CursorShape {
    let quarter = rotation.rem_euclid(180.0);
    let swapped = quarter > 45.0 && quarter < 135.0;
    let shape = match handle {
        CropHandle::TopLeft | CropHandle::BottomRight => CursorShape::SizeFDiag,
        CropHandle::TopRight | CropHandle::BottomLeft => CursorShape::SizeBDiag,
        CropHandle::Top | CropHandle::Bottom => CursorShape::SizeVer,
        CropHandle::Left | CropHandle::Right => CursorShape::SizeHor,
    };
    if !swapped {
        return shape;
    }
    match shape {
        CursorShape::SizeHor => CursorShape::SizeVer,
        CursorShape::SizeVer => CursorShape::SizeHor,
        CursorShape::SizeFDiag => CursorShape::SizeBDiag,
        CursorShape::SizeBDiag => CursorShape::SizeFDiag,
        CursorShape::Arrow => CursorShape::Arrow,
    }
}

/// Resize `origin` by dragging `handle` by `delta`.
///
/// Only the edges belonging to the handle move. The result stays inside
/// `bounds` and never inverts.
pub fn drag_rect(origin: Rect, handle: CropHandle, delta: kurbo::Vec2, bounds: Rect) -> Rect {
    let min_w = MIN_CROP_SIZE.min(origin.width());
    let min_h = MIN_CROP_SIZE.min(origin.height());
    let mut rect = origin;
    if handle.moves_left() {
        rect.x0 = (origin.x0 + delta.x).max(bounds.x0).min(origin.x1 - min_w);
    }
    if handle.moves_right() {
        rect.x1 = (origin.x1 + delta.x).min(bounds.x1).max(origin.x0 + min_w);
    }
    if handle.moves_top() {
        rect.y0 = (origin.y0 + delta.y).max(bounds.y0).min(origin.y1 - min_h);
    }
    if handle.moves_bottom() {
        rect.y1 = (origin.y1 + delta.y).min(bounds.y1).max(origin.y0 + min_h);
    }
    rect
}

/// An in-progress handle drag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropDrag {
    pub handle: CropHandle,
    /// Pointer position when the drag began.
    pub start: Point,
    /// Working rect when the drag began.
    pub origin: Rect,
}

/// What a pointer press did while cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOutcome {
    DragStarted(CropHandle),
    Confirmed,
    Cancelled,
}

/// Crop edit of a single item.
#[derive(Debug, Clone, PartialEq)]
pub struct CropSession {
    item: ItemId,
    original: Rect,
    temp: Rect,
    drag: Option<CropDrag>,
}

impl CropSession {
    pub fn new(item: ItemId, crop: Rect) -> Self {
        Self {
            item,
            original: crop,
            temp: crop,
            drag: None,
        }
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    /// The item's crop when editing started.
    pub fn original(&self) -> Rect {
        self.original
    }

    /// The working crop rect.
    pub fn temp(&self) -> Rect {
        self.temp
    }

    pub fn drag(&self) -> Option<&CropDrag> {
        self.drag.as_ref()
    }

    pub fn is_modified(&self) -> bool {
        self.temp != self.original
    }

    /// Decide what a press at `point` means.
    pub fn classify_press(&self, point: Point, handle_size: f64) -> PointerOutcome {
        match CropHandle::at(self.temp, handle_size, point) {
            Some(handle) => PointerOutcome::DragStarted(handle),
            None if self.temp.contains(point) => PointerOutcome::Confirmed,
            None => PointerOutcome::Cancelled,
        }
    }

    pub fn begin_drag(&mut self, handle: CropHandle, start: Point) {
        self.drag = Some(CropDrag {
            handle,
            start,
            origin: self.temp,
        });
    }

    /// Update the working rect for a pointer at `point`. Returns `None`
    /// when no drag is in progress.
    pub fn drag_to(&mut self, point: Point, bounds: Rect) -> Option<Rect> {
        let drag = self.drag?;
        self.temp = drag_rect(drag.origin, drag.handle, point - drag.start, bounds);
        Some(self.temp)
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    /// Cursor for hovering at `point`.
    pub fn cursor_at(&self, point: Point, handle_size: f64, rotation: f64) -> CursorShape {
        CropHandle::at(self.temp, handle_size, point)
            .map(|handle| cursor_for(handle, rotation))
            .unwrap_or(CursorShape::Arrow)
    }
}
