//! Selection entries and the rubberband marquee.

use crate::item::ItemId;
use kurbo::{Point, Rect};

/// Something that can appear in the scene's selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEntry {
    /// A user item.
    Item(ItemId),
    /// The in-progress rubberband. Never a user item.
    Marquee,
}

impl SceneEntry {
    pub fn is_user_item(self) -> bool {
        matches!(self, SceneEntry::Item(_))
    }

    pub fn item_id(self) -> Option<ItemId> {
        match self {
            SceneEntry::Item(id) => Some(id),
            SceneEntry::Marquee => None,
        }
    }
}

/// Rubberband rectangle dragged out to select items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marquee {
    pub origin: Point,
    pub current: Point,
}

impl Marquee {
    pub fn new(origin: Point) -> Self {
        Self {
            origin,
            current: origin,
        }
    }

    /// Normalized rect spanned by two corners in any order.
    pub fn fit(a: Point, b: Point) -> Rect {
        Rect::from_points(a, b)
    }

    pub fn rect(&self) -> Rect {
        Self::fit(self.origin, self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_any_corner_order() {
        let expected = Rect::new(-5.0, 3.0, 10.0, 20.0);
        assert_eq!(Marquee::fit(Point::new(-5.0, 3.0), Point::new(10.0, 20.0)), expected);
        assert_eq!(Marquee::fit(Point::new(10.0, 20.0), Point::new(-5.0, 3.0)), expected);
        assert_eq!(Marquee::fit(Point::new(-5.0, 20.0), Point::new(10.0, 3.0)), expected);
        assert_eq!(Marquee::fit(Point::new(10.0, 3.0), Point::new(-5.0, 20.0)), expected);
    }

    #[test]
    fn test_marquee_is_not_a_user_item() {
        assert!(!SceneEntry::Marquee.is_user_item());
        assert_eq!(SceneEntry::Marquee.item_id(), None);
    }
}
