//! The scene: items, selection and the active edit.

use crate::arrange::{self, NormalizeMode};
use crate::config::NormalizePolicy;
use crate::crop::CropSession;
use crate::history::Command;
use crate::item::{Item, ItemId};
use crate::pipeline::Inbound;
use crate::selection::{Marquee, SceneEntry};
use kurbo::{Point, Rect};
use std::collections::{HashMap, VecDeque};

/// Modal editing state. At most one item can be in crop mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum EditState {
    #[default]
    Idle,
    Crop(CropSession),
}

/// Items of one document plus their selection.
#[derive(Debug, Default)]
pub struct Scene {
    items: HashMap<ItemId, Item>,
    /// Insertion order. Stacking uses `Item::z`.
    order: Vec<ItemId>,
    /// Selected items in the order they were selected.
    selection: Vec<ItemId>,
    marquee: Option<Marquee>,
    edit: EditState,
    /// Decoded items handed over by a background job, not yet attached.
    inbound: VecDeque<Inbound>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    /// Mutable access is for commands only.
    pub(crate) fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    /// Items in insertion order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    /// Items from bottom to top.
    pub fn items_by_z(&self) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.items().collect();
        items.sort_by(|a, b| a.z.total_cmp(&b.z));
        items
    }

    /// Attach an item. Returns its id.
    pub fn add(&mut self, item: Item) -> ItemId {
        let id = item.id();
        let index = self.order.len();
        self.insert_at(index, item);
        id
    }

    /// Attach an item at a position in the insertion order.
    pub(crate) fn insert_at(&mut self, index: usize, item: Item) {
        let id = item.id();
        if self.items.insert(id, item).is_some() {
            self.order.retain(|existing| *existing != id);
        }
        let index = index.min(self.order.len());
        self.order.insert(index, id);
    }

    /// Detach an item and hand it back with its former index. The item is
    /// deselected, and crop mode ends if it was being cropped.
    pub fn remove(&mut self, id: ItemId) -> Option<(usize, Item)> {
        let item = self.items.remove(&id)?;
        let index = self.order.iter().position(|existing| *existing == id)?;
        self.order.remove(index);
        self.selection.retain(|selected| *selected != id);
        if self.crop_session().is_some_and(|session| session.item() == id) {
            log::debug!("Cropped item {} removed, leaving crop mode", id);
            self.edit = EditState::Idle;
        }
        Some((index, item))
    }

    /// Remove everything, including pending inbound items.
    pub fn clear(&mut self) {
        self.items.clear();
        self.order.clear();
        self.selection.clear();
        self.marquee = None;
        self.edit = EditState::Idle;
        self.inbound.clear();
    }

    // --- Selection ---

    pub fn is_selected(&self, id: ItemId) -> bool {
        self.selection.contains(&id)
    }

    pub fn selected_ids(&self) -> &[ItemId] {
        &self.selection
    }

    /// Current selection. Unless `user_only`, an active rubberband is
    /// reported too.
    pub fn selected_items(&self, user_only: bool) -> Vec<SceneEntry> {
        let mut entries: Vec<SceneEntry> = self.selection.iter().map(|id| SceneEntry::Item(*id)).collect();
        if !user_only && self.marquee.is_some() {
            entries.push(SceneEntry::Marquee);
        }
        entries
    }

    /// Select a single item.
    pub fn select(&mut self, id: ItemId) {
        self.set_selection([id]);
    }

    pub fn add_to_selection(&mut self, id: ItemId) {
        if self.contains(id) && !self.is_selected(id) {
            self.selection.push(id);
        }
    }

    pub fn deselect(&mut self, id: ItemId) {
        self.selection.retain(|selected| *selected != id);
    }

    /// Replace the selection. Ids not in the scene are ignored.
    pub fn set_selection(&mut self, ids: impl IntoIterator<Item = ItemId>) {
        self.selection.clear();
        for id in ids {
            self.add_to_selection(id);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn select_all(&mut self) {
        self.selection = self.order.clone();
    }

    // --- Rubberband ---

    pub fn marquee(&self) -> Option<&Marquee> {
        self.marquee.as_ref()
    }

    pub fn begin_marquee(&mut self, origin: Point) {
        self.marquee = Some(Marquee::new(origin));
        self.clear_selection();
    }

    /// Extend the rubberband and select every item it touches.
    pub fn update_marquee(&mut self, current: Point) {
        let Some(marquee) = &mut self.marquee else {
            return;
        };
        marquee.current = current;
        let rect = marquee.rect();
        let hits: Vec<ItemId> = self
            .items()
            .filter(|item| !item.bounds().intersect(rect).is_zero_area())
            .map(Item::id)
            .collect();
        self.set_selection(hits);
    }

    pub fn end_marquee(&mut self) {
        self.marquee = None;
    }

    // --- Queries ---

    /// Union of the scene bounds of all items, or only the selected ones.
    pub fn bounding_rect(&self, selection_only: bool) -> Option<Rect> {
        let bounds = self.items().filter_map(|item| {
            (!selection_only || self.is_selected(item.id())).then(|| item.bounds())
        });
        bounds.reduce(|acc, rect| acc.union(rect))
    }

    /// Items under a scene point, topmost first.
    pub fn items_at(&self, point: Point) -> Vec<ItemId> {
        let mut hits: Vec<&Item> = self.items_by_z().into_iter().filter(|item| item.contains(point)).collect();
        hits.reverse();
        hits.into_iter().map(Item::id).collect()
    }

    pub fn item_at(&self, point: Point) -> Option<ItemId> {
        self.items_at(point).into_iter().next()
    }

    /// Z value that puts a new item on top of everything.
    pub fn next_z(&self) -> f64 {
        self.items
            .values()
            .map(|item| item.z)
            .reduce(f64::max)
            .map_or(0.0, |z| z + 1.0)
    }

    /// Scrollable area: item bounds grown by `margin`. Returns `None` when
    /// the result is not representable, in which case callers keep their
    /// previous rect.
    pub fn canvas_rect(&self, margin: f64) -> Option<Rect> {
        let rect = self.bounding_rect(false).unwrap_or(Rect::ZERO).inflate(margin, margin);
        if rect.is_finite() && rect.width().is_finite() && rect.height().is_finite() {
            Some(rect)
        } else {
            log::debug!("Canvas rect overflowed, skipping recalculation: {:?}", rect);
            None
        }
    }

    /// Local rect to paint for an item, accounting for crop mode.
    pub fn paint_rect(&self, id: ItemId) -> Option<Rect> {
        let item = self.get(id)?;
        let cropping = self.crop_session().is_some_and(|session| session.item() == id);
        Some(item.bounding_rect_unselected(cropping))
    }

    // --- Active edit ---

    pub fn edit_state(&self) -> &EditState {
        &self.edit
    }

    pub fn crop_session(&self) -> Option<&CropSession> {
        match &self.edit {
            EditState::Crop(session) => Some(session),
            EditState::Idle => None,
        }
    }

    pub(crate) fn crop_session_mut(&mut self) -> Option<&mut CropSession> {
        match &mut self.edit {
            EditState::Crop(session) => Some(session),
            EditState::Idle => None,
        }
    }

    /// The item holding input focus, which is the one being cropped.
    pub fn focused_item(&self) -> Option<ItemId> {
        self.crop_session().map(CropSession::item)
    }

    /// Start crop mode. Returns `false` if an edit is already active or
    /// the item is unknown.
    pub(crate) fn begin_crop(&mut self, session: CropSession) -> bool {
        if !matches!(self.edit, EditState::Idle) || !self.contains(session.item()) {
            return false;
        }
        self.edit = EditState::Crop(session);
        true
    }

    pub(crate) fn end_crop(&mut self) -> Option<CropSession> {
        match std::mem::take(&mut self.edit) {
            EditState::Crop(session) => Some(session),
            EditState::Idle => None,
        }
    }

    // --- Hand-off queue ---

    pub(crate) fn enqueue_inbound(&mut self, inbound: Inbound) {
        self.inbound.push_back(inbound);
    }

    pub(crate) fn drain_inbound(&mut self) -> Vec<Inbound> {
        self.inbound.drain(..).collect()
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    // --- Layout commands ---

    fn selected_refs(&self) -> Vec<&Item> {
        self.selection.iter().filter_map(|id| self.get(*id)).collect()
    }

    /// Scale the selection to a common height, width or area.
    pub fn normalize(&self, mode: NormalizeMode, policy: NormalizePolicy) -> Option<Command> {
        let items = self.selected_refs();
        if items.is_empty() {
            return None;
        }
        let scales = arrange::normalize_scales(&items, mode, policy);
        let targets = items.iter().map(|item| item.id()).zip(scales).collect();
        Some(Command::normalize_items(mode.label(), targets))
    }

    /// Place the selection in a row, or a column if `vertical`.
    pub fn arrange(&self, vertical: bool, gap: f64) -> Option<Command> {
        let label = if vertical { "Arrange vertically" } else { "Arrange horizontally" };
        self.layout(label, &self.selection, |items| arrange::arrange_linear(items, vertical, gap))
    }

    /// Pack the selection into a grid close to `aspect`.
    pub fn arrange_optimal(&self, aspect: f64, gap: f64) -> Option<Command> {
        self.arrange_optimal_ids(&self.selection, aspect, gap)
    }

    pub(crate) fn arrange_optimal_ids(&self, ids: &[ItemId], aspect: f64, gap: f64) -> Option<Command> {
        self.layout("Arrange optimally", ids, |items| arrange::arrange_optimal(items, aspect, gap))
    }

    fn layout(
        &self,
        label: &str,
        ids: &[ItemId],
        compute: impl FnOnce(&[&Item]) -> Vec<Point>,
    ) -> Option<Command> {
        let items: Vec<&Item> = ids.iter().filter_map(|id| self.get(*id)).collect();
        if items.is_empty() {
            return None;
        }
        let positions = compute(&items);
        let targets = items.iter().map(|item| item.id()).zip(positions).collect();
        Some(Command::arrange_items(label, targets))
    }

    /// Mirror each selected item about its own center.
    pub fn flip_items(&self, vertical: bool) -> Option<Command> {
        (!self.selection.is_empty()).then(|| Command::flip_items(self.selection.clone(), vertical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn item_at(scene: &mut Scene, w: u32, h: u32, x: f64, y: f64, z: f64) -> ItemId {
        let mut item = Item::new(RgbaImage::new(w, h), None);
        item.position = Point::new(x, y);
        item.z = z;
        scene.add(item)
    }

    #[test]
    fn test_add_remove() {
        let mut scene = Scene::new();
        let a = item_at(&mut scene, 10, 10, 0.0, 0.0, 0.0);
        let b = item_at(&mut scene, 10, 10, 0.0, 0.0, 0.0);
        scene.select_all();

        let (index, item) = scene.remove(a).unwrap();
        assert_eq!(index, 0);
        assert_eq!(item.id(), a);
        assert_eq!(scene.selected_ids(), &[b]);
        assert!(scene.remove(a).is_none());

        scene.insert_at(index, item);
        let order: Vec<ItemId> = scene.items().map(Item::id).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn test_selection_only_holds_members() {
        let mut scene = Scene::new();
        let a = item_at(&mut scene, 10, 10, 0.0, 0.0, 0.0);
        scene.set_selection([a, uuid::Uuid::new_v4()]);
        assert_eq!(scene.selected_ids(), &[a]);
        scene.add_to_selection(a);
        assert_eq!(scene.selected_ids(), &[a]);
        scene.deselect(a);
        assert!(scene.selected_ids().is_empty());
    }

    #[test]
    fn test_bounding_rect() {
        let mut scene = Scene::new();
        assert_eq!(scene.bounding_rect(false), None);
        let a = item_at(&mut scene, 10, 10, 0.0, 0.0, 0.0);
        item_at(&mut scene, 10, 20, 50.0, 50.0, 0.0);
        assert_eq!(scene.bounding_rect(false), Some(Rect::new(0.0, 0.0, 60.0, 70.0)));
        assert_eq!(scene.bounding_rect(true), None);
        scene.select(a);
        assert_eq!(scene.bounding_rect(true), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn test_items_at_topmost_first() {
        let mut scene = Scene::new();
        let low = item_at(&mut scene, 10, 10, 0.0, 0.0, 1.0);
        let high = item_at(&mut scene, 10, 10, 5.0, 5.0, 3.0);
        let mid = item_at(&mut scene, 10, 10, 2.0, 2.0, 2.0);
        assert_eq!(scene.items_at(Point::new(7.0, 7.0)), vec![high, mid, low]);
        assert_eq!(scene.item_at(Point::new(1.0, 1.0)), Some(low));
        assert_eq!(scene.item_at(Point::new(100.0, 100.0)), None);
        assert_eq!(scene.next_z(), 4.0);
    }

    #[test]
    fn test_marquee_selection() {
        let mut scene = Scene::new();
        let a = item_at(&mut scene, 10, 10, 0.0, 0.0, 0.0);
        let b = item_at(&mut scene, 10, 10, 100.0, 100.0, 0.0);
        scene.begin_marquee(Point::new(-5.0, -5.0));
        scene.update_marquee(Point::new(20.0, 20.0));
        assert_eq!(scene.selected_ids(), &[a]);
        assert_eq!(scene.selected_items(true), vec![SceneEntry::Item(a)]);
        assert_eq!(scene.selected_items(false), vec![SceneEntry::Item(a), SceneEntry::Marquee]);

        scene.update_marquee(Point::new(105.0, 105.0));
        assert_eq!(scene.selected_ids(), &[a, b]);
        scene.end_marquee();
        assert_eq!(scene.selected_items(false).len(), 2);
    }

    #[test]
    fn test_canvas_rect() {
        let mut scene = Scene::new();
        assert_eq!(scene.canvas_rect(10.0), Some(Rect::new(-10.0, -10.0, 10.0, 10.0)));
        item_at(&mut scene, 10, 10, 0.0, 0.0, 0.0);
        assert_eq!(scene.canvas_rect(5.0), Some(Rect::new(-5.0, -5.0, 15.0, 15.0)));
        item_at(&mut scene, 10, 10, f64::MAX, 0.0, 0.0);
        assert_eq!(scene.canvas_rect(f64::MAX), None);
    }

    #[test]
    fn test_single_crop_session() {
        let mut scene = Scene::new();
        let a = item_at(&mut scene, 10, 10, 0.0, 0.0, 0.0);
        let b = item_at(&mut scene, 10, 10, 0.0, 0.0, 0.0);
        assert!(scene.begin_crop(CropSession::new(a, Rect::new(0.0, 0.0, 10.0, 10.0))));
        assert!(!scene.begin_crop(CropSession::new(b, Rect::new(0.0, 0.0, 10.0, 10.0))));
        assert_eq!(scene.focused_item(), Some(a));
        assert_eq!(scene.paint_rect(a), Some(Rect::new(-0.5, -0.5, 10.5, 10.5)));
        assert_eq!(scene.paint_rect(b), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));

        scene.remove(a);
        assert_eq!(scene.edit_state(), &EditState::Idle);
        assert!(scene.end_crop().is_none());
    }

    #[test]
    fn test_layout_commands_need_selection() {
        let mut scene = Scene::new();
        item_at(&mut scene, 10, 10, 0.0, 0.0, 0.0);
        assert!(scene.arrange(false, 0.0).is_none());
        assert!(scene.arrange_optimal(1.0, 0.0).is_none());
        assert!(scene.flip_items(false).is_none());
        assert!(scene.normalize(NormalizeMode::Height, NormalizePolicy::Largest).is_none());
        scene.select_all();
        assert_eq!(scene.flip_items(true).map(|c| c.label().to_string()).as_deref(), Some("Flip vertically"));
    }
}
