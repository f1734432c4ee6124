//! Reversible scene edits.
//!
//! A command holds ids and the snapshots it needs to undo itself, never
//! references into the scene. Snapshots of prior state are taken when the
//! command is applied, not when it is built.

use crate::item::{Flip, Item, ItemId, Placement};
use crate::scene::Scene;
use kurbo::{Point, Rect, Vec2};

/// Which part of an item's transform a reset clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Scale,
    Rotation,
    Flip,
    /// Scale, rotation and flip together.
    All,
}

#[derive(Debug, Clone)]
enum Operation {
    InsertItems {
        ids: Vec<ItemId>,
        /// Items detached from the scene, waiting to be attached.
        parked: Vec<Item>,
        /// Keep the existing selection instead of replacing it.
        additive: bool,
        prior_selection: Vec<ItemId>,
    },
    DeleteSelected {
        /// Selection at first application.
        targets: Option<Vec<ItemId>>,
        /// Removed items with their former index, in removal order.
        removed: Vec<(usize, Item)>,
    },
    MoveBy {
        ids: Vec<ItemId>,
        delta: Vec2,
    },
    ScaleBy {
        ids: Vec<ItemId>,
        factor: f64,
    },
    SetScales {
        targets: Vec<(ItemId, f64)>,
        prior: Vec<(ItemId, Placement)>,
    },
    SetPositions {
        targets: Vec<(ItemId, Point)>,
        prior: Vec<(ItemId, Point)>,
    },
    Flip {
        ids: Vec<ItemId>,
        vertical: bool,
        prior: Vec<(ItemId, Placement)>,
    },
    SetCrop {
        id: ItemId,
        old: Rect,
        new: Rect,
    },
    ResetCrop {
        ids: Vec<ItemId>,
        prior: Vec<(ItemId, Rect)>,
    },
    ResetTransform {
        ids: Vec<ItemId>,
        kind: ResetKind,
        prior: Vec<(ItemId, Placement)>,
    },
}

/// A reversible scene edit with a label for the undo menu.
#[derive(Debug, Clone)]
pub struct Command {
    label: String,
    op: Operation,
    skip_forward: bool,
}

impl Command {
    fn new(label: impl Into<String>, op: Operation) -> Self {
        Self {
            label: label.into(),
            op,
            skip_forward: false,
        }
    }

    /// Attach `items` and make them the selection.
    pub fn insert_items(items: Vec<Item>) -> Self {
        let label = if items.len() == 1 { "Insert item" } else { "Insert items" };
        Self::new(
            label,
            Operation::InsertItems {
                ids: items.iter().map(Item::id).collect(),
                parked: items,
                additive: false,
                prior_selection: Vec::new(),
            },
        )
    }

    /// Delete whatever is selected when the command is first applied.
    pub fn delete_selected() -> Self {
        Self::new(
            "Delete items",
            Operation::DeleteSelected {
                targets: None,
                removed: Vec::new(),
            },
        )
    }

    pub fn move_items_by(ids: Vec<ItemId>, delta: Vec2) -> Self {
        Self::new("Move items", Operation::MoveBy { ids, delta })
    }

    /// Add `factor` to the scale of each item.
    pub fn scale_items_by(ids: Vec<ItemId>, factor: f64) -> Self {
        Self::new("Scale items", Operation::ScaleBy { ids, factor })
    }

    /// Set each item's scale about its center.
    pub fn normalize_items(label: impl Into<String>, targets: Vec<(ItemId, f64)>) -> Self {
        Self::new(
            label,
            Operation::SetScales {
                targets,
                prior: Vec::new(),
            },
        )
    }

    /// Move each item to a target position.
    pub fn arrange_items(label: impl Into<String>, targets: Vec<(ItemId, Point)>) -> Self {
        Self::new(
            label,
            Operation::SetPositions {
                targets,
                prior: Vec::new(),
            },
        )
    }

    pub fn flip_items(ids: Vec<ItemId>, vertical: bool) -> Self {
        let label = if vertical { "Flip vertically" } else { "Flip horizontally" };
        Self::new(
            label,
            Operation::Flip {
                ids,
                vertical,
                prior: Vec::new(),
            },
        )
    }

    pub fn crop_item(id: ItemId, old: Rect, new: Rect) -> Self {
        Self::new("Crop", Operation::SetCrop { id, old, new })
    }

    pub fn reset_crop(ids: Vec<ItemId>) -> Self {
        Self::new(
            "Reset crop",
            Operation::ResetCrop {
                ids,
                prior: Vec::new(),
            },
        )
    }

    pub fn reset_transform(ids: Vec<ItemId>, kind: ResetKind) -> Self {
        let label = match kind {
            ResetKind::Scale => "Reset scale",
            ResetKind::Rotation => "Reset rotation",
            ResetKind::Flip => "Reset flip",
            ResetKind::All => "Reset transforms",
        };
        Self::new(
            label,
            Operation::ResetTransform {
                ids,
                kind,
                prior: Vec::new(),
            },
        )
    }

    /// Keep the current selection when inserting.
    pub fn additive(mut self) -> Self {
        if let Operation::InsertItems { additive, .. } = &mut self.op {
            *additive = true;
        }
        self
    }

    /// Record an edit that is already visible in the scene: the first
    /// application does nothing.
    ///
    /// # Panics
    /// For commands other than move and scale, which need to snapshot
    /// state when first applied.
    pub fn skip_first_forward(mut self) -> Self {
        assert!(
            matches!(self.op, Operation::MoveBy { .. } | Operation::ScaleBy { .. }),
            "only move and scale commands can skip their first application"
        );
        self.skip_forward = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Ids of the items an insert command attaches.
    pub fn inserted_ids(&self) -> &[ItemId] {
        match &self.op {
            Operation::InsertItems { ids, .. } => ids,
            _ => &[],
        }
    }

    /// An item this command holds while it is detached from the scene.
    pub(crate) fn parked_item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        match &mut self.op {
            Operation::InsertItems { parked, .. } => parked.iter_mut().find(|item| item.id() == id),
            Operation::DeleteSelected { removed, .. } => removed
                .iter_mut()
                .map(|(_, item)| item)
                .find(|item| item.id() == id),
            _ => None,
        }
    }

    pub(crate) fn forward(&mut self, scene: &mut Scene) {
        if self.skip_forward {
            self.skip_forward = false;
            return;
        }

        match &mut self.op {
            Operation::InsertItems {
                parked,
                additive,
                prior_selection,
                ..
            } => {
                *prior_selection = scene.selected_ids().to_vec();
                if !*additive {
                    scene.clear_selection();
                }
                for item in parked.drain(..) {
                    let id = scene.add(item);
                    scene.add_to_selection(id);
                }
            }
            Operation::DeleteSelected { targets, removed } => {
                let targets = targets.get_or_insert_with(|| scene.selected_ids().to_vec());
                removed.clear();
                for id in targets.iter() {
                    if let Some(entry) = scene.remove(*id) {
                        removed.push(entry);
                    }
                }
            }
            Operation::MoveBy { ids, delta } => {
                for_each_item(scene, ids, |item| item.move_by(*delta));
            }
            Operation::ScaleBy { ids, factor } => {
                for_each_item(scene, ids, |item| item.set_scale(item.scale() + *factor));
            }
            Operation::SetScales { targets, prior } => {
                *prior = snapshot(scene, targets.iter().map(|(id, _)| *id), Item::placement);
                for (id, scale) in targets.iter() {
                    if let Some(item) = scene.get_mut(*id) {
                        item.set_scale_about_center(*scale);
                    }
                }
            }
            Operation::SetPositions { targets, prior } => {
                *prior = snapshot(scene, targets.iter().map(|(id, _)| *id), |item| item.position);
                for (id, position) in targets.iter() {
                    if let Some(item) = scene.get_mut(*id) {
                        item.position = *position;
                    }
                }
            }
            Operation::Flip { ids, vertical, prior } => {
                *prior = snapshot(scene, ids.iter().copied(), Item::placement);
                for_each_item(scene, ids, |item| item.flip_about_center(*vertical));
            }
            Operation::SetCrop { id, new, .. } => {
                if let Some(item) = scene.get_mut(*id) {
                    item.set_crop(*new);
                }
            }
            Operation::ResetCrop { ids, prior } => {
                *prior = snapshot(scene, ids.iter().copied(), Item::crop);
                for_each_item(scene, ids, Item::reset_crop);
            }
            Operation::ResetTransform { ids, kind, prior } => {
                *prior = snapshot(scene, ids.iter().copied(), Item::placement);
                let kind = *kind;
                for_each_item(scene, ids, |item| reset(item, kind));
            }
        }
    }

    pub(crate) fn inverse(&mut self, scene: &mut Scene) {
        match &mut self.op {
            Operation::InsertItems {
                ids,
                parked,
                prior_selection,
                ..
            } => {
                for id in ids.iter() {
                    if let Some((_, item)) = scene.remove(*id) {
                        parked.push(item);
                    }
                }
                scene.set_selection(prior_selection.iter().copied());
            }
            Operation::DeleteSelected { targets, removed } => {
                for (index, item) in removed.drain(..).rev() {
                    scene.insert_at(index, item);
                }
                if let Some(targets) = targets {
                    scene.set_selection(targets.iter().copied());
                }
            }
            Operation::MoveBy { ids, delta } => {
                for_each_item(scene, ids, |item| item.move_by(-*delta));
            }
            Operation::ScaleBy { ids, factor } => {
                for_each_item(scene, ids, |item| item.set_scale(item.scale() - *factor));
            }
            Operation::SetScales { prior, .. }
            | Operation::Flip { prior, .. }
            | Operation::ResetTransform { prior, .. } => {
                for (id, placement) in prior.iter() {
                    if let Some(item) = scene.get_mut(*id) {
                        item.set_placement(*placement);
                    }
                }
            }
            Operation::SetPositions { prior, .. } => {
                for (id, position) in prior.iter() {
                    if let Some(item) = scene.get_mut(*id) {
                        item.position = *position;
                    }
                }
            }
            Operation::SetCrop { id, old, .. } => {
                if let Some(item) = scene.get_mut(*id) {
                    item.set_crop(*old);
                }
            }
            Operation::ResetCrop { prior, .. } => {
                for (id, crop) in prior.iter() {
                    if let Some(item) = scene.get_mut(*id) {
                        item.set_crop(*crop);
                    }
                }
            }
        }
    }
}

fn for_each_item(scene: &mut Scene, ids: &[ItemId], mut f: impl FnMut(&mut Item)) {
    for id in ids {
        match scene.get_mut(*id) {
            Some(item) => f(item),
            None => log::debug!("Command target {} is not in the scene", id),
        }
    }
}

fn snapshot<T>(
    scene: &Scene,
    ids: impl Iterator<Item = ItemId>,
    f: impl Fn(&Item) -> T,
) -> Vec<(ItemId, T)> {
    ids.filter_map(|id| scene.get(id).map(|item| (id, f(item))))
        .collect()
}

fn reset(item: &mut Item, kind: ResetKind) {
    match kind {
        ResetKind::Scale => item.set_scale_about_center(1.0),
        ResetKind::Rotation => item.set_rotation_about_center(0.0),
        ResetKind::Flip => item.set_flip_about_center(Flip::Normal),
        ResetKind::All => {
            item.set_scale_about_center(1.0);
            item.set_rotation_about_center(0.0);
            item.set_flip_about_center(Flip::Normal);
        }
    }
}
