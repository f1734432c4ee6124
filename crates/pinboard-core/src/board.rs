//! A document being edited: scene, undo history, configuration and at most
//! one background job.
//!
//! Every edit goes through here so it lands on the undo stack. Selection
//! and rubberband changes are not undoable and go straight to the scene.

use crate::arrange::NormalizeMode;
use crate::codec::{Loader, Source};
use crate::config::BoardConfig;
use crate::crop::{CropSession, CursorShape, PointerOutcome};
use crate::error::{BoardError, BoardResult};
use crate::history::{Command, CommandStack, ResetKind, StackEvent};
use crate::item::{Item, ItemId};
use crate::pipeline::{Inbound, Job, JobEvent, JobKind, JobOutput};
use crate::scene::Scene;
use crate::storage::{ItemSnapshot, StorageError};
use image::RgbaImage;
use kurbo::{Point, Rect, Vec2};
use std::path::{Path, PathBuf};

/// Outcome of a finished background job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub kind: JobKind,
    /// Document path for open/save, empty for inserts.
    pub label: String,
    /// Failed sources for inserts, the failure for open/save.
    pub errors: Vec<String>,
    /// Items added by an insert.
    pub inserted: Vec<ItemId>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug)]
struct ActiveJob {
    job: Job,
    path: Option<PathBuf>,
    inserted: Vec<ItemId>,
    document: Option<Vec<ItemSnapshot>>,
    save_ids: Option<Vec<(ItemId, i64)>>,
    /// History generation when a save started.
    saved_generation: u64,
}

/// One open document.
#[derive(Debug)]
pub struct Board {
    scene: Scene,
    history: CommandStack,
    config: BoardConfig,
    loader: Loader,
    path: Option<PathBuf>,
    job: Option<ActiveJob>,
    clipboard: Vec<Item>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new(BoardConfig::default())
    }
}

impl Board {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            scene: Scene::new(),
            history: CommandStack::new(config.undo_limit),
            config,
            loader: Loader::default(),
            path: None,
            job: None,
            clipboard: Vec::new(),
        }
    }

    /// Use a custom reader or codec for inserts.
    pub fn with_loader(mut self, loader: Loader) -> Self {
        self.loader = loader;
        self
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// For selection and rubberband changes.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn history(&self) -> &CommandStack {
        &self.history
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// File the board was opened from or last saved to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_clean(&self) -> bool {
        self.history.is_clean()
    }

    pub fn is_busy(&self) -> bool {
        self.job.is_some()
    }

    pub fn take_stack_events(&mut self) -> Vec<StackEvent> {
        self.history.take_events()
    }

    pub fn canvas_rect(&self) -> Option<Rect> {
        self.scene.canvas_rect(self.config.canvas_margin)
    }

    // --- History ---

    /// Apply a command and record it.
    pub fn push(&mut self, command: Command) {
        self.history.push(&mut self.scene, command);
    }

    /// Undo one step. A crop edit in progress is cancelled first, but only
    /// if there is something to undo.
    pub fn undo(&mut self) -> bool {
        if !self.history.can_undo() {
            return false;
        }
        self.leave_crop_mode();
        self.history.undo(&mut self.scene)
    }

    pub fn redo(&mut self) -> bool {
        if !self.history.can_redo() {
            return false;
        }
        self.leave_crop_mode();
        self.history.redo(&mut self.scene)
    }

    fn leave_crop_mode(&mut self) {
        if self.scene.crop_session().is_some() {
            let _ = self.exit_crop_mode(false);
        }
    }

    fn selection(&self) -> BoardResult<Vec<ItemId>> {
        let ids = self.scene.selected_ids();
        if ids.is_empty() {
            Err(BoardError::EmptySelection)
        } else {
            Ok(ids.to_vec())
        }
    }

    // --- Editing ---

    pub fn delete_selected(&mut self) -> BoardResult<()> {
        self.selection()?;
        self.push(Command::delete_selected());
        Ok(())
    }

    /// Move the selection without recording it, for live dragging. Follow
    /// up with [`move_selected_by`](Self::move_selected_by) and
    /// `already_applied` set.
    pub fn preview_move_selected(&mut self, delta: Vec2) {
        for id in self.scene.selected_ids().to_vec() {
            if let Some(item) = self.scene.get_mut(id) {
                item.move_by(delta);
            }
        }
    }

    pub fn move_selected_by(&mut self, delta: Vec2, already_applied: bool) -> BoardResult<()> {
        let ids = self.selection()?;
        let mut command = Command::move_items_by(ids, delta);
        if already_applied {
            command = command.skip_first_forward();
        }
        self.push(command);
        Ok(())
    }

    /// Add `factor` to the scale of each selected item. Fails without
    /// changes if any scale would drop to zero or below.
    pub fn scale_selected_by(&mut self, factor: f64, already_applied: bool) -> BoardResult<()> {
        let ids = self.selection()?;
        for id in &ids {
            let Some(item) = self.scene.get(*id) else {
                continue;
            };
            // Both the applied and the undone scale must stay positive.
            let (before, after) = if already_applied {
                (item.scale() - factor, item.scale())
            } else {
                (item.scale(), item.scale() + factor)
            };
            for scale in [before, after] {
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(BoardError::InvalidScale(scale));
                }
            }
        }
        let mut command = Command::scale_items_by(ids, factor);
        if already_applied {
            command = command.skip_first_forward();
        }
        self.push(command);
        Ok(())
    }

    pub fn normalize(&mut self, mode: NormalizeMode) -> BoardResult<()> {
        let command = self
            .scene
            .normalize(mode, self.config.normalize_policy)
            .ok_or(BoardError::EmptySelection)?;
        self.push(command);
        Ok(())
    }

    pub fn normalize_height(&mut self) -> BoardResult<()> {
        self.normalize(NormalizeMode::Height)
    }

    pub fn normalize_width(&mut self) -> BoardResult<()> {
        self.normalize(NormalizeMode::Width)
    }

    pub fn normalize_size(&mut self) -> BoardResult<()> {
        self.normalize(NormalizeMode::Size)
    }

    pub fn arrange(&mut self, vertical: bool) -> BoardResult<()> {
        let command = self
            .scene
            .arrange(vertical, self.config.arrange_gap)
            .ok_or(BoardError::EmptySelection)?;
        self.push(command);
        Ok(())
    }

    pub fn arrange_optimal(&mut self) -> BoardResult<()> {
        let command = self
            .scene
            .arrange_optimal(self.config.optimal_aspect, self.config.arrange_gap)
            .ok_or(BoardError::EmptySelection)?;
        self.push(command);
        Ok(())
    }

    pub fn flip_selected(&mut self, vertical: bool) -> BoardResult<()> {
        let command = self.scene.flip_items(vertical).ok_or(BoardError::EmptySelection)?;
        self.push(command);
        Ok(())
    }

    pub fn reset_transform(&mut self, kind: ResetKind) -> BoardResult<()> {
        let ids = self.selection()?;
        self.push(Command::reset_transform(ids, kind));
        Ok(())
    }

    pub fn reset_crop(&mut self) -> BoardResult<()> {
        let ids = self.selection()?;
        self.push(Command::reset_crop(ids));
        Ok(())
    }

    // --- Crop mode ---

    pub fn enter_crop_mode(&mut self, id: ItemId) -> BoardResult<()> {
        if self.scene.crop_session().is_some() {
            return Err(BoardError::CropModeActive);
        }
        let crop = self.scene.get(id).ok_or(BoardError::ItemNotFound(id))?.crop();
        if !self.scene.begin_crop(CropSession::new(id, crop)) {
            return Err(BoardError::CropModeActive);
        }
        log::debug!("Entered crop mode for {}", id);
        Ok(())
    }

    /// Leave crop mode. When confirming a changed rect, a crop command is
    /// pushed; returns whether that happened.
    pub fn exit_crop_mode(&mut self, confirm: bool) -> BoardResult<bool> {
        let session = self.scene.end_crop().ok_or(BoardError::NotInCropMode)?;
        log::debug!("Left crop mode for {} (confirm: {})", session.item(), confirm);
        if confirm && session.is_modified() {
            self.push(Command::crop_item(session.item(), session.original(), session.temp()));
            return Ok(true);
        }
        Ok(false)
    }

    /// Cropped item with a scene point mapped into its local space and
    /// the handle size in local units.
    fn crop_target(&self, scene_point: Point) -> BoardResult<(Point, f64, &Item)> {
        let session = self.scene.crop_session().ok_or(BoardError::NotInCropMode)?;
        let item = self
            .scene
            .get(session.item())
            .ok_or(BoardError::ItemNotFound(session.item()))?;
        let handle_size = self.config.crop_handle_size / item.scale();
        Ok((item.map_from_scene(scene_point), handle_size, item))
    }

    /// Pointer pressed while cropping. Starts a handle drag, or confirms
    /// or cancels the edit.
    pub fn crop_press(&mut self, scene_point: Point) -> BoardResult<PointerOutcome> {
        let (local, handle_size, _) = self.crop_target(scene_point)?;
        let outcome = self
            .scene
            .crop_session()
            .map(|session| session.classify_press(local, handle_size))
            .ok_or(BoardError::NotInCropMode)?;
        match outcome {
            PointerOutcome::DragStarted(handle) => {
                if let Some(session) = self.scene.crop_session_mut() {
                    session.begin_drag(handle, local);
                }
            }
            PointerOutcome::Confirmed => {
                self.exit_crop_mode(true)?;
            }
            PointerOutcome::Cancelled => {
                self.exit_crop_mode(false)?;
            }
        }
        Ok(outcome)
    }

    /// Pointer moved while cropping. Returns the working rect if a handle
    /// is being dragged.
    pub fn crop_drag(&mut self, scene_point: Point) -> BoardResult<Option<Rect>> {
        let (local, _, item) = self.crop_target(scene_point)?;
        let bounds = item.full_rect();
        Ok(self
            .scene
            .crop_session_mut()
            .and_then(|session| session.drag_to(local, bounds)))
    }

    pub fn crop_release(&mut self) -> BoardResult<()> {
        let session = self.scene.crop_session_mut().ok_or(BoardError::NotInCropMode)?;
        session.end_drag();
        Ok(())
    }

    /// Cursor for hovering at a scene point while cropping.
    pub fn crop_cursor(&self, scene_point: Point) -> BoardResult<CursorShape> {
        let (local, handle_size, item) = self.crop_target(scene_point)?;
        let session = self.scene.crop_session().ok_or(BoardError::NotInCropMode)?;
        Ok(session.cursor_at(local, handle_size, item.rotation()))
    }

    // --- Clipboard ---

    /// Copy the selected items. Returns how many were copied.
    pub fn copy_selected(&mut self) -> usize {
        self.clipboard = self
            .scene
            .selected_ids()
            .iter()
            .filter_map(|id| self.scene.get(*id))
            .cloned()
            .collect();
        self.clipboard.len()
    }

    /// Copy the selected items and delete them in one undoable step.
    /// Returns how many were cut.
    pub fn cut_selected(&mut self) -> BoardResult<usize> {
        self.selection()?;
        let count = self.copy_selected();
        self.push(Command::delete_selected().with_label("Cut"));
        Ok(count)
    }

    /// Paste copied items centered on `center`, keeping their layout.
    pub fn paste_at(&mut self, center: Point) -> BoardResult<Vec<ItemId>> {
        let bounds = self
            .clipboard
            .iter()
            .map(Item::bounds)
            .reduce(|acc, rect| acc.union(rect))
            .ok_or(BoardError::EmptySelection)?;
        let offset = center - bounds.center();
        let mut z = self.scene.next_z();
        let items: Vec<Item> = self
            .clipboard
            .iter()
            .map(|item| {
                let mut copy = item.duplicate();
                copy.move_by(offset);
                copy.z = z;
                z += 1.0;
                copy
            })
            .collect();
        let command = Command::insert_items(items).with_label("Paste");
        let ids = command.inserted_ids().to_vec();
        self.push(command);
        Ok(ids)
    }

    /// Insert raw pixels, e.g. from the system clipboard, centered on
    /// `center`.
    pub fn paste_image(&mut self, pixels: RgbaImage, center: Point) -> BoardResult<ItemId> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(BoardError::EmptyImage);
        }
        let mut item = Item::new(pixels, None);
        item.set_pos_center(center);
        item.z = self.scene.next_z();
        let id = item.id();
        self.push(Command::insert_items(vec![item]).with_label("Paste image"));
        Ok(id)
    }

    // --- Background jobs ---

    fn ensure_idle(&self) -> BoardResult<()> {
        if self.job.is_some() {
            Err(BoardError::JobActive)
        } else {
            Ok(())
        }
    }

    pub(crate) fn start_job(&mut self, job: Job, path: Option<PathBuf>) -> BoardResult<()> {
        self.ensure_idle()?;
        if job.kind() == JobKind::Insert {
            self.history.begin_macro("Insert images");
        }
        self.job = Some(ActiveJob {
            job,
            path,
            inserted: Vec::new(),
            document: None,
            save_ids: None,
            saved_generation: self.history.generation(),
        });
        Ok(())
    }

    /// Load images in the background and insert them around `anchor`.
    /// The whole batch undoes as one step.
    pub fn insert_images(&mut self, sources: Vec<Source>, anchor: Point) -> BoardResult<()> {
        self.ensure_idle()?;
        log::info!("Inserting {} images", sources.len());
        let job = Job::insert_images(sources, anchor, self.config.insert_offset, self.loader.clone());
        self.start_job(job, None)
    }

    /// Replace the board with a document, once it has loaded completely.
    pub fn open(&mut self, path: impl Into<PathBuf>) -> BoardResult<()> {
        self.ensure_idle()?;
        let path = path.into();
        self.start_job(Job::open_document(path.clone()), Some(path))
    }

    /// Save to the current file, updating it in place.
    pub fn save(&mut self) -> BoardResult<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| StorageError::Other("Board has not been saved yet".to_string()))?;
        self.save_to(path, false)
    }

    /// Save to a new file.
    pub fn save_as(&mut self, path: impl Into<PathBuf>) -> BoardResult<()> {
        self.save_to(path.into(), true)
    }

    fn save_to(&mut self, path: PathBuf, create_new: bool) -> BoardResult<()> {
        self.ensure_idle()?;
        let items = self.scene.items().map(ItemSnapshot::from_item).collect();
        self.start_job(Job::save_document(path.clone(), items, create_new), Some(path))
    }

    pub fn cancel_job(&self) {
        if let Some(active) = &self.job {
            active.job.cancel();
        }
    }

    /// Handle everything the job has reported so far. Returns the report
    /// once it finished.
    pub fn poll_job(&mut self) -> Option<JobReport> {
        loop {
            let event = self.job.as_mut()?.job.poll_event()?;
            if let Some(report) = self.handle_event(event) {
                return Some(report);
            }
        }
    }

    /// Block until the running job finishes.
    pub fn wait_job(&mut self) -> Option<JobReport> {
        loop {
            let event = self.job.as_mut()?.job.wait_event()?;
            if let Some(report) = self.handle_event(event) {
                return Some(report);
            }
        }
    }

    fn handle_event(&mut self, event: JobEvent) -> Option<JobReport> {
        match event {
            JobEvent::BeginProcessing { total } => {
                log::debug!("Job started with {} steps", total);
                None
            }
            JobEvent::Progress { .. } => {
                self.collect_outputs();
                None
            }
            JobEvent::Finished { label, errors } => {
                self.collect_outputs();
                let active = self.job.take()?;
                Some(self.finish_job(active, label, errors))
            }
        }
    }

    /// Drain the hand-off queue and merge decoded items.
    fn collect_outputs(&mut self) {
        let Some(active) = self.job.as_mut() else {
            return;
        };
        for output in active.job.take_outputs() {
            match output {
                JobOutput::Item(inbound) => self.scene.enqueue_inbound(inbound),
                JobOutput::Document(items) => active.document = Some(items),
                JobOutput::SaveIds(ids) => active.save_ids = Some(ids),
            }
        }

        let inbound = self.scene.drain_inbound();
        if inbound.is_empty() {
            return;
        }
        let mut z = self.scene.next_z();
        let items: Vec<Item> = inbound
            .into_iter()
            .map(|Inbound { mut item, source }| {
                log::debug!("Inserting {}", source);
                item.z = z;
                z += 1.0;
                item
            })
            .collect();
        let mut command = Command::insert_items(items);
        if !active.inserted.is_empty() {
            command = command.additive();
        }
        active.inserted.extend_from_slice(command.inserted_ids());
        self.history.push(&mut self.scene, command);
    }

    fn finish_job(&mut self, mut active: ActiveJob, label: String, errors: Vec<String>) -> JobReport {
        let kind = active.job.kind();
        match kind {
            JobKind::Insert => {
                if active.inserted.len() > 1 {
                    let command = self.scene.arrange_optimal_ids(
                        &active.inserted,
                        self.config.optimal_aspect,
                        self.config.arrange_gap,
                    );
                    if let Some(command) = command {
                        self.history.push(&mut self.scene, command);
                    }
                }
                self.history.end_macro();
                if errors.is_empty() {
                    log::info!("Inserted {} images", active.inserted.len());
                } else {
                    log::warn!("Could not load {} images: {}", errors.len(), errors.join(", "));
                }
            }
            JobKind::Open => match active.document.take() {
                Some(snapshots) if errors.is_empty() => {
                    self.scene.clear();
                    self.history.clear();
                    for snapshot in snapshots {
                        self.scene.add(snapshot.into_item());
                    }
                    self.history.mark_clean();
                    self.path = active.path.take();
                    log::info!("Opened {} with {} items", label, self.scene.len());
                }
                _ => log::warn!("Could not open {}: {}", label, errors.join(", ")),
            },
            JobKind::Save => {
                if errors.is_empty() {
                    for (id, save_id) in active.save_ids.take().unwrap_or_default() {
                        // Items deleted during the save keep their id for
                        // when the delete is undone.
                        let item = match self.scene.get_mut(id) {
                            Some(item) => Some(item),
                            None => self.history.parked_item_mut(id),
                        };
                        if let Some(item) = item {
                            item.assign_save_id(save_id);
                        }
                    }
                    if self.history.generation() == active.saved_generation {
                        self.history.mark_clean();
                    } else {
                        log::debug!("Board changed while saving, leaving it dirty");
                    }
                    self.path = active.path.take();
                    log::info!("Saved {}", label);
                } else {
                    log::warn!("Could not save {}: {}", label, errors.join(", "));
                }
            }
        }
        JobReport {
            kind,
            label,
            errors,
            inserted: active.inserted,
        }
    }
}
