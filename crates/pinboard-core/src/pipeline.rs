//! Background jobs: inserting images, opening and saving documents.
//!
//! Workers never touch the scene or the undo stack. They report through a
//! [`JobSink`]: notifications go on one channel, finished work (decoded
//! items, loaded documents, assigned save ids) on a separate hand-off
//! channel. The interactive thread drains the hand-off queue whenever a
//! progress notification arrives.

use crate::codec::{Loader, Source};
use crate::item::{Item, ItemId};
use crate::storage::{self, ItemSnapshot};
use kurbo::{Point, Vec2};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

/// What a job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Insert,
    Open,
    Save,
}

/// Progress notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// Sent once before any work.
    BeginProcessing { total: usize },
    /// Sent after each unit of work, whether it succeeded or not.
    Progress { index: usize },
    /// Sent exactly once at the end.
    Finished { label: String, errors: Vec<String> },
}

/// A decoded item waiting to be attached.
#[derive(Debug)]
pub struct Inbound {
    pub item: Item,
    pub source: String,
}

/// Results handed to the interactive thread.
#[derive(Debug)]
pub enum JobOutput {
    Item(Inbound),
    Document(Vec<ItemSnapshot>),
    SaveIds(Vec<(ItemId, i64)>),
}

/// Where a worker reports to.
pub trait JobSink {
    fn event(&mut self, event: JobEvent);
    fn hand_off(&mut self, output: JobOutput);
}

/// Sink backed by two channels.
pub struct ChannelSink {
    events: Sender<JobEvent>,
    outputs: Sender<JobOutput>,
}

impl JobSink for ChannelSink {
    fn event(&mut self, event: JobEvent) {
        // The receiver is gone when the board was dropped mid-job.
        let _ = self.events.send(event);
    }

    fn hand_off(&mut self, output: JobOutput) {
        let _ = self.outputs.send(output);
    }
}

/// Decode `sources` into items centered on `anchor`, each one after the
/// first shifted by `offset` on both axes so they don't fully overlap.
///
/// Failed sources are listed in the finished event and don't stop the
/// batch. The cancel flag is checked before each source.
pub fn load_images(
    sources: &[Source],
    anchor: Point,
    offset: f64,
    loader: &Loader,
    sink: &mut dyn JobSink,
    cancel: &AtomicBool,
) {
    sink.event(JobEvent::BeginProcessing { total: sources.len() });
    let mut position = anchor;
    let mut errors = Vec::new();

    for (index, source) in sources.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            log::debug!("Insert cancelled, skipping {} remaining sources", sources.len() - index);
            break;
        }
        log::debug!("Loading image {}", source);
        match loader.load(source) {
            Ok(pixels) => {
                let mut item = Item::new(pixels, source.filename());
                item.set_pos_center(position);
                position += Vec2::new(offset, offset);
                sink.hand_off(JobOutput::Item(Inbound {
                    item,
                    source: source.identifier(),
                }));
            }
            Err(e) => {
                log::warn!("Could not load {}: {}", source, e);
                errors.push(source.identifier());
            }
        }
        sink.event(JobEvent::Progress { index });
    }

    log::info!("Loaded {} sources with {} errors", sources.len(), errors.len());
    sink.event(JobEvent::Finished {
        label: String::new(),
        errors,
    });
}

/// Read a document. Hands off the items only if every record decoded.
pub fn load_document(path: &Path, sink: &mut dyn JobSink, cancel: &AtomicBool) {
    let label = path.display().to_string();
    log::info!("Opening {}", label);
    let file = match storage::read_board_file(path) {
        Ok(file) => file,
        Err(e) => {
            log::warn!("Could not open {}: {}", label, e);
            sink.event(JobEvent::BeginProcessing { total: 0 });
            sink.event(JobEvent::Finished {
                label,
                errors: vec![e.to_string()],
            });
            return;
        }
    };

    sink.event(JobEvent::BeginProcessing { total: file.items.len() });
    let mut snapshots = Vec::with_capacity(file.items.len());
    let mut errors = Vec::new();
    for (index, record) in file.items.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            errors.push("Cancelled".to_string());
            break;
        }
        match record.decode() {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => {
                log::warn!("Could not read item from {}: {}", label, e);
                errors.push(e.to_string());
            }
        }
        sink.event(JobEvent::Progress { index });
    }

    if errors.is_empty() {
        sink.hand_off(JobOutput::Document(snapshots));
    }
    sink.event(JobEvent::Finished { label, errors });
}

/// Write a document and hand off the save ids it assigned.
pub fn save_document(path: &Path, items: &[ItemSnapshot], create_new: bool, sink: &mut dyn JobSink) {
    let label = path.display().to_string();
    log::info!("Saving {} items to {}", items.len(), label);
    sink.event(JobEvent::BeginProcessing { total: items.len() });

    let result = storage::write_document(path, items, create_new, |index| {
        sink.event(JobEvent::Progress { index })
    });

    let errors = match result {
        Ok(assigned) => {
            sink.hand_off(JobOutput::SaveIds(assigned));
            Vec::new()
        }
        Err(e) => {
            log::warn!("Could not save {}: {}", label, e);
            vec![e.to_string()]
        }
    };
    sink.event(JobEvent::Finished { label, errors });
}

/// Handle to a running (or finished) background job.
pub struct Job {
    kind: JobKind,
    events: Receiver<JobEvent>,
    outputs: Receiver<JobOutput>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    finished: bool,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("kind", &self.kind)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Job {
    fn channels(kind: JobKind) -> (Self, ChannelSink) {
        let (event_tx, event_rx) = mpsc::channel();
        let (output_tx, output_rx) = mpsc::channel();
        let job = Self {
            kind,
            events: event_rx,
            outputs: output_rx,
            cancel: Arc::new(AtomicBool::new(false)),
            handle: None,
            finished: false,
        };
        let sink = ChannelSink {
            events: event_tx,
            outputs: output_tx,
        };
        (job, sink)
    }

    /// Run `work` on a new thread.
    pub fn spawn<F>(kind: JobKind, work: F) -> Self
    where
        F: FnOnce(&mut dyn JobSink, &AtomicBool) + Send + 'static,
    {
        let (mut job, mut sink) = Self::channels(kind);
        let cancel = Arc::clone(&job.cancel);
        job.handle = Some(thread::spawn(move || {
            let sink: &mut dyn JobSink = &mut sink;
            work(sink, cancel.as_ref())
        }));
        job
    }

    /// Run `work` to completion on the calling thread. Events are queued
    /// exactly as a threaded job would produce them.
    pub fn inline<F>(kind: JobKind, work: F) -> Self
    where
        F: FnOnce(&mut dyn JobSink, &AtomicBool),
    {
        let (job, mut sink) = Self::channels(kind);
        let cancel = Arc::clone(&job.cancel);
        let sink: &mut dyn JobSink = &mut sink;
        work(sink, cancel.as_ref());
        job
    }

    pub fn insert_images(sources: Vec<Source>, anchor: Point, offset: f64, loader: Loader) -> Self {
        Self::spawn(JobKind::Insert, move |sink, cancel| {
            load_images(&sources, anchor, offset, &loader, sink, cancel)
        })
    }

    pub fn open_document(path: PathBuf) -> Self {
        Self::spawn(JobKind::Open, move |sink, cancel| load_document(&path, sink, cancel))
    }

    pub fn save_document(path: PathBuf, items: Vec<ItemSnapshot>, create_new: bool) -> Self {
        Self::spawn(JobKind::Save, move |sink, _| save_document(&path, &items, create_new, sink))
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Ask the worker to stop before its next unit of work.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next pending event without blocking.
    pub fn poll_event(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }
        match self.events.try_recv() {
            Ok(event) => Some(self.observe(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.observe(Self::lost())),
        }
    }

    /// Next event, blocking until the worker sends one.
    pub fn wait_event(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().unwrap_or_else(|_| Self::lost());
        Some(self.observe(event))
    }

    /// Everything handed off so far.
    pub fn take_outputs(&mut self) -> Vec<JobOutput> {
        self.outputs.try_iter().collect()
    }

    fn observe(&mut self, event: JobEvent) -> JobEvent {
        if matches!(event, JobEvent::Finished { .. }) {
            self.finished = true;
            if let Some(handle) = self.handle.take() {
                if handle.join().is_err() {
                    log::error!("{:?} worker panicked", self.kind);
                }
            }
        }
        event
    }

    /// Stand-in for the finished event of a worker that died.
    fn lost() -> JobEvent {
        log::error!("Background job stopped without finishing");
        JobEvent::Finished {
            label: String::new(),
            errors: vec!["Background job stopped unexpectedly".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DefaultCodec, HttpReader};
    use image::RgbaImage;

    /// Writes a `width`x`height` PNG and returns its path.
    fn fixture(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::new(width, height).save(&path).unwrap();
        path
    }

    fn drain(job: &mut Job) -> Vec<JobEvent> {
        std::iter::from_fn(|| job.wait_event()).collect()
    }

    #[test]
    fn test_load_images_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            Source::Path(fixture(dir.path(), "a.png", 3, 3)),
            Source::Path(PathBuf::from("badpath")),
        ];
        let mut job = Job::inline(JobKind::Insert, |sink, cancel| {
            load_images(&sources, Point::new(5.0, 6.0), 50.0, &Loader::default(), sink, cancel)
        });

        assert_eq!(
            drain(&mut job),
            vec![
                JobEvent::BeginProcessing { total: 2 },
                JobEvent::Progress { index: 0 },
                JobEvent::Progress { index: 1 },
                JobEvent::Finished {
                    label: String::new(),
                    errors: vec!["badpath".to_string()],
                },
            ]
        );
        let outputs = job.take_outputs();
        assert_eq!(outputs.len(), 1);
        let JobOutput::Item(inbound) = &outputs[0] else {
            panic!("expected an item");
        };
        assert_eq!(inbound.item.position, Point::new(3.5, 4.5));
    }

    #[test]
    fn test_failed_download_is_reported() {
        // Nothing listens on a port once its listener is dropped.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{}/missing.png", port);
        let client = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
        let loader = Loader::new(
            Arc::new(HttpReader::with_client(client)),
            Arc::new(DefaultCodec),
        );
        let sources = vec![Source::parse(&url)];
        let mut job = Job::inline(JobKind::Insert, |sink, cancel| {
            load_images(&sources, Point::ZERO, 50.0, &loader, sink, cancel)
        });

        let events = drain(&mut job);
        assert_eq!(
            events.last(),
            Some(&JobEvent::Finished {
                label: String::new(),
                errors: vec![url],
            })
        );
        assert!(job.take_outputs().is_empty());
    }

    #[test]
    fn test_load_images_offsets_successive_items() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            Source::Path(fixture(dir.path(), "a.png", 10, 10)),
            Source::Path(PathBuf::from("missing.png")),
            Source::Path(fixture(dir.path(), "b.png", 20, 20)),
        ];
        let mut job = Job::inline(JobKind::Insert, |sink, cancel| {
            load_images(&sources, Point::ZERO, 50.0, &Loader::default(), sink, cancel)
        });
        drain(&mut job);
        let centers: Vec<Point> = job
            .take_outputs()
            .into_iter()
            .filter_map(|output| match output {
                JobOutput::Item(inbound) => Some(inbound.item.center()),
                _ => None,
            })
            .collect();
        assert_eq!(centers, vec![Point::ZERO, Point::new(50.0, 50.0)]);
    }

    #[test]
    fn test_load_images_from_bytes() {
        let png = crate::item::encode_png(&RgbaImage::new(4, 2)).unwrap();
        let sources = vec![Source::bytes("clipboard", png)];
        let mut job = Job::inline(JobKind::Insert, |sink, cancel| {
            load_images(&sources, Point::ZERO, 50.0, &Loader::default(), sink, cancel)
        });
        drain(&mut job);
        let outputs = job.take_outputs();
        let [JobOutput::Item(inbound)] = outputs.as_slice() else {
            panic!("expected one item");
        };
        assert_eq!(inbound.item.filename, None);
        assert_eq!(inbound.source, "clipboard");
    }

    struct CancelAfterFirst<'a> {
        inner: &'a mut dyn JobSink,
        cancel: &'a AtomicBool,
    }

    impl JobSink for CancelAfterFirst<'_> {
        fn event(&mut self, event: JobEvent) {
            if event == (JobEvent::Progress { index: 0 }) {
                self.cancel.store(true, Ordering::Relaxed);
            }
            self.inner.event(event);
        }

        fn hand_off(&mut self, output: JobOutput) {
            self.inner.hand_off(output);
        }
    }

    #[test]
    fn test_cancel_keeps_finished_work() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            Source::Path(fixture(dir.path(), "a.png", 3, 3)),
            Source::Path(fixture(dir.path(), "b.png", 3, 3)),
        ];
        let mut job = Job::inline(JobKind::Insert, |sink, cancel| {
            let mut sink = CancelAfterFirst { inner: sink, cancel };
            load_images(&sources, Point::ZERO, 50.0, &Loader::default(), &mut sink, cancel)
        });
        assert!(job.is_cancelled());
        assert_eq!(
            drain(&mut job),
            vec![
                JobEvent::BeginProcessing { total: 2 },
                JobEvent::Progress { index: 0 },
                JobEvent::Finished {
                    label: String::new(),
                    errors: Vec::new(),
                },
            ]
        );
        assert_eq!(job.take_outputs().len(), 1);
    }

    #[test]
    fn test_threaded_insert() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![Source::Path(fixture(dir.path(), "a.png", 3, 3))];
        let mut job = Job::insert_images(sources, Point::ZERO, 50.0, Loader::default());
        let events = drain(&mut job);
        assert!(job.is_finished());
        assert!(matches!(events.last(), Some(JobEvent::Finished { errors, .. }) if errors.is_empty()));
        assert_eq!(job.take_outputs().len(), 1);
        assert!(job.poll_event().is_none());
    }

    #[test]
    fn test_open_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = Job::open_document(dir.path().join("missing.pinb"));
        let events = drain(&mut job);
        let Some(JobEvent::Finished { errors, .. }) = events.last() else {
            panic!("no finished event");
        };
        assert_eq!(errors.len(), 1);
        assert!(job.take_outputs().is_empty());
    }

    #[test]
    fn test_save_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.pinb");
        let item = Item::new(RgbaImage::new(3, 3), None);
        let snapshot = ItemSnapshot::from_item(&item);

        let mut job = Job::save_document(path.clone(), vec![snapshot], true);
        drain(&mut job);
        let outputs = job.take_outputs();
        let [JobOutput::SaveIds(ids)] = outputs.as_slice() else {
            panic!("expected save ids");
        };
        assert_eq!(ids, &vec![(item.id(), 1)]);

        let mut job = Job::open_document(path);
        assert_eq!(drain(&mut job)[0], JobEvent::BeginProcessing { total: 1 });
        let outputs = job.take_outputs();
        let [JobOutput::Document(items)] = outputs.as_slice() else {
            panic!("expected a document");
        };
        assert_eq!(items[0].save_id, Some(1));
    }

    #[test]
    fn test_dead_worker_reports_finished() {
        let mut job = Job::spawn(JobKind::Insert, |sink, _| {
            sink.event(JobEvent::BeginProcessing { total: 1 });
            panic!("worker failure");
        });
        let events = drain(&mut job);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], JobEvent::Finished { errors, .. } if errors.len() == 1));
    }
}
