//! Append-only journal of configuration commits.
//!
//! The file is a stream of JSON events. Event 0 creates the document; each
//! later event carries the patch of one commit.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::{de::IoRead, Deserializer, StreamDeserializer};
use std::{
    fs::{File, OpenOptions},
    io::{self, Seek as _, Write},
    path::Path,
    sync::{atomic::AtomicBool, atomic::Ordering, Arc},
    time::{Duration, Instant},
};
use tracing::{error, info, warn};

/// Value of the `_type` member of a journal's document.
pub const DOCUMENT_TYPE: &str = "alteonConfig";

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct JournalEvent {
    pub index: u64,
    pub meta: JournalEventMeta,
    pub patch: json_patch::Patch,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct JournalEventMeta {
    pub time: String,
    #[serde(flatten)]
    pub other_fields: serde_json::Value,
}

impl JournalEvent {
    pub fn new(index: u64, patch: json_patch::Patch, other_fields: serde_json::Value) -> Self {
        JournalEvent {
            index,
            meta: JournalEventMeta {
                time: Utc::now().to_rfc3339(),
                other_fields,
            },
            patch,
        }
    }

    fn init() -> Result<Self> {
        let patch = serde_json::from_value(serde_json::json!([
            { "op": "add", "path": "", "value": initial_document() }
        ]))?;
        Ok(Self::new(0, patch, serde_json::json!({})))
    }
}

pub fn initial_document() -> serde_json::Value {
    serde_json::json!({
        "_type": DOCUMENT_TYPE,
        "tables": {},
    })
}

pub struct JournalEventStream<'a, R: io::Read> {
    iter: StreamDeserializer<'a, IoRead<R>, JournalEvent>,
    /// The validated first event, handed out before the rest.
    first_event: Option<JournalEvent>,
}

impl<'a, R: io::Read> JournalEventStream<'a, R> {
    pub fn open_from_reader(reader: R) -> Result<JournalEventStream<'a, R>> {
        let deserializer = Deserializer::from_reader(reader);
        let mut iter = deserializer.into_iter();
        let first_event = match iter.next() {
            Some(Ok(ev @ JournalEvent { index, .. })) => {
                if index != 0 {
                    bail!("Expected initial journal event with index 0, got {}", index);
                }
                ev
            }
            Some(Err(e)) => bail!(
                "Journal invalid: error parsing initial journal event: {}",
                e
            ),
            None => bail!("Journal invalid: no initial journal event"),
        };
        Ok(JournalEventStream {
            iter,
            first_event: Some(first_event),
        })
    }
}

impl<R: io::Read> Iterator for JournalEventStream<'_, R> {
    type Item = Result<JournalEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.first_event.is_some() {
            self.first_event.take().map(Ok)
        } else {
            self.iter.next().map(|r| r.map_err(Into::into))
        }
    }
}

pub fn apply_event(document: &mut serde_json::Value, event: &JournalEvent) -> Result<()> {
    json_patch::patch(document, event.patch.0.as_slice())
        .with_context(|| format!("applying journal event {}", event.index))
}

/// Replay `events` onto `document`. Returns the index of the last event.
pub fn apply_events(
    document: &mut serde_json::Value,
    events: impl Iterator<Item = Result<JournalEvent>>,
) -> Result<u64> {
    let mut last = None;
    for event in events {
        let event = event?;
        if let Some(prev) = last {
            if event.index != prev + 1 {
                bail!(
                    "Journal invalid: event {} follows event {}",
                    event.index,
                    prev
                );
            }
        }
        apply_event(document, &event)?;
        last = Some(event.index);
    }
    last.context("Journal invalid: no events")
}

/// Logs progress of a wait that may take a while.
/// After SILENT_INTERVAL: log the activity
/// After LOG_INTERVAL: log the activity and its duration
pub struct WaitMonitor {
    done: Arc<AtomicBool>,
}

impl WaitMonitor {
    const SILENT_INTERVAL: Duration = Duration::from_millis(500);
    const LOG_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new(activity: &'static str) -> WaitMonitor {
        let done = Arc::new(AtomicBool::new(false));
        let r = WaitMonitor { done: done.clone() };
        std::thread::spawn(move || WaitMonitor::run(done, activity));
        r
    }

    fn run(done: Arc<AtomicBool>, activity: &'static str) {
        let start = Instant::now();
        let mut next_log = start + Self::SILENT_INTERVAL;
        loop {
            std::thread::sleep(next_log.saturating_duration_since(Instant::now()));
            if done.load(Ordering::Relaxed) {
                break;
            }
            info!(
                waited_secs = next_log.duration_since(start).as_secs(),
                "{}",
                activity
            );
            next_log += Self::LOG_INTERVAL;
        }
    }

    pub fn done(&self) {
        self.done.store(true, Ordering::Relaxed);
    }
}

impl Drop for WaitMonitor {
    fn drop(&mut self) {
        self.done()
    }
}

/// Writable handle on a journal file.
pub struct Journal {
    file: Arc<File>,
    locking: fd_lock::RwLock<Arc<File>>,
    expected_size: Option<u64>,
}

impl Journal {
    /// Open a journal; with `create_new`, create it with its initial event.
    pub fn open<P: AsRef<Path>>(path: P, create_new: bool) -> Result<Journal> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(create_new)
            .open(path)
            .with_context(|| format!("opening journal {}", path.display()))?;
        let file = Arc::new(file);
        let locking = fd_lock::RwLock::new(file.clone());
        let mut journal = Journal {
            file,
            locking,
            expected_size: None,
        };
        if create_new {
            journal.append(&[&JournalEvent::init()?])?;
        }
        Ok(journal)
    }

    /// Read the committed document. Later appends that did not go through
    /// this handle are reported as concurrent writes.
    pub fn read(&mut self) -> Result<(serde_json::Value, u64)> {
        let _lock = Self::lock_read(&self.locking)?;
        let size = self.file.metadata()?.len();
        let reader = io::BufReader::new(reader_from_start(&self.file)?);
        let stream = JournalEventStream::open_from_reader(reader)?;
        let mut document = serde_json::json!({});
        let last = apply_events(&mut document, stream)?;
        if document.get("_type").and_then(|t| t.as_str()) != Some(DOCUMENT_TYPE) {
            bail!("Journal invalid: not an {} document", DOCUMENT_TYPE);
        }
        self.expected_size = Some(size);
        Ok((document, last))
    }

    fn lock_read(
        locking: &fd_lock::RwLock<Arc<File>>,
    ) -> Result<fd_lock::RwLockReadGuard<'_, Arc<File>>> {
        let lock_wait_mon = WaitMonitor::new("Waiting for journal read lock");
        let lock = locking.read()?;
        lock_wait_mon.done();
        Ok(lock)
    }

    fn lock_write(
        locking: &mut fd_lock::RwLock<Arc<File>>,
    ) -> Result<fd_lock::RwLockWriteGuard<'_, Arc<File>>> {
        let lock_wait_mon = WaitMonitor::new("Waiting for journal write lock");
        let lock = locking.write()?;
        lock_wait_mon.done();
        Ok(lock)
    }

    pub fn append(&mut self, events: &[&JournalEvent]) -> Result<()> {
        let lock_guard = Self::lock_write(&mut self.locking)?;
        let pos = self.file.seek(io::SeekFrom::End(0))?;
        match self.expected_size {
            None => self.expected_size = Some(pos),
            Some(expected_size) => {
                if pos != expected_size {
                    warn!(
                        "Detected concurrent writing. Foreign bytes: [{}..{})",
                        expected_size, pos
                    );
                    error!("Concurrent configuration changes may have been overwritten; review the journal");
                }
            }
        }
        let mut writer = io::BufWriter::new(self.file.clone());

        for event in events {
            // Pretty, so that the journal can be reviewed by hand.
            serde_json::to_writer_pretty(&mut writer, event)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        self.expected_size = Some(self.file.stream_position()?);

        drop(lock_guard);
        Ok(())
    }
}

fn reader_from_start(file: &File) -> io::Result<File> {
    let mut clone = file.try_clone()?;
    clone.rewind()?;
    Ok(clone)
}
