//! A configuration store on the local machine that behaves like a device:
//! changes accumulate in a pending buffer until committed to the journal.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use alteon_configurators::{Put, Row, TableStore};
use alteon_reconcile::{DeviceError, DeviceSession};
use anyhow::{anyhow, Context, Result};
use json_patch::{Patch, PatchOperation};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::journal::{initial_document, Journal, JournalEvent};

struct DeviceState {
    /// `None` for a device that lives in memory only.
    journal: Option<Journal>,
    committed: Value,
    working: Value,
    pending: Vec<PatchOperation>,
    last_index: u64,
    reachable: bool,
}

/// Handle on a local device. Clones share the device, so a configurator and
/// a session can both hold one.
#[derive(Clone)]
pub struct LocalDevice {
    inner: Arc<Mutex<DeviceState>>,
}

impl LocalDevice {
    fn with_state(journal: Option<Journal>, committed: Value, last_index: u64) -> Self {
        LocalDevice {
            inner: Arc::new(Mutex::new(DeviceState {
                journal,
                working: committed.clone(),
                committed,
                pending: Vec::new(),
                last_index,
                reachable: true,
            })),
        }
    }

    /// A device without persistence; commits only survive in memory.
    pub fn in_memory() -> Self {
        Self::with_state(None, initial_document(), 0)
    }

    /// Create a new journal at `path`. Fails if the file exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut journal = Journal::open(path, true)?;
        let (committed, last_index) = journal.read()?;
        Ok(Self::with_state(Some(journal), committed, last_index))
    }

    /// Open the journal at `path` and replay it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut journal = Journal::open(path, false)?;
        let (committed, last_index) = journal
            .read()
            .with_context(|| format!("reading journal {}", path.display()))?;
        debug!(path = %path.display(), last_index, "opened local device");
        Ok(Self::with_state(Some(journal), committed, last_index))
    }

    /// Simulate losing or regaining the connection. An unreachable device
    /// fails every call with [`DeviceError::Unreachable`].
    pub fn set_reachable(&self, reachable: bool) -> Result<()> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("local device state poisoned"))?
            .reachable = reachable;
        Ok(())
    }

    /// The committed configuration document.
    pub fn committed(&self) -> Result<Value> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| anyhow!("local device state poisoned"))?
            .committed
            .clone())
    }

    fn state(&self) -> Result<MutexGuard<'_, DeviceState>, DeviceError> {
        let state = self
            .inner
            .lock()
            .map_err(|_| DeviceError::rejected(anyhow!("local device state poisoned")))?;
        if !state.reachable {
            return Err(DeviceError::unreachable(anyhow!("local device is not reachable")));
        }
        Ok(state)
    }
}

/// Encode a string as a JSON pointer token.
fn token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn operation(op: &str, path: String, value: Option<Value>) -> Result<PatchOperation, DeviceError> {
    let mut op = json!({ "op": op, "path": path });
    if let Some(value) = value {
        op["value"] = value;
    }
    serde_json::from_value(op).map_err(DeviceError::rejected)
}

impl DeviceState {
    fn rows(&self, table: &str) -> &[Value] {
        self.working["tables"]
            .get(table)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn position(&self, table: &str, index: &[String]) -> Option<usize> {
        self.rows(table)
            .iter()
            .position(|r| index_matches(&r["index"], index))
    }

    /// Apply `op` to the working copy and buffer it for the next commit.
    fn record(&mut self, op: PatchOperation) -> Result<(), DeviceError> {
        json_patch::patch(&mut self.working, std::slice::from_ref(&op))
            .map_err(DeviceError::rejected)?;
        self.pending.push(op);
        Ok(())
    }
}

fn index_matches(value: &Value, index: &[String]) -> bool {
    match value.as_array() {
        Some(parts) => {
            parts.len() == index.len()
                && parts.iter().zip(index).all(|(p, i)| p.as_str() == Some(i.as_str()))
        }
        None => false,
    }
}

fn decode_row(value: &Value) -> Result<(Vec<String>, Row), DeviceError> {
    let malformed = || DeviceError::rejected(anyhow!("malformed row {}", value));
    let index = value["index"]
        .as_array()
        .ok_or_else(malformed)?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(malformed)?;
    let row = value["row"].as_object().ok_or_else(malformed)?.clone();
    Ok((index, row))
}

impl TableStore for LocalDevice {
    fn fetch(&mut self, table: &str, index: &[String]) -> Result<Option<Row>, DeviceError> {
        let state = self.state()?;
        match state.position(table, index) {
            None => Ok(None),
            Some(pos) => decode_row(&state.rows(table)[pos]).map(|(_, row)| Some(row)),
        }
    }

    fn list(
        &mut self,
        table: &str,
        prefix: &[String],
    ) -> Result<Vec<(Vec<String>, Row)>, DeviceError> {
        let state = self.state()?;
        let mut rows = Vec::new();
        for value in state.rows(table) {
            let (index, row) = decode_row(value)?;
            if index.starts_with(prefix) {
                rows.push((index, row));
            }
        }
        Ok(rows)
    }

    fn put(&mut self, table: &str, index: &[String], row: Row, mode: Put) -> Result<(), DeviceError> {
        let mut state = self.state()?;
        let table_path = format!("/tables/{}", token(table));
        match (mode, state.position(table, index)) {
            (Put::Insert, None) => {
                if state.working["tables"].get(table).is_none() {
                    state.record(operation("add", table_path.clone(), Some(json!([])))?)?;
                }
                let value = json!({ "index": index, "row": row });
                state.record(operation("add", format!("{}/-", table_path), Some(value))?)
            }
            (Put::Merge, Some(pos)) => {
                for (column, value) in row {
                    let path = format!("{}/{}/row/{}", table_path, pos, token(&column));
                    state.record(operation("add", path, Some(value))?)?;
                }
                Ok(())
            }
            (Put::Insert, Some(_)) => Err(DeviceError::rejected(anyhow!(
                "{} row {} already exists",
                table,
                index.join(".")
            ))),
            (Put::Merge, None) => Err(DeviceError::rejected(anyhow!(
                "{} row {} does not exist",
                table,
                index.join(".")
            ))),
        }
    }

    fn remove(&mut self, table: &str, index: &[String]) -> Result<(), DeviceError> {
        let mut state = self.state()?;
        let pos = state.position(table, index).ok_or_else(|| {
            DeviceError::rejected(anyhow!("{} row {} does not exist", table, index.join(".")))
        })?;
        state.record(operation("remove", format!("/tables/{}/{}", token(table), pos), None)?)
    }
}

impl DeviceSession for LocalDevice {
    fn has_pending_changes(&mut self) -> Result<bool, DeviceError> {
        Ok(!self.state()?.pending.is_empty())
    }

    fn commit(&mut self) -> Result<(), DeviceError> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        if state.pending.is_empty() {
            return Ok(());
        }
        let index = state.last_index + 1;
        let operations = state.pending.len();
        if let Some(journal) = state.journal.as_mut() {
            let event = JournalEvent::new(
                index,
                Patch(state.pending.clone()),
                json!({ "operations": operations }),
            );
            journal.append(&[&event]).map_err(DeviceError::rejected)?;
        }
        state.committed = state.working.clone();
        state.pending.clear();
        state.last_index = index;
        info!(index, operations, "committed configuration");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state()?;
        let discarded = state.pending.len();
        state.working = state.committed.clone();
        state.pending.clear();
        info!(discarded, "discarded pending changes");
        Ok(())
    }
}
