use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use alteon_reconcile::DeviceError;
use anyhow::anyhow;
use serde_json::Value;

use crate::table::{Put, Row, TableStore};

/// Tables kept in memory; clones share the same rows.
#[derive(Clone, Default)]
pub struct MemoryStore(Rc<RefCell<BTreeMap<(String, Vec<String>), Row>>>);

impl MemoryStore {
    pub fn row(&self, table: &str, index: &[&str]) -> Option<Value> {
        let key = (
            table.to_string(),
            index.iter().map(|s| s.to_string()).collect(),
        );
        self.0.borrow().get(&key).cloned().map(Value::Object)
    }
}

fn key(table: &str, index: &[String]) -> (String, Vec<String>) {
    (table.to_string(), index.to_vec())
}

impl TableStore for MemoryStore {
    fn fetch(&mut self, table: &str, index: &[String]) -> Result<Option<Row>, DeviceError> {
        Ok(self.0.borrow().get(&key(table, index)).cloned())
    }

    fn list(
        &mut self,
        table: &str,
        prefix: &[String],
    ) -> Result<Vec<(Vec<String>, Row)>, DeviceError> {
        Ok(self
            .0
            .borrow()
            .iter()
            .filter(|((t, index), _)| t == table && index.starts_with(prefix))
            .map(|((_, index), row)| (index.clone(), row.clone()))
            .collect())
    }

    fn put(&mut self, table: &str, index: &[String], row: Row, mode: Put) -> Result<(), DeviceError> {
        let mut rows = self.0.borrow_mut();
        let key = key(table, index);
        match (mode, rows.contains_key(&key)) {
            (Put::Insert, false) => {
                rows.insert(key, row);
            }
            (Put::Merge, true) => {
                if let Some(existing) = rows.get_mut(&key) {
                    existing.extend(row);
                }
            }
            (Put::Insert, true) => return Err(DeviceError::rejected(anyhow!("row exists"))),
            (Put::Merge, false) => return Err(DeviceError::rejected(anyhow!("no such row"))),
        }
        Ok(())
    }

    fn remove(&mut self, table: &str, index: &[String]) -> Result<(), DeviceError> {
        match self.0.borrow_mut().remove(&key(table, index)) {
            Some(_) => Ok(()),
            None => Err(DeviceError::rejected(anyhow!("no such row"))),
        }
    }
}
