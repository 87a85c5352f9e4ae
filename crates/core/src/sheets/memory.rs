//! In-process [`SheetStore`], used by tests and dry runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{Row, SheetStore, Worksheet};
use crate::Result;

type Grid = Arc<Mutex<Vec<Vec<String>>>>;

/// Worksheets kept as string grids, one per title.
#[derive(Default, Clone)]
pub struct MemoryStore {
    tabs: Arc<Mutex<HashMap<String, Grid>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents of a tab, creating it if needed.
    pub fn seed(&self, title: &str, rows: Vec<Vec<String>>) {
        *self.grid(title).lock().unwrap_or_else(PoisonError::into_inner) = rows;
    }

    /// Snapshot of a tab; empty when it does not exist.
    pub fn rows(&self, title: &str) -> Vec<Vec<String>> {
        let tabs = self.tabs.lock().unwrap_or_else(PoisonError::into_inner);
        tabs.get(title)
            .map(|grid| grid.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default()
    }

    fn grid(&self, title: &str) -> Grid {
        let mut tabs = self.tabs.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(tabs.entry(title.to_string()).or_default())
    }
}

#[async_trait]
impl SheetStore for MemoryStore {
    async fn worksheet(&self, title: &str, _rows: u32, _cols: u32) -> Result<Arc<dyn Worksheet>> {
        Ok(Arc::new(MemoryWorksheet { grid: self.grid(title) }))
    }
}

struct MemoryWorksheet {
    grid: Grid,
}

impl MemoryWorksheet {
    fn with_grid<T>(&self, f: impl FnOnce(&mut Vec<Vec<String>>) -> T) -> T {
        f(&mut self.grid.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl Worksheet for MemoryWorksheet {
    async fn row_values(&self, row: usize) -> Result<Vec<String>> {
        Ok(self.with_grid(|grid| grid.get(row.saturating_sub(1)).cloned().unwrap_or_default()))
    }

    async fn all_values(&self) -> Result<Vec<Vec<String>>> {
        Ok(self.with_grid(|grid| grid.clone()))
    }

    async fn write_header(&self, headers: &[&str]) -> Result<()> {
        let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        self.with_grid(|grid| match grid.first_mut() {
            Some(first) => *first = header,
            None => grid.push(header),
        });
        Ok(())
    }

    async fn append_rows(&self, rows: &[Row]) -> Result<()> {
        let rendered: Vec<Vec<String>> = rows.iter().map(|row| row.iter().map(display).collect()).collect();
        self.with_grid(|grid| grid.extend(rendered));
        Ok(())
    }
}

/// How a cell reads back after a RAW write.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
