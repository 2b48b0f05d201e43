//! Ontology 持久化边界：store / get / find
//!
//! 记录以 JSON 形式按 (kind, id) 存取。MemoryStore 供测试与临时运行；
//! JsonFileStore 在 root/<kind>/<id>.json 下每条记录一个文件。

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::Value;
use thiserror::Error;

/// 记录类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Identity,
    Goal,
    Task,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Identity => "identity",
            RecordKind::Goal => "goal",
            RecordKind::Task => "task",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid record id: {0}")]
    InvalidId(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// 持久化存储 trait
pub trait OntologyStore: Send + Sync {
    fn store(&self, kind: RecordKind, id: &str, record: &Value) -> Result<(), StoreError>;

    /// 不存在时返回 Ok(None)
    fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError>;

    fn find(
        &self,
        kind: RecordKind,
        predicate: &dyn Fn(&Value) -> bool,
    ) -> Result<Vec<Value>, StoreError>;
}

/// 内存存储
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(RecordKind, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OntologyStore for MemoryStore {
    fn store(&self, kind: RecordKind, id: &str, record: &Value) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert((kind, id.to_string()), record.clone());
        Ok(())
    }

    fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(&(kind, id.to_string()))
            .cloned())
    }

    fn find(
        &self,
        kind: RecordKind,
        predicate: &dyn Fn(&Value) -> bool,
    ) -> Result<Vec<Value>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records
            .iter()
            .filter(|((k, _), v)| *k == kind && predicate(v))
            .map(|(_, v)| v.clone())
            .collect())
    }
}

/// JSON 文件存储：root/<kind>/<id>.json
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 文件名保留 [A-Za-z0-9_-]，其余字节按 %XX 编码，不同 id 不会落到同一文件
    fn record_path(&self, kind: RecordKind, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        let mut file_name = String::with_capacity(id.len() + 5);
        for byte in id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                file_name.push(char::from(byte));
            } else {
                file_name.push_str(&format!("%{byte:02X}"));
            }
        }
        file_name.push_str(".json");
        Ok(self.root.join(kind.as_str()).join(file_name))
    }
}

impl OntologyStore for JsonFileStore {
    fn store(&self, kind: RecordKind, id: &str, record: &Value) -> Result<(), StoreError> {
        let path = self.record_path(kind, id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec_pretty(record)?)?;
        Ok(())
    }

    fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError> {
        let path = self.record_path(kind, id)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn find(
        &self,
        kind: RecordKind,
        predicate: &dyn Fn(&Value) -> bool,
    ) -> Result<Vec<Value>, StoreError> {
        let dir = self.root.join(kind.as_str());
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut found = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let value: Value = serde_json::from_slice(&std::fs::read(&path)?)?;
            if predicate(&value) {
                found.push(value);
            }
        }
        Ok(found)
    }
}
