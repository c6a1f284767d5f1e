use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Partition holding the gateway's own namespaces.
pub const DEFAULT_PARTITION: &str = "nvs";
/// The single namespace used for gateway settings and device records.
pub const STORAGE_NAMESPACE: &str = "storage";
/// Opaque Zigbee-stack partitions, erased wholesale on factory reset.
pub const ZB_STORAGE_PARTITION: &str = "zb_storage";
pub const ZB_FCT_PARTITION: &str = "zb_fct";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum KvValue {
    I32(i32),
    U32(u32),
    Str(String),
    Blob(Vec<u8>),
}

type Namespace = HashMap<String, KvValue>;
type Partition = HashMap<String, Namespace>;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct KvTable {
    partitions: HashMap<String, Partition>,
}

/// Durable home of a committed [`KvTable`]. The in-memory store uses the
/// null backend; the binary persists to a JSON file.
pub trait KvBackend: Send + Sync {
    fn load(&self) -> GatewayResult<KvTable>;
    fn persist(&self, table: &KvTable) -> GatewayResult<()>;
}

struct NullBackend;

impl KvBackend for NullBackend {
    fn load(&self) -> GatewayResult<KvTable> {
        Ok(KvTable::default())
    }

    fn persist(&self, _table: &KvTable) -> GatewayResult<()> {
        Ok(())
    }
}

/// JSON-file backend. The file is rewritten on every commit; a write
/// failure surfaces as `Fail` and the committed table is left untouched.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileBackend { path: path.into() }
    }
}

impl KvBackend for FileBackend {
    fn load(&self) -> GatewayResult<KvTable> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                log::warn!("corrupt kv file {}: {e}", self.path.display());
                GatewayError::Fail
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(KvTable::default()),
            Err(e) => {
                log::warn!("failed to read kv file {}: {e}", self.path.display());
                Err(GatewayError::Fail)
            }
        }
    }

    fn persist(&self, table: &KvTable) -> GatewayResult<()> {
        let bytes = serde_json::to_vec(table).map_err(|_| GatewayError::Fail)?;
        std::fs::write(&self.path, bytes).map_err(|e| {
            log::warn!("failed to write kv file {}: {e}", self.path.display());
            GatewayError::Fail
        })
    }
}

/// Typed key-value store with explicit-commit transactions per namespace.
///
/// Writes staged in a transaction become visible to other readers only at
/// `commit`; dropping the transaction discards them. A failed commit
/// leaves the previously committed table intact.
pub struct KvStore {
    backend: Box<dyn KvBackend>,
    table: Mutex<KvTable>,
}

impl KvStore {
    pub fn in_memory() -> Arc<Self> {
        Arc::new(KvStore {
            backend: Box::new(NullBackend),
            table: Mutex::new(KvTable::default()),
        })
    }

    pub fn open_file(path: impl AsRef<Path>) -> GatewayResult<Arc<Self>> {
        let backend = FileBackend::new(path.as_ref());
        let table = backend.load()?;
        Ok(Arc::new(KvStore {
            backend: Box::new(backend),
            table: Mutex::new(table),
        }))
    }

    pub fn with_backend(backend: Box<dyn KvBackend>) -> GatewayResult<Arc<Self>> {
        let table = backend.load()?;
        Ok(Arc::new(KvStore {
            backend,
            table: Mutex::new(table),
        }))
    }

    /// Opens a read-only view of a namespace in the default partition.
    /// Fails `NotFound` when the namespace was never committed.
    pub fn open_readonly(&self, namespace: &str) -> GatewayResult<KvTxn<'_>> {
        let table = self.table.lock().expect("lock kv table");
        let ns = table
            .partitions
            .get(DEFAULT_PARTITION)
            .and_then(|p| p.get(namespace))
            .ok_or(GatewayError::NotFound)?
            .clone();
        Ok(KvTxn {
            store: self,
            namespace: namespace.to_string(),
            work: ns,
            writable: false,
        })
    }

    /// Opens a read-write transaction on a namespace in the default
    /// partition, creating it at commit time if needed.
    pub fn open_readwrite(&self, namespace: &str) -> KvTxn<'_> {
        let table = self.table.lock().expect("lock kv table");
        let ns = table
            .partitions
            .get(DEFAULT_PARTITION)
            .and_then(|p| p.get(namespace))
            .cloned()
            .unwrap_or_default();
        KvTxn {
            store: self,
            namespace: namespace.to_string(),
            work: ns,
            writable: true,
        }
    }

    /// Wipes a whole partition. Returns whether it existed.
    pub fn erase_partition(&self, label: &str) -> GatewayResult<bool> {
        let mut table = self.table.lock().expect("lock kv table");
        let removed = table.partitions.remove(label);
        let found = removed.is_some();
        if let Err(e) = self.backend.persist(&table) {
            if let Some(partition) = removed {
                table.partitions.insert(label.to_string(), partition);
            }
            return Err(e);
        }
        Ok(found)
    }

    /// Seeds a key in an arbitrary partition. The gateway itself only
    /// writes the default partition; this exists so tests and platform
    /// glue can populate the opaque Zigbee partitions.
    pub fn seed_partition_key(&self, partition: &str, namespace: &str, key: &str, value: KvValue) {
        let mut table = self.table.lock().expect("lock kv table");
        table
            .partitions
            .entry(partition.to_string())
            .or_default()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn commit_namespace(&self, namespace: &str, work: &Namespace) -> GatewayResult<()> {
        let mut table = self.table.lock().expect("lock kv table");
        let partition = table
            .partitions
            .entry(DEFAULT_PARTITION.to_string())
            .or_default();
        let previous = partition.insert(namespace.to_string(), work.clone());
        if let Err(e) = self.backend.persist(&table) {
            // Roll the committed table back so readers never observe a
            // state the backend failed to make durable.
            match previous {
                Some(ns) => {
                    table
                        .partitions
                        .entry(DEFAULT_PARTITION.to_string())
                        .or_default()
                        .insert(namespace.to_string(), ns);
                }
                None => {
                    table
                        .partitions
                        .entry(DEFAULT_PARTITION.to_string())
                        .or_default()
                        .remove(namespace);
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

/// One open namespace. Staged mutations live only in this value until
/// `commit`.
pub struct KvTxn<'s> {
    store: &'s KvStore,
    namespace: String,
    work: Namespace,
    writable: bool,
}

impl KvTxn<'_> {
    pub fn get_i32(&self, key: &str) -> GatewayResult<Option<i32>> {
        match self.work.get(key) {
            None => Ok(None),
            Some(KvValue::I32(v)) => Ok(Some(*v)),
            Some(_) => Err(GatewayError::InvalidArg),
        }
    }

    pub fn set_i32(&mut self, key: &str, value: i32) -> GatewayResult<()> {
        self.set(key, KvValue::I32(value))
    }

    pub fn get_u32(&self, key: &str) -> GatewayResult<Option<u32>> {
        match self.work.get(key) {
            None => Ok(None),
            Some(KvValue::U32(v)) => Ok(Some(*v)),
            Some(_) => Err(GatewayError::InvalidArg),
        }
    }

    pub fn set_u32(&mut self, key: &str, value: u32) -> GatewayResult<()> {
        self.set(key, KvValue::U32(value))
    }

    pub fn get_str(&self, key: &str) -> GatewayResult<Option<String>> {
        match self.work.get(key) {
            None => Ok(None),
            Some(KvValue::Str(v)) => Ok(Some(v.clone())),
            Some(_) => Err(GatewayError::InvalidArg),
        }
    }

    pub fn set_str(&mut self, key: &str, value: &str) -> GatewayResult<()> {
        self.set(key, KvValue::Str(value.to_string()))
    }

    pub fn get_blob(&self, key: &str) -> GatewayResult<Option<Vec<u8>>> {
        match self.work.get(key) {
            None => Ok(None),
            Some(KvValue::Blob(v)) => Ok(Some(v.clone())),
            Some(_) => Err(GatewayError::InvalidArg),
        }
    }

    pub fn set_blob(&mut self, key: &str, value: &[u8]) -> GatewayResult<()> {
        self.set(key, KvValue::Blob(value.to_vec()))
    }

    /// Returns whether the key existed.
    pub fn erase_key(&mut self, key: &str) -> GatewayResult<bool> {
        if !self.writable {
            return Err(GatewayError::InvalidState);
        }
        Ok(self.work.remove(key).is_some())
    }

    pub fn commit(self) -> GatewayResult<()> {
        if !self.writable {
            return Err(GatewayError::InvalidState);
        }
        self.store.commit_namespace(&self.namespace, &self.work)
    }

    fn set(&mut self, key: &str, value: KvValue) -> GatewayResult<()> {
        if !self.writable {
            return Err(GatewayError::InvalidState);
        }
        self.work.insert(key.to_string(), value);
        Ok(())
    }
}
