use std::sync::{Arc, Mutex};

use crate::config::{DeviceRecord, IeeeAddr, MAX_DEVICES};
use crate::error::{GatewayError, GatewayResult};
use crate::store::{KvStore, STORAGE_NAMESPACE};

const KEY_DEV_COUNT: &str = "dev_count";
const KEY_DEV_LIST: &str = "dev_list";

// Fixed wire layout per record: LE short address, IEEE address, NUL-padded
// name field. The blob always holds the full capacity, unused slots zeroed.
const NAME_FIELD_LEN: usize = 32;
pub const DEVICE_RECORD_SIZE: usize = 2 + 8 + NAME_FIELD_LEN;
pub const DEVICE_BLOB_SIZE: usize = DEVICE_RECORD_SIZE * MAX_DEVICES;

/// Repository port the device registry persists through. Production uses
/// [`DeviceRepository`]; tests substitute failing or counting fakes.
pub trait DeviceRepo: Send + Sync {
    /// Returns the stored records, or `None` when nothing was ever saved.
    fn load(&self) -> GatewayResult<Option<Vec<DeviceRecord>>>;
    fn save(&self, devices: &[DeviceRecord]) -> GatewayResult<()>;
}

pub fn encode_devices(devices: &[DeviceRecord]) -> GatewayResult<Vec<u8>> {
    if devices.len() > MAX_DEVICES {
        return Err(GatewayError::InvalidArg);
    }
    let mut blob = vec![0u8; DEVICE_BLOB_SIZE];
    for (i, device) in devices.iter().enumerate() {
        let at = i * DEVICE_RECORD_SIZE;
        blob[at..at + 2].copy_from_slice(&device.short_addr.to_le_bytes());
        blob[at + 2..at + 10].copy_from_slice(&device.ieee_addr);
        let name = device.name.as_bytes();
        if name.len() >= NAME_FIELD_LEN {
            return Err(GatewayError::InvalidArg);
        }
        blob[at + 10..at + 10 + name.len()].copy_from_slice(name);
    }
    Ok(blob)
}

pub fn decode_devices(blob: &[u8], count: usize) -> GatewayResult<Vec<DeviceRecord>> {
    if count > MAX_DEVICES || blob.len() < count * DEVICE_RECORD_SIZE {
        return Err(GatewayError::InvalidArg);
    }
    let mut devices = Vec::with_capacity(count);
    for i in 0..count {
        let at = i * DEVICE_RECORD_SIZE;
        let short_addr = u16::from_le_bytes([blob[at], blob[at + 1]]);
        let mut ieee_addr: IeeeAddr = [0; 8];
        ieee_addr.copy_from_slice(&blob[at + 2..at + 10]);
        let name_field = &blob[at + 10..at + 10 + NAME_FIELD_LEN];
        let name_len = name_field
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(NAME_FIELD_LEN);
        let name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();
        devices.push(DeviceRecord {
            short_addr,
            ieee_addr,
            name,
        });
    }
    Ok(devices)
}

/// Persists the device count plus the fixed-capacity record array.
pub struct DeviceRepository {
    kv: Arc<KvStore>,
    lock: Mutex<()>,
}

impl DeviceRepository {
    pub fn new(kv: Arc<KvStore>) -> Arc<Self> {
        Arc::new(DeviceRepository {
            kv,
            lock: Mutex::new(()),
        })
    }

    pub fn clear(&self) -> GatewayResult<()> {
        let _guard = self.lock.lock().expect("lock device repo");
        let mut txn = self.kv.open_readwrite(STORAGE_NAMESPACE);
        txn.erase_key(KEY_DEV_COUNT)?;
        txn.erase_key(KEY_DEV_LIST)?;
        txn.commit()
    }
}

impl DeviceRepo for DeviceRepository {
    fn load(&self) -> GatewayResult<Option<Vec<DeviceRecord>>> {
        let _guard = self.lock.lock().expect("lock device repo");
        let txn = match self.kv.open_readonly(STORAGE_NAMESPACE) {
            Ok(txn) => txn,
            Err(GatewayError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        let count = match txn.get_i32(KEY_DEV_COUNT)? {
            Some(count) => count,
            None => return Ok(None),
        };
        let blob = match txn.get_blob(KEY_DEV_LIST)? {
            Some(blob) => blob,
            None => return Ok(None),
        };
        let count = count.clamp(0, MAX_DEVICES as i32) as usize;
        Ok(Some(decode_devices(&blob, count)?))
    }

    fn save(&self, devices: &[DeviceRecord]) -> GatewayResult<()> {
        if devices.len() > MAX_DEVICES {
            return Err(GatewayError::InvalidArg);
        }
        let _guard = self.lock.lock().expect("lock device repo");
        let blob = encode_devices(devices)?;
        let mut txn = self.kv.open_readwrite(STORAGE_NAMESPACE);
        txn.set_i32(KEY_DEV_COUNT, devices.len() as i32)?;
        txn.set_blob(KEY_DEV_LIST, &blob)?;
        txn.commit()
    }
}
