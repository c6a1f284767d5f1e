use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{truncate_utf8, DeviceRecord, IeeeAddr, DEVICE_NAME_MAX_LEN, MAX_DEVICES};
use crate::error::{GatewayError, GatewayResult};
use crate::event::{EventBus, GatewayEvent};
use crate::service::StateStore;
use crate::store::DeviceRepo;

/// Display name assigned at join time. Only the ≤31-byte bound is
/// contractual, not the literal.
pub fn default_device_name(short_addr: u16) -> String {
    format!("Device 0x{short_addr:04X}")
}

/// Authoritative in-memory device list, owning persistence through the
/// repository port.
///
/// Every mutation that persists rolls the in-memory change back if the
/// save fails, so callers never observe an acknowledged state that is not
/// on disk. Notifications go out only after a successful persist and only
/// after the lock is released, which keeps downstream subscribers free to
/// call back into the registry.
pub struct DeviceRegistry {
    devices: Mutex<Vec<DeviceRecord>>,
    repo: Arc<dyn DeviceRepo>,
    state: Arc<StateStore>,
    bus: Arc<EventBus>,
    initialized: AtomicBool,
}

impl DeviceRegistry {
    pub fn new(
        repo: Arc<dyn DeviceRepo>,
        state: Arc<StateStore>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(DeviceRegistry {
            devices: Mutex::new(Vec::new()),
            repo,
            state,
            bus,
            initialized: AtomicBool::new(false),
        })
    }

    /// Loads the persisted list and emits one list-changed notification.
    /// Subsequent calls are no-ops.
    pub fn init(&self) -> GatewayResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        {
            let mut devices = self.devices.lock().expect("lock devices");
            match self.repo.load() {
                Ok(Some(stored)) => {
                    log::info!("loaded {} devices from storage", stored.len());
                    *devices = stored;
                }
                Ok(None) => {
                    log::warn!("no device data in storage (first boot?)");
                }
                Err(e) => {
                    log::warn!("failed to load device data: {e}");
                }
            }
            self.state.set_devices(&devices);
        }
        self.bus.post(GatewayEvent::DeviceListChanged);
        Ok(())
    }

    /// Adds a device from a join announcement. A known short address only
    /// refreshes the stored IEEE address, with no save and no
    /// notification.
    pub fn add(&self, short_addr: u16, ieee_addr: IeeeAddr) -> GatewayResult<()> {
        {
            let mut devices = self.devices.lock().expect("lock devices");
            if let Some(existing) = devices.iter_mut().find(|d| d.short_addr == short_addr) {
                log::info!("device 0x{short_addr:04x} already known, updating IEEE");
                existing.ieee_addr = ieee_addr;
                self.state.set_devices(&devices);
                return Ok(());
            }

            if devices.len() >= MAX_DEVICES {
                log::warn!("device limit reached ({MAX_DEVICES})");
                return Err(GatewayError::NoMem);
            }

            devices.push(DeviceRecord::new(
                short_addr,
                ieee_addr,
                default_device_name(short_addr),
            ));
            if let Err(e) = self.repo.save(&devices) {
                devices.pop();
                return Err(e);
            }
            log::info!("new device 0x{short_addr:04x}, total {}", devices.len());
            self.state.set_devices(&devices);
        }
        self.bus.post(GatewayEvent::DeviceListChanged);
        Ok(())
    }

    /// Renames a device. A name identical to the current one performs no
    /// persistence call and no notification.
    pub fn update_name(&self, short_addr: u16, new_name: &str) -> GatewayResult<()> {
        let new_name = truncate_utf8(new_name, DEVICE_NAME_MAX_LEN).to_string();
        {
            let mut devices = self.devices.lock().expect("lock devices");
            let Some(index) = devices.iter().position(|d| d.short_addr == short_addr) else {
                return Err(GatewayError::NotFound);
            };
            if devices[index].name == new_name {
                return Ok(());
            }

            let previous = std::mem::replace(&mut devices[index].name, new_name);
            if let Err(e) = self.repo.save(&devices) {
                devices[index].name = previous;
                return Err(e);
            }
            log::info!("device 0x{short_addr:04x} renamed to '{}'", devices[index].name);
            self.state.set_devices(&devices);
        }
        self.bus.post(GatewayEvent::DeviceListChanged);
        Ok(())
    }

    /// Removes a device, preserving order. An unknown address is a no-op.
    /// After releasing the lock, a delete request carrying the captured
    /// IEEE address is posted, then list-changed.
    pub fn delete(&self, short_addr: u16) -> GatewayResult<()> {
        let removed;
        {
            let mut devices = self.devices.lock().expect("lock devices");
            let Some(index) = devices.iter().position(|d| d.short_addr == short_addr) else {
                return Ok(());
            };
            let record = devices.remove(index);
            if let Err(e) = self.repo.save(&devices) {
                devices.insert(index, record);
                return Err(e);
            }
            log::info!("device 0x{short_addr:04x} removed, {} remaining", devices.len());
            self.state.set_devices(&devices);
            removed = record;
        }
        self.bus.post(GatewayEvent::DeviceDeleteRequest {
            short_addr: removed.short_addr,
            ieee_addr: removed.ieee_addr,
        });
        self.bus.post(GatewayEvent::DeviceListChanged);
        Ok(())
    }

    pub fn snapshot(&self, max_items: usize) -> Vec<DeviceRecord> {
        let devices = self.devices.lock().expect("lock devices");
        devices.iter().take(max_items).cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.devices.lock().expect("lock devices").len()
    }
}
