use std::sync::{Arc, Mutex};

use crate::error::{GatewayError, GatewayResult};
use crate::store::{KvStore, KvTxn, STORAGE_NAMESPACE};

pub const SCHEMA_VERSION_CURRENT: i32 = 1;
const KEY_SCHEMA_VER: &str = "schema_ver";

type MigrationFn = fn(&mut KvTxn<'_>) -> GatewayResult<()>;

struct MigrationStep {
    from: i32,
    to: i32,
    migrate: MigrationFn,
}

// v0 is the legacy unversioned schema; its data keys are already shaped
// like v1, so the step only has to introduce the version key.
fn migrate_v0_to_v1(_txn: &mut KvTxn<'_>) -> GatewayResult<()> {
    Ok(())
}

const MIGRATION_STEPS: &[MigrationStep] = &[MigrationStep {
    from: 0,
    to: 1,
    migrate: migrate_v0_to_v1,
}];

fn find_step(from: i32) -> Option<&'static MigrationStep> {
    MIGRATION_STEPS.iter().find(|step| step.from == from)
}

/// Persisted schema version plus the linear migration chain.
pub struct SchemaStore {
    kv: Arc<KvStore>,
    lock: Mutex<()>,
}

impl SchemaStore {
    pub fn new(kv: Arc<KvStore>) -> Arc<Self> {
        Arc::new(SchemaStore {
            kv,
            lock: Mutex::new(()),
        })
    }

    /// Reads the stored version. An absent key (or namespace) reads as the
    /// legacy version 0 with `found == false`.
    pub fn version(&self) -> GatewayResult<(i32, bool)> {
        let _guard = self.lock.lock().expect("lock schema");
        self.version_unlocked()
    }

    pub fn set_version(&self, version: i32) -> GatewayResult<()> {
        if version < 0 {
            return Err(GatewayError::InvalidArg);
        }
        let _guard = self.lock.lock().expect("lock schema");
        let mut txn = self.kv.open_readwrite(STORAGE_NAMESPACE);
        txn.set_i32(KEY_SCHEMA_VER, version)?;
        txn.commit()
    }

    /// Brings the stored schema to the current version.
    ///
    /// Walks the migration chain one step at a time, committing the new
    /// version after each successful step; a failing step aborts with no
    /// commit for that step. A stored version newer than the current one
    /// is a fatal, non-destructive error.
    pub fn init_or_migrate(&self) -> GatewayResult<()> {
        let _guard = self.lock.lock().expect("lock schema");
        let (mut version, _found) = self.version_unlocked()?;

        if version > SCHEMA_VERSION_CURRENT {
            log::error!(
                "unsupported settings schema version: {version} > {SCHEMA_VERSION_CURRENT}"
            );
            return Err(GatewayError::NotSupported);
        }
        if version == SCHEMA_VERSION_CURRENT {
            log::info!("settings schema up-to-date: v{SCHEMA_VERSION_CURRENT}");
            return Ok(());
        }

        while version < SCHEMA_VERSION_CURRENT {
            let step = match find_step(version) {
                Some(step) if step.to > step.from => step,
                _ => {
                    log::error!("missing migration step from v{version}");
                    return Err(GatewayError::NotSupported);
                }
            };

            let mut txn = self.kv.open_readwrite(STORAGE_NAMESPACE);
            (step.migrate)(&mut txn)?;
            txn.set_i32(KEY_SCHEMA_VER, step.to)?;
            txn.commit()?;

            log::info!("settings schema migrated: v{} -> v{}", step.from, step.to);
            version = step.to;
        }
        Ok(())
    }

    fn version_unlocked(&self) -> GatewayResult<(i32, bool)> {
        match self.kv.open_readonly(STORAGE_NAMESPACE) {
            Ok(txn) => match txn.get_i32(KEY_SCHEMA_VER)? {
                Some(v) => Ok((v, true)),
                None => Ok((0, false)),
            },
            Err(GatewayError::NotFound) => Ok((0, false)),
            Err(e) => Err(e),
        }
    }
}
