//! Whole-store snapshot export and restore.

use crate::prelude::*;

use crate::base::Actor;
use crate::persistence::RecordStore;

pub mod export;
pub mod import;
pub mod snapshot;

use import::RestoreReport;
use snapshot::Snapshot;

#[derive(Clone)]
pub struct BackupService {
    records: Arc<dyn RecordStore>,
}

impl BackupService {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    pub async fn export(&self) -> Result<Snapshot> {
        export::export_all(self.records.as_ref()).await
    }

    pub async fn restore(&self, bytes: &[u8], actor: &Actor) -> Result<RestoreReport> {
        info!("Restoring snapshot of {} bytes for {}", bytes.len(), actor.id);
        import::import_all(self.records.as_ref(), bytes, actor).await
    }
}
