use crate::prelude::*;

use super::snapshot::{Snapshot, SnapshotData};
use crate::persistence::RecordStore;

/// Reads every staff member, case and the settings document into one snapshot.
///
/// Password hashes are dropped; attachment locators are kept as they are.
pub async fn export_all(records: &dyn RecordStore) -> Result<Snapshot> {
    let (lawyers, cases, settings) = futures::try_join!(
        records.all_staff(),
        records.all_cases(),
        records.get_settings(),
    )
    .map_err(|err| match err {
        Error::StoreUnavailable(_) => err,
        other => Error::StoreUnavailable(other.to_string()),
    })?;

    if lawyers.is_empty() && cases.is_empty() && settings.is_none() {
        return Err(Error::EmptyStore);
    }

    let snapshot = Snapshot::new(SnapshotData {
        lawyers: lawyers.iter().map(|s| s.without_secrets()).collect(),
        cases,
        settings,
    });
    info!(
        "Exported snapshot: {} staff, {} cases, {} settings",
        snapshot.metadata.total_records.lawyers,
        snapshot.metadata.total_records.cases,
        snapshot.metadata.total_records.settings
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{OfficeSettings, Role, StaffMember};
    use crate::persistence::memory::MemoryRecordStore;

    #[tokio::test]
    async fn test_empty_store_has_nothing_to_export() {
        let records = MemoryRecordStore::new();
        let err = export_all(&records).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyStore);
    }

    #[tokio::test]
    async fn test_export_drops_password_hashes() {
        let records = MemoryRecordStore::new();
        records
            .insert_staff(&StaffMember {
                id: Uuid::new_v4(),
                name: "Mona".into(),
                registration_number: None,
                registration_level: None,
                national_id: None,
                address: None,
                phone: None,
                image: None,
                registration_code: "123456".into(),
                password_hash: Some("$2b$10$secret".into()),
                role: Role::Admin,
                is_active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        records.put_settings(&OfficeSettings::default()).await.unwrap();

        let snapshot = export_all(&records).await.unwrap();
        assert_eq!(snapshot.metadata.total_records.lawyers, 1);
        assert_eq!(snapshot.metadata.total_records.settings, 1);
        assert_eq!(snapshot.data.lawyers[0].password_hash, None);
        let text = serde_json::to_string(&snapshot).unwrap();
        assert!(!text.contains("secret"));
    }
}
