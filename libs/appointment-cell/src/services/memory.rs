use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use shared_models::StoredAppointment;

use crate::error::StoreError;
use crate::models::PendingSurveyQuery;
use crate::services::store::AppointmentStore;

/// Process-local store with the same contract as the table store.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    records: Mutex<BTreeMap<(String, String), StoredAppointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<StoredAppointment> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), StoredAppointment>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn create(&self, record: &StoredAppointment) -> Result<(), StoreError> {
        let mut records = self.lock();
        let key = (record.partition_key.clone(), record.row_key.clone());
        if records.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                row_key: record.row_key.clone(),
            });
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn query_pending_survey(&self, query: &PendingSurveyQuery) -> Result<Vec<StoredAppointment>, StoreError> {
        Ok(self
            .lock()
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }

    async fn mark_sent(
        &self,
        row_key: &str,
        partition_key: &str,
        sent_on: DateTime<Utc>,
        message_sid: &str,
    ) -> Result<(), StoreError> {
        let mut records = self.lock();
        let record = records
            .get_mut(&(partition_key.to_string(), row_key.to_string()))
            .ok_or_else(|| StoreError::NotFound {
                row_key: row_key.to_string(),
            })?;
        record.sent_on = Some(sent_on);
        record.message_sid = Some(message_sid.to_string());
        Ok(())
    }

    async fn get(&self, row_key: &str, partition_key: &str) -> Result<Option<StoredAppointment>, StoreError> {
        Ok(self
            .lock()
            .get(&(partition_key.to_string(), row_key.to_string()))
            .cloned())
    }
}
