use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tracing::{debug, info, instrument};

use shared_config::AppConfig;
use shared_database::{StorageError, TableClient};
use shared_models::StoredAppointment;

use crate::error::StoreError;
use crate::models::{AppointmentEntity, PendingSurveyQuery};

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Atomic insert. An existing record with the same key yields
    /// [`StoreError::AlreadyExists`].
    async fn create(&self, record: &StoredAppointment) -> Result<(), StoreError>;

    async fn query_pending_survey(&self, query: &PendingSurveyQuery) -> Result<Vec<StoredAppointment>, StoreError>;

    /// Sets `sent_on` and `message_sid` only.
    async fn mark_sent(
        &self,
        row_key: &str,
        partition_key: &str,
        sent_on: DateTime<Utc>,
        message_sid: &str,
    ) -> Result<(), StoreError>;

    async fn get(&self, row_key: &str, partition_key: &str) -> Result<Option<StoredAppointment>, StoreError>;
}

/// Appointment records in an Azure Storage table.
pub struct TableAppointmentStore {
    table: TableClient,
}

impl TableAppointmentStore {
    pub fn new(table: TableClient) -> Self {
        Self { table }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        Ok(Self::new(TableClient::from_config(config)?))
    }

    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        self.table.create_table_if_missing().await?;
        info!("Appointments table '{}' ready", self.table.table_name());
        Ok(())
    }
}

#[async_trait]
impl AppointmentStore for TableAppointmentStore {
    #[instrument(skip(self, record), fields(row_key = %record.row_key))]
    async fn create(&self, record: &StoredAppointment) -> Result<(), StoreError> {
        let entity = AppointmentEntity::from(record);
        match self.table.insert_entity(&entity).await {
            Ok(()) => {
                debug!("Inserted appointment entity");
                Ok(())
            }
            Err(StorageError::Conflict) => Err(StoreError::AlreadyExists {
                row_key: record.row_key.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn query_pending_survey(&self, query: &PendingSurveyQuery) -> Result<Vec<StoredAppointment>, StoreError> {
        let filter = query.to_odata_filter();
        debug!("Querying pending surveys: {}", filter);

        let entities: Vec<AppointmentEntity> = self.table.query_entities(&filter).await?;
        entities
            .into_iter()
            .map(StoredAppointment::try_from)
            .collect()
    }

    #[instrument(skip(self, sent_on, message_sid))]
    async fn mark_sent(
        &self,
        row_key: &str,
        partition_key: &str,
        sent_on: DateTime<Utc>,
        message_sid: &str,
    ) -> Result<(), StoreError> {
        let properties = json!({
            "sentOn": sent_on.to_rfc3339_opts(SecondsFormat::Secs, true),
            "sentOn@odata.type": "Edm.DateTime",
            "message_sid": message_sid,
        });

        match self.table.merge_entity(partition_key, row_key, &properties).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => Err(StoreError::NotFound {
                row_key: row_key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, row_key: &str, partition_key: &str) -> Result<Option<StoredAppointment>, StoreError> {
        let entity: Option<AppointmentEntity> = self.table.get_entity(partition_key, row_key).await?;
        entity.map(StoredAppointment::try_from).transpose()
    }
}
