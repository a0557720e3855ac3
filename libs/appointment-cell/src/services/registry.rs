use std::sync::Arc;

use tracing::{debug, info, warn};

use shared_models::{Appointment, IngestSummary, StoredAppointment};

use crate::error::StoreError;
use crate::services::identity::key_for;
use crate::services::store::AppointmentStore;

/// Turns parsed appointments into stored records, one at a time.
pub struct AppointmentRegistry {
    store: Arc<dyn AppointmentStore>,
}

impl AppointmentRegistry {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn AppointmentStore> {
        Arc::clone(&self.store)
    }

    /// Creates a record per appointment. Duplicates and per-record failures
    /// are counted and never stop the batch.
    pub async fn ingest(&self, appointments: Vec<Appointment>) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for appointment in appointments {
            let key = match key_for(&appointment) {
                Ok(key) => key,
                Err(e) => {
                    warn!("Skipping '{}': {}", appointment.patient_name, e);
                    summary.errors += 1;
                    continue;
                }
            };

            let record = StoredAppointment::new(key.row_key, key.partition_key, appointment);
            match self.store.create(&record).await {
                Ok(()) => {
                    debug!("Created appointment {}", record.row_key);
                    summary.created += 1;
                }
                Err(StoreError::AlreadyExists { row_key }) => {
                    debug!("Appointment {} already stored", row_key);
                    summary.duplicates += 1;
                }
                Err(e) => {
                    warn!("Failed to store appointment {}: {}", record.row_key, e);
                    summary.errors += 1;
                }
            }
        }

        info!(
            "Ingest complete: {} created, {} duplicates, {} errors",
            summary.created, summary.duplicates, summary.errors
        );
        summary
    }
}
