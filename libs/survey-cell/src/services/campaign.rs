use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use appointment_cell::{AppointmentStore, PendingSurveyQuery, StoreError};
use shared_models::SurveySummary;

use crate::services::dispatcher::SurveyDispatcher;

/// Sends a survey for every pending record and records the delivery.
pub struct SurveyCampaign {
    store: Arc<dyn AppointmentStore>,
    dispatcher: SurveyDispatcher,
    query: PendingSurveyQuery,
}

impl SurveyCampaign {
    pub fn new(store: Arc<dyn AppointmentStore>, dispatcher: SurveyDispatcher, query: PendingSurveyQuery) -> Self {
        Self {
            store,
            dispatcher,
            query,
        }
    }

    /// Dispatch and update failures are counted per record. Only a failed
    /// pending query is returned as an error.
    pub async fn send_pending(&self) -> Result<SurveySummary, StoreError> {
        let pending = self.store.query_pending_survey(&self.query).await?;
        info!("{} appointments pending a survey", pending.len());

        let mut summary = SurveySummary {
            pending: pending.len(),
            ..Default::default()
        };

        for record in pending {
            let sid = match self
                .dispatcher
                .send_survey(&record.row_key, &record.appointment.patient_name, &record.appointment.patient_phone)
                .await
            {
                Ok(sid) => sid,
                Err(e) => {
                    warn!("Survey dispatch failed for {}: {}", record.row_key, e);
                    summary.dispatch_errors += 1;
                    continue;
                }
            };
            summary.sent += 1;

            if let Err(e) = self
                .store
                .mark_sent(&record.row_key, &record.partition_key, Utc::now(), &sid)
                .await
            {
                error!("Survey {} sent but record {} not updated: {}", sid, record.row_key, e);
                summary.update_errors += 1;
            }
        }

        info!(
            "Surveys complete: {} sent, {} dispatch errors, {} update errors",
            summary.sent, summary.dispatch_errors, summary.update_errors
        );
        Ok(summary)
    }
}
