use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use appointment_cell::{AppointmentRegistry, PendingSurveyQuery, TableAppointmentStore};
use pipeline_cell::{RunOptions, SurveyPipeline};
use schedule_cell::ScheduleScraper;
use session_cell::{state_store_from_config, CallHarborCodeRetriever, EhrSessionManager};
use shared_browser::{BrowserLauncher, WebDriverLauncher};
use shared_config::{AppConfig, SessionStateBackend};
use shared_database::{BlobClient, StorageAccount};
use shared_models::SurveyTarget;
use survey_cell::{SurveyCampaign, SurveyDispatcher, TwilioClient};

pub fn survey_target(config: &AppConfig) -> SurveyTarget {
    SurveyTarget::new(
        &config.run.target_status,
        &config.run.target_appointment_type,
        &config.run.target_provider,
    )
}

/// Builds the production pipeline and makes sure its storage exists.
pub async fn build_pipeline(config: &AppConfig, today: NaiveDate, options: RunOptions) -> Result<SurveyPipeline> {
    if options.send_surveys && !config.is_sms_configured() {
        anyhow::bail!("Twilio settings are required unless surveys are skipped");
    }

    let launcher: Arc<dyn BrowserLauncher> = Arc::new(WebDriverLauncher::new(config.browser.clone()));

    if config.storage.session_state_backend == SessionStateBackend::Blob {
        let account = StorageAccount::from_connection_string(&config.storage.connection_string)
            .context("invalid storage connection string")?;
        BlobClient::new(account, &config.storage.session_state_container)
            .create_container_if_missing()
            .await
            .context("could not prepare session state container")?;
    }
    let state_store = state_store_from_config(&config.storage).context("could not open session state store")?;

    let code_source = Arc::new(CallHarborCodeRetriever::new(
        config.callharbor.clone(),
        Arc::clone(&launcher),
        Arc::clone(&state_store),
    ));
    let session = EhrSessionManager::new(config.practice_fusion.clone(), state_store, code_source);

    let scraper = ScheduleScraper::new(config.practice_fusion.clone(), today)
        .with_debug_dir(config.browser.html_debug_dir.clone());

    let store = Arc::new(TableAppointmentStore::from_config(config).context("invalid appointments table config")?);
    store.ensure_table().await.context("could not prepare appointments table")?;

    let target = survey_target(config);
    let campaign = if config.is_sms_configured() {
        let provider = Arc::new(TwilioClient::new(&config.twilio).context("could not create Twilio client")?);
        let dispatcher = SurveyDispatcher::new(&config.twilio, provider);
        Some(SurveyCampaign::new(store.clone(), dispatcher, PendingSurveyQuery::new(target.clone())))
    } else {
        None
    };

    info!("Pipeline ready for {:?}", target);
    Ok(SurveyPipeline::new(
        launcher,
        session,
        scraper,
        AppointmentRegistry::new(store),
        campaign,
        target,
    ))
}
