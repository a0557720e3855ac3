// libs/appointment-cell/tests/table_store_test.rs

use assert_matches::assert_matches;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::{key_for, AppointmentStore, PendingSurveyQuery, StoreError, TableAppointmentStore};
use shared_models::StoredAppointment;
use shared_utils::test_utils::{appointment, TestConfig};

fn store(server: &MockServer) -> TableAppointmentStore {
    let config = TestConfig::with_mock_uri(&server.uri()).to_app_config();
    TableAppointmentStore::from_config(&config).unwrap()
}

fn record() -> StoredAppointment {
    let appt = appointment("DOE JANE", NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(), 10, 30);
    let key = key_for(&appt).unwrap();
    StoredAppointment::new(key.row_key, key.partition_key, appt)
}

fn entity(record: &StoredAppointment, sent_on: &str, sid: &str) -> serde_json::Value {
    json!({
        "PartitionKey": record.partition_key,
        "RowKey": record.row_key,
        "sentOn": sent_on,
        "message_sid": sid,
        "patientName": "DOE JANE",
        "patientDOB": "1990-01-02",
        "patientPhone": "5551234567",
        "appointmentTime": "2025-01-02T10:30",
        "appointmentStatus": "Seen",
        "provider": "BHUC COMMON GROUND",
        "type": "CLINICIAN",
    })
}

#[tokio::test]
async fn test_create_posts_full_entity() {
    let server = MockServer::start().await;
    let record = record();
    Mock::given(method("POST"))
        .and(path("/devstoreaccount1/appointments"))
        .and(header("prefer", "return-no-content"))
        .and(body_json(entity(&record, "", "")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store(&server).create(&record).await.unwrap();
}

#[tokio::test]
async fn test_create_conflict_is_already_exists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/devstoreaccount1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_string("EntityAlreadyExists"))
        .mount(&server)
        .await;

    let record = record();
    let result = store(&server).create(&record).await;
    assert_matches!(result, Err(StoreError::AlreadyExists { row_key }) if row_key == record.row_key);
}

#[tokio::test]
async fn test_create_server_error_is_storage_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = store(&server).create(&record()).await;
    assert_matches!(result, Err(StoreError::Storage(_)));
}

#[tokio::test]
async fn test_pending_query_sends_filter_and_decodes_rows() {
    let server = MockServer::start().await;
    let record = record();
    Mock::given(method("GET"))
        .and(path("/devstoreaccount1/appointments()"))
        .and(query_param(
            "$filter",
            "appointmentStatus eq 'Seen' and provider eq 'BHUC COMMON GROUND' and type eq 'CLINICIAN' and sentOn eq ''",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [entity(&record, "", "")] })))
        .expect(1)
        .mount(&server)
        .await;

    let pending = store(&server)
        .query_pending_survey(&PendingSurveyQuery::default())
        .await
        .unwrap();

    assert_eq!(pending, vec![record]);
}

#[tokio::test]
async fn test_mark_sent_merges_only_delivery_fields() {
    let server = MockServer::start().await;
    let record = record();
    let resource = format!(
        "/devstoreaccount1/appointments(PartitionKey='{}',RowKey='{}')",
        record.partition_key, record.row_key
    );
    Mock::given(method("PATCH"))
        .and(path(resource.as_str()))
        .and(header("if-match", "*"))
        .and(body_json(json!({
            "sentOn": "2025-01-02T18:00:00Z",
            "sentOn@odata.type": "Edm.DateTime",
            "message_sid": "SM123",
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store(&server)
        .mark_sent(
            &record.row_key,
            &record.partition_key,
            Utc.with_ymd_and_hms(2025, 1, 2, 18, 0, 0).unwrap(),
            "SM123",
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mark_sent_missing_record_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = store(&server).mark_sent("missing", "g", Utc::now(), "SM1").await;
    assert_matches!(result, Err(StoreError::NotFound { row_key }) if row_key == "missing");
}

#[tokio::test]
async fn test_get_reads_sent_record() {
    let server = MockServer::start().await;
    let record = record();
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(entity(&record, "2025-01-02T18:00:00.0000000Z", "SM123")),
        )
        .mount(&server)
        .await;

    let stored = store(&server)
        .get(&record.row_key, &record.partition_key)
        .await
        .unwrap()
        .unwrap();

    assert!(stored.survey_sent());
    assert_eq!(stored.message_sid.as_deref(), Some("SM123"));
    assert_eq!(stored.appointment, record.appointment);
}

#[tokio::test]
async fn test_ensure_table_tolerates_existing_table() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/devstoreaccount1/Tables"))
        .and(body_partial_json(json!({ "TableName": "appointments" })))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    store(&server).ensure_table().await.unwrap();
}
