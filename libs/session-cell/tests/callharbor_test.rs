// libs/session-cell/tests/callharbor_test.rs

use std::sync::Arc;

use assert_matches::assert_matches;

use session_cell::mfa::{
    LOGIN_SUBMIT, PASSCODE_INPUT, PASSCODE_SUBMIT, PASSWORD_INPUT, RECENT_MESSAGE, USERNAME_INPUT,
};
use session_cell::{
    CallHarborCodeRetriever, InMemorySessionStateStore, MfaCodeSource, SessionError, CALLHARBOR_SITE,
};
use shared_browser::fake::{ClickEffect, FakeBrowser, FakeLauncher, FakePage};
use shared_config::CallHarborConfig;
use shared_utils::test_utils::TestConfig;

fn config() -> CallHarborConfig {
    TestConfig::default().callharbor()
}

fn portal(config: &CallHarborConfig, inbox: Vec<Vec<&str>>) -> FakeBrowser {
    FakeBrowser::new(vec![
        FakePage::new("/portal/login").with_selectors(&[USERNAME_INPUT, PASSWORD_INPUT, LOGIN_SUBMIT]),
        FakePage::new("/portal/login/mfa").with_selectors(&[PASSCODE_INPUT, PASSCODE_SUBMIT]),
        FakePage::new("/portal/messages").requiring_auth().with_texts(RECENT_MESSAGE, inbox),
    ])
    .with_login_redirect(&format!("{}/portal/login", config.base_url))
    .on_click(
        LOGIN_SUBMIT,
        vec![ClickEffect::Navigate(format!("{}/portal/login/mfa/1", config.base_url))],
    )
    .on_click(
        PASSCODE_SUBMIT,
        vec![
            ClickEffect::Authenticate,
            ClickEffect::Navigate(format!("{}/portal/home", config.base_url)),
        ],
    )
}

#[tokio::test]
async fn test_logs_in_with_totp_and_reads_code() {
    let config = config();
    let browser = portal(&config, vec![vec!["Your code is: 482913. Thank you."]]);
    let store = Arc::new(InMemorySessionStateStore::new());
    let retriever = CallHarborCodeRetriever::new(
        config.clone(),
        Arc::new(FakeLauncher::new(vec![browser.clone()])),
        store.clone(),
    );

    let code = retriever.latest_code().await.unwrap();

    assert_eq!(code, "482913");
    let fills = browser.fills();
    assert!(fills.contains(&(USERNAME_INPUT.to_string(), "sms@clinic".to_string())));
    let passcode = fills.iter().find(|(selector, _)| selector == PASSCODE_INPUT).map(|(_, v)| v.clone());
    assert_matches!(passcode, Some(p) if p.len() == 6 && p.chars().all(|c| c.is_ascii_digit()));
    assert!(store.contains(CALLHARBOR_SITE));
    assert!(browser.is_closed());
}

#[tokio::test]
async fn test_cached_portal_session_skips_login() {
    let config = config();
    let browser = portal(&config, vec![vec!["hello", "Your code is: 777001. Thank you."]]);
    let store = Arc::new(InMemorySessionStateStore::with_state(CALLHARBOR_SITE, FakeBrowser::authenticated_state()));
    let retriever = CallHarborCodeRetriever::new(config, Arc::new(FakeLauncher::new(vec![browser.clone()])), store);

    assert_eq!(retriever.latest_code().await.unwrap(), "777001");
    assert!(browser.fills().is_empty());
}

#[tokio::test]
async fn test_polls_until_code_arrives() {
    let config = config();
    let browser = portal(&config, vec![vec![], vec!["old message"], vec!["Your code is: 135790. Thank you."]]);
    let store = Arc::new(InMemorySessionStateStore::with_state(CALLHARBOR_SITE, FakeBrowser::authenticated_state()));
    let retriever = CallHarborCodeRetriever::new(config, Arc::new(FakeLauncher::new(vec![browser.clone()])), store);

    assert_eq!(retriever.latest_code().await.unwrap(), "135790");
    assert!(browser.visits().len() >= 3);
}

#[tokio::test]
async fn test_missing_code_fails_but_state_is_saved_and_browser_closed() {
    let config = config();
    let browser = portal(&config, vec![vec!["no codes here"]]);
    let store = Arc::new(InMemorySessionStateStore::new());
    let retriever = CallHarborCodeRetriever::new(config, Arc::new(FakeLauncher::new(vec![browser.clone()])), store.clone());

    let result = retriever.latest_code().await;

    assert_matches!(result, Err(SessionError::MfaCodeNotFound { .. }));
    assert_eq!(store.get(CALLHARBOR_SITE), Some(FakeBrowser::authenticated_state()));
    assert!(browser.is_closed());
}

#[tokio::test]
async fn test_rejected_portal_credentials_are_auth_error() {
    let config = config();
    let browser = portal(&config, vec![vec![]]).on_click(LOGIN_SUBMIT, vec![]);
    let retriever = CallHarborCodeRetriever::new(
        config,
        Arc::new(FakeLauncher::new(vec![browser.clone()])),
        Arc::new(InMemorySessionStateStore::new()),
    );

    assert_matches!(retriever.latest_code().await, Err(SessionError::Auth(_)));
    assert!(browser.is_closed());
}
