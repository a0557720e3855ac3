use serde::Serialize;

/// Site identifiers used as session-state keys.
pub const EHR_SITE: &str = "practicefusion";
pub const CALLHARBOR_SITE: &str = "callharbor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Try the persisted browser state before logging in.
    ReuseCached,
    /// Skip validation and log in with credentials.
    ForceLogin,
}

/// Steps of the EHR login state machine, in the order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    NoSession,
    ValidatingCachedSession,
    SessionValid,
    SessionInvalid,
    CredentialLogin,
    MfaRequired,
    MfaHandled,
    MainPage,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionOutcome {
    pub phases: Vec<SessionPhase>,
    pub reused_cached: bool,
}

impl SessionOutcome {
    pub(crate) fn new() -> Self {
        Self {
            phases: vec![SessionPhase::NoSession],
            reused_cached: false,
        }
    }

    pub(crate) fn enter(&mut self, phase: SessionPhase) {
        self.phases.push(phase);
    }

    pub fn passed_through(&self, phase: SessionPhase) -> bool {
        self.phases.contains(&phase)
    }
}
