pub mod ehr;
pub mod mfa;
pub mod state_store;
pub mod totp;

// Selector constants stay behind their module paths; both pages have a
// username and password input.
pub use ehr::EhrSessionManager;
pub use mfa::{extract_code, CallHarborCodeRetriever, MfaCodeSource};
pub use state_store::*;
