//! Serializable browser storage (cookies plus per-origin `localStorage`),
//! persisted between runs so a login can be reused.

use serde::{Deserialize, Serialize};

use crate::error::BrowserError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<LocalStorageEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStorageEntry {
    pub name: String,
    pub value: String,
}

impl StorageState {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }

    pub fn to_json(&self) -> Result<Vec<u8>, BrowserError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, BrowserError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Cookies that a page on `host` would receive.
    pub fn cookies_for_host<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a StoredCookie> + 'a {
        self.cookies.iter().filter(move |cookie| match &cookie.domain {
            Some(domain) => domain_matches(host, domain),
            None => true,
        })
    }

    /// Origins to visit for cookies whose domain matches no stored origin,
    /// one per distinct domain, plus the count of domainless cookies that
    /// have no origin at all to be written on.
    pub fn uncovered_cookie_origins(&self) -> (Vec<String>, usize) {
        let hosts: Vec<&str> = self.origins.iter().map(|o| origin_host(&o.origin)).collect();
        let mut origins: Vec<String> = Vec::new();
        let mut unplaced = 0;

        for cookie in &self.cookies {
            match &cookie.domain {
                Some(domain) => {
                    if hosts.iter().any(|host| domain_matches(host, domain)) {
                        continue;
                    }
                    let origin = format!("https://{}/", domain.trim_start_matches('.'));
                    if !origins.contains(&origin) {
                        origins.push(origin);
                    }
                }
                None if hosts.is_empty() => unplaced += 1,
                None => {}
            }
        }

        (origins, unplaced)
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Host of an origin such as `https://ehr.example.com:8443`.
pub fn origin_host(origin: &str) -> &str {
    let rest = origin.split_once("://").map(|(_, rest)| rest).unwrap_or(origin);
    let authority = rest.split('/').next().unwrap_or(rest);
    authority.split(':').next().unwrap_or(authority)
}
