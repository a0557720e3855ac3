use reqwest::Url;

use crate::error::StorageError;

/// Storage account credentials and service endpoints parsed from a
/// connection string.
#[derive(Debug, Clone)]
pub struct StorageAccount {
    pub name: String,
    pub key: String,
    pub table_endpoint: String,
    pub blob_endpoint: String,
}

impl StorageAccount {
    /// Parses `Key=Value;` pairs. `TableEndpoint`/`BlobEndpoint` override
    /// the endpoints derived from the account name and suffix.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, StorageError> {
        let mut name = None;
        let mut key = None;
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();
        let mut table_endpoint = None;
        let mut blob_endpoint = None;

        for part in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Account keys are base64 and may end in '='
            let Some((k, v)) = part.split_once('=') else {
                return Err(StorageError::Config(format!("Malformed connection string segment '{}'", part)));
            };
            match k {
                "AccountName" => name = Some(v.to_string()),
                "AccountKey" => key = Some(v.to_string()),
                "DefaultEndpointsProtocol" => protocol = v.to_string(),
                "EndpointSuffix" => suffix = v.to_string(),
                "TableEndpoint" => table_endpoint = Some(v.trim_end_matches('/').to_string()),
                "BlobEndpoint" => blob_endpoint = Some(v.trim_end_matches('/').to_string()),
                _ => {}
            }
        }

        let name = name.ok_or_else(|| StorageError::Config("AccountName is missing".to_string()))?;
        let key = key.ok_or_else(|| StorageError::Config("AccountKey is missing".to_string()))?;

        Ok(Self {
            table_endpoint: table_endpoint
                .unwrap_or_else(|| format!("{}://{}.table.{}", protocol, name, suffix)),
            blob_endpoint: blob_endpoint
                .unwrap_or_else(|| format!("{}://{}.blob.{}", protocol, name, suffix)),
            name,
            key,
        })
    }

    /// Canonicalized resource for a request to `endpoint/resource`, as
    /// signed by Shared Key Lite.
    pub fn canonical_resource(&self, endpoint: &str, resource: &str) -> Result<String, StorageError> {
        let url = Url::parse(endpoint)
            .map_err(|e| StorageError::Config(format!("Invalid endpoint '{}': {}", endpoint, e)))?;
        let prefix = url.path().trim_end_matches('/');
        Ok(format!("/{}{}/{}", self.name, prefix, resource))
    }
}
