use chrono::Utc;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, Response,
};
use tracing::{debug, error};

use shared_utils::shared_key;

use crate::connection::StorageAccount;
use crate::error::StorageError;

const API_VERSION: &str = "2019-02-02";

/// Block blob access inside one container.
pub struct BlobClient {
    client: Client,
    account: StorageAccount,
    container: String,
}

impl BlobClient {
    pub fn new(account: StorageAccount, container: &str) -> Self {
        Self {
            client: Client::new(),
            account,
            container: container.to_string(),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    async fn request(
        &self,
        method: Method,
        blob: Option<&str>,
        query: Option<&str>,
        content_type: &str,
        body: Option<Vec<u8>>,
        ms_headers: &[(&str, &str)],
    ) -> Result<Response, StorageError> {
        let resource = match blob {
            Some(name) => format!("{}/{}", self.container, urlencoding::encode(name)),
            None => self.container.clone(),
        };
        let mut url = format!("{}/{}", self.account.blob_endpoint, resource);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        debug!("Making {} request to {}", method, url);

        let ms_date = shared_key::format_ms_date(Utc::now());
        let mut signed_headers = vec![("x-ms-date", ms_date.as_str()), ("x-ms-version", API_VERSION)];
        signed_headers.extend_from_slice(ms_headers);

        let canonical = self
            .account
            .canonical_resource(&self.account.blob_endpoint, &resource)?;
        let authorization = shared_key::blob_authorization(
            &self.account.name,
            &self.account.key,
            method.as_str(),
            content_type,
            &signed_headers,
            &canonical,
        )
        .map_err(StorageError::Config)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &signed_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StorageError::Config(format!("Invalid header name: {}", e)))?;
            headers.insert(name, header_value(value)?);
        }
        headers.insert(AUTHORIZATION, header_value(&authorization)?);
        if !content_type.is_empty() {
            headers.insert(CONTENT_TYPE, header_value(content_type)?);
        }

        let mut req = self.client.request(method, &url).headers(headers);
        if let Some(body) = body {
            req = req.body(body);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() != 404 && status.as_u16() != 409 {
                error!("Blob API error ({}): {}", status, error_text);
            }
            return Err(StorageError::from_status(status.as_u16(), error_text));
        }

        Ok(response)
    }

    pub async fn create_container_if_missing(&self) -> Result<(), StorageError> {
        match self
            .request(Method::PUT, None, Some("restype=container"), "", None, &[])
            .await
        {
            Ok(_) | Err(StorageError::Conflict) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Reads a blob; `None` when it does not exist.
    pub async fn get_blob(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.request(Method::GET, Some(name), None, "", None, &[]).await {
            Ok(response) => Ok(Some(response.bytes().await?.to_vec())),
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Creates or overwrites a block blob.
    pub async fn put_blob(&self, name: &str, content: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.request(
            Method::PUT,
            Some(name),
            None,
            content_type,
            Some(content),
            &[("x-ms-blob-type", "BlockBlob")],
        )
        .await?;
        Ok(())
    }

    /// Deletes a blob. Deleting a missing blob succeeds.
    pub async fn delete_blob(&self, name: &str) -> Result<(), StorageError> {
        match self.request(Method::DELETE, Some(name), None, "", None, &[]).await {
            Ok(_) | Err(StorageError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, StorageError> {
    HeaderValue::from_str(value).map_err(|e| StorageError::Config(format!("Invalid header value: {}", e)))
}
