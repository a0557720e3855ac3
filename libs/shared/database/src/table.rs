use chrono::Utc;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, Response,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_utils::shared_key;

use crate::connection::StorageAccount;
use crate::error::StorageError;

const API_VERSION: &str = "2019-02-02";
const CONTINUATION_PARTITION: &str = "x-ms-continuation-NextPartitionKey";
const CONTINUATION_ROW: &str = "x-ms-continuation-NextRowKey";

#[derive(Debug, Deserialize)]
struct QueryPage<T> {
    value: Vec<T>,
}

/// REST client for a single Azure Storage table.
pub struct TableClient {
    client: Client,
    account: StorageAccount,
    table: String,
}

impl TableClient {
    pub fn new(account: StorageAccount, table: &str) -> Self {
        Self {
            client: Client::new(),
            account,
            table: table.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, StorageError> {
        let account = StorageAccount::from_connection_string(&config.storage.connection_string)?;
        Ok(Self::new(account, &config.storage.appointments_table))
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    fn get_headers(&self, resource: &str) -> Result<HeaderMap, StorageError> {
        let ms_date = shared_key::format_ms_date(Utc::now());
        let canonical = self
            .account
            .canonical_resource(&self.account.table_endpoint, resource)?;
        let authorization = shared_key::table_authorization(
            &self.account.name,
            &self.account.key,
            &ms_date,
            &canonical,
        )
        .map_err(StorageError::Config)?;

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-ms-date"), header_value(&ms_date)?);
        headers.insert(HeaderName::from_static("x-ms-version"), HeaderValue::from_static(API_VERSION));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json;odata=nometadata"));
        headers.insert(HeaderName::from_static("dataserviceversion"), HeaderValue::from_static("3.0;NetFx"));
        headers.insert(HeaderName::from_static("maxdataserviceversion"), HeaderValue::from_static("3.0;NetFx"));
        headers.insert(AUTHORIZATION, header_value(&authorization)?);
        Ok(headers)
    }

    /// Sends a signed request; `resource` is the URL path below the
    /// endpoint and `query` an already encoded query string.
    async fn request(
        &self,
        method: Method,
        resource: &str,
        query: Option<&str>,
        body: Option<&Value>,
        extra_headers: HeaderMap,
    ) -> Result<Response, StorageError> {
        let mut url = format!("{}/{}", self.account.table_endpoint, resource);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(resource)?;
        headers.extend(extra_headers);

        let mut req = self.client.request(method, &url).headers(headers);
        if let Some(body) = body {
            req = req
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() != 409 && status.as_u16() != 404 {
                error!("Table API error ({}): {}", status, error_text);
            }
            return Err(StorageError::from_status(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Creates the table, treating an existing table as success.
    pub async fn create_table_if_missing(&self) -> Result<(), StorageError> {
        let body = json!({ "TableName": self.table });
        match self
            .request(Method::POST, "Tables", None, Some(&body), no_content())
            .await
        {
            Ok(_) | Err(StorageError::Conflict) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Inserts a new entity. An entity with the same keys yields
    /// [`StorageError::Conflict`].
    pub async fn insert_entity<T: Serialize>(&self, entity: &T) -> Result<(), StorageError> {
        let body = serde_json::to_value(entity)?;
        self.request(Method::POST, &self.table, None, Some(&body), no_content())
            .await?;
        Ok(())
    }

    pub async fn get_entity<T: DeserializeOwned>(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<T>, StorageError> {
        let resource = self.entity_resource(partition_key, row_key);
        match self
            .request(Method::GET, &resource, None, None, HeaderMap::new())
            .await
        {
            Ok(response) => Ok(Some(response.json::<T>().await?)),
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Runs an OData `$filter` query, following continuation tokens until
    /// every page has been read.
    pub async fn query_entities<T: DeserializeOwned>(&self, filter: &str) -> Result<Vec<T>, StorageError> {
        let resource = format!("{}()", self.table);
        let mut entities = Vec::new();
        let mut continuation: Option<(String, Option<String>)> = None;

        loop {
            let mut query = format!("$filter={}", urlencoding::encode(filter));
            if let Some((partition, row)) = &continuation {
                query.push_str(&format!("&NextPartitionKey={}", urlencoding::encode(partition)));
                if let Some(row) = row {
                    query.push_str(&format!("&NextRowKey={}", urlencoding::encode(row)));
                }
            }

            let response = self
                .request(Method::GET, &resource, Some(&query), None, HeaderMap::new())
                .await?;

            let next_partition = header_string(&response, CONTINUATION_PARTITION);
            let next_row = header_string(&response, CONTINUATION_ROW);
            let page: QueryPage<T> = response.json().await?;
            debug!("Query page returned {} entities", page.value.len());
            entities.extend(page.value);

            match next_partition {
                Some(partition) => continuation = Some((partition, next_row)),
                None => break,
            }
        }

        Ok(entities)
    }

    /// Merges `properties` into an existing entity, leaving every other
    /// property untouched. A missing entity yields [`StorageError::NotFound`].
    pub async fn merge_entity(
        &self,
        partition_key: &str,
        row_key: &str,
        properties: &Value,
    ) -> Result<(), StorageError> {
        let resource = self.entity_resource(partition_key, row_key);
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("if-match"), HeaderValue::from_static("*"));
        self.request(Method::PATCH, &resource, None, Some(properties), headers)
            .await?;
        Ok(())
    }

    fn entity_resource(&self, partition_key: &str, row_key: &str) -> String {
        format!(
            "{}(PartitionKey='{}',RowKey='{}')",
            self.table,
            escape_key(partition_key),
            escape_key(row_key)
        )
    }
}

fn no_content() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("prefer"), HeaderValue::from_static("return-no-content"));
    headers
}

fn escape_key(key: &str) -> String {
    urlencoding::encode(&key.replace('\'', "''")).into_owned()
}

fn header_value(value: &str) -> Result<HeaderValue, StorageError> {
    HeaderValue::from_str(value).map_err(|e| StorageError::Config(format!("Invalid header value: {}", e)))
}

fn header_string(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
