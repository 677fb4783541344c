//! Supabase storage backend over the storage REST API.

use std::io::Read;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{ObjectStore, StoreError, StoredObject, UploadOutcome};

const LIST_LIMIT: u32 = 1000;

pub struct SupabaseStore {
    base_url: String,
    key: String,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct RawObject {
    name: String,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl From<RawObject> for StoredObject {
    fn from(raw: RawObject) -> Self {
        let size = raw
            .metadata
            .as_ref()
            .and_then(|m| m.get("size"))
            .and_then(Value::as_u64);
        StoredObject {
            name: raw.name,
            size,
            updated_at: raw.updated_at,
        }
    }
}

#[derive(Deserialize)]
struct RawBucket {
    name: String,
}

impl SupabaseStore {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            key: service_key.to_string(),
            agent,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.base_url, path)
    }

    fn authorized(&self, request: ureq::Request) -> ureq::Request {
        request
            .set("Authorization", &format!("Bearer {}", self.key))
            .set("apikey", &self.key)
    }
}

fn request_error(err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(status, response) => StoreError::Http {
            status,
            message: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => StoreError::Transport(transport.to_string()),
    }
}

fn decode_error(err: std::io::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

impl ObjectStore for SupabaseStore {
    fn name(&self) -> &'static str {
        "supabase"
    }

    fn list(&self, bucket: &str) -> Result<Vec<StoredObject>, StoreError> {
        let body = json!({
            "prefix": "",
            "limit": LIST_LIMIT,
            "offset": 0,
            "sortBy": {"column": "name", "order": "asc"}
        });
        let response = self
            .authorized(self.agent.post(&self.endpoint(&format!("object/list/{}", bucket))))
            .send_json(body)
            .map_err(request_error)?;
        let raw: Vec<RawObject> = response.into_json().map_err(decode_error)?;
        Ok(raw.into_iter().map(StoredObject::from).collect())
    }

    fn upload(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<UploadOutcome, StoreError> {
        if self.exists(bucket, name)? {
            return Ok(UploadOutcome::Skipped);
        }
        self.authorized(self.agent.post(&self.endpoint(&format!("object/{}/{}", bucket, name))))
            .set("Content-Type", content_type)
            .set("x-upsert", "false")
            .send_bytes(bytes)
            .map_err(request_error)?;
        Ok(UploadOutcome::Uploaded)
    }

    fn download(&self, bucket: &str, name: &str) -> Result<Vec<u8>, StoreError> {
        let response = self
            .authorized(self.agent.get(&self.endpoint(&format!("object/{}/{}", bucket, name))))
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(404, _) => StoreError::NotFound {
                    bucket: bucket.to_string(),
                    name: name.to_string(),
                },
                other => request_error(other),
            })?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(decode_error)?;
        Ok(bytes)
    }

    fn delete(&self, bucket: &str, name: &str) -> Result<(), StoreError> {
        self.authorized(self.agent.delete(&self.endpoint(&format!("object/{}", bucket))))
            .send_json(json!({ "prefixes": [name] }))
            .map_err(request_error)?;
        Ok(())
    }

    fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .authorized(self.agent.get(&self.endpoint("bucket")))
            .call()
            .map_err(request_error)?;
        let raw: Vec<RawBucket> = response.into_json().map_err(decode_error)?;
        Ok(raw.into_iter().map(|b| b.name).collect())
    }
}
