use crate::config::S3Config;
use crate::error::StoreError;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, instrument};

/// HTTP status of a successful S3 read or write.
pub const STATUS_OK: u16 = 200;

/// Body and status of a get-object call.
#[derive(Debug, Clone)]
pub struct ObjectResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Narrow interface to the backing object store.
///
/// A response from the service is reported as a status code; only failures
/// that never produced a response are errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectResponse, StoreError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<u16, StoreError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new store from shared AWS configuration
    pub fn new(aws_config: &SdkConfig, config: &S3Config) -> Self {
        let mut s3_config_builder = S3ConfigBuilder::from(aws_config)
            .region(aws_sdk_s3::config::Region::new(config.region.clone()));

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            region = %config.region,
            endpoint = config.endpoint_url.as_deref().unwrap_or("default"),
            "S3 object store initialized"
        );

        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectResponse, StoreError> {
        match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => {
                let body = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StoreError::Body(e.to_string()))?
                    .into_bytes()
                    .to_vec();

                debug!(size_bytes = body.len(), "Object fetched from S3");
                Ok(ObjectResponse {
                    status: STATUS_OK,
                    body,
                })
            }
            Err(e) => {
                let status = response_status("get_object", e)?;
                Ok(ObjectResponse {
                    status,
                    body: Vec::new(),
                })
            }
        }
    }

    #[instrument(skip(self, body), fields(size_bytes = body.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<u16, StoreError> {
        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await;

        match result {
            Ok(_) => Ok(STATUS_OK),
            Err(e) => response_status("put_object", e),
        }
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        match self.client.delete_object().bucket(bucket).key(key).send().await {
            Ok(_) => {
                debug!("Object deleted from S3");
                Ok(())
            }
            Err(e) => {
                let status = response_status("delete_object", e)?;
                Err(StoreError::Status {
                    operation: "delete_object",
                    status,
                })
            }
        }
    }
}

/// Status code of a failed call, or a transport error when the service
/// never answered with an error status.
fn response_status<E>(operation: &'static str, err: SdkError<E>) -> Result<u16, StoreError>
where
    E: std::error::Error + 'static,
{
    match err.raw_response() {
        Some(raw) if !raw.status().is_success() => Ok(raw.status().as_u16()),
        _ => Err(StoreError::Transport {
            operation,
            message: DisplayErrorContext(&err).to_string(),
        }),
    }
}

/// In-memory store used by tests across the crate.
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryObjectStore {
        objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
        calls: Mutex<Vec<String>>,
        puts: Mutex<usize>,
        fail_put_at: Option<usize>,
        fail_delete: bool,
    }

    impl InMemoryObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer the n-th put (0-based) with status 500
        pub fn failing_put_at(mut self, n: usize) -> Self {
            self.fail_put_at = Some(n);
            self
        }

        pub fn failing_delete(mut self) -> Self {
            self.fail_delete = true;
            self
        }

        pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
            self.objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), key.to_string()), body.into());
        }

        pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
        }

        pub fn get_text(&self, bucket: &str, key: &str) -> Option<String> {
            self.get(bucket, key)
                .map(|body| String::from_utf8(body).unwrap())
        }

        pub fn keys(&self, bucket: &str) -> Vec<String> {
            self.objects
                .lock()
                .unwrap()
                .keys()
                .filter(|(b, _)| b == bucket)
                .map(|(_, k)| k.clone())
                .collect()
        }

        /// Operations in call order, e.g. `put uploads/output/a_0.csv`
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, operation: &str, bucket: &str, key: &str) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}/{}", operation, bucket, key));
        }
    }

    #[async_trait]
    impl ObjectStore for InMemoryObjectStore {
        async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectResponse, StoreError> {
            self.record("get", bucket, key);
            Ok(match self.get(bucket, key) {
                Some(body) => ObjectResponse {
                    status: STATUS_OK,
                    body,
                },
                None => ObjectResponse {
                    status: 404,
                    body: Vec::new(),
                },
            })
        }

        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            body: Vec<u8>,
            _content_type: &str,
        ) -> Result<u16, StoreError> {
            self.record("put", bucket, key);
            let attempt = {
                let mut puts = self.puts.lock().unwrap();
                let attempt = *puts;
                *puts += 1;
                attempt
            };

            if self.fail_put_at == Some(attempt) {
                return Ok(500);
            }

            self.insert(bucket, key, body);
            Ok(STATUS_OK)
        }

        async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
            self.record("delete", bucket, key);
            if self.fail_delete {
                return Err(StoreError::Status {
                    operation: "delete_object",
                    status: 403,
                });
            }

            self.objects
                .lock()
                .unwrap()
                .remove(&(bucket.to_string(), key.to_string()));
            Ok(())
        }
    }
}
