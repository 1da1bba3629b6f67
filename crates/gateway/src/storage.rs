//! S3-compatible object storage client (spec §6), grounded on
//! `stream-node::storage::uploader::s3_client` / `recorder-node`'s use of
//! `aws-sdk-s3` for a MinIO-style endpoint.

use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{config::Builder as S3ConfigBuilder, primitives::ByteStream, Client};
use tracing::info;

use bytes::Bytes;

use crate::config::StorageConfig;
use crate::error::GatewayError;

/// Content types used for archival uploads (spec §4.6).
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    pub async fn connect(config: &StorageConfig) -> Self {
        let region = Region::new(config.s3_region.clone());
        let region_provider = RegionProviderChain::first_try(region.clone()).or_default_provider();
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&base).region(region).force_path_style(true);

        if let Some(endpoint) = &config.s3_endpoint {
            builder = builder.endpoint_url(endpoint.clone());
        }
        if let (Some(access_key), Some(secret_key)) =
            (&config.s3_access_key, &config.s3_secret_key)
        {
            builder = builder.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "static",
            ));
        }

        let client = Client::from_conf(builder.build());
        Self {
            client,
            bucket: config.s3_bucket.clone(),
        }
    }

    pub async fn ensure_bucket(&self) {
        let _ = self.client.create_bucket().bucket(&self.bucket).send().await;
    }

    /// Upload `bytes` to `key` (spec §6: `<stream_id>/<YYYYMMDD>/<name>`).
    pub async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), GatewayError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| GatewayError::storage(format!("upload {key}: {e}")))?;

        info!(%key, "uploaded to object storage");
        Ok(())
    }

    /// Fetch `key` (spec §6 historical playlist/segment reads).
    pub async fn get_object(&self, key: &str) -> Result<Bytes, GatewayError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| GatewayError::storage(format!("fetch {key}: {e}")))?;

        let aggregated = resp
            .body
            .collect()
            .await
            .map_err(|e| GatewayError::storage(format!("read body for {key}: {e}")))?;
        Ok(aggregated.into_bytes())
    }
}
