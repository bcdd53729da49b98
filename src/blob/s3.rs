use crate::prelude::*;

use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;

use super::{BlobStore, NewFile, join_locator, new_blob_key};
use crate::base::Attachment;
use crate::settings::BlobStoreSettings;

/// S3 or any S3-compatible object store.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3BlobStore {
    pub async fn connect(settings: &BlobStoreSettings) -> anyhow::Result<Self> {
        let bucket = settings
            .bucket
            .clone()
            .context("blob_store.bucket is required for the s3 backend")?;

        let configured_region = settings.region.clone().map(Region::new);
        let region_provider = RegionProviderChain::first_try(configured_region)
            .or_default_provider()
            .or_else(Region::new("us-east-1"));
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.endpoint.is_some())
            .build();
        let client = Client::from_conf(s3_config);

        let public_base_url = match (&settings.public_base_url, &settings.endpoint) {
            (Some(base), _) => base.clone(),
            (None, Some(endpoint)) => join_locator(endpoint, &bucket),
            (None, None) => format!("https://{bucket}.s3.amazonaws.com"),
        };
        info!("Using S3 bucket `{bucket}` for attachments");

        Ok(Self {
            client,
            bucket,
            public_base_url,
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, file: &NewFile, folder: &str) -> anyhow::Result<Attachment> {
        let key = new_blob_key(folder, file);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(&file.content_type)
            .body(ByteStream::from(file.bytes.clone()))
            .send()
            .await
            .with_context(|| format!("put_object s3://{}/{key}", self.bucket))?;
        Ok(Attachment {
            locator: join_locator(&self.public_base_url, &key),
            external_id: key,
            kind: file.kind(),
        })
    }

    async fn delete(&self, external_id: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(external_id)
            .send()
            .await
            .with_context(|| format!("delete_object s3://{}/{external_id}", self.bucket))?;
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .with_context(|| format!("head_bucket {}", self.bucket))?;
        Ok(())
    }
}
