use anyhow::{anyhow, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use url::Url;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
    public_endpoint: String,
}

impl ObjectStorage {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.s3_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.s3_endpoint.clone())
            .force_path_style(true);
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }
        let s3_config = s3_builder.build();

        let client = Client::from_conf(s3_config);

        Ok(Self {
            client,
            bucket: config.s3_bucket.clone(),
            public_endpoint: config
                .s3_public_endpoint
                .clone()
                .unwrap_or_else(|| config.s3_endpoint.clone()),
        })
    }

    pub async fn put_object(&self, key: &str, content_type: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await?;
        Ok(())
    }

    /// Path-style URL under which `key` is publicly reachable.
    pub fn object_url(&self, key: &str) -> Result<String> {
        object_url(&self.public_endpoint, &self.bucket, key)
    }
}

fn object_url(endpoint: &str, bucket: &str, key: &str) -> Result<String> {
    let mut base = Url::parse(endpoint).map_err(|err| anyhow!("invalid storage endpoint: {}", err))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    let url = base
        .join(&format!("{}/{}", bucket, key))
        .map_err(|err| anyhow!("invalid object key: {}", err))?;
    Ok(url.to_string())
}
