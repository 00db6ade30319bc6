//! S3/MinIO image fetch, grounded on the teacher's `S3Service`: a configurable
//! endpoint URL for MinIO compatibility plus optional path-style addressing.

use anyhow::anyhow;

use crate::config::Config;

/// Distinguishes "the object genuinely isn't there" from everything else, so
/// callers can tell a per-image 404 apart from a transient auth/network
/// failure that deserves a job-level retry instead of an `image_not_found`.
#[derive(thiserror::Error, Debug)]
pub enum S3FetchError {
    #[error("object not found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(feature = "s3")]
pub struct S3Resolver {
    client: aws_sdk_s3::Client,
}

#[cfg(not(feature = "s3"))]
pub struct S3Resolver;

impl S3Resolver {
    #[cfg(feature = "s3")]
    pub async fn from_config(config: &Config) -> Option<Self> {
        let region = config
            .s3_region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region));
        if let Some(endpoint) = &config.s3_endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let conf = loader.load().await;
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&conf);
        if config.s3_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        Some(S3Resolver {
            client: aws_sdk_s3::Client::from_conf(s3_builder.build()),
        })
    }

    #[cfg(not(feature = "s3"))]
    pub async fn from_config(_config: &Config) -> Option<Self> {
        None
    }

    /// Accepts `s3://bucket/key` or a bare `bucket/key` form. A malformed
    /// reference can never resolve to an object, so it's treated the same as
    /// the object not existing rather than a transient failure.
    fn parse_uri(value: &str) -> Result<(String, String), S3FetchError> {
        let trimmed = value.strip_prefix("s3://").unwrap_or(value);
        let mut parts = trimmed.splitn(2, '/');
        let bucket = parts.next().filter(|b| !b.is_empty()).ok_or(S3FetchError::NotFound)?;
        let key = parts.next().filter(|k| !k.is_empty()).ok_or(S3FetchError::NotFound)?;
        Ok((bucket.to_string(), key.to_string()))
    }

    #[cfg(feature = "s3")]
    pub async fn fetch(&self, value: &str) -> Result<Vec<u8>, S3FetchError> {
        let (bucket, key) = Self::parse_uri(value)?;
        let out = self.client.get_object().bucket(bucket).key(key).send().await.map_err(|e| {
            let service_err = e.as_service_error();
            if service_err.is_some_and(|se| se.is_no_such_key())
                || e.raw_response().is_some_and(|r| r.status().as_u16() == 404)
            {
                S3FetchError::NotFound
            } else {
                S3FetchError::Other(anyhow!(e).context("s3 get_object failed"))
            }
        })?;
        let bytes = out
            .body
            .collect()
            .await
            .map_err(|e| S3FetchError::Other(anyhow!(e).context("s3 body collect failed")))?
            .into_bytes();
        Ok(bytes.to_vec())
    }

    #[cfg(not(feature = "s3"))]
    pub async fn fetch(&self, _value: &str) -> Result<Vec<u8>, S3FetchError> {
        Err(S3FetchError::Other(anyhow!("service built without the s3 feature")))
    }
}
