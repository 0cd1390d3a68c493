use super::ObjectStorage;
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
};
use bytes::Bytes;
use common::config::MinioConfig;
use common::{Error, Result};
use tracing::debug;

// DeleteObjects accepts at most this many keys per request.
const DELETE_BATCH: usize = 1000;

pub struct S3Storage {
    client: S3Client,
    region: String,
}

impl S3Storage {
    /// Static credentials with path-style addressing when an access key is
    /// configured (MinIO), otherwise the default AWS credential chain.
    pub async fn connect(config: &MinioConfig) -> Self {
        let region = Region::new(config.region.clone());

        let s3_config = if config.access_key.is_empty() {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&shared)
                .endpoint_url(&config.endpoint)
                .force_path_style(true)
                .build()
        } else {
            let credentials = Credentials::new(
                &config.access_key,
                &config.secret_key,
                None,
                None,
                "static",
            );
            aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .endpoint_url(&config.endpoint)
                .region(region)
                .credentials_provider(credentials)
                .force_path_style(true)
                .build()
        };

        Self {
            client: S3Client::from_conf(s3_config),
            region: config.region.clone(),
        }
    }
}

/// Maps an S3 service error on an object call. Object operations report a
/// missing bucket as an unmodeled `NoSuchBucket` code.
fn object_error<E>(err: E, bucket: &str, key: &str) -> Error
where
    E: ProvideErrorMetadata + std::fmt::Display,
{
    match err.code() {
        Some("NoSuchBucket") => Error::NotFound(format!("bucket {}", bucket)),
        Some("NoSuchKey") => Error::NotFound(format!("{}/{}", bucket, key)),
        _ => Error::Storage(err.to_string()),
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(err))
                if err.err().is_bucket_already_exists()
                    || err.err().is_bucket_already_owned_by_you() =>
            {
                Err(Error::BucketAlreadyExists(bucket.to_string()))
            }
            Err(SdkError::ServiceError(err)) => Err(Error::Storage(format!(
                "Failed to create bucket '{}': {}",
                bucket,
                err.into_err()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(err)) if err.err().is_not_found() => Ok(false),
            Err(e) => Err(Error::Storage(format!(
                "Cannot access bucket '{}': {}",
                bucket, e
            ))),
        }
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let response = self.client.list_buckets().send().await?;

        let mut names: Vec<String> = response
            .buckets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|bucket| bucket.name)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| match e {
                SdkError::ServiceError(err) => object_error(err.into_err(), bucket, prefix),
                _ => Error::Storage(e.to_string()),
            })?;

            if let Some(contents) = response.contents {
                for object in contents {
                    if let Some(key) = object.key {
                        objects.push(key);
                    }
                }
            }

            continuation_token = response.next_continuation_token;
            if continuation_token.is_none() {
                break;
            }
        }

        objects.sort();
        debug!(bucket, prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let body = Bytes::copy_from_slice(data);
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body.into())
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(err) => object_error(err.into_err(), bucket, key),
                _ => Error::Storage(e.to_string()),
            })?;

        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(err) => object_error(err.into_err(), bucket, key),
                _ => Error::Storage(e.to_string()),
            })?;

        let data = response.body.collect().await?.into_bytes().to_vec();
        Ok(data)
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        self.client
            .copy_object()
            .copy_source(format!("{}/{}", src_bucket, src_key))
            .bucket(dst_bucket)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(err) => object_error(err.into_err(), src_bucket, src_key),
                _ => Error::Storage(e.to_string()),
            })?;

        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        for chunk in keys.chunks(DELETE_BATCH) {
            let identifiers = chunk
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| Error::InvalidInput(e.to_string()))
                })
                .collect::<Result<Vec<_>>>()?;

            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .quiet(true)
                .build()
                .map_err(|e| Error::InvalidInput(e.to_string()))?;

            self.client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| match e {
                    SdkError::ServiceError(err) => Error::Storage(err.into_err().to_string()),
                    _ => Error::Storage(e.to_string()),
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::get_object::GetObjectError;
    use aws_sdk_s3::operation::put_object::PutObjectError;

    fn with_code(code: &str) -> ErrorMetadata {
        ErrorMetadata::builder()
            .code(code)
            .message("The specified resource does not exist")
            .build()
    }

    #[test]
    fn test_missing_bucket_on_get_is_not_found() {
        let err = object_error(
            GetObjectError::generic(with_code("NoSuchBucket")),
            "warehouse",
            "_orchestrator/trigger_table.json",
        );
        assert!(matches!(err, Error::NotFound(ref what) if what == "bucket warehouse"));
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let err = object_error(
            GetObjectError::generic(with_code("NoSuchKey")),
            "warehouse",
            "_ledger/weather.json",
        );
        assert!(matches!(
            err,
            Error::NotFound(ref what) if what == "warehouse/_ledger/weather.json"
        ));
    }

    #[test]
    fn test_missing_bucket_on_put_is_not_found() {
        let err = object_error(
            PutObjectError::generic(with_code("NoSuchBucket")),
            "warehouse",
            "tables/weather/part.parquet",
        );
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_other_codes_stay_retryable_storage_errors() {
        let err = object_error(
            PutObjectError::generic(with_code("SlowDown")),
            "warehouse",
            "tables/weather/part.parquet",
        );
        assert!(matches!(err, Error::Storage(_)));
        assert!(err.is_retryable());
    }
}
