use super::ObjectStorage;
use common::{Error, Result};
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of [`provision_bucket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provisioned {
    AlreadyExists,
    Created,
}

/// Makes sure `bucket` exists.
///
/// The listing is only a precondition check. A concurrent provisioner may
/// still win the race between listing and creating, in which case the
/// creation error is logged and reported as `AlreadyExists`.
pub async fn provision_bucket(storage: &dyn ObjectStorage, bucket: &str) -> Result<Provisioned> {
    let existing = storage.list_buckets().await?;
    if existing.iter().any(|name| name == bucket) {
        info!(bucket, "Bucket already exists");
        return Ok(Provisioned::AlreadyExists);
    }

    match storage.create_bucket(bucket).await {
        Ok(()) => {
            info!(bucket, "Bucket created");
            Ok(Provisioned::Created)
        }
        Err(Error::BucketAlreadyExists(_)) => {
            warn!(bucket, "Bucket appeared while provisioning, treating as existing");
            Ok(Provisioned::AlreadyExists)
        }
        Err(e) => Err(e),
    }
}

pub async fn provision_buckets(
    storage: &dyn ObjectStorage,
    buckets: &[&str],
) -> Result<Vec<(String, Provisioned)>> {
    let mut outcomes = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let outcome = provision_bucket(storage, bucket).await?;
        outcomes.push((bucket.to_string(), outcome));
    }
    Ok(outcomes)
}
