use std::{
    env::{self, VarError},
    ffi::OsStr,
    path::PathBuf,
};

use crate::{
    error::{Error, Result},
    storage::{BoxedStorage, LocalStorage, S3Storage},
};

use super::FreezeArgs;

const ENV_VAR_BUCKET: &str = "FREEZEOMATIC_BUCKET";
const ENV_VAR_LOCAL: &str = "FREEZEOMATIC_LOCAL";

pub async fn create_storage(args: &FreezeArgs) -> Result<BoxedStorage> {
    let mut bucket = args.bucket.clone();
    let mut local = args.local.clone();

    if bucket.is_none() && local.is_none() {
        bucket = get_env_var(ENV_VAR_BUCKET)?;
        local = get_env_var(ENV_VAR_LOCAL)?.map(PathBuf::from);
    }

    match (bucket, local) {
        (Some(bucket), None) => {
            let s3_storage = S3Storage::new(bucket).await;
            Ok(Box::new(s3_storage))
        }
        (None, Some(path)) => {
            let local_storage = LocalStorage::new(path, args.latency);
            Ok(Box::new(local_storage))
        }
        (None, None) => Err(Error::Cli(format!(
            "either `--bucket` or `--local` (or `{ENV_VAR_BUCKET}` / `{ENV_VAR_LOCAL}`) must be set"
        ))),
        _ => Err(Error::Cli(format!(
            "`{ENV_VAR_BUCKET}` and `{ENV_VAR_LOCAL}` can't both be set"
        ))),
    }
}

fn get_env_var<T: AsRef<OsStr>>(name: T) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
