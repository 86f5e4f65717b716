use std::{env::VarError, fmt::Debug, num::TryFromIntError};

use aws_sdk_s3::error::SdkError;
use tokio::{sync::AcquireError, task::JoinError};

use super::Error;

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::other(error)
    }
}

impl From<VarError> for Error {
    fn from(error: VarError) -> Self {
        Error::other(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::other(error)
    }
}

impl From<walkdir::Error> for Error {
    fn from(error: walkdir::Error) -> Self {
        Error::other(error)
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(error: tempfile::PersistError) -> Self {
        Error::other(error)
    }
}

impl From<JoinError> for Error {
    fn from(error: JoinError) -> Self {
        Error::other(error)
    }
}

impl From<AcquireError> for Error {
    fn from(error: AcquireError) -> Self {
        Error::other(error)
    }
}

impl From<TryFromIntError> for Error {
    fn from(error: TryFromIntError) -> Self {
        Error::other(error)
    }
}

impl<E: std::error::Error + Send + Sync + 'static, R: Debug + Send + Sync + 'static>
    From<SdkError<E, R>> for Error
{
    fn from(error: SdkError<E, R>) -> Self {
        Error::other(error)
    }
}
