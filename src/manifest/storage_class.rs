use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Durability/cost tier an object is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    Standard,
    ReducedRedundancy,
    StandardIa,
    OnezoneIa,
    IntelligentTiering,
    Glacier,
    GlacierIr,
    #[default]
    DeepArchive,
    Outposts,
}

impl StorageClass {
    pub const ALL: [StorageClass; 9] = [
        StorageClass::Standard,
        StorageClass::ReducedRedundancy,
        StorageClass::StandardIa,
        StorageClass::OnezoneIa,
        StorageClass::IntelligentTiering,
        StorageClass::Glacier,
        StorageClass::GlacierIr,
        StorageClass::DeepArchive,
        StorageClass::Outposts,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::ReducedRedundancy => "REDUCED_REDUNDANCY",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::OnezoneIa => "ONEZONE_IA",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::Glacier => "GLACIER",
            StorageClass::GlacierIr => "GLACIER_IR",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
            StorageClass::Outposts => "OUTPOSTS",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStorageClass(pub String);

impl fmt::Display for UnknownStorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown storage class `{}`", self.0)
    }
}

impl FromStr for StorageClass {
    type Err = UnknownStorageClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        StorageClass::ALL
            .into_iter()
            .find(|class| class.as_str() == upper)
            .ok_or_else(|| UnknownStorageClass(s.to_owned()))
    }
}

impl From<StorageClass> for aws_sdk_s3::types::StorageClass {
    fn from(class: StorageClass) -> Self {
        use aws_sdk_s3::types::StorageClass as S3;

        match class {
            StorageClass::Standard => S3::Standard,
            StorageClass::ReducedRedundancy => S3::ReducedRedundancy,
            StorageClass::StandardIa => S3::StandardIa,
            StorageClass::OnezoneIa => S3::OnezoneIa,
            StorageClass::IntelligentTiering => S3::IntelligentTiering,
            StorageClass::Glacier => S3::Glacier,
            StorageClass::GlacierIr => S3::GlacierIr,
            StorageClass::DeepArchive => S3::DeepArchive,
            StorageClass::Outposts => S3::Outposts,
        }
    }
}
