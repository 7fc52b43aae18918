use std::path::PathBuf;

/// Where generated artifacts are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Filesystem {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
        prefix: Option<String>,
    },
}

impl StorageConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var           | Default     |
    /// |-------------------|-------------|
    /// | `STORAGE_BACKEND` | `fs`        |
    /// | `STORAGE_ROOT`    | `./storage` |
    /// | `S3_BUCKET`       | (required for `s3`) |
    /// | `S3_REGION`       | `us-east-1` |
    /// | `S3_ENDPOINT`     | unset       |
    /// | `S3_PREFIX`       | unset       |
    pub fn from_env() -> Self {
        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "fs".into());
        match backend.as_str() {
            "s3" => Self::S3 {
                bucket: std::env::var("S3_BUCKET")
                    .expect("S3_BUCKET must be set when STORAGE_BACKEND=s3"),
                region: optional_var("S3_REGION"),
                endpoint: optional_var("S3_ENDPOINT"),
                prefix: optional_var("S3_PREFIX"),
            },
            "fs" | "filesystem" => Self::Filesystem {
                root: std::env::var("STORAGE_ROOT")
                    .unwrap_or_else(|_| "./storage".into())
                    .into(),
            },
            other => panic!("STORAGE_BACKEND must be 'fs' or 's3', got '{other}'"),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Filesystem { root } if root.as_os_str().is_empty() => {
                Err("storage root must not be empty".into())
            }
            Self::S3 { bucket, .. } if bucket.trim().is_empty() => {
                Err("S3 bucket must not be empty".into())
            }
            _ => Ok(()),
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
