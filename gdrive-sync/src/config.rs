use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checksum::CacheSettings;
use crate::resolver::AmbiguityPolicy;
use crate::retry::RetryPolicy;

const DEFAULT_ROOT_FOLDER: &str = "iPhotos";
const DEFAULT_NAMESPACE: &str = "gdrive";
const DEFAULT_CACHE_TITLE: &str = "checksum_cache.json";
const DEFAULT_PERSIST_ATTEMPTS: u64 = 5;
const DEFAULT_RETRY_BASE_MS: u64 = 250;
const DEFAULT_RETRY_MAX_MS: u64 = 10_000;
const DEFAULT_REBUILD_CONCURRENCY: u64 = 4;
const DEFAULT_CONTENT_MIME_PREFIXES: &str = "image/,video/,application/octet-stream";

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub root_folder: String,
    pub namespace: String,
    pub cache_title: String,
    pub scratch_dir: PathBuf,
    pub ambiguity: AmbiguityPolicy,
    pub persist_attempts: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub rebuild_concurrency: usize,
    pub content_mime_prefixes: Vec<String>,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read_string = |name: &str, default: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let read_u64 = |name: &str, default: u64| {
            lookup(name)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(default)
        };
        let read_bool = |name: &str, default: bool| {
            lookup(name)
                .map(|value| {
                    matches!(
                        value.trim().to_ascii_lowercase().as_str(),
                        "1" | "true" | "yes" | "on"
                    )
                })
                .unwrap_or(default)
        };

        let scratch_dir = match (lookup("GDRIVE_SCRATCH_DIR"), dirs::home_dir()) {
            (Some(value), Some(home)) => expand_with_home(&value, &home),
            (Some(value), None) => PathBuf::from(value),
            (None, _) => default_scratch_dir(),
        };
        let ambiguity = if read_bool("GDRIVE_STRICT_AMBIGUITY", false) {
            AmbiguityPolicy::Reject
        } else {
            AmbiguityPolicy::FirstMatch
        };
        let content_mime_prefixes = read_string(
            "GDRIVE_CONTENT_MIME_PREFIXES",
            DEFAULT_CONTENT_MIME_PREFIXES,
        )
        .split(',')
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty())
        .map(str::to_string)
        .collect();

        Self {
            root_folder: read_string("GDRIVE_ROOT_FOLDER", DEFAULT_ROOT_FOLDER),
            namespace: read_string("GDRIVE_NAMESPACE", DEFAULT_NAMESPACE)
                .trim_end_matches('/')
                .to_string(),
            cache_title: read_string("GDRIVE_CACHE_TITLE", DEFAULT_CACHE_TITLE),
            scratch_dir,
            ambiguity,
            persist_attempts: u32::try_from(read_u64(
                "GDRIVE_PERSIST_ATTEMPTS",
                DEFAULT_PERSIST_ATTEMPTS,
            ))
            .unwrap_or(u32::MAX),
            retry_base: Duration::from_millis(read_u64(
                "GDRIVE_RETRY_BASE_MS",
                DEFAULT_RETRY_BASE_MS,
            )),
            retry_max: Duration::from_millis(read_u64("GDRIVE_RETRY_MAX_MS", DEFAULT_RETRY_MAX_MS)),
            rebuild_concurrency: usize::try_from(read_u64(
                "GDRIVE_REBUILD_CONCURRENCY",
                DEFAULT_REBUILD_CONCURRENCY,
            ))
            .unwrap_or(usize::MAX),
            content_mime_prefixes,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.persist_attempts, self.retry_base, self.retry_max)
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            title: self.cache_title.clone(),
            scratch_dir: self.scratch_dir.clone(),
            content_mime_prefixes: self.content_mime_prefixes.clone(),
            rebuild_concurrency: self.rebuild_concurrency,
            persist_retry: self.retry_policy(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn default_scratch_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("gdrive-sync")
}
