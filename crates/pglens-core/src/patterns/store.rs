//! Pattern source loading with local caching.
//!
//! Patterns come from a local file or an http(s) URL. Fetched documents
//! are cached under a hashed filename with a TTL; on fetch failure the
//! cache is used regardless of TTL, and the built-in defaults are the
//! last resort. `load` never fails — classification degrades, it does
//! not halt the pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{PatternError, PatternSet};

pub struct PatternStore {
    source: Option<String>,
    cache_dir: PathBuf,
    cache_ttl: Duration,
    http_timeout: Duration,
}

impl PatternStore {
    pub fn new(
        source: Option<String>,
        cache_dir: impl Into<PathBuf>,
        cache_ttl: Duration,
        http_timeout: Duration,
    ) -> Self {
        Self {
            source,
            cache_dir: cache_dir.into(),
            cache_ttl,
            http_timeout,
        }
    }

    /// Load the pattern set. Resolution order:
    /// fresh cache, then the source itself (caching the result), then a
    /// stale cache, then the built-in defaults.
    pub fn load(&self) -> PatternSet {
        let Some(source) = self.source.as_deref() else {
            debug!("no pattern source configured, using built-in defaults");
            return PatternSet::defaults();
        };

        let cache_path = self.cache_path(source);

        if self.cache_is_fresh(&cache_path) {
            match load_file(&cache_path) {
                Ok(set) => {
                    debug!(cache = %cache_path.display(), "loaded patterns from cache");
                    return set;
                }
                Err(e) => {
                    // Corrupted cache: ignore it and continue with the source.
                    warn!(cache = %cache_path.display(), error = %e, "pattern cache unreadable");
                }
            }
        }

        match self.load_source(source) {
            Ok((set, raw)) => {
                self.save_cache(&cache_path, &raw);
                debug!(source, patterns = set.len(), "loaded patterns from source");
                set
            }
            Err(e) => {
                warn!(source, error = %e, "pattern source failed, falling back");
                if cache_path.exists() {
                    if let Ok(set) = load_file(&cache_path) {
                        return set;
                    }
                }
                PatternSet::defaults()
            }
        }
    }

    /// Cache filename derived from a hash of the source identifier, so
    /// different sources never collide.
    fn cache_path(&self, source: &str) -> PathBuf {
        let digest = Sha256::digest(source.as_bytes());
        let mut hex = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            hex.push_str(&format!("{:02x}", byte));
        }
        self.cache_dir.join(format!("patterns_{}.json", hex))
    }

    fn cache_is_fresh(&self, path: &Path) -> bool {
        let Ok(metadata) = fs::metadata(path) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age < self.cache_ttl,
            // Cache from the future (clock moved back): treat as fresh.
            Err(_) => true,
        }
    }

    /// Fetch and validate the source, returning the parsed set and the
    /// raw document for caching.
    fn load_source(&self, source: &str) -> Result<(PatternSet, String), PatternError> {
        let raw = if source.starts_with("http://") || source.starts_with("https://") {
            self.fetch_url(source)?
        } else {
            fs::read_to_string(source)?
        };
        let set = PatternSet::from_json_str(&raw)?;
        Ok((set, raw))
    }

    fn fetch_url(&self, url: &str) -> Result<String, PatternError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.http_timeout)
            .build()?;
        let response = client.get(url).send()?.error_for_status()?;
        Ok(response.text()?)
    }

    /// Best effort: a cache write failure only costs the next fallback.
    fn save_cache(&self, path: &Path, raw: &str) {
        if let Err(e) = fs::create_dir_all(&self.cache_dir) {
            warn!(dir = %self.cache_dir.display(), error = %e, "cannot create pattern cache dir");
            return;
        }
        if let Err(e) = fs::write(path, raw) {
            warn!(cache = %path.display(), error = %e, "cannot write pattern cache");
        }
    }
}

fn load_file(path: &Path) -> Result<PatternSet, PatternError> {
    let raw = fs::read_to_string(path)?;
    PatternSet::from_json_str(&raw)
}
