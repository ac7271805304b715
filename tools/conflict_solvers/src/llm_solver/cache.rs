use crate::SolveError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// What a cached response is stored under.
#[derive(Debug, Clone, Copy)]
pub struct CacheKey<'a> {
    /// Class file name, e.g. `Main.java`.
    pub file: &'a str,
    pub line: usize,
    /// Class the error is about.
    pub class: &'a str,
    pub provider: &'a str,
}

#[derive(Serialize, Deserialize)]
struct CachedResponse {
    prompt: String,
    response: String,
}

/// Text-completion responses on disk, one JSON file per key. A response is only reused for the
/// prompt it answered.
pub struct ResponseCache {
    dir: PathBuf,
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') { c } else { '_' })
        .collect()
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> ResponseCache {
        ResponseCache { dir: dir.into() }
    }

    fn path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}_{}.json",
            sanitize(key.file),
            key.line,
            sanitize(key.class),
            sanitize(key.provider)
        ))
    }

    pub fn get(&self, key: &CacheKey, prompt: &str) -> Option<String> {
        let path = self.path(key);
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CachedResponse>(&text) {
            Ok(cached) if cached.prompt == prompt => {
                trace!("cached response {}", path.display());
                Some(cached.response)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("ignoring unreadable cache entry {}: {e}", path.display());
                None
            }
        }
    }

    pub fn put(&self, key: &CacheKey, prompt: &str, response: &str) -> Result<(), SolveError> {
        let io = |path: &Path, source| SolveError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(|e| io(&self.dir, e))?;
        let path = self.path(key);
        let entry = CachedResponse {
            prompt: prompt.to_string(),
            response: response.to_string(),
        };
        let json = serde_json::to_string_pretty(&entry).map_err(|e| io(&path, e.into()))?;
        fs::write(&path, json).map_err(|e| io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_are_reused_for_the_same_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().join("prompts"));
        let key = CacheKey {
            file: "Main.java",
            line: 12,
            class: "com.lib.Client",
            provider: "ollama-llama3:8b",
        };
        assert_eq!(cache.get(&key, "prompt"), None);
        cache.put(&key, "prompt", "```java\nx();\n```").unwrap();
        assert_eq!(cache.get(&key, "prompt").as_deref(), Some("```java\nx();\n```"));
        assert_eq!(cache.get(&key, "another prompt"), None);
        assert!(dir.path().join("prompts/Main.java_12_com.lib.Client_ollama-llama3_8b.json").exists());
    }
}
