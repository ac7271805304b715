//! Place to put utilities that are only used by tests.

use crate::llm::{Completion, CompletionError, TextCompletion, TextEmbedding};
use std::sync::Mutex;

/// Returns a new temporary directory. Unlike the defaults in the `tempdir` and `tempfile` crates,
/// this directory is not world-accessible by default.
#[cfg(not(miri))]
pub fn tempdir() -> std::io::Result<tempfile::TempDir> {
    use std::fs::Permissions;
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(Permissions::from_mode(0o700));
    }
    builder.tempdir()
}

type CompleteFn = dyn Fn(&str, &str) -> Result<String, CompletionError> + Send + Sync;

/// A text-completion service that answers with a programmable closure and records every prompt
/// it receives.
///
/// # Example
/// ```
/// use bump_core::llm::TextCompletion;
/// use bump_core::test_util::MockCompletion;
/// let mock = MockCompletion::replying("```java\nfoo();\n```");
/// assert_eq!(mock.complete("prompt", "system").unwrap().code, "foo();");
/// assert_eq!(mock.prompts(), ["prompt"]);
/// ```
pub struct MockCompletion {
    reply: Box<CompleteFn>,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletion {
    pub fn new<F>(reply: F) -> MockCompletion
    where
        F: Fn(&str, &str) -> Result<String, CompletionError> + Send + Sync + 'static,
    {
        MockCompletion {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `text`.
    pub fn replying(text: &str) -> MockCompletion {
        let text = text.to_string();
        MockCompletion::new(move |_, _| Ok(text.clone()))
    }

    /// Every prompt received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl TextCompletion for MockCompletion {
    fn name(&self) -> String {
        "mock".into()
    }

    fn complete(&self, prompt: &str, system_context: &str) -> Result<Completion, CompletionError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        (self.reply)(prompt, system_context).map(Completion::from_raw)
    }
}

/// An embedding service that maps text to a bag-of-characters vector, so texts sharing letters
/// are close.
pub struct MockEmbedding;

impl TextEmbedding for MockEmbedding {
    fn embed(&self, text: &str) -> Result<Vec<f32>, CompletionError> {
        let mut vector = vec![0.0f32; 26];
        for c in text.chars().filter(char::is_ascii_alphabetic) {
            vector[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        Ok(vector)
    }
}
