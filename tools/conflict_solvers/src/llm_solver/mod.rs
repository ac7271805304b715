//! The catch-all solver: asks a text-completion service for the replacement.

pub mod cache;
pub mod prompt;
pub mod similar;

pub use cache::{CacheKey, ResponseCache};
pub use similar::Ranker;

use crate::{Problem, SolveError, Solver};
use api_diff::{ClassDiff, MethodDiff, MethodReport, infer_member, render_member};
use bump_core::config::unknown_field_warning;
use bump_core::llm::{Completion, LLMConfig, TextCompletion, complete_retrying};
use bump_core::ProposedChange;
use code_analysis::bytecode::Visibility;
use code_analysis::types;
use prompt::{Prompt, enclosing_scope};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

const SYSTEM_PROMPT: &str = include_str!("system_prompt.txt");

fn default_similar_methods() -> usize {
    5
}

fn default_cache_responses() -> bool {
    true
}

/// `[tools.llm_solver]`
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub llm: LLMConfig,

    /// How many methods of the new API to list as candidate replacements.
    #[serde(default = "default_similar_methods")]
    pub similar_methods: usize,

    /// Keep responses on disk and reuse them for identical prompts.
    #[serde(default = "default_cache_responses")]
    pub cache_responses: bool,

    #[serde(flatten)]
    unknown: HashMap<String, Value>,
}

impl Config {
    pub fn validate(&self) {
        unknown_field_warning("tools.llm_solver", &self.unknown);
    }

    /// Returns a mock config for testing.
    pub fn mock() -> Self {
        Self {
            llm: LLMConfig {
                address: None,
                api_key: None,
                backend: "mock_llm".into(),
                model: "mock_model".into(),
                max_tokens: 1000,
            },
            similar_methods: default_similar_methods(),
            cache_responses: false,
            unknown: HashMap::new(),
        }
    }
}

pub struct LlmSolver {
    completion: Arc<dyn TextCompletion>,
    ranker: Ranker,
    similar_methods: usize,
    cache: Option<ResponseCache>,
    backoff: Duration,
}

impl LlmSolver {
    pub fn new(completion: Arc<dyn TextCompletion>) -> LlmSolver {
        LlmSolver {
            completion,
            ranker: Ranker::Levenshtein,
            similar_methods: default_similar_methods(),
            cache: None,
            backoff: Duration::from_secs(2),
        }
    }

    pub fn with_ranker(mut self, ranker: Ranker) -> LlmSolver {
        self.ranker = ranker;
        self
    }

    pub fn with_similar_methods(mut self, count: usize) -> LlmSolver {
        self.similar_methods = count;
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> LlmSolver {
        self.cache = Some(cache);
        self
    }

    /// Pause between retries of a failed connection.
    pub fn with_backoff(mut self, backoff: Duration) -> LlmSolver {
        self.backoff = backoff;
        self
    }

    /// The class of the error in the dependency diff, and the member the broken code uses.
    fn member<'p>(problem: &Problem<'p>) -> Option<(&'p ClassDiff, Option<&'p MethodDiff>)> {
        let class = problem
            .classification
            .class
            .as_ref()
            .or_else(|| problem.diff.class(&problem.location.class_name))?;
        if let Some(method) = &problem.classification.method {
            return Some((class, Some(method)));
        }
        let Some(name) = problem.location.method() else {
            return Some((class, None));
        };
        let name = if name == types::simple_name(&class.name) { "<init>" } else { name };
        let candidates: Vec<&MethodDiff> = class.methods_named(name).collect();
        Some((class, infer_member(&candidates, &problem.location.parameter_types)))
    }

    /// Methods of the new version of `class`, most similar to `method` first.
    fn similar_methods(&self, class: &ClassDiff, query: &str) -> Vec<String> {
        let Some(new) = &class.new else {
            return Vec::new();
        };
        let candidates: Vec<String> = new
            .methods
            .iter()
            .filter(|m| !m.is_synthetic() && m.visibility() != Visibility::Private)
            .map(|m| render_member(&class.name, m))
            .collect();
        self.ranker.rank(query, candidates, self.similar_methods)
    }

    pub fn prompt(&self, problem: &Problem) -> String {
        let mut prompt = Prompt::default();
        let member = LlmSolver::member(problem);
        if let Some((class, Some(method))) = member {
            prompt.section("API change", MethodReport { class: &class.name, method }.to_string());
        }
        if !problem.classification.conflicts.is_empty() {
            let conflicts: Vec<String> = problem
                .classification
                .conflicts
                .iter()
                .map(|c| c.to_string())
                .collect();
            prompt.section("Breaking changes", conflicts.join(", "));
        }
        if let Some(scope) = enclosing_scope(problem.class_source, problem.broken.start) {
            prompt.code_section("Enclosing method", &scope);
        }
        prompt.code_section("Broken code", &problem.broken.code);
        if let Some((class, method)) = member {
            let query = method
                .and_then(|m| m.old.as_ref().or(m.new.as_ref()))
                .map(|m| render_member(&class.name, m))
                .unwrap_or_else(|| problem.location.to_string());
            let similar = self.similar_methods(class, &query);
            if !similar.is_empty() {
                let list: Vec<String> = similar.iter().map(|s| format!("- {s}")).collect();
                prompt.section(format!("Methods of {} in the new version", class.name), list.join("\n"));
            }
        }
        prompt.section("Compiler error", problem.error.render());
        prompt.to_string()
    }
}

impl Solver for LlmSolver {
    fn name(&self) -> &'static str {
        "llm"
    }

    fn targets(&self, _problem: &Problem) -> bool {
        true
    }

    fn fixable(&self, _problem: &Problem) -> bool {
        true
    }

    fn solve(&self, problem: &Problem) -> Result<Option<ProposedChange>, SolveError> {
        let prompt = self.prompt(problem);
        trace!("prompt:\n{prompt}");
        let file = problem.error.class_file_name();
        let provider = self.completion.name();
        let key = CacheKey {
            file: &file,
            line: problem.error.line,
            class: &problem.location.class_name,
            provider: &provider,
        };
        let raw = match self.cache.as_ref().and_then(|c| c.get(&key, &prompt)) {
            Some(raw) => raw,
            None => {
                let completion = complete_retrying(self.completion.as_ref(), &prompt, SYSTEM_PROMPT, self.backoff)?;
                if let Some(cache) = &self.cache {
                    cache.put(&key, &prompt, &completion.raw)?;
                }
                completion.raw
            }
        };
        let completion = Completion::from_raw(raw);
        if completion.code.trim().is_empty() {
            warn!("no code in the completion for {file}:{}", problem.error.line);
            return Ok(None);
        }
        debug!("completion proposes {:?}", completion.code);
        Ok(Some(problem.change(completion.code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use api_diff::ApiDiff;
    use bump_core::test_util::MockCompletion;
    use bump_core::{ConflictType, ErrorLocation};
    use code_analysis::bytecode::classfile::access;
    use code_analysis::bytecode::test_support::{ClassBuilder, write_jar};

    const MAIN: &str = "\
package com.app;

class Main {
    void run(com.lib.Client client, String name) {
        int before = 1;
        client.fetch(name);
    }
}
";

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let (old, new) = (dir.path().join("c-1.jar"), dir.path().join("c-2.jar"));
        write_jar(
            &old,
            vec![ClassBuilder::new("com/lib/Client").method(access::PUBLIC, "fetch", "(Ljava/lang/String;)V")],
        );
        write_jar(
            &new,
            vec![
                ClassBuilder::new("com/lib/Client")
                    .method(access::PUBLIC, "fetch", "(Ljava/lang/String;Ljava/util/Map;)V")
                    .method(access::PUBLIC, "fetchAll", "(Ljava/lang/String;)V")
                    .method(access::PRIVATE, "secret", "()V"),
            ],
        );
        let diff = ApiDiff::compute(&old, &new).unwrap();
        let mut fixture = Fixture::new("method fetch in class com.lib.Client cannot be applied to given types", "        client.fetch(name);")
            .conflicts(&[ConflictType::MethodParametersAdded]);
        fixture.broken.start = 6;
        fixture.broken.end = 6;
        fixture.error.line = 6;
        fixture.classification.class = diff.class("com.lib.Client").cloned();
        fixture.location = ErrorLocation::new("com.lib.Client", Some("fetch".into()), vec![Some("String".into())]);
        fixture.class_source = MAIN.to_string();
        fixture.diff = diff;
        fixture
    }

    #[test]
    fn prompt_carries_every_section() {
        let fixture = fixture();
        let solver = LlmSolver::new(Arc::new(MockCompletion::replying("")));
        let prompt = solver.prompt(&fixture.problem());
        assert!(prompt.contains("## API change\nMethod modified in com.lib.Client"), "{prompt}");
        assert!(prompt.contains("parameter 1 added: java.util.Map"), "{prompt}");
        assert!(prompt.contains("METHOD_PARAMETERS_ADDED"), "{prompt}");
        assert!(prompt.contains("## Enclosing method\n```java\n    void run("), "{prompt}");
        assert!(prompt.contains("## Broken code\n```java\n        client.fetch(name);\n```"), "{prompt}");
        assert!(prompt.contains("- public void fetchAll(java.lang.String)"), "{prompt}");
        assert!(!prompt.contains("secret"), "{prompt}");
        assert!(prompt.contains("## Compiler error\n/app/src/main/java/com/app/Main.java:[6,1]"), "{prompt}");
    }

    #[test]
    fn fenced_reply_becomes_the_fix() {
        let fixture = fixture();
        let completion = Arc::new(MockCompletion::replying(
            "Pass an empty map:\n```java\n        client.fetch(name, java.util.Map.of());\n```",
        ));
        let solver = LlmSolver::new(completion.clone());
        let change = solver.solve(&fixture.problem()).unwrap().unwrap();
        assert_eq!(change.code, "        client.fetch(name, java.util.Map.of());");
        assert_eq!((change.start, change.end), (6, 6));
        assert_eq!(change.class_name, "Main.java");
        assert_eq!(completion.prompts().len(), 1);
    }

    #[test]
    fn reply_without_code_is_no_fix() {
        let fixture = fixture();
        let solver = LlmSolver::new(Arc::new(MockCompletion::replying("I cannot help with that.")));
        assert_eq!(solver.solve(&fixture.problem()).unwrap(), None);
    }

    #[test]
    fn cached_responses_skip_the_service() {
        let fixture = fixture();
        let dir = tempfile::tempdir().unwrap();
        let completion = Arc::new(MockCompletion::replying("```java\nx();\n```"));
        let solver = LlmSolver::new(completion.clone()).with_cache(ResponseCache::new(dir.path()));
        let first = solver.solve(&fixture.problem()).unwrap();
        let second = solver.solve(&fixture.problem()).unwrap();
        assert_eq!(first, second);
        assert_eq!(completion.prompts().len(), 1);
    }
}
