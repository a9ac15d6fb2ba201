//! Prompt rendering for each agent-facing phase.

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;

const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");
const REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");
const RESOLVE_TEMPLATE: &str = include_str!("prompts/resolve.md");
const RESOLVE_THREADS_TEMPLATE: &str = include_str!("prompts/resolve_threads.md");
const CLARIFY_TEMPLATE: &str = include_str!("prompts/clarify.md");

/// Inputs for the fix-phase prompt. Paths are relative to the project root.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FixPrompt {
    pub iteration: u32,
    pub oscillation: Option<String>,
    pub checks_filtered: String,
    pub checks_log: String,
    pub review_history: Option<String>,
    pub build_history: Option<String>,
    pub manifest: Option<String>,
    pub large_files: Vec<String>,
    pub large_file_lines: usize,
    pub artifact_dir: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReviewPrompt {
    pub iteration: u32,
    pub diff_path: String,
    pub diff_attached: bool,
    pub changed_files: Vec<String>,
    pub review_file: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvePrompt {
    pub iteration: u32,
    pub attempt: u32,
    pub review_file: String,
    pub review_recent: Option<String>,
    pub previous_attempt_failed: bool,
    pub artifact_dir: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveThreadsPrompt {
    pub iteration: u32,
    pub pr_label: String,
    pub threads: String,
    pub resolved_file: String,
    pub artifact_dir: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClarifyPrompt {
    pub iteration: u32,
    pub phase: String,
    pub confidence: String,
    pub issue: String,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for (name, source) in [
            ("fix", FIX_TEMPLATE),
            ("review", REVIEW_TEMPLATE),
            ("resolve", RESOLVE_TEMPLATE),
            ("resolve_threads", RESOLVE_THREADS_TEMPLATE),
            ("clarify", CLARIFY_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load {name} prompt template"))?;
        }
        Ok(Self { env })
    }

    pub fn render_fix(&self, input: &FixPrompt) -> Result<String> {
        self.render("fix", input)
    }

    pub fn render_review(&self, input: &ReviewPrompt) -> Result<String> {
        self.render("review", input)
    }

    pub fn render_resolve(&self, input: &ResolvePrompt) -> Result<String> {
        self.render("resolve", input)
    }

    pub fn render_resolve_threads(&self, input: &ResolveThreadsPrompt) -> Result<String> {
        self.render("resolve_threads", input)
    }

    pub fn render_clarify(&self, input: &ClarifyPrompt) -> Result<String> {
        self.render("clarify", input)
    }

    fn render<T: Serialize>(&self, name: &str, input: &T) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(input)
            .with_context(|| format!("render {name} prompt"))?;
        Ok(rendered.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PromptEngine {
        PromptEngine::new().expect("templates load")
    }

    #[test]
    fn fix_prompt_includes_warning_only_when_oscillating() {
        let mut input = FixPrompt {
            iteration: 2,
            checks_filtered: ".fixloop/checks_filtered.log".to_string(),
            checks_log: ".fixloop/checks.log".to_string(),
            artifact_dir: ".fixloop".to_string(),
            ..FixPrompt::default()
        };
        let plain = engine().render_fix(&input).expect("render");
        assert!(plain.contains("iteration 2"));
        assert!(plain.contains(".fixloop/checks_filtered.log"));
        assert!(!plain.contains("## Warning"));

        input.oscillation = Some("WARNING: Check output is IDENTICAL to iteration 1.".to_string());
        let warned = engine().render_fix(&input).expect("render");
        assert!(warned.contains("IDENTICAL to iteration 1"));
    }

    #[test]
    fn fix_prompt_lists_large_files() {
        let input = FixPrompt {
            large_files: vec!["src/huge.rs".to_string()],
            large_file_lines: 2000,
            ..FixPrompt::default()
        };
        let rendered = engine().render_fix(&input).expect("render");
        assert!(rendered.contains("longer than 2000 lines"));
        assert!(rendered.contains("- src/huge.rs"));
    }

    #[test]
    fn review_prompt_names_sentinel_and_output_file() {
        let input = ReviewPrompt {
            iteration: 1,
            diff_path: ".fixloop/changes.diff".to_string(),
            diff_attached: true,
            changed_files: vec!["src/lib.rs".to_string()],
            review_file: ".fixloop/review_current.md".to_string(),
        };
        let rendered = engine().render_review(&input).expect("render");
        assert!(rendered.contains("exactly `NO_ISSUES`"));
        assert!(rendered.contains("- src/lib.rs"));
        assert!(rendered.contains("attached as `.fixloop/changes.diff`"));
    }

    #[test]
    fn thread_prompt_points_at_claim_file() {
        let input = ResolveThreadsPrompt {
            iteration: 1,
            pr_label: "#12".to_string(),
            threads: "--- Thread #1 ---\nID: PRRT_a".to_string(),
            resolved_file: ".fixloop/.resolved_threads".to_string(),
            artifact_dir: ".fixloop".to_string(),
        };
        let rendered = engine().render_resolve_threads(&input).expect("render");
        assert!(rendered.contains("ID: PRRT_a"));
        assert!(rendered.contains("`.fixloop/.resolved_threads`, one ID per line"));
    }
}
