//! Attachment planning and changed-path classification.

use std::path::{Component, Path};

use glob::Pattern;

/// Generated files that never go to the reviewer.
const REVIEW_EXCLUDED: &[&str] = &["*.lock", "*-lock.json", "*-lock.yaml", "go.sum", "*.min.*"];

/// A changed file and its size on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizedFile {
    pub path: String,
    pub bytes: u64,
}

/// How changed files reach the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextPlan {
    /// Attach files directly to the invocation.
    Embed { files: Vec<String>, total_bytes: u64 },
    /// Too large: list paths and let the agent read on demand.
    Manifest { files: Vec<String>, total_bytes: u64 },
}

impl ContextPlan {
    /// Paths to pass as attachments (empty in manifest mode).
    pub fn attachments(&self) -> &[String] {
        match self {
            ContextPlan::Embed { files, .. } => files,
            ContextPlan::Manifest { .. } => &[],
        }
    }

    /// Prompt text describing files the agent must fetch itself.
    pub fn manifest(&self) -> Option<String> {
        let ContextPlan::Manifest { files, total_bytes } = self else {
            return None;
        };
        let mut text = format!(
            "The following changed files are too large to pre-load ({} KB total). \
             You MUST use the 'read' tool to inspect them before editing:\n",
            total_bytes / 1024
        );
        for file in files {
            text.push_str(&format!("- {file}\n"));
        }
        Some(text)
    }
}

/// Choose between embedding and a manifest based on the combined size.
pub fn plan_context(files: &[SizedFile], threshold_bytes: u64) -> ContextPlan {
    let total_bytes: u64 = files.iter().map(|f| f.bytes).sum();
    let paths = files.iter().map(|f| f.path.clone()).collect();
    if files.is_empty() || total_bytes <= threshold_bytes {
        ContextPlan::Embed {
            files: paths,
            total_bytes,
        }
    } else {
        ContextPlan::Manifest {
            files: paths,
            total_bytes,
        }
    }
}

/// True if `path` is inside the top-level artifact directory `dir_name`.
pub fn is_artifact_path(path: &Path, dir_name: &str) -> bool {
    let mut components = path
        .components()
        .filter(|component| !matches!(component, Component::CurDir | Component::RootDir));

    match components.next() {
        Some(Component::Normal(name)) => name == dir_name,
        _ => false,
    }
}

/// True for lock files and minified bundles, matched on the file name.
pub fn is_review_excluded(path: &str) -> bool {
    let name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);
    REVIEW_EXCLUDED
        .iter()
        .filter_map(|pattern| Pattern::new(pattern).ok())
        .any(|pattern| pattern.matches(name))
}
