//! Input files for the CLI.

use std::path::Path;

use anyhow::{bail, Context, Result};
use arbiter::ArbiterRequest;

/// Read a JSON request: `{"question": ..., "schema_context": ..., "evidence": ...,
/// "start_tier": "basic"}`. Only `question` is required.
pub fn load_request(path: &Path) -> Result<ArbiterRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read request {}", path.display()))?;
    let request: ArbiterRequest = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse request {}", path.display()))?;
    if request.question.trim().is_empty() {
        bail!("request {} has no question", path.display());
    }
    Ok(request)
}

/// One assertion per non-blank line. Blank lines are separators, not
/// assertions; empty-string sentinels are the deduplicator's business.
pub fn load_assertions(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read assertions {}", path.display()))?;
    Ok(raw
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect())
}
