//! Tier-2 repair through a text oracle

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

use sculpt_core::{with_fallback, HealingConfig, Issue, OracleRequest, TextOracle};

use crate::normalize::{normalize_indentation, strip_disallowed_imports, substitute_characters};

/// Issues included in one repair request
const MAX_ISSUES: usize = 5;

/// Longest issue text forwarded to the oracle
const MAX_ISSUE_CHARS: usize = 240;

const SYSTEM: &str = "You repair CadQuery Python scripts. Reply with the full corrected script in one ```python block and nothing else.";

/// Generative repair backed by a [`TextOracle`]
#[derive(Clone)]
pub struct RepairOracle {
    oracle: Arc<dyn TextOracle>,
    timeout: Duration,
}

impl RepairOracle {
    pub fn new(oracle: Arc<dyn TextOracle>) -> Self {
        Self {
            oracle,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        self.oracle.name()
    }

    /// Ask the oracle for a repaired script
    ///
    /// Returns `None` when the oracle fails, times out, or replies without
    /// recognizable code.
    pub async fn repair(
        &self,
        code: &str,
        issues: &[Issue],
        config: &HealingConfig,
    ) -> Option<String> {
        let request = OracleRequest::new(repair_prompt(code, issues, config))
            .with_system(SYSTEM)
            .with_temperature(0.1)
            .with_max_tokens(2048);

        info!(oracle = self.oracle.name(), issues = issues.len(), "requesting tier-2 repair");
        let reply = with_fallback(
            "repair",
            self.timeout,
            async { self.oracle.generate(&request).await.map(Some) },
            || None,
        )
        .await?;

        let extracted = extract_code(&reply);
        if extracted.is_none() {
            debug!("repair reply contained no code");
        }
        extracted.map(|code| normalize_reply(&code, config))
    }
}

impl std::fmt::Debug for RepairOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairOracle")
            .field("oracle", &self.oracle.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Build the repair request with its contract
pub fn repair_prompt(code: &str, issues: &[Issue], config: &HealingConfig) -> String {
    let condensed: Vec<String> = issues
        .iter()
        .take(MAX_ISSUES)
        .map(|issue| {
            let message = issue.message();
            let line = message.lines().next().unwrap_or("").trim();
            let mut short: String = line.chars().take(MAX_ISSUE_CHARS).collect();
            if line.chars().count() > MAX_ISSUE_CHARS {
                short.push_str("...");
            }
            format!("- {}", short)
        })
        .collect();

    format!(
        "Fix this CadQuery script.\n\n\
         Problems:\n{issues}\n\n\
         Rules:\n\
         - Import only these modules: {allowed}\n\
         - Use only CadQuery API members that exist; do not invent methods\n\
         - Keep every existing variable name, including `result`\n\
         - Change as little as possible\n\n\
         Script:\n```python\n{code}\n```\n",
        issues = condensed.join("\n"),
        allowed = config.allowed_imports.join(", "),
        code = code.trim_end(),
    )
}

fn fence_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:python|py)?[ \t]*\r?\n(.*?)```").ok())
        .as_ref()
}

/// Pull the script out of an oracle reply
///
/// Prefers the first fenced block; otherwise starts at the first line that
/// opens a script (`import`, `from`, `result`).
pub fn extract_code(reply: &str) -> Option<String> {
    if let Some(block) = fence_regex()
        .and_then(|re| re.captures(reply))
        .and_then(|c| c.get(1))
    {
        let code = block.as_str().trim_matches('\n');
        return (!code.trim().is_empty()).then(|| format!("{}\n", code.trim_end()));
    }

    let mut offset = 0;
    for line in reply.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("import ")
            || trimmed.starts_with("from ")
            || trimmed.starts_with("result")
        {
            let code = reply[offset..].trim_end();
            return Some(format!("{}\n", code));
        }
        offset += line.len();
    }
    None
}

/// The normalization every tier-2 reply goes through
pub fn normalize_reply(code: &str, config: &HealingConfig) -> String {
    let code = substitute_characters(code);
    let code = normalize_indentation(&code);
    strip_disallowed_imports(&code, config)
}
