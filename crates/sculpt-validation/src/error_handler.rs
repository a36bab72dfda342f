//! Classification of raw failure strings into a fixed taxonomy

use serde::{Deserialize, Serialize};
use tracing::info;

use sculpt_core::PhaseResult;

/// Failure category, in matching order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Syntax,
    Runtime,
    Import,
    Memory,
    Geometry,
    Unknown,
}

impl ErrorCategory {
    pub fn severity(self) -> Severity {
        match self {
            Self::Memory | Self::Import => Severity::Critical,
            Self::Syntax | Self::Runtime => Severity::High,
            Self::Geometry => Severity::Medium,
            Self::Unknown => Severity::Low,
        }
    }

    pub fn can_retry(self) -> bool {
        matches!(self, Self::Syntax | Self::Runtime | Self::Geometry)
    }

    /// Categories that end the run immediately
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Import | Self::Memory)
    }

    pub fn recovery_action(self) -> Option<&'static str> {
        match self {
            Self::Syntax => Some("Fix syntax errors with self-healing"),
            Self::Runtime => Some("Review variable definitions and types"),
            Self::Import => Some("Check required dependencies"),
            Self::Memory => Some("Reduce model complexity"),
            Self::Geometry => Some("Adjust geometric parameters"),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Runtime => write!(f, "runtime"),
            Self::Import => write!(f, "import"),
            Self::Memory => write!(f, "memory"),
            Self::Geometry => write!(f, "geometry"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One classified failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub message: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub can_retry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_action: Option<String>,
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}", self.category, self.severity, self.message)
    }
}

/// Classification of a whole error list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub errors: Vec<ClassifiedError>,
    /// True if any individual error is retryable
    pub can_retry: bool,
    pub recovery_actions: Vec<String>,
}

impl ErrorClassification {
    /// Any import or memory failure present
    pub fn is_terminal(&self) -> bool {
        self.errors.iter().any(|e| e.category.is_terminal())
    }

    /// Retry only when something is retryable and nothing is terminal
    pub fn should_retry(&self) -> bool {
        self.can_retry && !self.is_terminal()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.errors.iter().map(|e| e.severity).max()
    }

    pub fn into_phase_result(self) -> PhaseResult {
        let can_retry = self.can_retry;
        let count = self.errors.len();
        PhaseResult::success(&self)
            .with_metadata("can_retry", can_retry)
            .with_metadata("error_count", count)
    }
}

/// Keyword-driven failure classifier
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    categories: Vec<(ErrorCategory, Vec<String>)>,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorHandler {
    pub fn new() -> Self {
        let table: [(ErrorCategory, &[&str]); 5] = [
            (
                ErrorCategory::Syntax,
                &["SyntaxError", "IndentationError", "TabError"],
            ),
            (
                ErrorCategory::Runtime,
                &["NameError", "TypeError", "AttributeError", "ValueError"],
            ),
            (
                ErrorCategory::Import,
                &["ImportError", "ModuleNotFoundError"],
            ),
            (ErrorCategory::Memory, &["MemoryError", "RecursionError"]),
            (
                ErrorCategory::Geometry,
                &["topology", "invalid shape", "degenerate"],
            ),
        ];
        Self {
            categories: table
                .iter()
                .map(|(cat, words)| (*cat, words.iter().map(|w| w.to_lowercase()).collect()))
                .collect(),
        }
    }

    /// First category whose keyword occurs in the message, case-insensitively
    pub fn categorize(&self, message: &str) -> ErrorCategory {
        let lower = message.to_lowercase();
        self.categories
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w.as_str())))
            .map(|(cat, _)| *cat)
            .unwrap_or(ErrorCategory::Unknown)
    }

    pub fn classify_one(&self, message: &str) -> ClassifiedError {
        let category = self.categorize(message);
        ClassifiedError {
            message: message.to_string(),
            category,
            severity: category.severity(),
            can_retry: category.can_retry(),
            recovery_action: category.recovery_action().map(str::to_string),
        }
    }

    pub fn classify(&self, errors: &[String]) -> ErrorClassification {
        let errors: Vec<ClassifiedError> = errors.iter().map(|e| self.classify_one(e)).collect();
        let can_retry = errors.iter().any(|e| e.can_retry);
        let mut recovery_actions: Vec<String> = Vec::new();
        for action in errors.iter().filter_map(|e| e.recovery_action.clone()) {
            if !recovery_actions.contains(&action) {
                recovery_actions.push(action);
            }
        }

        info!(
            count = errors.len(),
            can_retry,
            "classified execution errors"
        );

        ErrorClassification {
            errors,
            can_retry,
            recovery_actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_and_severity() {
        let handler = ErrorHandler::new();
        let cases = [
            ("SyntaxError: invalid syntax", ErrorCategory::Syntax, Severity::High),
            ("NameError: name 'np' is not defined", ErrorCategory::Runtime, Severity::High),
            ("ModuleNotFoundError: No module named 'foo'", ErrorCategory::Import, Severity::Critical),
            ("MemoryError", ErrorCategory::Memory, Severity::Critical),
            ("BRep_API: command not done, invalid shape", ErrorCategory::Geometry, Severity::Medium),
            ("something odd happened", ErrorCategory::Unknown, Severity::Low),
        ];
        for (message, category, severity) in cases {
            let classified = handler.classify_one(message);
            assert_eq!(classified.category, category, "{}", message);
            assert_eq!(classified.severity, severity, "{}", message);
        }
    }

    #[test]
    fn test_first_match_wins_case_insensitive() {
        let handler = ErrorHandler::new();
        // Mentions both syntax and memory keywords; syntax is earlier in the table
        assert_eq!(
            handler.categorize("syntaxerror raised while handling memoryerror"),
            ErrorCategory::Syntax
        );
        assert_eq!(handler.categorize("DEGENERATE edge"), ErrorCategory::Geometry);
    }

    #[test]
    fn test_memory_failure_is_terminal() {
        let handler = ErrorHandler::new();
        let result = handler.classify(&["MemoryError: out of memory".to_string()]);
        assert!(!result.can_retry);
        assert!(result.is_terminal());
        assert!(!result.should_retry());
        assert_eq!(result.highest_severity(), Some(Severity::Critical));
    }

    #[test]
    fn test_aggregate_retry() {
        let handler = ErrorHandler::new();
        let result = handler.classify(&[
            "unexplained failure".to_string(),
            "AttributeError: 'Workplane' object has no attribute 'torus'".to_string(),
        ]);
        assert!(result.can_retry);
        assert!(result.should_retry());
        assert_eq!(result.recovery_actions.len(), 1);

        let mixed = handler.classify(&[
            "TypeError: bad operand".to_string(),
            "ImportError: cannot import name 'x'".to_string(),
        ]);
        assert!(mixed.can_retry);
        assert!(!mixed.should_retry());

        let phase = mixed.into_phase_result();
        assert!(phase.flag("can_retry"));
    }

    #[test]
    fn test_unknown_is_not_retryable() {
        let handler = ErrorHandler::new();
        let result = handler.classify(&["Cannot find a solid on the stack".to_string()]);
        assert!(!result.can_retry);
        assert!(!result.is_terminal());
    }
}
