//! Python syntax checking using tree-sitter

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tree_sitter::Node;
use tracing::debug;

use sculpt_core::PhaseResult;

use crate::chain::parse_python;

/// A syntax error located in the generated code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxIssue {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed, in bytes)
    pub column: usize,
    /// Python exception name: SyntaxError, IndentationError or TabError
    pub kind: String,
    pub message: String,
}

impl std::fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at line {}, column {}: {}",
            self.kind, self.line, self.column, self.message
        )
    }
}

/// Outcome of one syntax check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyntaxReport {
    pub errors: Vec<SyntaxIssue>,
    pub warnings: Vec<String>,
}

impl SyntaxReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<String> {
        self.errors.first().map(ToString::to_string)
    }

    pub fn into_phase_result(self) -> PhaseResult {
        if self.is_valid() {
            PhaseResult::success(serde_json::json!({
                "status": "PASS",
                "warnings": self.warnings,
            }))
        } else {
            let line = self.errors[0].line;
            let column = self.errors[0].column;
            PhaseResult::failed(self.errors.iter().map(ToString::to_string).collect())
                .with_metadata("line", line)
                .with_metadata("offset", column)
                .with_metadata("warnings", &self.warnings)
        }
    }
}

/// Syntax checker for generated scripts
#[derive(Debug, Clone, Default)]
pub struct SyntaxChecker;

impl SyntaxChecker {
    pub fn new() -> Self {
        Self
    }

    /// Check that `code` parses, and collect non-fatal warnings
    pub fn check(&self, code: &str) -> SyntaxReport {
        let mut report = SyntaxReport::default();

        if let Some(issue) = indentation_issue(code) {
            report.errors.push(issue);
        } else {
            match parse_python(code) {
                Some(tree) => {
                    let root = tree.root_node();
                    if root.has_error() {
                        report.errors.push(first_error_node(&root, code).unwrap_or_else(|| {
                            SyntaxIssue {
                                line: 1,
                                column: 1,
                                kind: "SyntaxError".to_string(),
                                message: "invalid syntax".to_string(),
                            }
                        }));
                    } else if let Some(issue) = rejected_statement(&root, code, false) {
                        report.errors.push(issue);
                    }
                }
                None => report.errors.push(SyntaxIssue {
                    line: 0,
                    column: 0,
                    kind: "SyntaxError".to_string(),
                    message: "failed to load the Python grammar".to_string(),
                }),
            }
        }

        report.warnings = warnings(code);
        debug!(
            valid = report.is_valid(),
            warnings = report.warnings.len(),
            "syntax check"
        );
        report
    }
}

/// Tab/space mixing and a stray indent on the first statement
fn indentation_issue(code: &str) -> Option<SyntaxIssue> {
    let mut uses_tabs = false;
    let mut uses_spaces = false;
    let mut seen_statement = false;

    for (idx, line) in code.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = &line[..line.len() - trimmed.len()];
        if !seen_statement && !indent.is_empty() {
            return Some(SyntaxIssue {
                line: idx + 1,
                column: 1,
                kind: "IndentationError".to_string(),
                message: "unexpected indent".to_string(),
            });
        }
        seen_statement = true;

        uses_tabs |= indent.contains('\t');
        uses_spaces |= indent.contains(' ');
        if uses_tabs && uses_spaces {
            return Some(SyntaxIssue {
                line: idx + 1,
                column: 1,
                kind: "TabError".to_string(),
                message: "inconsistent use of tabs and spaces in indentation".to_string(),
            });
        }
    }
    None
}

/// Recursively find the first error or missing node
fn first_error_node(node: &Node, code: &str) -> Option<SyntaxIssue> {
    if node.is_error() || node.is_missing() {
        let position = node.start_position();
        let message = if node.is_missing() {
            format!("expected '{}'", node.kind())
        } else {
            let snippet: String = code
                .get(node.start_byte()..node.end_byte())
                .unwrap_or("")
                .chars()
                .take(40)
                .collect();
            format!("invalid syntax near '{}'", snippet.trim())
        };
        let kind = if code
            .lines()
            .nth(position.row)
            .is_some_and(|l| l.trim_end().ends_with(':'))
            && node.is_missing()
        {
            "IndentationError"
        } else {
            "SyntaxError"
        };
        return Some(SyntaxIssue {
            line: position.row + 1,
            column: position.column + 1,
            kind: kind.to_string(),
            message,
        });
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() || child.is_missing() {
            if let Some(issue) = first_error_node(&child, code) {
                return Some(issue);
            }
        }
    }
    None
}

/// Statements the grammar accepts but Python 3 does not compile
///
/// Covers Python 2 `print`/`exec` statements and `return`/`yield` outside a
/// function body.
fn rejected_statement(node: &Node, code: &str, in_function: bool) -> Option<SyntaxIssue> {
    let message = match node.kind() {
        "print_statement" if !is_parenthesized_call(node, code, "print") => {
            Some("Missing parentheses in call to 'print'")
        }
        "exec_statement" if !is_parenthesized_call(node, code, "exec") => {
            Some("Missing parentheses in call to 'exec'")
        }
        "return_statement" if !in_function => Some("'return' outside function"),
        "yield" if !in_function => Some("'yield' outside function"),
        _ => None,
    };
    if let Some(message) = message {
        let position = node.start_position();
        return Some(SyntaxIssue {
            line: position.row + 1,
            column: position.column + 1,
            kind: "SyntaxError".to_string(),
            message: message.to_string(),
        });
    }

    let in_function = match node.kind() {
        "function_definition" | "lambda" => true,
        "class_definition" => false,
        _ => in_function,
    };
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(issue) = rejected_statement(&child, code, in_function) {
            return Some(issue);
        }
    }
    None
}

/// `print (x)` written with a space still compiles as a call
fn is_parenthesized_call(node: &Node, code: &str, keyword: &str) -> bool {
    code.get(node.start_byte()..node.end_byte())
        .and_then(|text| text.strip_prefix(keyword))
        .map(str::trim)
        .is_some_and(|args| args.starts_with('(') && args.ends_with(')'))
}

fn division_by_zero() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)/\s*0+(?:\.0*)?\s*(?:[)\],;#]|$)").ok())
        .as_ref()
}

fn warnings(code: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    let required = [
        ("cadquery", code.contains("cadquery") || code.contains("cq.")),
        ("numpy", code.contains("numpy") || code.contains("np.")),
        ("math", code.contains("math.")),
    ];
    for (module, used) in required {
        if used && !code.contains(&format!("import {}", module)) {
            warnings.push(format!("Missing import: {}", module));
        }
    }

    if !code.contains("exporters.export") && !code.contains("write_stl") {
        warnings.push("No STL export detected in code".to_string());
    }

    if division_by_zero().is_some_and(|re| re.is_match(code)) {
        warnings.push("Potential division by zero detected".to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_script() {
        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").box(10, 10, 10)\ncq.exporters.export(result, \"out.stl\")\n";
        let report = SyntaxChecker::new().check(code);
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
        assert!(report.into_phase_result().is_success());
    }

    #[test]
    fn test_unbalanced_paren() {
        let code = "import cadquery as cq\nresult = (cq.Workplane(\"XY\")\n    .box(10, 10, 10)\n";
        let report = SyntaxChecker::new().check(code);
        assert!(!report.is_valid());
        let message = report.first_error().unwrap();
        assert!(message.starts_with("SyntaxError at line"));

        let result = report.into_phase_result();
        assert!(!result.is_success());
        assert!(result.metadata.contains_key("line"));
    }

    #[test]
    fn test_mixed_tabs_and_spaces() {
        let code = "for i in range(3):\n    x = i\nfor j in range(3):\n\ty = j\n";
        let report = SyntaxChecker::new().check(code);
        assert_eq!(report.errors[0].kind, "TabError");
        assert_eq!(report.errors[0].line, 4);
    }

    #[test]
    fn test_unexpected_indent() {
        let report = SyntaxChecker::new().check("    x = 1\n");
        assert_eq!(report.errors[0].kind, "IndentationError");
    }

    #[test]
    fn test_python2_statements_rejected() {
        let checker = SyntaxChecker::new();

        let report = checker.check("print \"hi\"\n");
        assert_eq!(report.errors[0].message, "Missing parentheses in call to 'print'");

        let report = checker.check("x = 1\nexec \"y=2\"\n");
        assert_eq!(report.errors[0].line, 2);
        assert_eq!(report.errors[0].message, "Missing parentheses in call to 'exec'");

        assert!(checker.check("print(\"hi\")\n").is_valid());
    }

    #[test]
    fn test_return_and_yield_need_a_function() {
        let checker = SyntaxChecker::new();

        let report = checker.check("return 5\n");
        assert_eq!(report.errors[0].kind, "SyntaxError");
        assert_eq!(report.errors[0].message, "'return' outside function");

        let report = checker.check("x = 1\nyield x\n");
        assert_eq!(report.errors[0].message, "'yield' outside function");

        let report = checker.check("class Part:\n    return 1\n");
        assert!(!report.is_valid());

        assert!(checker.check("def f():\n    return 5\n").is_valid());
        assert!(checker.check("def g():\n    yield 1\n").is_valid());
    }

    #[test]
    fn test_warnings() {
        let code = "result = cq.Workplane(\"XY\").box(10, 10, 10 / 0)\n";
        let report = SyntaxChecker::new().check(code);
        assert!(report.is_valid());
        assert!(report.warnings.contains(&"Missing import: cadquery".to_string()));
        assert!(report.warnings.contains(&"No STL export detected in code".to_string()));
        assert!(report.warnings.contains(&"Potential division by zero detected".to_string()));

        let report = SyntaxChecker::new().check("x = 1 / 0.5\n");
        assert!(!report.warnings.contains(&"Potential division by zero detected".to_string()));
    }
}
