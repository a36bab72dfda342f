//! Statement-level edits over a script
//!
//! Edits address whole top-level statements located by
//! [`sculpt_validation::chain`], so a chained construction spread over several
//! lines is replaced or re-rendered as one unit.

use sculpt_validation::chain::{statement_chains, top_level_statements, CallChain, Statement};

/// Variable the generated scripts bind their final shape to
pub const RESULT: &str = "result";

/// Replace every top-level `result = ...` with `replacement`
///
/// The replacement lands where the first binding was. Without any binding it
/// goes before the export call, or at the end.
pub fn replace_result(code: &str, replacement: &str) -> String {
    let mut bindings: Vec<Statement> = top_level_statements(code)
        .into_iter()
        .filter(|s| s.target.as_deref() == Some(RESULT))
        .collect();

    if bindings.is_empty() {
        return insert_before_export(code, replacement);
    }

    bindings.sort_by_key(|s| std::cmp::Reverse(s.range.start));
    let first_start = bindings.iter().map(|s| s.range.start).min().unwrap_or(0);
    let mut out = code.to_string();
    for statement in &bindings {
        let text = if statement.range.start == first_start {
            with_newline(replacement)
        } else {
            String::new()
        };
        out.replace_range(statement.range.clone(), &text);
    }
    out
}

/// Insert `statement` ahead of the export call, or append it
pub fn insert_before_export(code: &str, statement: &str) -> String {
    let statement = with_newline(statement);
    match export_offset(code) {
        Some(offset) => {
            let mut out = code.to_string();
            out.insert_str(offset, &statement);
            out
        }
        None => {
            let mut out = code.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&statement);
            out
        }
    }
}

/// Byte offset of the line holding the first export call
pub fn export_offset(code: &str) -> Option<usize> {
    let mut offset = 0;
    for line in code.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if !line.starts_with([' ', '\t'])
            && (trimmed.contains("exporters.export(") || trimmed.starts_with("show_object("))
        {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Whether the script binds `result` at top level
pub fn binds_result(code: &str) -> bool {
    top_level_statements(code)
        .iter()
        .any(|s| s.target.as_deref() == Some(RESULT))
}

/// Rewrite every chained statement `edit` changes, re-rendering it
///
/// `edit` returns true when it modified the chain.
pub fn edit_chains<F>(code: &str, mut edit: F) -> Option<String>
where
    F: FnMut(&Statement, &mut CallChain) -> bool,
{
    let mut edits: Vec<(Statement, String)> = Vec::new();
    for (statement, mut chain) in statement_chains(code) {
        if edit(&statement, &mut chain) {
            let mut rendered = match &statement.target {
                Some(target) => chain.render_assignment(target),
                None => chain.render_expression(),
            };
            if let Some(comment) = &statement.comment {
                rendered = format!("{}  {}", rendered, comment);
            }
            edits.push((statement, with_newline(&rendered)));
        }
    }
    if edits.is_empty() {
        return None;
    }

    let mut out = code.to_string();
    edits.sort_by_key(|(s, _)| std::cmp::Reverse(s.range.start));
    for (statement, text) in edits {
        out.replace_range(statement.range, &text);
    }
    Some(out)
}

fn with_newline(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{}\n", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPLIT: &str = r#"import cadquery as cq

result = cq.Workplane("XY")
result = result.circle(60)

cq.exporters.export(result, "arc.stl")
"#;

    #[test]
    fn test_replace_all_bindings_at_first() {
        let out = replace_result(SPLIT, "result = cq.Workplane(\"XY\").box(1, 2, 3)\n");
        assert_eq!(
            out,
            "import cadquery as cq\n\nresult = cq.Workplane(\"XY\").box(1, 2, 3)\n\ncq.exporters.export(result, \"arc.stl\")\n"
        );
    }

    #[test]
    fn test_replace_multiline_binding() {
        let code = "import cadquery as cq\nresult = (cq.Workplane(\"XZ\")\n          .circle(8)\n          .revolve(360))\ncq.exporters.export(result, \"t.stl\")\n";
        let out = replace_result(code, "result = cq.Workplane(\"XY\").sphere(5)");
        assert_eq!(
            out,
            "import cadquery as cq\nresult = cq.Workplane(\"XY\").sphere(5)\ncq.exporters.export(result, \"t.stl\")\n"
        );
    }

    #[test]
    fn test_insert_without_binding() {
        let code = "import cadquery as cq\nshape = cq.Workplane(\"XY\")\ncq.exporters.export(shape, \"s.stl\")\n";
        let out = replace_result(code, "result = shape.box(1, 1, 1)\n");
        assert!(out.contains("result = shape.box(1, 1, 1)\ncq.exporters.export"));

        let out = insert_before_export("x = 1", "y = 2");
        assert_eq!(out, "x = 1\ny = 2\n");
    }

    #[test]
    fn test_edit_chains() {
        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").circle(5).extrude(-3)\n";
        let out = edit_chains(code, |_, chain| {
            let Some(i) = chain.position("extrude") else {
                return false;
            };
            chain.calls[i].method = "cutBlind".to_string();
            true
        })
        .unwrap();
        assert_eq!(
            out,
            "import cadquery as cq\nresult = cq.Workplane(\"XY\").circle(5).cutBlind(-3)\n"
        );
        assert!(edit_chains(code, |_, _| false).is_none());
    }

    #[test]
    fn test_edit_chains_keeps_comments() {
        let code = "import cadquery as cq\nresult = (cq.Workplane(\"XY\")\n          .circle(35)  # outer wall\n          .extrude(100)\n          .faces(\">Z\")\n          .shell(-3))  # glass\n";
        let out = edit_chains(code, |_, chain| {
            let Some(i) = chain.position("shell") else {
                return false;
            };
            chain.calls[i].args = "-2".to_string();
            true
        })
        .unwrap();
        assert_eq!(out, code.replace("shell(-3)", "shell(-2)"));

        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").box(1, 1, 1)  # base\n";
        let out = edit_chains(code, |_, chain| {
            chain.calls[1].args = "2, 2, 2".to_string();
            true
        })
        .unwrap();
        assert_eq!(
            out,
            "import cadquery as cq\nresult = cq.Workplane(\"XY\").box(2, 2, 2)  # base\n"
        );
    }
}
