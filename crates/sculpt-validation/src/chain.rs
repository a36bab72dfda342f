//! Statement and call-chain structure of generated scripts
//!
//! Top-level statements are located with tree-sitter so that a multi-line
//! chained construction is handled as one unit. When the script does not
//! parse, a line scanner that tracks balanced delimiters and continuation
//! lines takes over. Chained method calls are lifted into a [`CallChain`] of
//! `{method, args}` nodes that can be rewritten and rendered back.

use std::ops::Range;
use tree_sitter::{Node, Parser, Tree};

/// Parse Python source; `None` only if the grammar cannot be loaded
pub fn parse_python(code: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    parser.parse(code, None)
}

/// One top-level statement, widened to whole lines
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Byte range from the start of the first line through the trailing newline
    pub range: Range<usize>,
    /// 1-based first and last line
    pub start_line: usize,
    pub end_line: usize,
    /// Simple identifier on the left of `=`, if the statement is an assignment
    pub target: Option<String>,
    /// Right-hand side for assignments, the whole expression otherwise
    pub value: String,
    /// Comment after the statement on its last line
    pub comment: Option<String>,
}

impl Statement {
    pub fn text<'a>(&self, code: &'a str) -> &'a str {
        &code[self.range.clone()]
    }
}

/// All top-level statements in source order
pub fn top_level_statements(code: &str) -> Vec<Statement> {
    match parse_python(code) {
        Some(tree) if !tree.root_node().has_error() => statements_from_tree(code, &tree),
        _ => scan_statements(code),
    }
}

/// Top-level assignments to `name`
pub fn assignments_to(code: &str, name: &str) -> Vec<Statement> {
    top_level_statements(code)
        .into_iter()
        .filter(|s| s.target.as_deref() == Some(name))
        .collect()
}

fn statements_from_tree(code: &str, tree: &Tree) -> Vec<Statement> {
    let root = tree.root_node();
    let mut cursor = root.walk();
    root.named_children(&mut cursor)
        .filter(|node| node.kind() != "comment")
        .map(|node| {
            let (target, value) = assignment_parts(code, node);
            let range = widen_to_lines(code, node.start_byte()..node.end_byte());
            Statement {
                comment: gap_comment(code, node.end_byte()..range.end),
                range,
                start_line: node.start_position().row + 1,
                end_line: node.end_position().row + 1,
                target,
                value,
            }
        })
        .collect()
}

fn assignment_parts(code: &str, node: Node) -> (Option<String>, String) {
    let whole = node_text(code, node).to_string();
    if node.kind() != "expression_statement" {
        return (None, whole);
    }
    let Some(inner) = node.named_child(0) else {
        return (None, whole);
    };
    if inner.kind() != "assignment" {
        return (None, node_text(code, inner).to_string());
    }
    let target = inner
        .child_by_field_name("left")
        .filter(|left| left.kind() == "identifier")
        .map(|left| node_text(code, left).to_string());
    let value = inner
        .child_by_field_name("right")
        .map(|right| node_text(code, right).to_string())
        .unwrap_or_default();
    (target, value)
}

fn node_text<'a>(code: &'a str, node: Node) -> &'a str {
    code.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Comments in a stretch of source holding only punctuation and whitespace
fn gap_comment(code: &str, gap: Range<usize>) -> Option<String> {
    let text = code.get(gap)?;
    let comments: Vec<&str> = text
        .lines()
        .filter_map(|line| line.find('#').map(|i| line[i..].trim_end()))
        .collect();
    (!comments.is_empty()).then(|| comments.join(" "))
}

fn widen_to_lines(code: &str, range: Range<usize>) -> Range<usize> {
    let start = code[..range.start].rfind('\n').map_or(0, |i| i + 1);
    let end = code[range.end..]
        .find('\n')
        .map_or(code.len(), |i| range.end + i + 1);
    start..end
}

/// Group lines into top-level statements without a parser
///
/// A statement continues while brackets are open, the line ends with a
/// backslash, or the next line starts with `.` (a chained call).
pub fn scan_statements(code: &str) -> Vec<Statement> {
    let mut statements = Vec::new();
    let mut offset = 0;
    let lines: Vec<&str> = code.split_inclusive('\n').collect();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();
        let indented = line.starts_with([' ', '\t']);
        if trimmed.is_empty() || trimmed.starts_with('#') || indented {
            offset += line.len();
            i += 1;
            continue;
        }

        let start = offset;
        let start_line = i + 1;
        let mut depth = bracket_delta(line);
        let mut continued = trimmed.ends_with('\\');
        offset += line.len();
        i += 1;

        while i < lines.len() {
            let next = lines[i].trim_start();
            let chained = next.starts_with('.');
            if depth <= 0 && !continued && !chained {
                break;
            }
            depth += bracket_delta(lines[i]);
            continued = lines[i].trim_end().ends_with('\\');
            offset += lines[i].len();
            i += 1;
        }

        // Block openers own their indented body
        if code[start..offset].trim_end().ends_with(':') {
            let mut end = offset;
            let mut j = i;
            while j < lines.len() {
                let body = lines[j];
                if body.trim().is_empty() {
                    j += 1;
                    continue;
                }
                if !body.starts_with([' ', '\t']) {
                    break;
                }
                j += 1;
                end = lines[..j].iter().map(|l| l.len()).sum();
                i = j;
            }
            offset = end;
        }

        let text = &code[start..offset];
        let (target, value) = split_assignment(text);
        statements.push(Statement {
            range: start..offset,
            start_line,
            end_line: i,
            target,
            value,
            comment: None,
        });
    }

    statements
}

fn split_assignment(text: &str) -> (Option<String>, String) {
    let trimmed = text.trim();
    if let Some(eq) = top_level_assignment_eq(trimmed) {
        let left = trimmed[..eq].trim();
        if !left.is_empty() && left.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return (Some(left.to_string()), trimmed[eq + 1..].trim().to_string());
        }
    }
    (None, trimmed.to_string())
}

/// Index of a plain `=` (not `==`, `<=`, keyword argument) at depth zero
fn top_level_assignment_eq(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) => {
                if b == q && (i == 0 || bytes[i - 1] != b'\\') {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b'=' if depth == 0 => {
                    let prev = if i > 0 { bytes[i - 1] } else { b' ' };
                    let next = bytes.get(i + 1).copied().unwrap_or(b' ');
                    if next != b'=' && !matches!(prev, b'=' | b'!' | b'<' | b'>') {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Net bracket depth change over a line, ignoring strings and comments
fn bracket_delta(line: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut prev = ' ';
    for c in line.chars() {
        match quote {
            Some(q) => {
                if c == q && prev != '\\' {
                    quote = None;
                }
            }
            None => match c {
                '#' => break,
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            },
        }
        prev = c;
    }
    depth
}

/// Remove `#` comments outside string literals
pub fn strip_comments(code: &str) -> String {
    code.lines()
        .map(|line| {
            let mut quote: Option<char> = None;
            let mut prev = ' ';
            for (i, c) in line.char_indices() {
                match quote {
                    Some(q) => {
                        if c == q && prev != '\\' {
                            quote = None;
                        }
                    }
                    None => match c {
                        '#' => return &line[..i],
                        '\'' | '"' => quote = Some(c),
                        _ => {}
                    },
                }
                prev = c;
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One method call in a chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainCall {
    pub method: String,
    /// Argument text without the surrounding parentheses
    pub args: String,
    /// Comment written after the call, `#` included
    pub comment: Option<String>,
}

impl ChainCall {
    pub fn new(method: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: args.into(),
            comment: None,
        }
    }

    /// Top-level comma-separated arguments
    pub fn arguments(&self) -> Vec<String> {
        split_arguments(&self.args)
    }

    /// Positional argument `index`, or the keyword argument `keyword`
    pub fn argument(&self, index: usize, keyword: &str) -> Option<String> {
        let args = self.arguments();
        let prefix = format!("{}=", keyword);
        if let Some(kw) = args
            .iter()
            .find(|a| a.replace(' ', "").starts_with(&prefix))
        {
            return kw.split_once('=').map(|(_, v)| v.trim().to_string());
        }
        args.into_iter()
            .filter(|a| !is_keyword_argument(a))
            .nth(index)
    }

    /// Replace the value of positional argument `index` or keyword `keyword`
    ///
    /// Returns false if the call has no such argument.
    pub fn set_argument(&mut self, index: usize, keyword: &str, value: &str) -> bool {
        let mut args = self.arguments();
        let prefix = format!("{}=", keyword);
        let slot = match args.iter().position(|a| a.replace(' ', "").starts_with(&prefix)) {
            Some(i) => {
                args[i] = format!("{}={}", keyword, value);
                true
            }
            None => {
                let positional = args
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| !is_keyword_argument(a))
                    .map(|(i, _)| i)
                    .nth(index);
                match positional {
                    Some(i) => {
                        args[i] = value.to_string();
                        true
                    }
                    None => false,
                }
            }
        };
        if slot {
            self.args = args.join(", ");
        }
        slot
    }
}

fn is_keyword_argument(arg: &str) -> bool {
    match arg.find('=') {
        Some(i) => {
            let name = arg[..i].trim();
            !name.is_empty()
                && name.chars().all(|c| c.is_alphanumeric() || c == '_')
                && !arg[i + 1..].starts_with('=')
        }
        None => false,
    }
}

/// Split an argument list at depth-zero commas
pub fn split_arguments(args: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    let mut prev = ' ';
    for c in args.chars() {
        match quote {
            Some(q) => {
                if c == q && prev != '\\' {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' | '}' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(c),
            },
        }
        prev = c;
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// A receiver followed by chained method calls
///
/// `cq.Workplane("XY").circle(5).extrude(10)` has base `cq` and calls
/// `Workplane`, `circle`, `extrude`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallChain {
    pub base: String,
    pub calls: Vec<ChainCall>,
}

impl CallChain {
    /// Lift an expression into a chain; `None` if it is not a method chain
    pub fn parse(expression: &str) -> Option<Self> {
        let tree = parse_python(expression)?;
        let root = tree.root_node();
        if root.has_error() {
            return None;
        }
        let statement = root.named_child(0)?;
        let expr = if statement.kind() == "expression_statement" {
            statement.named_child(0)?
        } else {
            statement
        };
        let chain = chain_from_node(expression, expr, expression.len())?;
        (!chain.calls.is_empty()).then_some(chain)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.calls.iter().map(|c| c.method.as_str())
    }

    pub fn position(&self, method: &str) -> Option<usize> {
        self.calls.iter().position(|c| c.method == method)
    }

    pub fn has(&self, method: &str) -> bool {
        self.position(method).is_some()
    }

    /// Render as a single expression, one call per line after the first
    ///
    /// Comments stay on the line of their call. The last call's comment is
    /// left out; callers place it after any closing parenthesis.
    pub fn render(&self, indent: usize) -> String {
        let pad = " ".repeat(indent);
        let last = self.calls.len().saturating_sub(1);
        let mut out = self.base.clone();
        for (i, call) in self.calls.iter().enumerate() {
            if i > 0 {
                out.push('\n');
                out.push_str(&pad);
            }
            out.push_str(&format!(".{}({})", call.method, call.args));
            if let Some(comment) = call.comment.as_deref().filter(|_| i < last) {
                out.push_str("  ");
                out.push_str(comment);
            }
        }
        out
    }

    fn fits_one_line(&self) -> bool {
        self.calls.len() <= 3 && self.calls.iter().rev().skip(1).all(|c| c.comment.is_none())
    }

    fn trailing_comment(&self) -> Option<&str> {
        self.calls.last().and_then(|c| c.comment.as_deref())
    }

    /// Render as `target = (...)` at top level
    pub fn render_assignment(&self, target: &str) -> String {
        let body = if self.fits_one_line() {
            format!("{} = {}", target, self.render(0).replace('\n', ""))
        } else {
            let head = format!("{} = (", target);
            format!("{}{})", head, self.render(head.len()))
        };
        with_comment(body, self.trailing_comment())
    }

    /// Render as a bare expression statement
    pub fn render_expression(&self) -> String {
        let body = if self.fits_one_line() {
            self.render(0).replace('\n', "")
        } else {
            format!("({})", self.render(1))
        };
        with_comment(body, self.trailing_comment())
    }
}

fn with_comment(body: String, comment: Option<&str>) -> String {
    match comment {
        Some(comment) => format!("{}  {}", body, comment),
        None => body,
    }
}

fn unwrap_parens(node: Node) -> Node {
    let mut current = node;
    while current.kind() == "parenthesized_expression" {
        match current.named_children(&mut current.walk()).find(|n| n.kind() != "comment") {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// Chain rooted at `node`; source up to `end` may hold a trailing comment
fn chain_from_node(code: &str, node: Node, end: usize) -> Option<CallChain> {
    let mut calls = Vec::new();
    // (end of the call, start of its method name), outermost first
    let mut spans = Vec::new();
    let mut current = unwrap_parens(node);
    while current.kind() == "call" {
        let function = current.child_by_field_name("function")?;
        if function.kind() != "attribute" {
            break;
        }
        let method = function.child_by_field_name("attribute")?;
        let arguments = current.child_by_field_name("arguments")?;
        let args_text = node_text(code, arguments);
        let inner = args_text
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .unwrap_or(args_text);
        calls.push(ChainCall::new(node_text(code, method), inner.trim()));
        spans.push((current.end_byte(), method.start_byte()));
        current = unwrap_parens(function.child_by_field_name("object")?);
    }
    calls.reverse();
    spans.reverse();
    for (i, call) in calls.iter_mut().enumerate() {
        let gap_end = spans.get(i + 1).map_or(end, |&(_, method_start)| method_start);
        call.comment = gap_comment(code, spans[i].0..gap_end);
    }
    Some(CallChain {
        base: node_text(code, current).to_string(),
        calls,
    })
}

/// Every top-level statement whose value is a method chain
pub fn statement_chains(code: &str) -> Vec<(Statement, CallChain)> {
    top_level_statements(code)
        .into_iter()
        .filter_map(|s| CallChain::parse(&s.value).map(|c| (s, c)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLASS: &str = r#"import cadquery as cq

result = (cq.Workplane("XY")
          .circle(35)
          .extrude(100)  # outer
          .faces(">Z")
          .workplane()
          .circle(32.5)
          .extrude(-92))

cq.exporters.export(result, "glass.stl")
"#;

    #[test]
    fn test_multiline_statement_is_one_unit() {
        let statements = top_level_statements(GLASS);
        assert_eq!(statements.len(), 3);
        let result = &statements[1];
        assert_eq!(result.target.as_deref(), Some("result"));
        assert_eq!(result.start_line, 3);
        assert_eq!(result.end_line, 9);
        assert!(result.text(GLASS).ends_with(".extrude(-92))\n"));
    }

    #[test]
    fn test_scanner_matches_parser_on_valid_code() {
        let parsed = top_level_statements(GLASS);
        let scanned = scan_statements(GLASS);
        assert_eq!(parsed.len(), scanned.len());
        for (p, s) in parsed.iter().zip(scanned.iter()) {
            assert_eq!(p.range, s.range);
            assert_eq!(p.target, s.target);
        }
    }

    #[test]
    fn test_scanner_handles_broken_code() {
        let code = "import cadquery as cq\nresult = (cq.Workplane(\"XY\")\n    .box(1, 2, 3)\nprint(result\n";
        let statements = scan_statements(code);
        assert_eq!(statements[0].target, None);
        assert_eq!(statements[1].target.as_deref(), Some("result"));
    }

    #[test]
    fn test_chain_parse_and_render() {
        let chain = CallChain::parse(&assignments_to(GLASS, "result")[0].value).unwrap();
        assert_eq!(chain.base, "cq");
        let methods: Vec<&str> = chain.methods().collect();
        assert_eq!(
            methods,
            vec!["Workplane", "circle", "extrude", "faces", "workplane", "circle", "extrude"]
        );
        assert_eq!(chain.calls[6].args, "-92");

        let rendered = chain.render_assignment("result");
        assert!(rendered.starts_with("result = (cq.Workplane(\"XY\")\n"));
        assert!(rendered.ends_with(".extrude(-92))"));
        let reparsed = CallChain::parse(rendered.trim_start_matches("result = ")).unwrap();
        assert_eq!(reparsed, chain);
    }

    #[test]
    fn test_comments_follow_their_call() {
        let chain = CallChain::parse(&assignments_to(GLASS, "result")[0].value).unwrap();
        assert_eq!(chain.calls[2].comment.as_deref(), Some("# outer"));
        assert!(chain.calls[6].comment.is_none());
        let rendered = chain.render_assignment("result");
        assert!(rendered.contains(".extrude(100)  # outer\n"));

        let chain = CallChain::parse("cq.Workplane(\"XY\").box(1, 1, 1)  # base").unwrap();
        assert_eq!(
            chain.render_assignment("result"),
            "result = cq.Workplane(\"XY\").box(1, 1, 1)  # base"
        );
    }

    #[test]
    fn test_long_expression_is_parenthesized() {
        let chain =
            CallChain::parse("result.faces(\">Z\").workplane().hole(5).edges().fillet(1)").unwrap();
        assert_eq!(
            chain.render_expression(),
            "(result.faces(\">Z\")\n .workplane()\n .hole(5)\n .edges()\n .fillet(1))"
        );
    }

    #[test]
    fn test_short_chain_renders_inline() {
        let chain = CallChain::parse("cq.Workplane(\"XY\").box(50, 50, 50)").unwrap();
        assert_eq!(
            chain.render_assignment("result"),
            "result = cq.Workplane(\"XY\").box(50, 50, 50)"
        );
    }

    #[test]
    fn test_arguments() {
        let call = ChainCall::new("revolve", "360, (0, 0, 0), axisEnd=(0, 1, 0)");
        assert_eq!(call.arguments().len(), 3);
        assert_eq!(call.argument(0, "angleDegrees").as_deref(), Some("360"));
        assert_eq!(call.argument(1, "axisStart").as_deref(), Some("(0, 0, 0)"));
        assert_eq!(call.argument(2, "axisEnd").as_deref(), Some("(0, 1, 0)"));
    }

    #[test]
    fn test_set_argument() {
        let mut call = ChainCall::new("rarray", "0.1, ySpacing=0.1, 5, 5");
        assert!(call.set_argument(0, "xSpacing", "0.5"));
        assert!(call.set_argument(1, "ySpacing", "0.5"));
        assert_eq!(call.args, "0.5, ySpacing=0.5, 5, 5");
        assert!(!call.set_argument(7, "missing", "1"));
    }

    #[test]
    fn test_strip_comments_keeps_strings() {
        let code = "x = \"#notacomment\"  # moveTo here\ny = 1";
        assert_eq!(strip_comments(code), "x = \"#notacomment\"  \ny = 1");
    }
}
