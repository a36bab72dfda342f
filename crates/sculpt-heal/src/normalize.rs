//! Text normalization applied to every healed or repaired script

use sculpt_core::HealingConfig;

/// Replace tabs with four spaces and remove indentation shared by every line
pub fn normalize_indentation(code: &str) -> String {
    let expanded: Vec<String> = code.lines().map(|l| l.replace('\t', "    ")).collect();
    let common = expanded
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| leading_spaces(l))
        .min()
        .unwrap_or(0);

    let mut out = expanded
        .iter()
        .map(|l| if l.trim().is_empty() { "" } else { l.get(common..).unwrap_or(l) })
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    if code.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// ASCII spaces before the first other character
fn leading_spaces(line: &str) -> usize {
    line.bytes().take_while(|b| *b == b' ').count()
}

/// Swap typographic characters oracles like to emit for their ASCII forms
pub fn substitute_characters(code: &str) -> String {
    code.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2212}' | '\u{2013}' | '\u{2014}' => '-',
            '\u{00D7}' => '*',
            '\u{00A0}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}' => ' ',
            other => other,
        })
        .collect()
}

/// Whether `code` already imports `line` (exact import statement)
pub fn has_import(code: &str, line: &str) -> bool {
    code.lines().any(|l| l.trim() == line)
}

/// Prepend an import statement unless it is already present
pub fn ensure_import(code: &str, line: &str) -> String {
    if has_import(code, line) {
        return code.to_string();
    }
    format!("{}\n{}", line, code)
}

/// Drop imports of modules outside the allow-list
///
/// Multi-name `import a, b` statements keep their allowed names. A removed
/// import inside a block becomes `pass` so the block stays valid.
pub fn strip_disallowed_imports(code: &str, config: &HealingConfig) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in code.lines() {
        let trimmed = line.trim_start();
        let indent = &line[..line.len() - trimmed.len()];

        if let Some(rest) = trimmed.strip_prefix("from ") {
            let module = rest.split_whitespace().next().unwrap_or("");
            if module.starts_with('.') || !config.is_allowed_import(module) {
                tracing::debug!(module, "removing disallowed import");
                if !indent.is_empty() {
                    out.push(format!("{}pass", indent));
                }
                continue;
            }
        } else if let Some(rest) = trimmed.strip_prefix("import ") {
            let names: Vec<&str> = rest.split(',').map(str::trim).collect();
            let kept: Vec<&str> = names
                .iter()
                .copied()
                .filter(|name| {
                    let module = name.split_whitespace().next().unwrap_or("");
                    config.is_allowed_import(module)
                })
                .collect();
            if kept.len() != names.len() {
                tracing::debug!(statement = trimmed, "removing disallowed import");
                if !kept.is_empty() {
                    out.push(format!("{}import {}", indent, kept.join(", ")));
                } else if !indent.is_empty() {
                    out.push(format!("{}pass", indent));
                }
                continue;
            }
        }
        out.push(line.to_string());
    }

    let mut result = out.join("\n");
    if code.ends_with('\n') && !result.is_empty() {
        result.push('\n');
    }
    result
}
