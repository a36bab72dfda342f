//! Tier-1 deterministic rewrite table
//!
//! Each rule pairs a trigger with a rewrite. A trigger is either a structured
//! defect kind from the critic or substrings of a compiler/runtime message.
//! Every rewrite returns `None` when it has nothing to change, which makes
//! re-application to already-healed code a no-op.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use sculpt_core::{DefectKind, HealingConfig, Issue};
use sculpt_validation::chain::{strip_comments, CallChain, ChainCall};
use sculpt_validation::extract::{format_number, number_after, parse_number, parse_tuple, tuple_spans};
use sculpt_validation::{exclusive_pair, furniture_footprint, RuleTable};

use crate::normalize::{ensure_import, normalize_indentation, strip_disallowed_imports};
use crate::rewrite::{binds_result, edit_chains, insert_before_export, replace_result};
use crate::snippets::Primitive;

/// What a rule reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Defect(DefectKind),
    /// Any of these substrings in the issue message, case-insensitive
    Message(&'static [&'static str]),
}

impl Trigger {
    pub fn matches(&self, issue: &Issue) -> bool {
        match self {
            Self::Defect(kind) => issue.as_defect().is_some_and(|d| d.kind == *kind),
            Self::Message(needles) => {
                let message = issue.message().to_lowercase();
                needles.iter().any(|n| message.contains(&n.to_lowercase()))
            }
        }
    }
}

/// Shared inputs of every rewrite
pub struct RewriteContext<'a> {
    pub prompt: &'a str,
    pub rules: &'a RuleTable,
    pub config: &'a HealingConfig,
}

type Rewrite = fn(&str, &Issue, &RewriteContext<'_>) -> Option<String>;

/// One tier-1 rule
#[derive(Clone, Copy)]
pub struct HealRule {
    pub name: &'static str,
    pub trigger: Trigger,
    rewrite: Rewrite,
}

impl HealRule {
    pub fn apply(&self, code: &str, issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
        if !self.trigger.matches(issue) {
            return None;
        }
        (self.rewrite)(code, issue, ctx).filter(|healed| healed != code)
    }
}

impl std::fmt::Debug for HealRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealRule")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .finish()
    }
}

/// The ordered rule table
pub const TIER1_RULES: &[HealRule] = &[
    HealRule {
        name: "rebuild_shape",
        trigger: Trigger::Defect(DefectKind::ShapeSignature),
        rewrite: rebuild_from_defect,
    },
    HealRule {
        name: "unknown_api",
        trigger: Trigger::Defect(DefectKind::UnknownApi),
        rewrite: replace_unknown_api,
    },
    HealRule {
        name: "hollow_cut_blind",
        trigger: Trigger::Defect(DefectKind::HollowNegativeExtrude),
        rewrite: negative_extrude_to_cut_blind,
    },
    HealRule {
        name: "hollow_shell",
        trigger: Trigger::Defect(DefectKind::HollowMissingCut),
        rewrite: append_shell,
    },
    HealRule {
        name: "spring_helix",
        trigger: Trigger::Defect(DefectKind::SpringMissingHelix),
        rewrite: rebuild_spring,
    },
    HealRule {
        name: "spring_center",
        trigger: Trigger::Defect(DefectKind::SpringProfileAtOrigin),
        rewrite: center_spring_profile,
    },
    HealRule {
        name: "vase_shell",
        trigger: Trigger::Defect(DefectKind::VaseNotHollowed),
        rewrite: append_shell,
    },
    HealRule {
        name: "legs_to_corners",
        trigger: Trigger::Defect(DefectKind::LegsAtCenter),
        rewrite: move_legs_to_corners,
    },
    HealRule {
        name: "single_solid_op",
        trigger: Trigger::Defect(DefectKind::ExclusiveSolidOps),
        rewrite: drop_second_solid_op,
    },
    HealRule {
        name: "array_spacing",
        trigger: Trigger::Defect(DefectKind::ArraySpacing),
        rewrite: widen_array_spacing,
    },
    HealRule {
        name: "revolve_axis",
        trigger: Trigger::Defect(DefectKind::RevolveAxis),
        rewrite: revolve_in_plane,
    },
    HealRule {
        name: "missing_torus",
        trigger: Trigger::Message(&["has no attribute 'torus'"]),
        rewrite: rebuild_torus,
    },
    HealRule {
        name: "missing_regular_polygon",
        trigger: Trigger::Message(&["has no attribute 'regularPolygon'"]),
        rewrite: rename_regular_polygon,
    },
    HealRule {
        name: "missing_cube",
        trigger: Trigger::Message(&["has no attribute 'cube'"]),
        rewrite: cube_to_box,
    },
    HealRule {
        name: "revolve_angle_keyword",
        trigger: Trigger::Message(&["unexpected keyword argument 'angle'"]),
        rewrite: revolve_positional_angle,
    },
    HealRule {
        name: "loft_closed_keyword",
        trigger: Trigger::Message(&["unexpected keyword argument 'closed'"]),
        rewrite: loft_without_closed,
    },
    HealRule {
        name: "cut_without_argument",
        trigger: Trigger::Message(&["cut() missing 1 required positional argument"]),
        rewrite: cut_thru_all,
    },
    HealRule {
        name: "missing_import",
        trigger: Trigger::Message(&["is not defined"]),
        rewrite: add_missing_import,
    },
    HealRule {
        name: "indentation",
        trigger: Trigger::Message(&["IndentationError", "TabError", "unexpected indent"]),
        rewrite: fix_indentation,
    },
    HealRule {
        name: "disallowed_import",
        trigger: Trigger::Message(&["No module named", "ModuleNotFoundError", "ImportError"]),
        rewrite: drop_disallowed_imports,
    },
];

/// Apply every matching rule for every issue, in order
///
/// Returns the rewritten code and the names of the rules that changed it.
pub fn apply_rules(
    code: &str,
    issues: &[Issue],
    ctx: &RewriteContext<'_>,
) -> (String, Vec<&'static str>) {
    let mut current = code.to_string();
    let mut applied = Vec::new();
    for issue in issues {
        for rule in TIER1_RULES {
            if let Some(healed) = rule.apply(&current, issue, ctx) {
                debug!(rule = rule.name, "tier-1 rule rewrote code");
                current = healed;
                if !applied.contains(&rule.name) {
                    applied.push(rule.name);
                }
            }
        }
    }
    (current, applied)
}

// Rebuilds

/// Splice in the canonical construction for `shape`
pub fn rebuild(code: &str, shape: &str, prompt: &str) -> Option<String> {
    let primitive = Primitive::from_prompt(shape, prompt)?;
    let snippet = primitive.render();
    if code.contains(snippet.trim_end()) {
        return None;
    }
    let mut healed = replace_result(code, &snippet);
    for import in primitive.imports().iter().rev() {
        healed = ensure_import(&healed, import);
    }
    Some(healed)
}

fn rebuild_from_defect(code: &str, issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
    let defect = issue.as_defect()?;
    rebuild(code, &defect.keyword, ctx.prompt)
}

fn rebuild_spring(code: &str, _issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
    rebuild(code, "spring", ctx.prompt)
}

fn rebuild_torus(code: &str, _issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
    rebuild(code, "torus", ctx.prompt)
}

fn replace_unknown_api(code: &str, issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
    let defect = issue.as_defect()?;
    let api = ctx.rules.unknown_api(&defect.keyword)?;
    if api.member == "cube" {
        return cube_to_box(code, issue, ctx);
    }
    match (&api.replacement, &api.rebuild) {
        (Some(replacement), _) => rename_call(code, &api.member, replacement),
        (None, Some(shape)) => rebuild(code, shape, ctx.prompt),
        (None, None) => None,
    }
}

// Renames and keyword fixes

fn rename_call(code: &str, from: &str, to: &str) -> Option<String> {
    let re = Regex::new(&format!(r"\.{}\s*\(", regex::escape(from))).ok()?;
    if !re.is_match(code) {
        return None;
    }
    Some(re.replace_all(code, format!(".{}(", to).as_str()).into_owned())
}

fn rename_regular_polygon(code: &str, _issue: &Issue, _ctx: &RewriteContext<'_>) -> Option<String> {
    rename_call(code, "regularPolygon", "polygon")
}

fn cube_single_arg() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.cube\(\s*([^,()]+?)\s*\)").ok())
        .as_ref()
}

/// `.cube(s)` becomes `.box(s, s, s)`; any other `.cube(` is renamed
fn cube_to_box(code: &str, _issue: &Issue, _ctx: &RewriteContext<'_>) -> Option<String> {
    let re = cube_single_arg()?;
    let expanded = re.replace_all(code, ".box($1, $1, $1)").into_owned();
    rename_call(&expanded, "cube", "box").or_else(|| (expanded != code).then_some(expanded))
}

fn revolve_angle_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.revolve\(\s*angle\s*=\s*([^,()]+?)\s*([,)])").ok())
        .as_ref()
}

fn revolve_positional_angle(code: &str, _issue: &Issue, _ctx: &RewriteContext<'_>) -> Option<String> {
    let re = revolve_angle_regex()?;
    Some(re.replace_all(code, ".revolve($1$2").into_owned())
}

fn loft_closed_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.loft\(([^()]*?)\s*,?\s*closed\s*=\s*\w+\s*\)").ok())
        .as_ref()
}

fn loft_without_closed(code: &str, _issue: &Issue, _ctx: &RewriteContext<'_>) -> Option<String> {
    let re = loft_closed_regex()?;
    Some(re.replace_all(code, ".loft($1)").into_owned())
}

fn empty_cut_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.cut\(\s*\)").ok()).as_ref()
}

fn cut_thru_all(code: &str, _issue: &Issue, _ctx: &RewriteContext<'_>) -> Option<String> {
    let re = empty_cut_regex()?;
    Some(re.replace_all(code, ".cutThruAll()").into_owned())
}

fn undefined_name_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"name '(\w+)' is not defined").ok())
        .as_ref()
}

fn add_missing_import(code: &str, issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
    let message = issue.message();
    let name = undefined_name_regex()?.captures(&message)?.get(1)?.as_str().to_string();
    let (module, line) = match name.as_str() {
        "np" | "numpy" => ("numpy", "import numpy as np"),
        "math" => ("math", "import math"),
        "cq" | "cadquery" => ("cadquery", "import cadquery as cq"),
        "Path" => ("pathlib", "from pathlib import Path"),
        "struct" => ("struct", "import struct"),
        _ => return None,
    };
    if !ctx.config.is_allowed_import(module) {
        return None;
    }
    Some(ensure_import(code, line))
}

fn fix_indentation(code: &str, _issue: &Issue, _ctx: &RewriteContext<'_>) -> Option<String> {
    Some(normalize_indentation(code))
}

fn drop_disallowed_imports(code: &str, _issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
    Some(strip_disallowed_imports(code, ctx.config))
}

// Hollowing

/// `.extrude(-d)` on an existing solid becomes `.cutBlind(-d)`
fn negative_extrude_to_cut_blind(
    code: &str,
    _issue: &Issue,
    _ctx: &RewriteContext<'_>,
) -> Option<String> {
    edit_chains(code, |_, chain| {
        let mut seen_solid = chain.base != "cq";
        let mut changed = false;
        for call in chain.calls.iter_mut() {
            if call.method != "extrude" {
                continue;
            }
            let negative = call
                .argument(0, "until")
                .is_some_and(|a| a.trim_start().starts_with('-'));
            if seen_solid && negative {
                call.method = "cutBlind".to_string();
                changed = true;
            }
            seen_solid = true;
        }
        changed
    })
}

/// Shell the finished solid open at its top face
fn append_shell(code: &str, _issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
    if strip_comments(code).contains(".shell(") || !binds_result(code) {
        return None;
    }
    let wall = number_after(ctx.prompt, &["wall thickness", "wall", "thickness"]).unwrap_or(2.0);
    let statement = format!("result = result.faces(\">Z\").shell(-{})", format_number(wall));
    Some(insert_before_export(code, &statement))
}

// Springs

fn helix_radius(code: &str, prompt: &str) -> f64 {
    let code = strip_comments(code);
    code.lines()
        .find(|l| l.contains("makeHelix"))
        .and_then(|l| number_after(l, &["radius"]))
        .or_else(|| number_after(prompt, &["major radius", "coil radius", "helix radius"]))
        .unwrap_or(20.0)
}

/// Move the swept circle onto the helix start
fn center_spring_profile(code: &str, _issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
    let radius = format_number(helix_radius(code, ctx.prompt));
    let needs_center = |chain: &CallChain| {
        chain.position("circle").is_some_and(|circle| {
            !chain.calls[..circle]
                .iter()
                .any(|c| c.method == "center" || c.method == "moveTo")
        })
    };
    let insert_center = |chain: &mut CallChain| {
        if let Some(circle) = chain.position("circle") {
            chain
                .calls
                .insert(circle, ChainCall::new("center", format!("{}, 0", radius)));
        }
    };

    // Prefer the chain that sweeps; fall back to any bare profile circle
    edit_chains(code, |_, chain| {
        if chain.has("sweep") && needs_center(chain) {
            insert_center(chain);
            true
        } else {
            false
        }
    })
    .or_else(|| {
        edit_chains(code, |statement, chain| {
            if !statement.value.contains("makeHelix") && needs_center(chain) {
                insert_center(chain);
                true
            } else {
                false
            }
        })
    })
}

// Furniture

/// Move leg positions to (±(W/2 - inset), ±(D/2 - inset)), keeping z
fn move_legs_to_corners(code: &str, _issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
    let (width, depth) = furniture_footprint(ctx.prompt)?;
    let default_inset = ctx.rules.furniture.default_inset;
    let inset = number_after(ctx.prompt, &["inset"])
        .unwrap_or(default_inset)
        .clamp(0.0, width.min(depth) / 4.0);
    let corner_x = width / 2.0 - inset;
    let corner_y = depth / 2.0 - inset;

    let leg_words = &ctx.rules.furniture.leg_words;
    let lines: Vec<(usize, &str)> = code
        .split_inclusive('\n')
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start, line))
        })
        .collect();
    let pushed: Vec<&(usize, &str)> = lines.iter().filter(|(_, l)| l.contains("pushPoints")).collect();
    let candidates: Vec<&(usize, &str)> = if pushed.is_empty() {
        lines
            .iter()
            .filter(|(_, l)| {
                let lower = l.to_lowercase();
                leg_words.iter().any(|w| lower.contains(w.as_str()))
            })
            .collect()
    } else {
        pushed
    };

    const CORNERS: [(f64, f64); 4] = [(1.0, 1.0), (-1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)];
    let sign = |value: f64, fallback: f64| {
        if value > 0.0 {
            1.0
        } else if value < 0.0 {
            -1.0
        } else {
            fallback
        }
    };

    let mut replacements: Vec<(std::ops::Range<usize>, String)> = Vec::new();
    let mut index = 0;
    for (offset, line) in candidates {
        for span in tuple_spans(line) {
            if span.values.len() < 2 {
                continue;
            }
            let (cx, cy) = CORNERS[index % CORNERS.len()];
            index += 1;
            let x = sign(span.values[0], cx) * corner_x;
            let y = sign(span.values[1], cy) * corner_y;
            let mut parts = vec![format_number(x), format_number(y)];
            if let Some(z) = span.values.get(2) {
                parts.push(format_number(*z));
            }
            let text = format!("({})", parts.join(", "));
            let range = offset + span.range.start..offset + span.range.end;
            if code[range.clone()] != text {
                replacements.push((range, text));
            }
        }
    }
    if replacements.is_empty() {
        return None;
    }

    let mut healed = code.to_string();
    for (range, text) in replacements.into_iter().rev() {
        healed.replace_range(range, &text);
    }
    Some(healed)
}

// Structural

fn drop_second_solid_op(code: &str, _issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
    let structural = &ctx.rules.structural;
    edit_chains(code, |_, chain| {
        let mut changed = false;
        while let Some((_, second)) =
            exclusive_pair(chain, &structural.solid_operations, &structural.reset_operations)
        {
            chain.calls.remove(second);
            changed = true;
        }
        changed
    })
}

fn widen_array_spacing(code: &str, _issue: &Issue, ctx: &RewriteContext<'_>) -> Option<String> {
    let min = ctx.config.min_array_spacing;
    let min_text = format_number(min);
    edit_chains(code, |_, chain| {
        let mut changed = false;
        for call in chain.calls.iter_mut() {
            match call.method.as_str() {
                "rarray" => {
                    for (spacing, count) in [((0, "xSpacing"), (2, "xCount")), ((1, "ySpacing"), (3, "yCount"))] {
                        let value = numeric_argument(call, spacing.0, spacing.1);
                        let n = numeric_argument(call, count.0, count.1).unwrap_or(1.0);
                        if n > 1.0 && value.is_some_and(|v| v.abs() < min) {
                            changed |= call.set_argument(spacing.0, spacing.1, &min_text);
                        }
                    }
                }
                "polarArray" => {
                    let radius = numeric_argument(call, 0, "radius");
                    let angle = numeric_argument(call, 2, "angle");
                    let count = numeric_argument(call, 3, "count");
                    if let (Some(r), Some(a), Some(n)) = (radius, angle, count) {
                        let arc = 2.0 * std::f64::consts::PI * r.abs() * (a.abs() / 360.0);
                        if n > 1.0 && arc / n < min {
                            let fitted = (arc / min).floor().max(1.0);
                            changed |= call.set_argument(3, "count", &format_number(fitted));
                        }
                    }
                }
                _ => {}
            }
        }
        changed
    })
}

fn numeric_argument(call: &ChainCall, index: usize, keyword: &str) -> Option<f64> {
    call.argument(index, keyword).and_then(|a| parse_number(&a))
}

/// Point a revolve axis along local y when it was the workplane normal
fn revolve_in_plane(code: &str, _issue: &Issue, _ctx: &RewriteContext<'_>) -> Option<String> {
    edit_chains(code, |_, chain| {
        let mut changed = false;
        for call in chain.calls.iter_mut().filter(|c| c.method == "revolve") {
            let start = call.argument(1, "axisStart").and_then(|a| parse_tuple(&a));
            let end = call.argument(2, "axisEnd").and_then(|a| parse_tuple(&a));
            let (Some(start), Some(end)) = (start, end) else {
                continue;
            };
            if start.len() != 3 || end.len() != 3 {
                continue;
            }
            let dir = [end[0] - start[0], end[1] - start[1], end[2] - start[2]];
            if dir[0].abs() < 1e-9 && dir[1].abs() < 1e-9 && dir[2].abs() > 1e-9 {
                let new_end = format!(
                    "({}, {}, {})",
                    format_number(start[0]),
                    format_number(start[1] + 1.0),
                    format_number(start[2])
                );
                changed |= call.set_argument(2, "axisEnd", &new_end);
            }
        }
        changed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sculpt_core::Defect;

    fn ctx<'a>(prompt: &'a str, rules: &'a RuleTable, config: &'a HealingConfig) -> RewriteContext<'a> {
        RewriteContext {
            prompt,
            rules,
            config,
        }
    }

    fn defect(kind: DefectKind, keyword: &str) -> Issue {
        Issue::Defect(Defect::new(kind, keyword, "test", "test"))
    }

    #[test]
    fn test_trigger_matching() {
        let issue = Issue::execution("AttributeError: 'Workplane' object has no attribute 'TORUS'");
        assert!(Trigger::Message(&["has no attribute 'torus'"]).matches(&issue));
        assert!(!Trigger::Defect(DefectKind::UnknownApi).matches(&issue));
        assert!(Trigger::Defect(DefectKind::UnknownApi).matches(&defect(DefectKind::UnknownApi, "cube")));
    }

    #[test]
    fn test_cube_to_box() {
        let rules = RuleTable::builtin();
        let config = HealingConfig::default();
        let c = ctx("", &rules, &config);
        let code = "r = cq.Workplane(\"XY\").cube(10)\n";
        let (out, applied) = apply_rules(code, &[defect(DefectKind::UnknownApi, "cube")], &c);
        assert_eq!(out, "r = cq.Workplane(\"XY\").box(10, 10, 10)\n");
        assert_eq!(applied, vec!["unknown_api"]);
    }

    #[test]
    fn test_runtime_keyword_fixes() {
        let rules = RuleTable::builtin();
        let config = HealingConfig::default();
        let c = ctx("", &rules, &config);
        let code = "import cadquery as cq\na = cq.Workplane(\"XZ\").circle(5).revolve(angle=180)\nb = w.loft(closed=True)\nc = w.cut()\n";
        let issues = [
            Issue::execution("TypeError: revolve() got an unexpected keyword argument 'angle'"),
            Issue::execution("TypeError: loft() got an unexpected keyword argument 'closed'"),
            Issue::execution("TypeError: Workplane.cut() missing 1 required positional argument: 'toCut'"),
        ];
        let (out, applied) = apply_rules(code, &issues, &c);
        assert!(out.contains(".revolve(180)"));
        assert!(out.contains("w.loft()"));
        assert!(out.contains("w.cutThruAll()"));
        assert_eq!(
            applied,
            vec!["revolve_angle_keyword", "loft_closed_keyword", "cut_without_argument"]
        );
    }

    #[test]
    fn test_missing_import() {
        let rules = RuleTable::builtin();
        let config = HealingConfig::default();
        let c = ctx("", &rules, &config);
        let code = "import cadquery as cq\nx = np.pi\n";
        let issue = Issue::execution("NameError: name 'np' is not defined");
        let (out, _) = apply_rules(code, &[issue.clone()], &c);
        assert_eq!(out, "import numpy as np\nimport cadquery as cq\nx = np.pi\n");
        let (again, applied) = apply_rules(&out, &[issue], &c);
        assert_eq!(again, out);
        assert!(applied.is_empty());

        let unknown = Issue::execution("NameError: name 'os' is not defined");
        assert_eq!(apply_rules(code, &[unknown], &c).0, code);
    }

    #[test]
    fn test_spring_center_uses_helix_radius() {
        let rules = RuleTable::builtin();
        let config = HealingConfig::default();
        let c = ctx("a spring", &rules, &config);
        let code = "import cadquery as cq\npath = cq.Wire.makeHelix(pitch=8, height=80, radius=20)\nresult = cq.Workplane(\"XY\").circle(1.5).sweep(path, isFrenet=True)\n";
        let issue = defect(DefectKind::SpringProfileAtOrigin, "spring");
        let (out, _) = apply_rules(code, &[issue.clone()], &c);
        assert!(out.contains(".center(20, 0)"));
        assert!(out.contains(".circle(1.5)"));
        let (again, _) = apply_rules(&out, &[issue], &c);
        assert_eq!(again, out);
    }

    #[test]
    fn test_revolve_axis() {
        let rules = RuleTable::builtin();
        let config = HealingConfig::default();
        let c = ctx("", &rules, &config);
        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").moveTo(20, 0).circle(5).revolve(360, (0, 0, 0), (0, 0, 1))\n";
        let (out, _) = apply_rules(code, &[defect(DefectKind::RevolveAxis, "revolve")], &c);
        assert!(out.contains(".revolve(360, (0, 0, 0), (0, 1, 0))"));
    }

    #[test]
    fn test_array_spacing_and_exclusive_ops() {
        let rules = RuleTable::builtin();
        let config = HealingConfig::default();
        let c = ctx("", &rules, &config);
        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").rarray(0.1, 0.1, 5, 5).circle(1).extrude(2).revolve(90)\n";
        let issues = [
            defect(DefectKind::ArraySpacing, "rarray"),
            defect(DefectKind::ExclusiveSolidOps, "revolve"),
        ];
        let (out, applied) = apply_rules(code, &issues, &c);
        assert!(out.contains(".rarray(0.5, 0.5, 5, 5)"));
        assert!(!out.contains(".revolve("));
        assert_eq!(applied, vec!["array_spacing", "single_solid_op"]);
    }
}
