//! Rule-based semantic critic
//!
//! Runs an ordered battery of independent checks over generated code and the
//! prompt that produced it. Every check runs; defects are collected rather
//! than raised, so one pass can report several problems.
//!
//! The checks are lexical and structural only. Over-detection is accepted:
//! a spurious defect costs one idempotent healing pass.

use std::sync::Arc;
use tracing::debug;

use sculpt_core::{Defect, DefectKind, PhaseResult};

use crate::chain::{statement_chains, strip_comments, CallChain};
use crate::extract::{
    dimensions, format_number, number_after, parse_number, parse_tuple, tuple_spans,
};
use crate::rules::{contains_word, RuleTable, ShapeRule};

/// Default smallest plausible array spacing, in mm
pub const DEFAULT_MIN_ARRAY_SPACING: f64 = 0.5;

/// Inputs shared by every check
pub struct CritiqueContext<'a> {
    /// Code with comments removed
    pub code: String,
    /// Lowercased prompt
    pub prompt: String,
    /// Prompt as given
    pub raw_prompt: &'a str,
    pub chains: Vec<CallChain>,
}

type Check = fn(&Critic, &CritiqueContext<'_>) -> Vec<Defect>;

/// Ordered check list; all are evaluated
const CHECKS: &[(&str, Check)] = &[
    ("shape_signatures", Critic::check_shape_signatures),
    ("hollow", Critic::check_hollow),
    ("spring", Critic::check_spring),
    ("vase", Critic::check_vase),
    ("furniture_legs", Critic::check_furniture_legs),
    ("exclusive_solid_ops", Critic::check_exclusive_solid_ops),
    ("array_spacing", Critic::check_array_spacing),
    ("revolve_axis", Critic::check_revolve_axis),
    ("unknown_api", Critic::check_unknown_api),
];

/// Static semantic critic
#[derive(Debug, Clone)]
pub struct Critic {
    rules: Arc<RuleTable>,
    min_array_spacing: f64,
}

impl Default for Critic {
    fn default() -> Self {
        Self::new(RuleTable::builtin())
    }
}

impl Critic {
    pub fn new(rules: Arc<RuleTable>) -> Self {
        Self {
            rules,
            min_array_spacing: DEFAULT_MIN_ARRAY_SPACING,
        }
    }

    pub fn with_min_array_spacing(mut self, spacing: f64) -> Self {
        self.min_array_spacing = spacing;
        self
    }

    pub fn rules(&self) -> &Arc<RuleTable> {
        &self.rules
    }

    /// All defects found in `code` for `prompt`
    pub fn critique(&self, code: &str, prompt: &str) -> Vec<Defect> {
        let ctx = CritiqueContext {
            code: strip_comments(code),
            prompt: prompt.to_lowercase(),
            raw_prompt: prompt,
            chains: statement_chains(code).into_iter().map(|(_, c)| c).collect(),
        };

        let mut defects = Vec::new();
        for (name, check) in CHECKS {
            let found = check(self, &ctx);
            if !found.is_empty() {
                debug!(check = name, count = found.len(), "critic check flagged code");
            }
            defects.extend(found);
        }
        defects
    }

    /// Critique wrapped as a phase result
    pub fn review(&self, code: &str, prompt: &str) -> PhaseResult {
        let defects = self.critique(code, prompt);
        if defects.is_empty() {
            PhaseResult::success(serde_json::json!({ "defects": [] }))
        } else {
            let messages = defects.iter().map(ToString::to_string).collect();
            PhaseResult::failed(messages).with_payload(&defects)
        }
    }

    fn check_shape_signatures(&self, ctx: &CritiqueContext<'_>) -> Vec<Defect> {
        let mut defects = Vec::new();
        let matched: Vec<(&ShapeRule, &str)> = self
            .rules
            .shapes
            .iter()
            .filter_map(|rule| rule.matched_keyword(&ctx.prompt).map(|k| (rule, k)))
            .collect();
        if matched.len() > 1 {
            debug!(
                shapes = ?matched.iter().map(|(r, _)| r.name.as_str()).collect::<Vec<_>>(),
                "prompt names several shapes, skipping shape signatures"
            );
            return defects;
        }

        for (rule, keyword) in matched {
            if rule.is_waived(&ctx.prompt) {
                continue;
            }

            let mut missing: Vec<String> = rule
                .required
                .iter()
                .filter(|t| !ctx.code.contains(t.as_str()))
                .cloned()
                .collect();
            if !rule.required_any.is_empty()
                && !rule.required_any.iter().any(|t| ctx.code.contains(t.as_str()))
            {
                missing.push(rule.required_any.join(" or "));
            }
            let forbidden: Vec<String> = rule
                .forbidden
                .iter()
                .filter(|t| ctx.code.contains(t.as_str()))
                .cloned()
                .collect();

            if missing.is_empty() && forbidden.is_empty() {
                continue;
            }

            let mut problems = Vec::new();
            if !forbidden.is_empty() {
                problems.push(format!("uses {}", forbidden.join(", ")));
            }
            if !missing.is_empty() {
                problems.push(format!("lacks {}", missing.join(", ")));
            }
            let message = format!(
                "Prompt asks for {} ('{}') but code {}",
                rule.name.to_uppercase(),
                keyword,
                problems.join(" and ")
            );
            defects.push(
                Defect::new(DefectKind::ShapeSignature, rule.name.clone(), message, rule.fix.clone())
                    .with_required(missing)
                    .with_forbidden(forbidden),
            );
        }
        defects
    }

    fn check_hollow(&self, ctx: &CritiqueContext<'_>) -> Vec<Defect> {
        let vocab = &self.rules.hollow;
        let Some(keyword) = vocab.keywords.iter().find(|k| contains_word(&ctx.prompt, k)) else {
            return Vec::new();
        };

        let negative = vocab
            .negative_extrude_keywords
            .iter()
            .any(|k| contains_word(&ctx.prompt, k));
        if negative && has_negative_extrude(&ctx.chains) {
            return vec![Defect::new(
                DefectKind::HollowNegativeExtrude,
                keyword.clone(),
                format!(
                    "{} hollow must use .cutBlind(-depth), not .extrude(-depth)",
                    capitalize(keyword)
                ),
                ".workplane().circle(R_in).cutBlind(-(height - bottom))",
            )
            .with_forbidden(vec![".extrude(-".to_string()])];
        }

        let hollowed = vocab.operations.iter().any(|op| ctx.code.contains(op.as_str()))
            || ctx.chains.iter().any(has_concentric_profile);
        if hollowed {
            return Vec::new();
        }

        vec![Defect::new(
            DefectKind::HollowMissingCut,
            keyword.clone(),
            format!(
                "Prompt asks for a hollow {} but code has no cut or shell operation",
                keyword
            ),
            ".faces(\">Z\").shell(-wall) or .cutBlind(-depth)",
        )
        .with_required(vocab.operations.clone())]
    }

    fn check_spring(&self, ctx: &CritiqueContext<'_>) -> Vec<Defect> {
        let Some(keyword) = self
            .rules
            .spring
            .keywords
            .iter()
            .find(|k| contains_word(&ctx.prompt, k))
        else {
            return Vec::new();
        };

        let has_helix = ctx.code.contains("makeHelix");
        let has_sweep = ctx.code.contains(".sweep(");
        if !has_helix || !has_sweep {
            let mut required = Vec::new();
            if !has_helix {
                required.push("makeHelix".to_string());
            }
            if !has_sweep {
                required.push(".sweep(".to_string());
            }
            return vec![Defect::new(
                DefectKind::SpringMissingHelix,
                keyword.clone(),
                "Spring must sweep a circular profile along a helix path",
                "path = cq.Wire.makeHelix(pitch, height, radius); Workplane(\"XY\").center(radius, 0).circle(r).sweep(path, isFrenet=True)",
            )
            .with_required(required)];
        }

        let positioned = ctx.chains.iter().any(|chain| {
            chain.position("circle").is_some_and(|circle| {
                chain.calls[..circle]
                    .iter()
                    .any(|c| c.method == "center" || c.method == "moveTo")
            })
        });
        if positioned {
            return Vec::new();
        }

        let radius = helix_radius(ctx);
        vec![Defect::new(
            DefectKind::SpringProfileAtOrigin,
            keyword.clone(),
            "Circle must be positioned at helix start",
            format!(
                "Workplane(\"XY\").center({r}, 0).circle(...) or .moveTo({r}, 0).circle(...)",
                r = format_number(radius)
            ),
        )
        .with_required(vec![".center(".to_string()])]
    }

    fn check_vase(&self, ctx: &CritiqueContext<'_>) -> Vec<Defect> {
        let vocab = &self.rules.vase;
        let Some(keyword) = vocab.keywords.iter().find(|k| contains_word(&ctx.prompt, k)) else {
            return Vec::new();
        };
        if !ctx.code.contains(".loft(") {
            return Vec::new();
        }
        if vocab.hollowing.iter().any(|op| ctx.code.contains(op.as_str())) {
            return Vec::new();
        }
        vec![Defect::new(
            DefectKind::VaseNotHollowed,
            keyword.clone(),
            "Lofted vase is solid; it must be hollowed after lofting",
            ".loft().faces(\">Z\").shell(-wall)",
        )
        .with_required(vocab.hollowing.clone())]
    }

    fn check_furniture_legs(&self, ctx: &CritiqueContext<'_>) -> Vec<Defect> {
        let vocab = &self.rules.furniture;
        let Some(keyword) = vocab.keywords.iter().find(|k| contains_word(&ctx.prompt, k)) else {
            return Vec::new();
        };
        if !vocab.leg_words.iter().any(|w| ctx.prompt.contains(w.as_str())) {
            return Vec::new();
        }
        let Some((width, depth)) = furniture_footprint(ctx.raw_prompt) else {
            return Vec::new();
        };

        let points = leg_points(&ctx.code, &vocab.leg_words);
        if points.is_empty() {
            return Vec::new();
        }

        let limit_x = width * vocab.corner_fraction;
        let limit_y = depth * vocab.corner_fraction;
        let centered = points
            .iter()
            .all(|p| p[0].abs() < limit_x && p[1].abs() < limit_y);
        if !centered {
            return Vec::new();
        }

        vec![Defect::new(
            DefectKind::LegsAtCenter,
            keyword.clone(),
            format!(
                "Legs of the {} are clustered at the center; {} leg position(s) all within ±{:.1} x ±{:.1} of the origin for a {} x {} top",
                keyword,
                points.len(),
                limit_x,
                limit_y,
                format_number(width),
                format_number(depth)
            ),
            format!(
                "place legs at (±(W/2 - inset), ±(D/2 - inset)) = (±{}, ±{})",
                format_number(width / 2.0 - vocab.default_inset),
                format_number(depth / 2.0 - vocab.default_inset)
            ),
        )]
    }

    fn check_exclusive_solid_ops(&self, ctx: &CritiqueContext<'_>) -> Vec<Defect> {
        let vocab = &self.rules.structural;
        let mut defects = Vec::new();
        for chain in &ctx.chains {
            if let Some((i, j)) =
                exclusive_pair(chain, &vocab.solid_operations, &vocab.reset_operations)
            {
                let first = &chain.calls[i].method;
                let second = &chain.calls[j].method;
                defects.push(
                    Defect::new(
                        DefectKind::ExclusiveSolidOps,
                        second.clone(),
                        format!(
                            "Solid from .{}() is passed straight to .{}() on the same shape",
                            first, second
                        ),
                        format!(
                            "keep one solid-forming operation; start a new workplane before .{}()",
                            second
                        ),
                    )
                    .with_forbidden(vec![format!(".{}(", second)]),
                );
            }
        }
        defects
    }

    fn check_array_spacing(&self, ctx: &CritiqueContext<'_>) -> Vec<Defect> {
        let min = self.min_array_spacing;
        let mut defects = Vec::new();
        for call in ctx.chains.iter().flat_map(|c| c.calls.iter()) {
            match call.method.as_str() {
                "rarray" => {
                    let spacing = |i: usize, kw: &str| call.argument(i, kw).and_then(|a| parse_number(&a));
                    let count = |i: usize, kw: &str| spacing(i, kw).unwrap_or(1.0);
                    let too_small = |s: Option<f64>, n: f64| n > 1.0 && s.is_some_and(|s| s.abs() < min);
                    if too_small(spacing(0, "xSpacing"), count(2, "xCount"))
                        || too_small(spacing(1, "ySpacing"), count(3, "yCount"))
                    {
                        defects.push(spacing_defect("rarray", &call.args, min));
                    }
                }
                "polarArray" => {
                    let radius = call.argument(0, "radius").and_then(|a| parse_number(&a));
                    let angle = call.argument(2, "angle").and_then(|a| parse_number(&a));
                    let count = call.argument(3, "count").and_then(|a| parse_number(&a));
                    if let (Some(r), Some(a), Some(n)) = (radius, angle, count) {
                        if n > 1.0 {
                            let arc = 2.0 * std::f64::consts::PI * r.abs() * (a.abs() / 360.0) / n;
                            if arc < min {
                                defects.push(spacing_defect("polarArray", &call.args, min));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        defects
    }

    fn check_revolve_axis(&self, ctx: &CritiqueContext<'_>) -> Vec<Defect> {
        let mut defects = Vec::new();
        for chain in &ctx.chains {
            let plane = chain
                .calls
                .iter()
                .find(|c| c.method == "Workplane")
                .and_then(|c| c.arguments().into_iter().next())
                .map(|p| p.trim_matches(|c| c == '"' || c == '\'').to_string())
                .unwrap_or_else(|| "XY".to_string());
            for call in chain.calls.iter().filter(|c| c.method == "revolve") {
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
                    defects.push(
                        Defect::new(
                            DefectKind::RevolveAxis,
                            "revolve",
                            format!(
                                "Revolve axis is the normal of the {} workplane; the profile must be revolved about an axis lying in its plane",
                                plane
                            ),
                            "revolve(angle, (0, 0, 0), (0, 1, 0))",
                        )
                        .with_forbidden(vec![call.args.clone()]),
                    );
                }
            }
        }
        defects
    }

    fn check_unknown_api(&self, ctx: &CritiqueContext<'_>) -> Vec<Defect> {
        self.rules
            .unknown_apis
            .iter()
            .filter(|api| ctx.code.contains(&api.call_token()))
            .map(|api| {
                let fix = match (&api.replacement, &api.rebuild) {
                    (Some(replacement), _) => format!(".{}(", replacement),
                    (None, Some(shape)) => self
                        .rules
                        .shape(shape)
                        .map(|s| s.fix.clone())
                        .unwrap_or_else(|| format!("canonical {} construction", shape)),
                    (None, None) => "remove the call".to_string(),
                };
                Defect::new(
                    DefectKind::UnknownApi,
                    api.member.clone(),
                    format!("Workplane has no method .{}()", api.member),
                    fix,
                )
                .with_forbidden(vec![api.call_token()])
            })
            .collect()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn spacing_defect(method: &str, args: &str, min: f64) -> Defect {
    Defect::new(
        DefectKind::ArraySpacing,
        method,
        format!(
            "{}({}) spaces its elements closer than {} mm",
            method, args, min
        ),
        format!("use a spacing of at least {} mm", min),
    )
}

/// A negative extrusion applied to an existing solid
///
/// A chain that does not start from `cq` continues a solid built earlier.
pub fn has_negative_extrude(chains: &[CallChain]) -> bool {
    chains.iter().any(|chain| {
        let mut seen_solid = chain.base != "cq";
        chain.calls.iter().any(|call| {
            if call.method != "extrude" {
                return false;
            }
            let negative = call
                .argument(0, "until")
                .is_some_and(|a| a.trim_start().starts_with('-'));
            let flagged = seen_solid && negative;
            seen_solid = true;
            flagged
        })
    })
}

/// Two or more circles extruded together form a tube wall
fn has_concentric_profile(chain: &CallChain) -> bool {
    let mut circles = 0;
    for call in &chain.calls {
        match call.method.as_str() {
            "circle" => circles += 1,
            "extrude" if circles >= 2 => return true,
            "extrude" | "faces" | "workplane" => circles = 0,
            _ => {}
        }
    }
    false
}

/// Indices of the first pair of solid-forming calls with no new workplane between them
pub fn exclusive_pair(
    chain: &CallChain,
    solid_ops: &[String],
    reset_ops: &[String],
) -> Option<(usize, usize)> {
    let mut last: Option<usize> = None;
    for (i, call) in chain.calls.iter().enumerate() {
        if reset_ops.iter().any(|r| r == &call.method) {
            last = None;
        } else if solid_ops.iter().any(|s| s == &call.method) {
            if let Some(first) = last {
                return Some((first, i));
            }
            last = Some(i);
        }
    }
    None
}

/// Helix radius from the code's makeHelix call, else the prompt
fn helix_radius(ctx: &CritiqueContext<'_>) -> f64 {
    number_after(&ctx.code, &["radius"])
        .filter(|_| ctx.code.contains("makeHelix"))
        .or_else(|| number_after(ctx.raw_prompt, &["major radius", "coil radius", "helix radius"]))
        .unwrap_or(20.0)
}

/// Overall width and depth stated in a furniture prompt
pub fn furniture_footprint(prompt: &str) -> Option<(f64, f64)> {
    if let Some(dims) = dimensions(prompt) {
        return Some((dims[0], dims[1]));
    }
    let width = number_after(prompt, &["width", "wide"])?;
    let depth = number_after(prompt, &["depth", "deep", "length", "long"]).unwrap_or(width);
    Some((width, depth))
}

/// Coordinates of leg placements: `pushPoints` tuples, else tuples on lines naming a leg
pub fn leg_points(code: &str, leg_words: &[String]) -> Vec<Vec<f64>> {
    let from_lines = |pred: &dyn Fn(&str) -> bool| -> Vec<Vec<f64>> {
        code.lines()
            .filter(|line| pred(line))
            .flat_map(|line| tuple_spans(line).into_iter().map(|t| t.values))
            .collect()
    };

    let pushed = from_lines(&|line: &str| line.contains("pushPoints"));
    if !pushed.is_empty() {
        return pushed;
    }
    from_lines(&|line: &str| {
        let lower = line.to_lowercase();
        leg_words.iter().any(|w| lower.contains(w.as_str()))
    })
}
