//! Keyword analyst
//!
//! Detects the requested shape from prompt vocabulary. Engineered applications
//! (heatsink, stent, ...) are checked first and carry the parameters their
//! design rules read. Otherwise a prompt naming exactly one primitive becomes
//! that primitive's descriptor. Anything else is `unknown` and goes to the
//! generative chain.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use sculpt_core::{Analyst, Result, ShapeDescriptor};
use sculpt_heal::Primitive;
use sculpt_validation::extract::number_after;
use sculpt_validation::{contains_word, RuleTable};

type Detect = fn(&str) -> bool;

/// `(parameter, labels, default)`; no default means only a stated value is kept
type ParamSpec = (&'static str, &'static [&'static str], Option<f64>);

struct Application {
    name: &'static str,
    detect: Detect,
    params: &'static [ParamSpec],
}

/// Checked in order; the first detector that fires wins
const APPLICATIONS: &[Application] = &[
    Application {
        name: "heatsink",
        detect: |p| p.contains("heatsink") || p.contains("heat sink"),
        params: &[
            ("plate_w", &["plate width"], Some(40.0)),
            ("plate_h", &["plate height"], Some(40.0)),
            ("plate_t", &["plate thickness"], Some(3.0)),
            ("fin_thickness", &["fin thickness"], None),
            ("fin_spacing", &["fin spacing"], None),
            ("bar_len", &["bar length", "fin length"], Some(22.0)),
        ],
    },
    Application {
        name: "gripper",
        detect: |p| p.contains("gripper"),
        params: &[
            ("arm_length", &["arm length"], Some(25.0)),
            ("arm_width", &["arm width"], Some(8.0)),
            ("thickness", &["thickness"], Some(1.5)),
        ],
    },
    Application {
        name: "stent",
        detect: |p| {
            p.contains("stent")
                && ["serpentine", "vascular", "expandable"]
                    .iter()
                    .any(|w| p.contains(w))
        },
        params: &[
            ("outer_radius", &["radius"], Some(8.0)),
            ("length", &["length"], Some(40.0)),
            ("strut_width", &["strut width"], Some(0.6)),
        ],
    },
    Application {
        name: "honeycomb",
        detect: |p| {
            ["honeycomb panel", "alveolar", "hexagonal cells", "cellular panel"]
                .iter()
                .any(|w| p.contains(w))
                || (p.contains("honeycomb") && (p.contains("panel") || p.contains("cell")))
        },
        params: &[
            ("panel_width", &["panel width", "width"], Some(300.0)),
            ("panel_height", &["panel height", "height"], Some(380.0)),
            ("cell_size", &["cell size"], Some(12.0)),
            ("wall_thickness", &["wall thickness"], Some(2.2)),
        ],
    },
    Application {
        name: "facade_pyramid",
        detect: |p| {
            ["pyramid facade", "hexagonal pyramid", "pyramidal"]
                .iter()
                .any(|w| p.contains(w))
        },
        params: &[
            ("hex_radius", &["radius"], Some(60.0)),
            ("wall_thickness", &["wall thickness", "plate thickness"], None),
        ],
    },
    Application {
        name: "lattice",
        detect: |p| {
            ["lattice", "cubic cell", "diamond cell", "gyroid", "octet", "kelvin"]
                .iter()
                .any(|w| p.contains(w))
        },
        params: &[
            ("cell_size", &["cell size"], Some(10.0)),
            ("strut_diameter", &["strut diameter", "strut thickness"], Some(1.5)),
            ("length", &["length"], Some(100.0)),
            ("width", &["width"], Some(100.0)),
            ("height", &["height"], Some(100.0)),
        ],
    },
    Application {
        name: "splint",
        detect: |p| ["splint", "orthosis", "brace"].iter().any(|w| p.contains(w)),
        params: &[
            ("thickness", &["wall thickness", "thickness"], Some(3.5)),
            ("width", &["width"], None),
        ],
    },
];

/// Deterministic prompt analyst
#[derive(Debug, Clone)]
pub struct KeywordAnalyst {
    rules: Arc<RuleTable>,
}

impl Default for KeywordAnalyst {
    fn default() -> Self {
        Self::new(RuleTable::builtin())
    }
}

impl KeywordAnalyst {
    pub fn new(rules: Arc<RuleTable>) -> Self {
        Self { rules }
    }

    /// Synchronous core of [`Analyst::analyze`]
    pub fn describe(&self, prompt: &str) -> ShapeDescriptor {
        let lower = prompt.to_lowercase();

        if let Some(app) = APPLICATIONS.iter().find(|a| (a.detect)(&lower)) {
            let mut descriptor = ShapeDescriptor::new(app.name);
            for (param, labels, default) in app.params {
                if let Some(value) = number_after(prompt, labels).or(*default) {
                    descriptor = descriptor.with_parameter(*param, value);
                }
            }
            info!(application = app.name, "detected application type");
            return descriptor;
        }

        if self.is_composite(&lower) {
            info!("composite object, routing to generative chain");
            return ShapeDescriptor::unknown();
        }

        let families = self.primitive_families(&lower);
        match families.as_slice() {
            [family] => match Primitive::from_prompt(family, prompt) {
                Some(primitive) => {
                    info!(shape = primitive.name(), "detected primitive");
                    primitive.to_descriptor()
                }
                None => ShapeDescriptor::unknown(),
            },
            _ => {
                info!(matches = families.len(), "no single primitive, routing to generative chain");
                ShapeDescriptor::unknown()
            }
        }
    }

    /// Hollow vessels, vases and furniture need more than one primitive
    fn is_composite(&self, lower: &str) -> bool {
        let rules = &self.rules;
        rules
            .hollow
            .keywords
            .iter()
            .chain(&rules.vase.keywords)
            .chain(&rules.furniture.keywords)
            .any(|k| contains_word(lower, k))
    }

    fn primitive_families(&self, lower: &str) -> Vec<&str> {
        let mut families: Vec<&str> = self
            .rules
            .shapes
            .iter()
            .filter(|rule| rule.matched_keyword(lower).is_some())
            .map(|rule| rule.name.as_str())
            .collect();
        if self.rules.spring.keywords.iter().any(|k| contains_word(lower, k)) {
            families.push("spring");
        }
        families
    }
}

#[async_trait]
impl Analyst for KeywordAnalyst {
    async fn analyze(&self, prompt: &str) -> Result<ShapeDescriptor> {
        Ok(self.describe(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives() {
        let analyst = KeywordAnalyst::default();
        let torus = analyst.describe("Create a torus major radius 50 mm minor radius 8 mm");
        assert_eq!(torus.shape_type, "torus");
        assert_eq!(torus.number("major_radius"), Some(50.0));
        assert_eq!(torus.number("minor_radius"), Some(8.0));

        let cube = analyst.describe("Create a cube 50×50×50");
        assert_eq!(cube.shape_type, "box");
        assert_eq!(cube.number("width"), Some(50.0));

        let cylinder = analyst.describe("Create a cylinder radius 25 height 50");
        assert_eq!(cylinder.shape_type, "cylinder");
        assert_eq!(cylinder.number("radius"), Some(25.0));
        assert_eq!(cylinder.number("height"), Some(50.0));
    }

    #[test]
    fn test_composites_are_unknown() {
        let analyst = KeywordAnalyst::default();
        assert!(analyst
            .describe("Create a drinking glass from an outer cylinder radius 35")
            .is_unknown());
        assert!(analyst
            .describe("Create a four-legged table with a 120 x 80 mm top")
            .is_unknown());
        assert!(analyst.describe("a cone on top of a cylinder").is_unknown());
        assert!(analyst.describe("a gear with 20 teeth").is_unknown());
    }

    #[test]
    fn test_applications() {
        let analyst = KeywordAnalyst::default();
        let heatsink = analyst.describe("Heatsink with fin spacing 1.5 mm");
        assert_eq!(heatsink.shape_type, "heatsink");
        assert_eq!(heatsink.number("fin_spacing"), Some(1.5));
        assert_eq!(heatsink.number("bar_len"), Some(22.0));
        assert_eq!(heatsink.number("fin_thickness"), None);

        let stent = analyst.describe("an expandable stent radius 4 mm");
        assert_eq!(stent.shape_type, "stent");
        assert_eq!(stent.number("outer_radius"), Some(4.0));

        assert_eq!(analyst.describe("a stent").shape_type, "unknown");
    }
}
