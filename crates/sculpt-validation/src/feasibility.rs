//! Pre-generation checks on the shape descriptor
//!
//! [`DesignRuleValidator`] applies per-application design rules and is
//! advisory to the pipeline. [`ConstraintValidator`] applies manufacturing
//! limits; a violation there stops the run.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use sculpt_core::{PhaseResult, ShapeDescriptor};

/// Inclusive range with an optional lower and upper bound
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Design rules for one application type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesignRules {
    pub application: &'static str,
    /// `(parameter, default, bounds)`; a `None` default means the check only
    /// runs when the descriptor carries the parameter
    pub checks: &'static [(&'static str, Option<f64>, Bounds)],
    pub recommended_materials: &'static [&'static str],
}

const DESIGN_RULES: &[DesignRules] = &[
    DesignRules {
        application: "splint",
        checks: &[
            ("thickness", Some(3.5), Bounds::new(2.0, 6.0)),
            ("width", None, Bounds::new(40.0, 100.0)),
        ],
        recommended_materials: &["PLA", "PETG", "Nylon"],
    },
    DesignRules {
        application: "stent",
        checks: &[
            ("strut_width", Some(0.6), Bounds::new(0.3, 1.5)),
            ("diameter", None, Bounds::new(2.0, 20.0)),
        ],
        recommended_materials: &["Nitinol", "Stainless Steel"],
    },
    DesignRules {
        application: "heatsink",
        checks: &[("fin_thickness", None, Bounds::new(1.0, 5.0))],
        recommended_materials: &["Aluminum", "Copper"],
    },
    DesignRules {
        application: "facade_pyramid",
        checks: &[("wall_thickness", None, Bounds::new(2.0, 10.0))],
        recommended_materials: &["Aluminum", "Steel"],
    },
    DesignRules {
        application: "honeycomb",
        checks: &[
            ("wall_thickness", Some(2.2), Bounds::new(1.5, 5.0)),
            ("cell_size", Some(12.0), Bounds::new(5.0, 50.0)),
        ],
        recommended_materials: &["Aluminum", "Composite"],
    },
    DesignRules {
        application: "gripper",
        checks: &[
            ("thickness", None, Bounds::new(1.0, 3.0)),
            ("arm_length", None, Bounds::new(10.0, 50.0)),
        ],
        recommended_materials: &["Stainless Steel", "Titanium"],
    },
];

const HEATSINK_MIN_FIN_SPACING: f64 = 2.0;
const HEATSINK_SHORT_BAR: f64 = 5.0;

/// Per-application design rule checks
#[derive(Debug, Clone, Default)]
pub struct DesignRuleValidator;

impl DesignRuleValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn rules_for(&self, application: &str) -> Option<&'static DesignRules> {
        DESIGN_RULES.iter().find(|r| r.application == application)
    }

    pub fn validate(&self, descriptor: &ShapeDescriptor) -> PhaseResult {
        let application = descriptor.shape_type.as_str();
        info!(application, "validating design rules");

        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        let rules = self.rules_for(application);

        if let Some(rules) = rules {
            for (param, default, bounds) in rules.checks {
                let value = match (descriptor.number(param), default) {
                    (Some(v), _) => v,
                    (None, Some(d)) => *d,
                    (None, None) => continue,
                };
                let label = param.replace('_', " ");
                if value < bounds.min {
                    violations.push(format!(
                        "{} {}mm is too small (min: {}mm)",
                        capitalize(&label),
                        value,
                        bounds.min
                    ));
                } else if value > bounds.max {
                    violations.push(format!(
                        "{} {}mm is too large (max: {}mm)",
                        capitalize(&label),
                        value,
                        bounds.max
                    ));
                }
            }
        }

        if application == "heatsink" {
            if let Some(spacing) = descriptor.number("fin_spacing") {
                if spacing < HEATSINK_MIN_FIN_SPACING {
                    violations.push(format!(
                        "Fin spacing {}mm is too tight (min: {}mm)",
                        spacing, HEATSINK_MIN_FIN_SPACING
                    ));
                }
            }
            let bar_len = descriptor.number_or("bar_len", 22.0);
            if bar_len < HEATSINK_SHORT_BAR {
                warnings.push(format!(
                    "Bar length {}mm might be too short for effective cooling",
                    bar_len
                ));
            }
        }

        let materials: Vec<&str> = rules
            .map(|r| r.recommended_materials.to_vec())
            .unwrap_or_default();

        if violations.is_empty() {
            PhaseResult::success(json!({
                "status": "PASS",
                "warnings": warnings,
                "recommended_materials": materials,
            }))
        } else {
            PhaseResult::failed(violations).with_metadata("warnings", warnings)
        }
    }
}

/// Manufacturing limits, in mm and degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingLimits {
    pub min_feature_size: f64,
    pub max_model_size: f64,
    pub min_wall_thickness: f64,
    pub max_overhang_angle: f64,
}

impl Default for ManufacturingLimits {
    fn default() -> Self {
        Self {
            min_feature_size: 0.5,
            max_model_size: 500.0,
            min_wall_thickness: 0.8,
            max_overhang_angle: 45.0,
        }
    }
}

/// Manufacturing constraint checks
#[derive(Debug, Clone, Default)]
pub struct ConstraintValidator {
    limits: ManufacturingLimits,
}

impl ConstraintValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: ManufacturingLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ManufacturingLimits {
        &self.limits
    }

    pub fn validate(&self, descriptor: &ShapeDescriptor) -> PhaseResult {
        let limits = &self.limits;
        let application = descriptor.shape_type.as_str();
        info!(application, "validating manufacturing constraints");

        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        match application {
            "splint" => {
                let total: f64 = descriptor
                    .parameters
                    .get("sections")
                    .and_then(Value::as_array)
                    .map(|sections| {
                        sections
                            .iter()
                            .filter_map(|s| s.get("length").and_then(Value::as_f64))
                            .sum()
                    })
                    .unwrap_or(0.0);
                if total > limits.max_model_size {
                    violations.push(format!("Total length {}mm exceeds max size", total));
                }
                let thickness = descriptor.number_or("thickness", 3.5);
                if thickness < limits.min_wall_thickness {
                    violations.push(format!("Wall thickness {}mm below minimum", thickness));
                }
            }
            "stent" => {
                let strut = descriptor.number_or("strut_width", 0.6);
                if strut < limits.min_feature_size {
                    violations.push(format!(
                        "Strut width {}mm below minimum feature size",
                        strut
                    ));
                }
            }
            "honeycomb" => {
                let wall = descriptor.number_or("wall_thickness", 2.2);
                if wall < limits.min_wall_thickness {
                    violations.push(format!("Wall thickness {}mm below minimum", wall));
                }
                let panel_w = descriptor.number_or("panel_width", 300.0);
                let panel_h = descriptor.number_or("panel_height", 380.0);
                if panel_w.max(panel_h) > limits.max_model_size {
                    warnings.push("Large panel size may require split manufacturing".to_string());
                }
            }
            "heatsink" => {
                let plate_w = descriptor.number_or("plate_w", 40.0);
                let plate_h = descriptor.number_or("plate_h", 40.0);
                if plate_w.max(plate_h) > limits.max_model_size {
                    violations.push("Heatsink dimensions exceed max size".to_string());
                }
            }
            "lattice" => {
                let strut = descriptor.number_or("strut_diameter", 1.5);
                if strut < limits.min_feature_size {
                    violations.push(format!(
                        "Strut diameter {}mm too small to manufacture",
                        strut
                    ));
                }
            }
            _ => self.generic_checks(descriptor, &mut violations, &mut warnings),
        }

        if violations.is_empty() {
            let checked = [
                "min_feature_size",
                "max_model_size",
                "min_wall_thickness",
                "max_overhang_angle",
            ];
            PhaseResult::success(json!({
                "status": "PASS",
                "warnings": warnings,
                "constraints_checked": checked,
            }))
        } else {
            PhaseResult::failed(violations).with_metadata("warnings", warnings)
        }
    }

    fn generic_checks(
        &self,
        descriptor: &ShapeDescriptor,
        violations: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        let limits = &self.limits;

        if let Some(wall) = descriptor.number("wall_thickness") {
            if wall < limits.min_wall_thickness {
                violations.push(format!("Wall thickness {}mm below minimum", wall));
            }
        }

        let extents = [
            ("width", 1.0),
            ("depth", 1.0),
            ("height", 1.0),
            ("length", 1.0),
            ("diameter", 1.0),
            ("radius", 2.0),
            ("major_radius", 2.0),
        ];
        for (key, factor) in extents {
            if let Some(value) = descriptor.number(key) {
                let size = value * factor;
                if size > limits.max_model_size {
                    violations.push(format!(
                        "{} {}mm gives a model larger than {}mm",
                        capitalize(&key.replace('_', " ")),
                        value,
                        limits.max_model_size
                    ));
                }
            }
        }

        for key in ["minor_radius", "wire_radius", "strut_width"] {
            if let Some(value) = descriptor.number(key) {
                if value > 0.0 && value < limits.min_feature_size {
                    violations.push(format!(
                        "{} {}mm below minimum feature size",
                        capitalize(&key.replace('_', " ")),
                        value
                    ));
                }
            }
        }

        if let Some(angle) = descriptor.number("overhang_angle") {
            if angle > limits.max_overhang_angle {
                warnings.push(format!(
                    "Overhang {}° exceeds {}° and will need support",
                    angle, limits.max_overhang_angle
                ));
            }
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splint_defaults_pass() {
        let result = DesignRuleValidator::new().validate(&ShapeDescriptor::new("splint"));
        assert!(result.is_success());
        assert_eq!(
            result.payload["recommended_materials"],
            json!(["PLA", "PETG", "Nylon"])
        );
    }

    #[test]
    fn test_splint_too_thin() {
        let desc = ShapeDescriptor::new("splint").with_parameter("thickness", 1.0);
        let result = DesignRuleValidator::new().validate(&desc);
        assert!(!result.is_success());
        assert!(result.errors[0].starts_with("Thickness 1mm is too small"));
    }

    #[test]
    fn test_honeycomb_cell_too_small() {
        let desc = ShapeDescriptor::new("honeycomb").with_parameter("cell_size", 3.0);
        let result = DesignRuleValidator::new().validate(&desc);
        assert_eq!(result.errors, vec!["Cell size 3mm is too small (min: 5mm)".to_string()]);
    }

    #[test]
    fn test_heatsink_short_bar_is_warning() {
        let desc = ShapeDescriptor::new("heatsink").with_parameter("bar_len", 3.0);
        let result = DesignRuleValidator::new().validate(&desc);
        assert!(result.is_success());
        assert_eq!(result.payload["warnings"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_unknown_application_passes() {
        let result = DesignRuleValidator::new().validate(&ShapeDescriptor::new("torus"));
        assert!(result.is_success());
        assert_eq!(result.payload["recommended_materials"], json!([]));
    }

    #[test]
    fn test_stent_strut_below_feature_size() {
        let desc = ShapeDescriptor::new("stent").with_parameter("strut_width", 0.2);
        let result = ConstraintValidator::new().validate(&desc);
        assert!(!result.is_success());
        assert!(result.errors[0].contains("below minimum feature size"));
    }

    #[test]
    fn test_splint_sections_too_long() {
        let desc = ShapeDescriptor::new("splint").with_parameter(
            "sections",
            json!([{ "length": 300.0 }, { "length": 250.0 }]),
        );
        let result = ConstraintValidator::new().validate(&desc);
        assert_eq!(result.errors, vec!["Total length 550mm exceeds max size".to_string()]);
    }

    #[test]
    fn test_large_honeycomb_panel_warns() {
        let desc = ShapeDescriptor::new("honeycomb").with_parameter("panel_width", 600.0);
        let result = ConstraintValidator::new().validate(&desc);
        assert!(result.is_success());
        assert_eq!(
            result.payload["warnings"][0],
            "Large panel size may require split manufacturing"
        );
    }

    #[test]
    fn test_generic_checks() {
        let ok = ShapeDescriptor::new("torus")
            .with_parameter("major_radius", 50.0)
            .with_parameter("minor_radius", 8.0);
        assert!(ConstraintValidator::new().validate(&ok).is_success());

        let huge = ShapeDescriptor::new("sphere").with_parameter("radius", 300.0);
        let result = ConstraintValidator::new().validate(&huge);
        assert!(!result.is_success());
        assert!(result.errors[0].starts_with("Radius 300mm"));

        let thin = ShapeDescriptor::new("glass").with_parameter("wall_thickness", 0.5);
        assert!(!ConstraintValidator::new().validate(&thin).is_success());
    }
}
