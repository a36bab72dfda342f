//! Canonical constructions for the recognized primitives
//!
//! The healer splices these in when a construction has to be rebuilt, and the
//! template generator emits them for known shape types, so both paths produce
//! the same code for the same parameters.

use serde::{Deserialize, Serialize};

use sculpt_core::ShapeDescriptor;
use sculpt_validation::extract::{angle_degrees, dimensions, format_number, number_after};

pub const CADQUERY_IMPORT: &str = "import cadquery as cq";
pub const MATH_IMPORT: &str = "import math";

/// A primitive with fully resolved parameters (mm, degrees)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Primitive {
    Box {
        width: f64,
        depth: f64,
        height: f64,
    },
    Cylinder {
        radius: f64,
        height: f64,
    },
    Sphere {
        radius: f64,
    },
    /// Lower half of a sphere, shelled open at the top
    Hemisphere {
        radius: f64,
        wall: f64,
    },
    Torus {
        major_radius: f64,
        minor_radius: f64,
    },
    Cone {
        base_radius: f64,
        top_radius: f64,
        height: f64,
    },
    /// Annular sector
    Arc {
        outer_radius: f64,
        inner_radius: f64,
        angle: f64,
        thickness: f64,
    },
    Spring {
        pitch: f64,
        height: f64,
        radius: f64,
        wire_radius: f64,
    },
}

impl Primitive {
    /// Primitive for a shape name, parameters read from the prompt
    pub fn from_prompt(shape: &str, prompt: &str) -> Option<Self> {
        let lower = prompt.to_lowercase();
        let p = prompt;
        let primitive = match canonical_name(shape)? {
            "box" => {
                let dims = dimensions(p).unwrap_or_default();
                let size = number_after(p, &["size", "side"]).unwrap_or(50.0);
                let width = dims
                    .first()
                    .copied()
                    .or_else(|| number_after(p, &["width"]))
                    .unwrap_or(size);
                let depth = dims
                    .get(1)
                    .copied()
                    .or_else(|| number_after(p, &["depth", "length"]))
                    .unwrap_or(width);
                let height = dims
                    .get(2)
                    .copied()
                    .or_else(|| number_after(p, &["height"]))
                    .unwrap_or(depth);
                Self::Box {
                    width,
                    depth,
                    height,
                }
            }
            "cylinder" => Self::Cylinder {
                radius: radius_from(p, &["radius"]).unwrap_or(25.0),
                height: number_after(p, &["height", "length", "tall"]).unwrap_or(50.0),
            },
            "sphere" => {
                let radius = radius_from(p, &["radius"]).unwrap_or(25.0);
                if lower.contains("hemispher") || lower.contains("bowl") {
                    Self::Hemisphere {
                        radius,
                        wall: number_after(p, &["wall thickness", "thickness", "wall"])
                            .unwrap_or(2.0),
                    }
                } else {
                    Self::Sphere { radius }
                }
            }
            "torus" => Self::Torus {
                major_radius: number_after(p, &["major radius", "ring radius"]).unwrap_or(50.0),
                minor_radius: number_after(p, &["minor radius", "tube radius"]).unwrap_or(10.0),
            },
            "cone" => Self::Cone {
                base_radius: radius_from(p, &["base radius", "bottom radius", "radius"])
                    .unwrap_or(25.0),
                top_radius: number_after(p, &["top radius"]).unwrap_or(0.0),
                height: number_after(p, &["height", "tall"]).unwrap_or(50.0),
            },
            "arc" => {
                let outer_radius = number_after(p, &["outer radius", "radius"]).unwrap_or(50.0);
                Self::Arc {
                    outer_radius,
                    inner_radius: number_after(p, &["inner radius"])
                        .unwrap_or(outer_radius * 3.0 / 5.0),
                    angle: angle_degrees(p)
                        .or_else(|| number_after(p, &["angle", "sweep"]))
                        .unwrap_or(90.0),
                    thickness: number_after(p, &["thickness", "height"]).unwrap_or(10.0),
                }
            }
            "spring" => Self::Spring {
                pitch: number_after(p, &["pitch"]).unwrap_or(8.0),
                height: number_after(p, &["total height", "height", "length"]).unwrap_or(80.0),
                radius: number_after(p, &["major radius", "coil radius", "helix radius"])
                    .unwrap_or(20.0),
                wire_radius: number_after(
                    p,
                    &["wire radius", "circle radius", "profile radius", "minor radius"],
                )
                .unwrap_or(1.5),
            },
            _ => return None,
        };
        Some(primitive)
    }

    /// Primitive from an analyst descriptor, with the same defaults
    pub fn from_descriptor(descriptor: &ShapeDescriptor) -> Option<Self> {
        let d = descriptor;
        let primitive = match canonical_name(&descriptor.shape_type)? {
            "box" => {
                let size = d.number_or("size", 50.0);
                let width = d.number_or("width", size);
                let depth = d.number_or("depth", width);
                Self::Box {
                    width,
                    depth,
                    height: d.number_or("height", depth),
                }
            }
            "cylinder" => Self::Cylinder {
                radius: d.number_or("radius", 25.0),
                height: d.number_or("height", 50.0),
            },
            "sphere" if d.number("wall_thickness").is_some() || d.shape_type == "hemisphere" => {
                Self::Hemisphere {
                    radius: d.number_or("radius", 25.0),
                    wall: d.number_or("wall_thickness", 2.0),
                }
            }
            "sphere" => Self::Sphere {
                radius: d.number_or("radius", 25.0),
            },
            "torus" => Self::Torus {
                major_radius: d.number_or("major_radius", 50.0),
                minor_radius: d.number_or("minor_radius", 10.0),
            },
            "cone" => Self::Cone {
                base_radius: d.number_or("base_radius", d.number_or("radius", 25.0)),
                top_radius: d.number_or("top_radius", 0.0),
                height: d.number_or("height", 50.0),
            },
            "arc" => {
                let outer_radius = d.number_or("outer_radius", d.number_or("radius", 50.0));
                Self::Arc {
                    outer_radius,
                    inner_radius: d.number_or("inner_radius", outer_radius * 3.0 / 5.0),
                    angle: d.number_or("angle", 90.0),
                    thickness: d.number_or("thickness", 10.0),
                }
            }
            "spring" => Self::Spring {
                pitch: d.number_or("pitch", 8.0),
                height: d.number_or("height", 80.0),
                radius: d.number_or("radius", 20.0),
                wire_radius: d.number_or("wire_radius", 1.5),
            },
            _ => return None,
        };
        Some(primitive)
    }

    /// Descriptor carrying this primitive's parameters
    ///
    /// Round-trips through [`Primitive::from_descriptor`].
    pub fn to_descriptor(&self) -> ShapeDescriptor {
        let shape_type = match self {
            Self::Hemisphere { .. } => "hemisphere",
            other => other.name(),
        };
        let mut descriptor = ShapeDescriptor::new(shape_type);
        if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(self) {
            for (key, value) in fields {
                let key = match key.as_str() {
                    "type" => continue,
                    "wall" => "wall_thickness".to_string(),
                    _ => key,
                };
                descriptor.parameters.insert(key, value);
            }
        }
        descriptor
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Box { .. } => "box",
            Self::Cylinder { .. } => "cylinder",
            Self::Sphere { .. } | Self::Hemisphere { .. } => "sphere",
            Self::Torus { .. } => "torus",
            Self::Cone { .. } => "cone",
            Self::Arc { .. } => "arc",
            Self::Spring { .. } => "spring",
        }
    }

    /// Import lines the construction needs
    pub fn imports(&self) -> &'static [&'static str] {
        match self {
            Self::Arc { .. } => &[CADQUERY_IMPORT, MATH_IMPORT],
            _ => &[CADQUERY_IMPORT],
        }
    }

    /// Top-level statements binding `result`, newline terminated
    pub fn render(&self) -> String {
        let n = format_number;
        match *self {
            Self::Box {
                width,
                depth,
                height,
            } => format!(
                "result = cq.Workplane(\"XY\").box({}, {}, {})\n",
                n(width),
                n(depth),
                n(height)
            ),
            Self::Cylinder { radius, height } => format!(
                "result = cq.Workplane(\"XY\").circle({}).extrude({})\n",
                n(radius),
                n(height)
            ),
            Self::Sphere { radius } => {
                format!("result = cq.Workplane(\"XY\").sphere({})\n", n(radius))
            }
            Self::Hemisphere { radius, wall } => format!(
                "result = (cq.Workplane(\"XY\")\n          .sphere({r})\n          .cut(cq.Workplane(\"XY\").box({w}, {w}, {h}, centered=(True, True, False)))\n          .faces(\">Z\")\n          .shell(-{t}))\n",
                r = n(radius),
                w = n(2.0 * radius + 2.0),
                h = n(radius + 1.0),
                t = n(wall)
            ),
            Self::Torus {
                major_radius,
                minor_radius,
            } => format!(
                "result = (cq.Workplane(\"XZ\")\n          .moveTo({}, 0)\n          .circle({})\n          .revolve(360, (0, 0, 0), (0, 1, 0)))\n",
                n(major_radius),
                n(minor_radius)
            ),
            Self::Cone {
                base_radius,
                top_radius,
                height,
            } => format!(
                "result = cq.Workplane(\"XY\").add(cq.Solid.makeCone({}, {}, {}))\n",
                n(base_radius),
                n(top_radius),
                n(height)
            ),
            Self::Arc {
                outer_radius,
                inner_radius,
                angle,
                thickness,
            } => format!(
                r#"R_OUT = {}
R_IN = {}
ANGLE = {}
THICKNESS = {}


def sector_wire(radius):
    end = math.radians(ANGLE)
    return cq.Wire.assembleEdges([
        cq.Edge.makeLine(cq.Vector(0, 0, 0), cq.Vector(radius, 0, 0)),
        cq.Edge.makeCircle(radius, angle1=0, angle2=ANGLE),
        cq.Edge.makeLine(cq.Vector(radius * math.cos(end), radius * math.sin(end), 0), cq.Vector(0, 0, 0)),
    ])


outer_wire = sector_wire(R_OUT)
inner_wire = sector_wire(R_IN)
outer_solid = cq.Solid.extrudeLinear(cq.Face.makeFromWires(outer_wire), cq.Vector(0, 0, THICKNESS))
inner_solid = cq.Solid.extrudeLinear(cq.Face.makeFromWires(inner_wire), cq.Vector(0, 0, THICKNESS))
result = cq.Workplane("XY").add(outer_solid.cut(inner_solid))
"#,
                n(outer_radius),
                n(inner_radius),
                n(angle),
                n(thickness)
            ),
            Self::Spring {
                pitch,
                height,
                radius,
                wire_radius,
            } => format!(
                "path = cq.Wire.makeHelix(pitch={}, height={}, radius={r})\nresult = (cq.Workplane(\"XY\")\n          .center({r}, 0)\n          .circle({})\n          .sweep(path, isFrenet=True))\n",
                n(pitch),
                n(height),
                n(wire_radius),
                r = n(radius)
            ),
        }
    }

    /// Complete script: imports, construction and STL export
    pub fn script(&self, output_name: &str) -> String {
        let mut script = self.imports().join("\n");
        script.push_str("\n\n");
        script.push_str(&self.render());
        script.push('\n');
        script.push_str(&export_block(output_name));
        script
    }
}

/// Shape names the snippets cover, including common aliases
pub fn canonical_name(shape: &str) -> Option<&'static str> {
    let name = match shape.trim().to_lowercase().as_str() {
        "box" | "cube" | "cuboid" | "block" => "box",
        "cylinder" | "rod" | "disc" | "disk" => "cylinder",
        "sphere" | "ball" | "hemisphere" | "bowl" => "sphere",
        "torus" | "donut" | "doughnut" | "ring" => "torus",
        "cone" => "cone",
        "arc" | "annular_sector" | "annular sector" => "arc",
        "spring" | "helix" | "coil" => "spring",
        _ => return None,
    };
    Some(name)
}

/// Export statement writing `result` as STL
pub fn export_block(output_name: &str) -> String {
    format!(
        "cq.exporters.export(result, \"{}.stl\")\n",
        output_name.trim_end_matches(".stl")
    )
}

fn radius_from(prompt: &str, labels: &[&str]) -> Option<f64> {
    number_after(prompt, labels).or_else(|| number_after(prompt, &["diameter"]).map(|d| d / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torus_from_prompt() {
        let torus =
            Primitive::from_prompt("torus", "Create a torus major radius 50 mm minor radius 8 mm")
                .unwrap();
        assert_eq!(
            torus,
            Primitive::Torus {
                major_radius: 50.0,
                minor_radius: 8.0
            }
        );
        let code = torus.render();
        assert!(code.contains(".moveTo(50, 0)"));
        assert!(code.contains(".circle(8)"));
        assert!(code.contains(".revolve(360, (0, 0, 0), (0, 1, 0))"));
    }

    #[test]
    fn test_defaults_when_prompt_is_silent() {
        assert_eq!(
            Primitive::from_prompt("cube", "make a cube"),
            Some(Primitive::Box {
                width: 50.0,
                depth: 50.0,
                height: 50.0
            })
        );
        assert_eq!(
            Primitive::from_prompt("spring", "a spring"),
            Some(Primitive::Spring {
                pitch: 8.0,
                height: 80.0,
                radius: 20.0,
                wire_radius: 1.5
            })
        );
        assert_eq!(Primitive::from_prompt("gear", "a gear"), None);
    }

    #[test]
    fn test_sphere_diameter_and_bowl() {
        assert_eq!(
            Primitive::from_prompt("sphere", "a ball of diameter 30"),
            Some(Primitive::Sphere { radius: 15.0 })
        );
        let bowl = Primitive::from_prompt("sphere", "Create a hemispherical bowl radius 40 mm")
            .unwrap();
        assert_eq!(
            bowl,
            Primitive::Hemisphere {
                radius: 40.0,
                wall: 2.0
            }
        );
        let code = bowl.render();
        assert!(code.contains(".sphere(40)"));
        assert!(code.contains(".box(82, 82, 41, centered=(True, True, False))"));
        assert!(code.contains(".shell(-2)"));
    }

    #[test]
    fn test_spring_reads_major_radius_not_wire_radius() {
        let prompt = "Create a helical spring by sweeping a circle radius 1.5 mm along a helix with pitch 8 mm, total height 80 mm, major radius 20 mm";
        let code = Primitive::from_prompt("spring", prompt).unwrap().render();
        assert!(code.contains("makeHelix(pitch=8, height=80, radius=20)"));
        assert!(code.contains(".center(20, 0)"));
        assert!(code.contains(".circle(1.5)"));
    }

    #[test]
    fn test_arc_uses_sector_wires() {
        let arc = Primitive::from_prompt("arc", "Create an arc radius 60 mm sweep 210 deg").unwrap();
        assert_eq!(
            arc,
            Primitive::Arc {
                outer_radius: 60.0,
                inner_radius: 36.0,
                angle: 210.0,
                thickness: 10.0
            }
        );
        let code = arc.render();
        assert!(code.contains("Edge.makeCircle"));
        assert!(code.contains("Wire.assembleEdges"));
        assert!(code.starts_with("R_OUT = 60\nR_IN = 36\nANGLE = 210\n"));
        assert_eq!(arc.imports(), &[CADQUERY_IMPORT, MATH_IMPORT]);
    }

    #[test]
    fn test_descriptor_round_trip() {
        let bowl = Primitive::Hemisphere {
            radius: 40.0,
            wall: 3.0,
        };
        let descriptor = bowl.to_descriptor();
        assert_eq!(descriptor.shape_type, "hemisphere");
        assert_eq!(descriptor.number("wall_thickness"), Some(3.0));
        assert_eq!(Primitive::from_descriptor(&descriptor), Some(bowl));

        let torus = Primitive::Torus {
            major_radius: 50.0,
            minor_radius: 8.0,
        };
        assert_eq!(Primitive::from_descriptor(&torus.to_descriptor()), Some(torus));
    }

    #[test]
    fn test_descriptor_and_script() {
        let desc = ShapeDescriptor::new("cylinder")
            .with_parameter("radius", 25.0)
            .with_parameter("height", 50.0);
        let cylinder = Primitive::from_descriptor(&desc).unwrap();
        let script = cylinder.script("cylinder");
        assert!(script.starts_with("import cadquery as cq\n\n"));
        assert!(script.contains("result = cq.Workplane(\"XY\").circle(25).extrude(50)\n"));
        assert!(script.ends_with("cq.exporters.export(result, \"cylinder.stl\")\n"));
    }
}
