//! Template generator for the recognized primitives

use tracing::debug;

use sculpt_core::{Result, SculptError, ShapeDescriptor, TemplateGenerator};
use sculpt_heal::{canonical_name, Primitive};

/// Emits the canonical construction for a known primitive
#[derive(Debug, Clone)]
pub struct PrimitiveTemplates {
    output_name: String,
}

impl Default for PrimitiveTemplates {
    fn default() -> Self {
        Self::new("generated")
    }
}

impl PrimitiveTemplates {
    /// `output_name` is the STL stem the script exports to
    pub fn new(output_name: impl Into<String>) -> Self {
        Self {
            output_name: output_name.into(),
        }
    }
}

impl TemplateGenerator for PrimitiveTemplates {
    fn supports(&self, shape_type: &str) -> bool {
        canonical_name(shape_type).is_some()
    }

    fn generate(&self, descriptor: &ShapeDescriptor) -> Result<String> {
        let primitive = Primitive::from_descriptor(descriptor).ok_or_else(|| {
            SculptError::collaborator(
                "template",
                format!("no template for shape type '{}'", descriptor.shape_type),
            )
        })?;
        debug!(shape = primitive.name(), "rendering template");
        Ok(primitive.script(&self.output_name))
    }
}
