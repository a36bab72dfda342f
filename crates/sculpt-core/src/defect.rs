//! Semantic defects and the issue vocabulary consumed by the healer

use serde::{Deserialize, Serialize};

/// What kind of structural mismatch the critic found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    /// Shape keyword in the prompt but the code lacks its signature
    ShapeSignature,
    /// Hollow object without any subtractive or shell operation
    HollowMissingCut,
    /// Hollow cut expressed as a negative extrusion
    HollowNegativeExtrude,
    /// Spring without a helix path swept by a profile
    SpringMissingHelix,
    /// Spring profile left at the origin instead of the helix start
    SpringProfileAtOrigin,
    /// Lofted vase that is never hollowed
    VaseNotHollowed,
    /// Furniture legs clustered around the center
    LegsAtCenter,
    /// Two solid-forming operations applied to the same chain
    ExclusiveSolidOps,
    /// Array with implausibly small spacing
    ArraySpacing,
    /// Revolve axis along the workplane normal
    RevolveAxis,
    /// Call to an API member that does not exist
    UnknownApi,
}

impl std::fmt::Display for DefectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ShapeSignature => "shape_signature",
            Self::HollowMissingCut => "hollow_missing_cut",
            Self::HollowNegativeExtrude => "hollow_negative_extrude",
            Self::SpringMissingHelix => "spring_missing_helix",
            Self::SpringProfileAtOrigin => "spring_profile_at_origin",
            Self::VaseNotHollowed => "vase_not_hollowed",
            Self::LegsAtCenter => "legs_at_center",
            Self::ExclusiveSolidOps => "exclusive_solid_ops",
            Self::ArraySpacing => "array_spacing",
            Self::RevolveAxis => "revolve_axis",
            Self::UnknownApi => "unknown_api",
        };
        write!(f, "{}", name)
    }
}

/// A semantic defect found by static inspection
///
/// Rendered through `Display` as a `SEMANTIC ERROR: ...` line so logs and
/// replays keep a single textual form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defect {
    pub kind: DefectKind,
    /// Prompt keyword or API member that triggered the check
    pub keyword: String,
    /// Tokens that must appear but do not
    #[serde(default)]
    pub required: Vec<String>,
    /// Tokens that appear but must not
    #[serde(default)]
    pub forbidden: Vec<String>,
    /// Canonical replacement pattern
    pub fix: String,
    /// Human readable description of the mismatch
    pub message: String,
}

impl Defect {
    pub fn new(
        kind: DefectKind,
        keyword: impl Into<String>,
        message: impl Into<String>,
        fix: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            keyword: keyword.into(),
            required: Vec::new(),
            forbidden: Vec::new(),
            fix: fix.into(),
            message: message.into(),
        }
    }

    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = required;
        self
    }

    pub fn with_forbidden(mut self, forbidden: Vec<String>) -> Self {
        self.forbidden = forbidden;
        self
    }
}

impl std::fmt::Display for Defect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SEMANTIC ERROR: {}. Use: {}", self.message, self.fix)
    }
}

/// Anything the healer can be asked to repair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "detail", rename_all = "snake_case")]
pub enum Issue {
    /// Structural defect from the critic
    Defect(Defect),
    /// Syntax check failure
    Compile(String),
    /// Failure raised while running the script
    Execution(String),
}

impl Issue {
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn as_defect(&self) -> Option<&Defect> {
        match self {
            Self::Defect(d) => Some(d),
            _ => None,
        }
    }

    /// Text form used for substring triggers and oracle prompts
    pub fn message(&self) -> String {
        match self {
            Self::Defect(d) => d.to_string(),
            Self::Compile(m) | Self::Execution(m) => m.clone(),
        }
    }
}

impl From<Defect> for Issue {
    fn from(defect: Defect) -> Self {
        Self::Defect(defect)
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defect_renders_semantic_error_line() {
        let defect = Defect::new(
            DefectKind::ShapeSignature,
            "torus",
            "Prompt asks for TORUS but code uses .sphere(",
            "Workplane(\"XZ\").moveTo(R, 0).circle(r).revolve(360)",
        )
        .with_forbidden(vec![".sphere(".to_string()]);

        let text = defect.to_string();
        assert!(text.starts_with("SEMANTIC ERROR: Prompt asks for TORUS"));
        assert!(text.contains("revolve"));
    }

    #[test]
    fn test_issue_message_passthrough() {
        let issue = Issue::execution("MemoryError: out of memory");
        assert_eq!(issue.message(), "MemoryError: out of memory");
        assert!(issue.as_defect().is_none());
    }
}
