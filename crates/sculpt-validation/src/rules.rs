//! Static rule table consumed by the critic and the healer
//!
//! The table is tagged TOML data. The built-in copy is embedded at compile
//! time and parsed once per process; an external table can replace it via
//! `rules_path` in the configuration. Tables are never mutated after load.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use sculpt_core::{Result, SculptError};

const BUILTIN_RULES: &str = include_str!("../rules/shapes.toml");

static BUILTIN: OnceLock<Arc<RuleTable>> = OnceLock::new();

/// Required and forbidden signature for one recognizable primitive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeRule {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub required_any: Vec<String>,
    #[serde(default)]
    pub forbidden: Vec<String>,
    /// Prompt fragments that switch the rule off
    #[serde(default)]
    pub allow_when_prompt_mentions: Vec<String>,
    pub fix: String,
}

impl ShapeRule {
    /// First keyword present in the (lowercased) prompt as a word
    pub fn matched_keyword(&self, prompt: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|k| contains_word(prompt, k))
            .map(String::as_str)
    }

    pub fn is_waived(&self, prompt: &str) -> bool {
        self.allow_when_prompt_mentions
            .iter()
            .any(|fragment| prompt.contains(fragment.as_str()))
    }
}

/// An API member the generated code must not call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownApi {
    pub member: String,
    /// Valid member with the same meaning, if a rename suffices
    #[serde(default)]
    pub replacement: Option<String>,
    /// Shape whose canonical construction replaces the call
    #[serde(default)]
    pub rebuild: Option<String>,
}

impl UnknownApi {
    pub fn call_token(&self) -> String {
        format!(".{}(", self.member)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HollowVocabulary {
    pub keywords: Vec<String>,
    pub operations: Vec<String>,
    #[serde(default)]
    pub negative_extrude_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpringVocabulary {
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaseVocabulary {
    pub keywords: Vec<String>,
    pub hollowing: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FurnitureVocabulary {
    pub keywords: Vec<String>,
    pub leg_words: Vec<String>,
    /// Legs closer to the center than this fraction of each dimension are flagged
    pub corner_fraction: f64,
    pub default_inset: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralVocabulary {
    pub solid_operations: Vec<String>,
    /// Calls that start a new working shape within a chain
    pub reset_operations: Vec<String>,
}

/// The whole rule table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(rename = "shape", default)]
    pub shapes: Vec<ShapeRule>,
    #[serde(rename = "unknown_api", default)]
    pub unknown_apis: Vec<UnknownApi>,
    pub hollow: HollowVocabulary,
    pub spring: SpringVocabulary,
    pub vase: VaseVocabulary,
    pub furniture: FurnitureVocabulary,
    pub structural: StructuralVocabulary,
}

impl RuleTable {
    /// The embedded table, parsed on first use
    pub fn builtin() -> Arc<RuleTable> {
        BUILTIN
            .get_or_init(|| {
                // Parsing is covered by test_builtin_table_parses
                Arc::new(Self::from_toml(BUILTIN_RULES).unwrap_or_else(|e| {
                    tracing::error!("built-in rule table is invalid: {}", e);
                    Self::empty()
                }))
            })
            .clone()
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let table: RuleTable = toml::from_str(content)
            .map_err(|e| SculptError::RuleTable(format!("failed to parse rule table: {}", e)))?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Table from an optional external path, else the built-in one
    pub fn load(path: Option<&Path>) -> Result<Arc<RuleTable>> {
        match path {
            Some(p) => Ok(Arc::new(Self::from_path(p)?)),
            None => Ok(Self::builtin()),
        }
    }

    pub fn shape(&self, name: &str) -> Option<&ShapeRule> {
        self.shapes.iter().find(|s| s.name == name)
    }

    pub fn unknown_api(&self, member: &str) -> Option<&UnknownApi> {
        self.unknown_apis.iter().find(|u| u.member == member)
    }

    fn validate(&self) -> Result<()> {
        for shape in &self.shapes {
            if shape.keywords.is_empty() {
                return Err(SculptError::RuleTable(format!(
                    "shape '{}' has no keywords",
                    shape.name
                )));
            }
            if shape.required.is_empty() && shape.required_any.is_empty() && shape.forbidden.is_empty()
            {
                return Err(SculptError::RuleTable(format!(
                    "shape '{}' has an empty signature",
                    shape.name
                )));
            }
        }
        for api in &self.unknown_apis {
            if api.replacement.is_none() && api.rebuild.is_none() {
                return Err(SculptError::RuleTable(format!(
                    "unknown API '{}' needs a replacement or a rebuild shape",
                    api.member
                )));
            }
        }
        Ok(())
    }

    fn empty() -> Self {
        Self {
            shapes: Vec::new(),
            unknown_apis: Vec::new(),
            hollow: HollowVocabulary {
                keywords: Vec::new(),
                operations: Vec::new(),
                negative_extrude_keywords: Vec::new(),
            },
            spring: SpringVocabulary {
                keywords: Vec::new(),
            },
            vase: VaseVocabulary {
                keywords: Vec::new(),
                hollowing: Vec::new(),
            },
            furniture: FurnitureVocabulary {
                keywords: Vec::new(),
                leg_words: Vec::new(),
                corner_fraction: 0.25,
                default_inset: 5.0,
            },
            structural: StructuralVocabulary {
                solid_operations: Vec::new(),
                reset_operations: Vec::new(),
            },
        }
    }
}

/// Whether `word` occurs in `text` bounded by non-alphanumerics
///
/// A trailing plural `s`/`es` still counts as a match.
pub fn contains_word(text: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(pos) = text[start..].find(word) {
        let begin = start + pos;
        let end = begin + word.len();
        let before_ok = begin == 0 || !bytes[begin - 1].is_ascii_alphanumeric();
        let rest = &text[end..];
        let boundary = |r: &str| r.chars().next().map_or(true, |c| !c.is_ascii_alphanumeric());
        let after_ok = boundary(rest)
            || rest.strip_prefix("es").is_some_and(boundary)
            || rest.strip_prefix('s').is_some_and(boundary);
        if before_ok && after_ok {
            return true;
        }
        start = begin + 1;
        while !text.is_char_boundary(start) {
            start += 1;
        }
    }
    false
}
