//! # sculpt-validation
//!
//! Static checks for generated CadQuery scripts.
//!
//! This crate provides:
//! - The rule-table driven semantic critic
//! - Syntax checking backed by tree-sitter
//! - Classification of execution failures
//! - Design-rule and manufacturing constraint validation of descriptors
//! - Statement/call-chain location and numeric extraction shared with the healer

pub mod chain;
mod critic;
mod error_handler;
pub mod extract;
mod feasibility;
mod rules;
mod syntax;

pub use critic::{
    exclusive_pair, furniture_footprint, has_negative_extrude, leg_points, Critic,
    CritiqueContext, DEFAULT_MIN_ARRAY_SPACING,
};
pub use error_handler::{ClassifiedError, ErrorCategory, ErrorClassification, ErrorHandler, Severity};
pub use feasibility::{
    Bounds, ConstraintValidator, DesignRuleValidator, DesignRules, ManufacturingLimits,
};
pub use rules::{
    contains_word, FurnitureVocabulary, HollowVocabulary, RuleTable, ShapeRule,
    SpringVocabulary, StructuralVocabulary, UnknownApi, VaseVocabulary,
};
pub use syntax::{SyntaxChecker, SyntaxIssue, SyntaxReport};
