//! # sculpt-heal
//!
//! Repair of generated CadQuery scripts.
//!
//! The [`SelfHealer`] takes code plus the issues found in it (critic defects,
//! syntax errors, execution failures) and rewrites it. Tier 1 is an ordered
//! table of deterministic rules that edit whole statements located through
//! the call-chain parser; tier 2 asks a repair oracle. Either way the result
//! must parse, or the original code comes back untouched.

mod healer;
pub mod normalize;
mod repair;
pub mod rewrite;
mod rules;
pub mod snippets;

pub use healer::{HealOutcome, HealTier, SelfHealer};
pub use repair::{extract_code, normalize_reply, repair_prompt, RepairOracle};
pub use rules::{apply_rules, rebuild, HealRule, RewriteContext, Trigger, TIER1_RULES};
pub use snippets::{canonical_name, export_block, Primitive};
