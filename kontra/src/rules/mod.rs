//! Rule model and registry (C1).
//!
//! A contract is a list of [`params::RuleSpec`]; [`build::build_rules`] turns
//! it into a `Vec<`[`model::Rule`]`>` in contract order. The rule set is a
//! closed sum type ([`model::RuleKind`]) — there is no dynamic plugin
//! registry, since every variant is known at compile time.

pub mod build;
pub mod model;
pub mod params;
pub mod validate;

pub use build::build_rules;
pub use model::{CompareOp, Rule, RuleKind, Severity};
pub use params::{Params, RuleSpec};
