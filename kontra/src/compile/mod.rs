//! Predicate & SQL-spec compiler (C2).
//!
//! For each rule, three independent, non-blocking extraction attempts are
//! made: a vectorizable [`predicate::Predicate`], a dialect-agnostic
//! [`sql_spec::SqlSpec`], and a metadata-only
//! [`static_predicate::StaticPredicate`]. None of these touch I/O; a rule
//! that fails every tier simply falls back to row-by-row `validate`.

pub mod predicate;
pub mod sql_spec;
pub mod static_predicate;

pub use predicate::{compile_predicate, Predicate};
pub use sql_spec::{to_sql_spec, SqlSpec};
pub use static_predicate::{to_static_predicates, StaticOp, StaticPredicate, StaticValue};
