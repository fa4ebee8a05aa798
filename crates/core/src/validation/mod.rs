//! Validation rule engine.
//!
//! Provides rule and chain types, a registry-backed evaluator with
//! sequential and parallel modes, per-rule diagnostics, a read-only
//! simulation mode, and the built-in migration rule set.

pub mod builtin;
pub mod engine;
pub mod rules;
