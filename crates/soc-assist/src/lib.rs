//! Severity scoring and feedback calibration for reported security events.
//!
//! Analyst answers are scored against an immutable, versioned rule set
//! ([`engine`]), floored by hard rules, scaled by multipliers, and classified
//! into one of five severity levels. Resolved outcomes feed [`calibration`],
//! whose proposals only take effect once an operator applies them through the
//! [`versions`] registry.

pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod telemetry;
pub mod triage;
pub mod versions;
