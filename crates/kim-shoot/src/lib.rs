//! Runtime to Shoot conversion for the Kyma infrastructure manager
//!
//! [`Converter`] turns a Runtime into the Shoot document that is created in
//! (or server-side applied to) the garden namespace. Each concern of the
//! Shoot spec is handled by one extender in [`extender`]; the converter only
//! decides which extenders run, and in which order, for create and patch.

pub mod classifier;
pub mod config;
pub mod converter;
pub mod extender;
pub mod version;

pub use classifier::{classify_last_errors, combine_error_descriptions, ErrorClassification};
pub use config::{AuditLogData, AuditLogTable, ConverterConfig};
pub use converter::{workers_are_different, Converter};
pub use version::KubernetesVersion;
