//! Security module for toolgate: audit logging, argument sanitization,
//! row-level scoping, and bearer-token authentication.
//!
//! Provides:
//! - **Audit logging**: Ordered per-invocation records with pluggable sinks
//! - **Sanitization**: Redaction of sensitive argument values plus a digest of the raw payload
//! - **Scoping**: Attribute-driven argument rewriting that vetoes unscoped calls
//! - **Token resolver**: Maps `Authorization: Bearer` tokens to configured users

pub mod audit;
pub mod resolver;
pub mod sanitize;
pub mod scoping;

pub use audit::{
    AuditLogger, AuditOutcome, AuditRecord, AuditSink, AuditStage, JsonlFileSink, TracingSink,
};
pub use resolver::TokenUserResolver;
pub use sanitize::{fingerprint, is_sensitive_key, sanitize_arguments, REDACTED};
pub use scoping::{AttributeScopeTransformer, ScopeMode, ScopeRule};
