//! The API endpoints URIs.
//!
//! Collection routes are served both with and without the trailing slash.

/// The route for extracting a draft transaction from free text.
pub const ANALYZE_TEXT: &str = "/analyze/text";
/// The route for extracting a draft transaction from a receipt photo.
pub const ANALYZE_IMAGE: &str = "/analyze/image";
/// The route for saving and listing transactions.
pub const TRANSACTIONS: &str = "/transactions/";
/// [TRANSACTIONS] without the trailing slash.
pub const TRANSACTIONS_NO_SLASH: &str = "/transactions";
/// The route for asking questions about saved transactions.
pub const ANALYTICS_ASK: &str = "/analytics/ask";
/// The liveness check.
pub const HEALTH: &str = "/health";
