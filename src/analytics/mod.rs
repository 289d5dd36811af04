//! Natural-language analytics over saved transactions.
//!
//! A question is translated into SQL by [QuerySynthesizer], which never fails
//! and falls back to [FALLBACK_QUERY]. The statement is then run through
//! [execute_read_only], which refuses anything that could modify the database.

mod ask_endpoint;
mod guard;
mod synthesis;

pub use ask_endpoint::ask_endpoint;
pub use guard::{Row, execute_read_only};
pub use synthesis::{FALLBACK_QUERY, QueryProvenance, QuerySynthesizer, SqlQuery};
