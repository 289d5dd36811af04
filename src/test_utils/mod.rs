#![allow(missing_docs)]

pub(crate) mod http;
pub(crate) mod provider;

pub(crate) use http::{assert_content_type, assert_status_ok, get_test_connection, response_json};
pub(crate) use provider::ScriptedProvider;
