//! StaticGenius image gateway: generates and edits marketing images through
//! a chain of upstream AI providers with retry, response normalization and a
//! local degraded fallback.

#![allow(clippy::multiple_crate_versions)]
#![deny(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::complexity)]
#![deny(clippy::correctness)]
#![deny(clippy::disallowed_methods)]
#![deny(clippy::expect_used)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::panic)]
#![deny(clippy::perf)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::unreachable)]
#![deny(clippy::unwrap_used)]
#![deny(warnings)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod ad_templates;
pub mod cli;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod fanout;
pub mod fetch;
pub mod local_fallback;
pub mod model;
pub mod preprocess;
pub mod prompt;
pub mod providers;
pub mod retry;
pub mod web;

#[cfg(test)]
pub(crate) mod test_helpers;
