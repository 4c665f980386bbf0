//! Multi-user chat backend relaying conversations to a hosted language model.

// Strict bans on unsafe or non-idiomatic practices
#![deny(warnings)] // every warning is an error
#![deny(unsafe_code)]
#![deny(missing_docs)] // every public item is documented
#![deny(dead_code)]
#![deny(non_camel_case_types)]

// Nothing left to slip through
#![deny(unused_imports)]
#![deny(unused_variables)]
#![deny(unused_must_use)] // Result and Option are handled explicitly
#![deny(non_snake_case)]
#![deny(non_upper_case_globals)]
#![deny(nonstandard_style)]
#![forbid(unsafe_op_in_unsafe_fn)]

// Clippy discipline
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)] // no unwrap() outside tests
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::print_stdout)] // logging goes through tracing
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::missing_const_for_fn)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::module_inception)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::shadow_unrelated)]
#![deny(clippy::too_many_arguments)]
#![deny(clippy::cognitive_complexity)]

// Robustness
#![deny(overflowing_literals)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

/// Account registration, login and session tokens.
#[allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
pub mod auth;
/// Conversation orchestration.
#[allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]
pub mod chat;
/// Environment-driven configuration.
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod config;
/// Completion provider adapter.
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod llm;
/// Messages, bounded history and conversation titles.
#[allow(clippy::must_use_candidate, clippy::missing_const_for_fn)]
pub mod memory;
/// HTTP server and API routes.
#[allow(
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::unused_async
)]
pub mod server;
/// Text-to-speech rendering.
#[allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]
pub mod speech;
/// Entry helpers to start the server.
pub mod start_charla;
/// Persistence backends.
#[allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::too_many_lines
)]
pub mod storage;
