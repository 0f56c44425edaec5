//! # REIA backend
//!
//! Property acquisition analysis service.
//!
//! A user submits a US property address and optional acquisition notes; the
//! backend asks a hosted LLM (OpenAI or Gemini) for a phased underwriting
//! report, stores it and returns it. When no provider is reachable a
//! deterministic canned report is served instead.
//!
//! ## Architecture
//!
//! - [`models`]: domain entities (users, analyses, audit events)
//! - [`db`]: repository traits with in-memory and PostgreSQL implementations
//! - [`llm`]: completion providers, prompt construction and the fallback report
//! - [`services`]: auth, validation, analysis orchestration and billing
//! - [`api`]: JSON response DTOs
//! - [`config`]: environment-driven settings
//! - [`http`]: axum router, extractors and handlers (feature `http-server`)

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod api;
pub mod config;
pub mod db;
pub mod llm;
pub mod models;
pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
