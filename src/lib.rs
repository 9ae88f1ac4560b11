//! Multi-provider SVG generation pipeline.
//!
//! One prompt fans out to several LLM text-generation services concurrently;
//! each raw response is repaired into a well-formed, embeddable SVG fragment
//! and the per-provider outcomes are aggregated into a single result set.

pub mod app;
pub mod domain;
pub mod infra;
