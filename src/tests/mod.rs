//! Cross-module tests for the counting pipeline.
//!
//! These exercise the full train → classify → mask → extract → count flow
//! and session persistence, where the per-module unit tests stop at one
//! component each.

mod session_tests;
