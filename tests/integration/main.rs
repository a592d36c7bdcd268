// Integration tests for the derived-analytics core
//
// Organized by concern:
// - derived_state: memoization identity and node independence
// - scenarios: end-to-end statistical properties through the public API

mod common;
mod derived_state;
mod scenarios;
