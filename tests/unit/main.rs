// Unit tests for the input layer
//
// Organized by component:
// - config: environment and serde configuration loading
// - feeds: feed bundle loading from disk

mod config_tests;
mod feeds_tests;
