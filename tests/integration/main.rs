//! Integration tests for Skein
//!
//! Compiled as a single test binary; each module covers one area.

mod common;
mod crawl_tests;
mod scenario_tests;
mod store_tests;
