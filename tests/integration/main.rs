//! Integration tests for the scan desk

mod api_tests;
mod support;
