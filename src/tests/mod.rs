//! Cross-module test suites
//!
//! Unit tests for individual types live next to the types; the suites here
//! exercise whole subsystems together, including the property-based tests.

pub mod executor_tests;

pub mod matcher_tests;
