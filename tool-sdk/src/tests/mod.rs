//! Cross-module tests for the Tool SDK

pub mod http_invoker_tests;
