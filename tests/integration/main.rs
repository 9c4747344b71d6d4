//! Integration tests for the collector
//!
//! These tests run complete sessions against an on-disk ledger in a
//! temporary work directory. In-memory collaborators stand in for real
//! sources and sinks; wiremock serves the HTTP fetcher tests.

mod crawl_tests;
mod http_tests;
mod support;
