//! Integration tests against in-memory stores and collaborators

mod api_tests;
mod common;
mod loan_lifecycle;
