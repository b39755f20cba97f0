//! Integration test entry point for meshnode.
//!
//! Run with: cargo test -p meshnode --test integration

mod harness;
mod links;
mod tree;
