//! Sift Kernel Library
//!
//! Model registry, search compiler, and the HTTP surface around them.
//! The main entry point for running the server is the `sift` binary.

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod routes;
pub mod search;
pub mod shortcuts;
pub mod state;
