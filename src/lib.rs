#![doc = "docs-publish: publish a documentation tree to a content-addressable store."]

//! Documents and static assets are uploaded once per distinct content hash,
//! static asset references inside text documents are rewritten to the
//! uploaded blob urls, and every document path gets a pointer to its current
//! content id.
//!
//! Entry points: [`publish::publish`] for a publish run and
//! [`check::check_links`] for the read-only link check.

pub mod check;
pub mod cli;
pub mod config;
pub mod content_type;
pub mod contract;
pub mod error;
pub mod files;
pub mod hash;
pub mod load_config;
pub mod pointer;
pub mod publish;
pub mod resolve;
pub mod store;

pub use cli::{run, Cli, Commands};
