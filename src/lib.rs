//! Palate - restaurant review intelligence pipeline.
//!
//! Ingests customer reviews scraped from third-party platforms, runs them
//! through an AI structured-extraction step, and aggregates the results into
//! a bounded per-restaurant sentiment score (the Flavor Index) with
//! category, staff, and menu-item breakdowns.

pub mod cli;
pub mod config;
pub mod extraction;
pub mod models;
pub mod platforms;
pub mod repository;
pub mod schema;
pub mod scoring;
pub mod server;
pub mod services;
