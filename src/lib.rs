//! # Back-office Library
//!
//! Core of a multi-tenant SaaS back office: the feature flag targeting
//! engine, subscription pricing, calculated-field formulas, and the HTTP API
//! and persistence around them.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod feature_flags;
pub mod formulas;
pub mod handlers;
pub mod models;
pub mod pricing;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod telemetry;
pub use migration;
