//! # Flight Aggregator Library
//!
//! Aggregates flight availability from heterogeneous airline and GDS
//! provider APIs: request translation, provider authentication, rate
//! limiting, response normalization, concurrent search fan-out, and
//! background catalog synchronization.

pub mod aggregator;
pub mod auth;
pub mod auth_manager;
pub mod booking;
pub mod catalog;
pub mod config;
pub mod crypto;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod models;
pub mod normalization;
pub mod providers;
pub mod rate_limiter;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub mod translation;
pub use migration;
