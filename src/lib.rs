//! Folio content cache and tag-aggregation core.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
