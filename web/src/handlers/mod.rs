//! HTTP request handlers, grouped by audience.

pub mod admin;
pub mod health;
pub mod issue;

pub use health::{health_check, readiness_check};
