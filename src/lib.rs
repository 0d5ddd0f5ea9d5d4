//! Tag-indexed, access-gated HTTP response cache.
//!
//! The [`cache`] module holds the store, the tag index, key construction, the
//! request-time gate and the invalidation trigger. [`access`] describes the
//! collaborators the gate consults (route policy and caller identity), and
//! [`config`] / [`infra`] carry settings loading, telemetry and the admin
//! HTTP surface.

pub mod access;
pub mod cache;
pub mod config;
pub mod infra;
