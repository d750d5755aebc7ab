//! Plaudit: the review and catalogue core of a social cataloguing service.
//!
//! Members review subjects drawn from a closed catalogue of kinds (projects,
//! songs, covers, music videos, podcasts, outfits and events) on a 0 to 5 star
//! scale. Each subject carries a running review count and star average that is
//! maintained incrementally as reviews are submitted, revised and withdrawn,
//! never recomputed from scratch. Hot list queries (search, popularity and
//! rating rankings) are served through an id-list cache that is invalidated by
//! subject kind when the underlying rows change.
//!
//! Layout follows the write path: `domain` holds the pure aggregate and
//! validation rules, `application` the services and repository traits, `infra`
//! the Postgres and in-process backends plus telemetry, `cache` the list cache
//! and its event-driven invalidation, and `config` the typed settings.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
