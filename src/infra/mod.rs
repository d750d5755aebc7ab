//! Infrastructure adapters: persistence backends and telemetry.

pub mod db;
pub mod error;
pub mod telemetry;
