//! Application services layer.

pub mod audit;
pub mod catalog;
pub mod error;
pub mod identity;
pub mod repos;
pub mod reviews;
