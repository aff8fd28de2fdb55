//! # Tabi Core
//!
//! Shared, runtime-free logic for Tabi: itinerary data models, the bundled
//! catalog, photo and map-link lookup tables, trip state mutation and merge
//! rules, and the trip document store abstraction.
//!
//! This crate contains no tokio, sqlx, filesystem writes, or network I/O.
//! Everything that suspends lives in the `tabi` crate.

pub mod blob;
pub mod catalog;
pub mod lookup;
pub mod models;
pub mod state;
pub mod store;
