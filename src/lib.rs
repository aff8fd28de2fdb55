//! # Tabi
//!
//! A local-first trip itinerary: a fixed catalog of days plus user-added
//! days, per-day notes and file attachments, kept in a local store and
//! synchronized to a remote trip document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────┐   ┌──────────────┐
//! │   CLI    │──▶│ SyncCoordinator │──▶│ Local store  │
//! │  (tabi)  │   │ debounce+merge  │   │ JSON files   │
//! └──────────┘   └───────┬─────────┘   └──────────────┘
//!                        │ HTTP
//!                        ▼
//!                ┌──────────────┐   ┌──────────┐
//!                │  HTTP server │──▶│  SQLite   │
//!                │ trip/auth/.. │   │ + blobs   │
//!                └──────────────┘   └──────────┘
//! ```
//!
//! Pure domain rules (catalog, merge, validation, lookup tables) live in
//! the `tabi-core` crate; this crate adds the runtime.
//!
//! ## Quick Start
//!
//! ```bash
//! tabi init                               # create database
//! JWT_SECRET=... tabi serve               # start HTTP server
//! tabi days                               # list the itinerary
//! tabi note 2025-02-21 "Ramen at Ichiran"
//! tabi attach 2025-02-21 ./ticket.pdf
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Lazily opened SQLite pool |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite trip document store |
//! | [`error`] | HTTP error taxonomy |
//! | [`auth`] | Accounts, password hashing, session tokens |
//! | [`notes`] | Per-user notes |
//! | [`upload`] | Attachment validation and blob backends |
//! | [`server`] | HTTP server |
//! | [`local`] | Local annotation store |
//! | [`remote`] | Remote trip client and uploader |
//! | [`sync`] | Sync coordinator |
//! | [`client`] | CLI itinerary commands |

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod local;
pub mod migrate;
pub mod notes;
pub mod remote;
pub mod server;
pub mod sqlite_store;
pub mod sync;
pub mod upload;
