//! # congress-sync
//!
//! Incremental sync of Congress.gov bills and members into SQLite.
//!
//! A run fetches every record updated inside a date window, normalizes it,
//! decides Insert / Update / Skip against what is stored, and writes each
//! record in its own transaction. Per-endpoint sync state makes the next run
//! start where the last successful one left off.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌────────────┐   ┌──────────┐
//! │  ApiClient  │──▶│ Normalizers │──▶│ Reconciler │──▶│  SQLite  │
//! │ retry+pages │   │ bills/members│  │ ins/upd/skip│   │ upserts  │
//! └─────────────┘   └─────────────┘   └────────────┘   └────┬─────┘
//!                                                           │
//!                          ┌────────────────────────────────┤
//!                          ▼                                ▼
//!                   ┌────────────┐                   ┌────────────┐
//!                   │ sync state │                   │  validate  │
//!                   └────────────┘                   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! csync init                          # create database
//! csync sync bills --days 3           # incremental bill sync
//! csync sync members --current-only
//! csync batch bills --missing actions --parallel
//! csync validate --format json --output report.json
//! csync status
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`api`] | Congress.gov client with retry and pagination |
//! | [`payload`] | Lenient accessors over upstream JSON |
//! | [`bills`] | Bill normalization |
//! | [`members`] | Member normalization |
//! | [`reconcile`] | Insert / Update / Skip decision |
//! | [`store`] | Transactional upserts |
//! | [`sync_state`] | Per-endpoint sync status |
//! | [`ingest`] | Incremental list sync |
//! | [`details`] | Detail, legislation, and biography enrichment |
//! | [`batch`] | Batch and parallel re-processing |
//! | [`validate`] | Missing-data reports |
//! | [`archive`] | Raw payload snapshots |
//! | [`status`] | Status overview |
//! | [`progress`] | Progress reporting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Sync error taxonomy |
//! | [`telemetry`] | Logging setup |

pub mod api;
pub mod archive;
pub mod batch;
pub mod bills;
pub mod config;
pub mod db;
pub mod details;
pub mod error;
pub mod ingest;
pub mod members;
pub mod migrate;
pub mod models;
pub mod payload;
pub mod progress;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod sync_state;
pub mod telemetry;
pub mod validate;
