//! # Clubhouse Database Crate
//!
//! This crate acts as the application-specific interface to the PostgreSQL
//! database that backs the clubhouse LMS: accounts, courses and lessons,
//! enrollments, holiday programs, attendance, monthly reports and the API
//! request log.
//!
//! ## Architectural Principles
//!
//! - **Adapter:** All SQL lives here. Callers work with typed rows and
//!   `DbRepository` methods, never with query strings.
//! - **Parameterized queries:** Every value reaches Postgres as a bound
//!   parameter. Optional filters use the `($n IS NULL OR col = $n)` form
//!   instead of string concatenation.
//! - **Asynchronous & Pooled:** All operations are asynchronous and share a
//!   connection pool (`PgPool`).
//! - **Transactional invariants:** Writes that must stay consistent with a
//!   counter or a capacity (enrollments, program registrations, lesson
//!   progress) run inside a single transaction.
//!
//! ## Public API
//!
//! - `connect` / `connect_lazy`: build the connection pool from `DatabaseSettings`.
//! - `run_migrations`: applies the embedded schema migrations.
//! - `DbRepository`: holds the pool and provides all data access methods.
//! - `DbError`: the error type returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod repository;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, connect_lazy, run_migrations};
pub use error::DbError;
pub use repository::*;
