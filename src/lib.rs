//! Role-scoped client and project tracking core.
//!
//! Trellis is the authorization-and-visibility layer of a resource-management
//! platform: clients, projects, and their embedded documents, notes, tasks,
//! milestones, and team assignments, all filtered through a three-role access
//! model (admin, engagement manager, resource manager).
//!
//! The crate is organised around a small set of seams:
//!
//! - [`policy`]: pure allow/deny decisions plus scope filters for list
//!   queries. No I/O, no state.
//! - [`model`]: the client and project aggregates. Embedded collections are
//!   only reachable through invariant-enforcing methods; derived fields
//!   (progress, metrics) are recomputed inside every mutation.
//! - [`store`]: document-store traits with the scope predicate folded into
//!   every query, plus an in-memory backend.
//! - [`service`]: the coordinators. Policy check, aggregate mutation, and
//!   conditional (version-checked) persistence per operation, with bounded
//!   retries on write conflicts.
//! - [`upload`] / [`blob`]: the document upload gate and the opaque blob
//!   store it feeds.
//!
//! Scoping is enforced twice on purpose. List queries carry a scope filter so
//! rows never leak, and by-id operations re-assert the same predicate inside
//! the store query, so a guessed identifier behaves exactly like a missing
//! record.

pub mod auth;
pub mod blob;
pub mod config;
pub mod error;
pub mod model;
pub mod policy;
pub mod service;
pub mod store;
pub mod upload;

pub use auth::{Principal, Role};
pub use config::ServiceConfig;
pub use error::ServiceError;
pub use service::{ClientService, ProjectService};
