//! # nodehook-domain
//!
//! Pure domain model for the nodehook automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Describe the **graph surface** the engine reacts to: node references,
//!   tags, raw store mutations and their canonical event form
//! - Define **Triggers** (mutation condition → stored query)
//! - Define **Cron jobs** (schedule → stored query) and next-fire computation
//! - Define **Macros** (named stored queries run as the caller)
//! - Define **Dmons** (supervised long-lived queries)
//! - Define **Users** and **Views**, the security and isolation boundaries
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod cron;
pub mod dmon;
pub mod event;
pub mod macros;
pub mod mutation;
pub mod node;
pub mod tag;
pub mod trigger;
pub mod user;
pub mod view;
