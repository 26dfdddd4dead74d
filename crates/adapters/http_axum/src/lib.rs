//! # nodehook-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve a **JSON API** under `/api` for managing users, views, triggers,
//!   cron jobs, macros and dmons, and for running ad-hoc queries
//! - Stream automation events to clients as **Server-Sent Events**
//! - Resolve the acting user from the `x-nodehook-user` header; every
//!   permission check happens in the application services
//!
//! ## Dependency rule
//! Depends on `nodehook-app` (for port traits and services) and
//! `nodehook-domain` (for domain types used in request/response mapping).
//! Never leaks axum types into the domain.

pub mod actor;
pub mod api;
pub mod error;
pub mod router;
pub mod state;
