//! # nodehook-adapter-memory
//!
//! In-memory demo graph store. It implements the `QueryRuntime` port with a
//! minimal pipeline syntax so the engine can be run and tested end to end
//! without an external datastore.
//!
//! ## Query syntax
//!
//! | Example | Meaning |
//! |---------|---------|
//! | `inet:fqdn=vertex.link` | lift a node |
//! | `[ inet:fqdn=vertex.link ]` | create a node |
//! | `[ +#cno.mal ]` / `[ -#cno ]` | add / remove a tag |
//! | `[ :zone=link ]` | set a property |
//! | `+inet:fqdn` / `-#seen` | filter by form or tag |
//! | `delnode` | delete the nodes in the pipeline |
//! | `macro.exec enrich` | run a macro as the current user |
//! | `raise` | fail the query |
//!
//! Every edit is permission-checked against the running user and reported
//! to the execution context, which runs matching triggers inline.
//!
//! ## Dependency rule
//!
//! Depends on `nodehook-app` (port traits) and `nodehook-domain` only.

mod graph;
pub mod query;

pub use graph::{MemoryGraph, NodeData};
