//! Policy-gated shell toolbelt for LLM agents.
//!
//! The core is the sandboxed command-pipeline executor in [`pipeline`]: it
//! splits an untrusted command string into stages, validates every stage
//! against a whitelist of read-only command prefixes, and runs the stages as
//! a connected process chain under a wall-clock timeout.  The [`tools`]
//! dispatcher layers the agent-facing operations (shell, reliability
//! bookkeeping, log analytics, memory writes) on top.

pub mod config;
pub mod paths;
pub mod pipeline;
pub mod tools;
