//! The sandboxed command-pipeline executor.
//!
//! Data flows one way: raw string → tokenized stages → policy check → live
//! process chain → aggregated text result.  Nothing here touches the
//! filesystem; the only side effects are the child processes themselves.

pub mod error;
pub mod exec;
pub mod policy;
pub mod split;

pub use error::PipelineError;
pub use exec::{ExecutionResult, execute};
pub use policy::Policy;
pub use split::{Stage, split_and_tokenize};
