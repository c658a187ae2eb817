//! TCP decision service exposing the rule set to other processes.

mod server;
mod service;

pub use server::DecisionServer;
pub use service::{CheckResponse, Command, DecisionService};
