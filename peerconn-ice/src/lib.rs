#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod agent;
pub mod candidate;
pub mod mdns;
pub mod network_type;
pub mod rand;
pub mod state;
pub mod url;

pub use agent::{agent_config::AgentConfig, Agent, Credentials, Event};
pub use candidate::{Candidate, CandidateType};
pub use state::ConnectionState;
