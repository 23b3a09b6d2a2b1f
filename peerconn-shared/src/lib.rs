#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod crypto;
pub mod error;
pub mod handler;
pub mod replay_detector;
pub mod time;
pub(crate) mod transport;
pub mod util;

pub use transport::{
    EcnCodepoint, FourTuple, TaggedBytesMut, TransportContext, TransportMessage, TransportProtocol,
};
