#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod codec;
pub mod header;
pub mod packet;
pub mod red;
pub mod rtx;
pub mod sequence;

pub use header::{Extension, Header};
pub use packet::Packet;
