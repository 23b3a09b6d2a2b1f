#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod description;
pub mod direction;
pub mod util;

pub use description::media::{MediaDescription, MediaName};
pub use description::session::SessionDescription;
pub use direction::Direction;
