mod client;
mod line_protocol;
mod point;

pub use client::*;
pub use line_protocol::*;
pub use point::*;
