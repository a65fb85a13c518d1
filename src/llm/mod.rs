pub mod client;
pub mod structure;
pub mod types;

pub use client::*;
pub use structure::*;
pub use types::*;
