//! Data models for the forum backend.
//!
//! Field names serialize in camelCase to match the web client.

mod category;
mod message;
mod tag;
mod topic;
mod user;

pub use category::*;
pub use message::*;
pub use tag::*;
pub use topic::*;
pub use user::*;
