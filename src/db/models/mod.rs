//! Database models split into domain-specific modules.

pub mod appointment;
pub mod common;
pub mod job;
pub mod message;
pub mod profile;
pub mod proposal;
pub mod review;
pub mod service;
pub mod user;

pub use appointment::*;
pub use common::*;
pub use job::*;
pub use message::*;
pub use profile::*;
pub use proposal::*;
pub use review::*;
pub use service::*;
pub use user::*;
