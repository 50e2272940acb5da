//! Local model server for glbridge
//!
//! Holds the most recently published GLB in memory and serves it over a
//! small hyper-based HTTP surface so a browser preview can poll for updates.

pub mod artifact;
pub mod http;
pub mod server;
pub mod store;

pub use artifact::*;
pub use http::{handle, route, HttpError, Request, Response};
pub use server::*;
pub use store::*;
