//! Rendezvous ("puncher") server for transhift.
//!
//! Downloaders register and receive a UID; an uploader presenting that UID is
//! introduced to the downloader and both sides receive each other's address.

mod error;
mod handler;
pub mod rendezvous;
pub mod server;

pub use error::{NotFoundError, PuncherError};
pub use handler::PendingDownloader;
pub use rendezvous::RendezvousTable;
pub use server::{DEFAULT_PORT, PuncherConfig, PuncherServer};
