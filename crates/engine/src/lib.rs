//! The sync session.
//!
//! A [`Session`] ties the other crates together for one connection with
//! Calibre:
//!
//! 1. [`Session::open`] identifies the device, replays updates deferred by the
//!    previous run and reconciles Calibre's cache against Nickel's catalog,
//! 2. the protocol driver lists, sends, fetches and deletes books through it,
//! 3. [`Session::finish`] waits for cover generation and writes everything
//!    that changed to the catalog.
//!
//! Talking to Calibre itself is the driver's job; nothing here touches the
//! network.

mod client;
pub mod error;
mod outcome;
mod session;

pub use crate::client::{BookListing, ClientOptions};
pub use crate::outcome::{Outcome, ReturnCode, SessionEnd, Summary};
pub use crate::session::{SavedBook, Session, apply_deferred};
