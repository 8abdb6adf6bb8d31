#![doc(html_root_url = "https://docs.rs/mono-client/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Client runtime for server-driven UI.
//!
//! The server owns the application state and renders HTML. This crate only
//!
//! - reports user interaction inside a session root to the server ([`events`]), and
//! - applies the path-addressed DOM mutations the server sends back ([`diff`]),
//!
//! driven by a long-poll loop ([`session`]) over a pluggable [`transport`].
//!
//! All DOM access goes through the [`platform::Dom`] trait. On `wasm32` the [`web`] module binds it to the live browser document;
//! [`mem`] provides an in-memory tree that runs anywhere.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod addressing;
pub mod config;
pub mod diff;
pub mod events;
pub mod flash;
pub mod mem;
pub mod platform;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod window;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use addressing::{AddressingError, Path};
pub use config::Config;
pub use diff::{DiffError, Updater};
pub use platform::{Dom, Host, ScriptSink, Timers};
pub use protocol::{AttrKind, Diff, Directive, InEvent};
pub use session::{Session, SessionEnd, SessionError, SessionState};
pub use transport::{Transport, TransportError};
