//! Shared types for Postern.
//!
//! This crate defines the two types that cross every layer of the workspace:
//!
//! - [`Token`] — a 128-bit opaque bearer secret with a strict hex codec and
//!   constant-time equality.
//! - [`ConnInfo`] — the `{type, info}` envelope that names a driver and
//!   carries its opaque connection payload.

mod conn_info;
mod token;

pub use conn_info::ConnInfo;
pub use token::{InvalidTokenError, TOKEN_LEN, Token};
