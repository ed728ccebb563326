//! Accounts and sessions.
//!
//! Users register with email, password and name. Logging in opens a
//! server-side session whose bearer token is handed to the client as an
//! HttpOnly `token` cookie (and in the body for non-browser clients).
//! Protected handlers take an [`AuthUser`] argument.

mod extract;
mod handler;
mod lib;
mod routes;

pub use extract::{AuthUser, token_from_headers};
pub use lib::*;
pub use routes::routes;

pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[("auth_001_schema.sql", include_str!("migrations/001_schema.sql"))]
}
