//! Identity resolution for the event stream and the trigger API.
//!
//! The registry only ever sees the identity string; everything about how that
//! string is obtained lives here.

mod claims;
mod jwt;

pub use claims::Claims;
pub use jwt::{extract_token, JwtValidator};
