//! Session credentials: the current token, its wire grant, and redacted secrets.

pub mod secret;
pub mod token;

pub use secret::*;
pub use token::*;
