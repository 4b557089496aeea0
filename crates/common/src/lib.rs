//! Types shared by the hextok auth crates and the server binary

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
