//! Common types shared by the session crates and the API client binary

mod secret;

pub use secret::Secret;
