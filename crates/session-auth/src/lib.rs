//! Session credentials and auth endpoint calls
//!
//! Holds the access/refresh token pair for the signed-in user and the wire
//! types and HTTP calls of the auth API. The request gateway reads and
//! writes tokens through the `CredentialStore` trait and exchanges refresh
//! tokens with `token::refresh_tokens`.
//!
//! Session flow:
//! 1. Login or signup response (`token::LoginResponse`) carries the initial pair
//! 2. Tokens stored via `CredentialStore::set_tokens()`
//! 3. Gateway attaches the access token to every request
//! 4. On 401 the gateway calls `token::refresh_tokens()` once
//! 5. New access token written back via `CredentialStore::set_access_token()`
//! 6. Unrecoverable refresh failure clears the store

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{Error, Result};
pub use token::{
    BaseResponse, CsrfTokenResponse, LoginData, LoginResponse, RefreshTokensResponse, SignupRequest,
    TokenInfo, Tokens, endpoint_url, refresh_tokens,
};
