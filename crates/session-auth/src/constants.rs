//! Auth API endpoint paths
//!
//! Paths are relative and joined onto the configured API base URL with
//! `token::endpoint_url`.

/// Password sign-in
pub const LOGIN_PATH: &str = "api/auth/login";

/// Account registration
pub const SIGNUP_PATH: &str = "api/auth/register";

/// Sends a one-time code for a password reset
pub const FORGOT_PASSWORD_PATH: &str = "api/auth/forgot-password";

/// Sets a new password using a one-time code
pub const RESET_PASSWORD_PATH: &str = "api/auth/reset-password";

/// Confirms a one-time code
pub const VERIFY_OTP_PATH: &str = "api/auth/verify-otp";

/// Sends a fresh one-time code
pub const RESEND_OTP_PATH: &str = "api/auth/resend-otp";

/// Exchanges a refresh token for a new token pair
pub const REFRESH_TOKEN_PATH: &str = "api/auth/refresh-token";

/// Issues the anti-forgery token attached as `X-CSRF-Token`
pub const CSRF_TOKEN_PATH: &str = "api/auth/csrf-token";

/// Ends the server-side session
pub const LOGOUT_PATH: &str = "api/auth/logout";

/// Header carrying the anti-forgery token
pub const CSRF_HEADER: &str = "x-csrf-token";
