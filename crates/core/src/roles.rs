//! Well-known role name constants.
//!
//! These must match the `profiles.role` check constraint in
//! `20261019000001_create_profiles.sql`.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// Every role a profile may hold.
pub const VALID_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_USER];
