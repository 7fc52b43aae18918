//! Identity extractors: [`auth::AuthUser`] and [`auth::RequireAdmin`].

pub mod auth;
