//! Profile entity model and DTOs.

use atelier_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Full row from the `profiles` table.
///
/// Contains the password hash -- NEVER serialize this to API responses directly.
/// Use [`ProfileResponse`] for external-facing output.
#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub id: DbId,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub credits: i32,
    pub password_hash: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Safe profile representation for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileResponse {
    pub id: DbId,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub credits: i32,
    pub created_at: Timestamp,
}

impl From<&Profile> for ProfileResponse {
    fn from(p: &Profile) -> Self {
        Self {
            id: p.id,
            email: p.email.clone(),
            display_name: p.display_name.clone(),
            role: p.role.clone(),
            credits: p.credits,
            created_at: p.created_at,
        }
    }
}

/// DTO for creating a profile at signup.
#[derive(Debug)]
pub struct CreateProfile {
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: String,
}

/// Admin-only profile changes. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfile {
    pub credits: Option<i32>,
    pub role: Option<String>,
}
