// JSON bodies exchanged with the booking backend

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use crate::ranges::RecordId;
use crate::rooms::RoomRef;

// One row of `/occupied-dates/`. Every field is optional on purpose: rows
// with holes are dropped one by one instead of failing the whole listing.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct OccupiedDatePayload {
    pub url: Option<String>,
    pub id: Option<RecordId>,
    pub room: Option<RoomRef>,
    pub user: Option<String>,
    pub date: Option<String>,
}

// Decode a listing row by row so one row of the wrong shape (say a string id)
// is dropped alone instead of failing the whole listing
pub fn occupied_dates_from_values(rows: Vec<Value>) -> Vec<OccupiedDatePayload> {
    rows.into_iter()
        .enumerate()
        .filter_map(
            |(index, row)| match serde_json::from_value::<OccupiedDatePayload>(row) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(row = index, error = %e, "skipping malformed occupied date");
                    None
                }
            },
        )
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
}

impl User {
    // Name shown next to a booking; the backend mirrors the email into username
    pub fn label(&self) -> &str {
        if !self.email.is_empty() {
            &self.email
        } else {
            &self.username
        }
    }
}

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// Login and registration answer with `{ user, token }`. Some auth setups
// send `key` instead of `token`, or the user fields at the top level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    pub user: Option<User>,
    pub token: Option<String>,
    pub key: Option<String>,
    pub id: Option<u64>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

impl AuthResponse {
    pub fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .or(self.key.as_deref())
            .filter(|token| !token.is_empty())
    }

    pub fn into_user(self) -> Option<User> {
        if let Some(user) = self.user {
            return Some(user);
        }
        if self.username.is_none() && self.email.is_none() {
            return None;
        }
        Some(User {
            id: self.id?,
            username: self.username.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            full_name: self.full_name.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookRoomBody {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CreatedDay {
    pub id: RecordId,
    pub room: u64,
    pub date: NaiveDate,
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BookRoomResponse {
    #[serde(default)]
    pub created: Vec<CreatedDay>,
    #[serde(default)]
    pub message: String,
}

// Error body of a rejected request, e.g. `{"detail": "Dates already booked", "conflicts": [...]}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    pub detail: Option<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
}
