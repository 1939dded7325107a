// Backend API client: the endpoints of the booking service behind one trait,
// with a reqwest implementation and an in-memory backend for tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::payloads::{
    occupied_dates_from_values, AuthResponse, BookRoomBody, BookRoomResponse, Credentials,
    ErrorBody, OccupiedDatePayload, Registration,
};
use crate::ranges::{parse_date, RecordId};
use crate::rooms::{Room, RoomRef};
use crate::session::Session;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Dates already booked: {}", format_dates(.conflicts))]
    DatesConflict { conflicts: Vec<NaiveDate> },

    #[error("API error: {status_code} - {message}")]
    ApiResponseError {
        status_code: u16,
        message: String,
        is_retryable: bool,
    },

    #[error("Unexpected response body: {0}")]
    DecodeError(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

pub fn format_dates(dates: &[NaiveDate]) -> String {
    dates
        .iter()
        .map(NaiveDate::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
}

// Authenticated calls take the session explicitly
#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn list_rooms(&self) -> Result<Vec<Room>, ApiError>;

    async fn get_room(&self, room_ref: &RoomRef) -> Result<Room, ApiError>;

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError>;

    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError>;

    // One occupied-date row is created per day of the inclusive range
    async fn book_room(
        &self,
        session: &Session,
        room_id: u64,
        body: &BookRoomBody,
    ) -> Result<BookRoomResponse, ApiError>;

    async fn list_occupied_dates(
        &self,
        session: &Session,
    ) -> Result<Vec<OccupiedDatePayload>, ApiError>;

    async fn delete_occupied_date(&self, session: &Session, id: RecordId) -> Result<(), ApiError>;
}

// Map a non-success response to an error. The body is usually DRF style
// JSON (`{"detail": ...}`), optionally with the list of conflicting days.
pub fn error_from_status(status_code: u16, body: &str) -> ApiError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.detail.clone())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {}", status_code)
            } else {
                body.trim().to_string()
            }
        });

    // Conflict lists with no readable day fall back to the detail text
    let conflicts: Vec<NaiveDate> = parsed
        .map(|error_body| {
            error_body
                .conflicts
                .iter()
                .filter_map(|d| parse_date(d))
                .collect()
        })
        .unwrap_or_default();

    match status_code {
        400 | 409 if !conflicts.is_empty() => ApiError::DatesConflict { conflicts },
        401 | 403 => ApiError::Unauthorized(message),
        404 => ApiError::NotFound(message),
        _ => ApiError::ApiResponseError {
            status_code,
            message,
            is_retryable: status_code >= 500,
        },
    }
}

pub struct HttpBookingApi {
    config: ClientConfig,
    http: reqwest::Client,
    stats: Mutex<ClientStats>,
}

impl HttpBookingApi {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            config,
            http,
            stats: Mutex::new(ClientStats::default()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }

    // Paths are appended to the base url as is, so a base with a path
    // prefix (`https://host/api`) keeps it.
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let base = self.config.base_url.trim_end_matches('/');
        let joined = if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        };
        Url::parse(&joined).map_err(|e| ApiError::NetworkError(format!("bad url {}: {}", joined, e)))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        self.stats.lock().requests_sent += 1;

        let result = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Err(error_from_status(status, &body))
            }
            Err(e) if e.is_timeout() => Err(ApiError::Timeout(self.config.timeout_ms)),
            Err(e) => Err(ApiError::NetworkError(e.to_string())),
        };

        let mut stats = self.stats.lock();
        match &result {
            Ok(_) => stats.requests_succeeded += 1,
            Err(e) => {
                stats.requests_failed += 1;
                warn!(error = %e, "booking api request failed");
            }
        }
        result
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::NetworkError(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| ApiError::DecodeError(e.to_string()))
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    async fn list_rooms(&self) -> Result<Vec<Room>, ApiError> {
        let url = self.endpoint("/rooms/")?;
        debug!(%url, "listing rooms");
        decode(self.send(self.http.get(url)).await?).await
    }

    async fn get_room(&self, room_ref: &RoomRef) -> Result<Room, ApiError> {
        let url = self.endpoint(&room_ref.request_path())?;
        debug!(%url, "fetching room");
        decode(self.send(self.http.get(url)).await?).await
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        let url = self.endpoint("/login/")?;
        debug!(username = %credentials.username, "logging in");
        decode(self.send(self.http.post(url).json(credentials)).await?).await
    }

    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        let url = self.endpoint("/register/")?;
        debug!(username = %registration.username, "registering");
        decode(self.send(self.http.post(url).json(registration)).await?).await
    }

    async fn book_room(
        &self,
        session: &Session,
        room_id: u64,
        body: &BookRoomBody,
    ) -> Result<BookRoomResponse, ApiError> {
        let url = self.endpoint(&format!("/rooms/{}/book/", room_id))?;
        debug!(%url, from = %body.from_date, to = %body.to_date, "booking room");
        let request = self
            .http
            .post(url)
            .header(AUTHORIZATION, session.authorization())
            .json(body);
        decode(self.send(request).await?).await
    }

    async fn list_occupied_dates(
        &self,
        session: &Session,
    ) -> Result<Vec<OccupiedDatePayload>, ApiError> {
        let url = self.endpoint(&format!("/occupied-dates/?user={}", session.user().id))?;
        debug!(%url, "listing occupied dates");
        let request = self
            .http
            .get(url)
            .header(AUTHORIZATION, session.authorization());
        let rows: Vec<serde_json::Value> = decode(self.send(request).await?).await?;
        Ok(occupied_dates_from_values(rows))
    }

    async fn delete_occupied_date(&self, session: &Session, id: RecordId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/occupied-dates/{}/", id))?;
        debug!(%url, "deleting occupied date");
        let request = self
            .http
            .delete(url)
            .header(AUTHORIZATION, session.authorization());
        self.send(request).await.map(|_| ())
    }
}
