// Room model as served by the booking backend, plus the helpers the
// listing, reservation and "my bookings" views need on top of it.

use chrono::NaiveDate;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::payloads::OccupiedDatePayload;
use crate::ranges::parse_date;

// Opaque reference to a room resource. The backend hands these out as
// absolute hyperlinks (`http://host/rooms/1/`), but bare paths are accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomRef(String);

impl RoomRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn from_id(room_id: u64) -> Self {
        Self(format!("/rooms/{}/", room_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Absolute references keep only their path, with a trailing slash
    pub fn request_path(&self) -> String {
        match Url::parse(&self.0) {
            Ok(url) => {
                let path = url.path();
                if path.ends_with('/') {
                    path.to_string()
                } else {
                    format!("{}/", path)
                }
            }
            Err(_) if self.0.starts_with('/') => self.0.clone(),
            Err(_) => format!("/{}", self.0),
        }
    }

    // Numeric id when the path looks like `/rooms/<id>/`
    pub fn room_id(&self) -> Option<u64> {
        let path = self.request_path();
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        match (segments.next(), segments.next(), segments.next()) {
            (Some("rooms"), Some(id), None) => id.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for RoomRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// The backend's decimal fields come through either as JSON numbers or strings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PriceValue {
    Number(f64),
    Text(String),
}

impl PriceValue {
    pub fn amount(&self) -> Option<f64> {
        match self {
            PriceValue::Number(value) => Some(*value),
            PriceValue::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct RoomImage {
    pub id: Option<u64>,
    pub image: Option<String>,
    pub image_url: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub url: Option<RoomRef>,
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub room_type: Option<String>,
    pub price_per_night: Option<PriceValue>,
    pub currency: Option<String>,
    pub max_occupancy: Option<u32>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<RoomImage>,
    #[serde(default)]
    pub occupied_dates: Vec<OccupiedDatePayload>,
}

impl Room {
    pub fn reference(&self) -> RoomRef {
        self.url
            .clone()
            .unwrap_or_else(|| RoomRef::from_id(self.id))
    }

    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("Room {}", self.id)
        } else {
            self.name.clone()
        }
    }

    pub fn primary_image(&self) -> Option<&str> {
        self.images
            .first()
            .and_then(|image| image.image.as_deref().or(image.image_url.as_deref()))
    }

    pub fn nightly_price(&self) -> Option<f64> {
        self.price_per_night.as_ref().and_then(PriceValue::amount)
    }

    // Days in `from..=to` the room already lists as occupied, sorted and unique
    pub fn conflicts(&self, from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
        let mut taken: Vec<NaiveDate> = self
            .occupied_dates
            .iter()
            .filter_map(|occupied| occupied.date.as_deref().and_then(parse_date))
            .filter(|date| *date >= from && *date <= to)
            .collect();
        taken.sort();
        taken.dedup();
        taken
    }

    // One line summary used by the CLI listing
    pub fn summary(&self) -> String {
        let price = match (self.nightly_price(), self.currency.as_deref()) {
            (Some(amount), Some(currency)) => format!("{:.2} {}", amount, currency),
            (Some(amount), None) => format!("{:.2}", amount),
            _ => "price on request".to_string(),
        };
        let kind = self.room_type.as_deref().unwrap_or("room");
        match self.max_occupancy {
            Some(guests) => format!(
                "#{} {} ({}, up to {} guests) - {} per night",
                self.id,
                self.display_name(),
                kind,
                guests,
                price
            ),
            None => format!("#{} {} ({}) - {} per night", self.id, self.display_name(), kind, price),
        }
    }
}
