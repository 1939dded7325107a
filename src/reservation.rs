// Reserving a room for an inclusive date range

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use crate::api::{format_dates, ApiError, BookingApi};
use crate::payloads::BookRoomBody;
use crate::ranges::{parse_date, RecordId};
use crate::rooms::Room;
use crate::session::Session;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("from_date {from} must be before or equal to to_date {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
}

#[derive(Error, Debug)]
pub enum ReservationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Room {room_id} is already booked on {}", format_dates(.conflicts))]
    AlreadyBooked {
        room_id: u64,
        conflicts: Vec<NaiveDate>,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationRequest {
    from_date: NaiveDate,
    to_date: NaiveDate,
}

impl ReservationRequest {
    pub fn new(from_date: NaiveDate, to_date: NaiveDate) -> Result<Self, ValidationError> {
        if from_date > to_date {
            return Err(ValidationError::InvertedRange {
                from: from_date,
                to: to_date,
            });
        }
        Ok(Self { from_date, to_date })
    }

    pub fn parse(from: &str, to: &str) -> Result<Self, ValidationError> {
        let from_date =
            parse_date(from).ok_or_else(|| ValidationError::InvalidDate(from.to_string()))?;
        let to_date = parse_date(to).ok_or_else(|| ValidationError::InvalidDate(to.to_string()))?;
        Self::new(from_date, to_date)
    }

    pub fn from_date(&self) -> NaiveDate {
        self.from_date
    }

    pub fn to_date(&self) -> NaiveDate {
        self.to_date
    }

    // Both ends count: the backend stores one row per day
    pub fn days(&self) -> i64 {
        (self.to_date - self.from_date).num_days() + 1
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.from_date
            .iter_days()
            .take_while(move |date| *date <= self.to_date)
    }

    fn body(&self) -> BookRoomBody {
        BookRoomBody {
            from_date: self.from_date,
            to_date: self.to_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingConfirmation {
    pub room_id: u64,
    pub record_ids: Vec<RecordId>,
    pub dates: Vec<NaiveDate>,
    pub message: String,
}

// Days the room already lists as occupied are refused before any request
pub async fn reserve(
    api: &dyn BookingApi,
    session: &Session,
    room: &Room,
    request: &ReservationRequest,
) -> Result<BookingConfirmation, ReservationError> {
    let conflicts = room.conflicts(request.from_date, request.to_date);
    if !conflicts.is_empty() {
        return Err(ReservationError::AlreadyBooked {
            room_id: room.id,
            conflicts,
        });
    }

    let response = match api.book_room(session, room.id, &request.body()).await {
        Ok(response) => response,
        Err(ApiError::DatesConflict { conflicts }) => {
            return Err(ReservationError::AlreadyBooked {
                room_id: room.id,
                conflicts,
            })
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        room = room.id,
        from = %request.from_date,
        to = %request.to_date,
        days = response.created.len(),
        "room booked"
    );
    Ok(BookingConfirmation {
        room_id: room.id,
        record_ids: response.created.iter().map(|day| day.id).collect(),
        dates: response.created.iter().map(|day| day.date).collect(),
        message: response.message,
    })
}
