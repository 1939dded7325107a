// Client library for the room booking service

pub mod api;
pub mod bookings;
pub mod config;
pub mod payloads;
pub mod ranges;
pub mod reservation;
pub mod rooms;
pub mod session;

// Re-export key types for convenience
pub use api::{ApiError, BookingApi, ClientError, ClientStats, HttpBookingApi};
pub use bookings::{
    load_bookings, BookingEntry, BookingList, CancelError, MyBookings, RangeKey, UnsummarizedRoom,
};
pub use config::ClientConfig;
pub use payloads::{Credentials, Registration, User};
pub use ranges::{compress, compress_all, DateRange, OccupiedDateRecord, RangeError, RecordId};
pub use reservation::{reserve, BookingConfirmation, ReservationError, ReservationRequest};
pub use rooms::{Room, RoomRef};
pub use session::Session;
