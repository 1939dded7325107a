// "My bookings": the signed-in user's occupied days, summarized as stays per
// room and decorated with room names, plus cancellation of a whole stay.

use chrono::NaiveDate;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::api::{ApiError, BookingApi};
use crate::ranges::{compress, group_by_room, DateRange, RecordId};
use crate::rooms::RoomRef;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeKey {
    pub room_ref: RoomRef,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl fmt::Display for RangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}..{}", self.room_ref, self.start_date, self.end_date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDetails {
    pub name: String,
    pub image: Option<String>,
}

impl RoomDetails {
    // What to show when the room itself could not be fetched
    fn fallback(room_ref: &RoomRef) -> Self {
        Self {
            name: room_ref.to_string(),
            image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingEntry {
    pub room_name: String,
    pub room_image: Option<String>,
    pub range: DateRange,
}

impl BookingEntry {
    pub fn key(&self) -> RangeKey {
        RangeKey {
            room_ref: self.range.room_ref.clone(),
            start_date: self.range.start_date,
            end_date: self.range.end_date,
        }
    }

    pub fn room_ref(&self) -> &RoomRef {
        &self.range.room_ref
    }

    pub fn days(&self) -> i64 {
        self.range.days()
    }
}

// A room whose records could not be turned into stays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsummarizedRoom {
    pub room_ref: RoomRef,
    pub room_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingList {
    pub entries: Vec<BookingEntry>,
    pub unsummarized: Vec<UnsummarizedRoom>,
}

impl BookingList {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.unsummarized.is_empty()
    }
}

// Room names and images for one load. Concurrent lookups of the same
// reference share a single request; a failed lookup leaves the slot empty so
// the next caller tries again.
pub struct RoomDirectory<'a> {
    api: &'a dyn BookingApi,
    cache: DashMap<RoomRef, Arc<OnceCell<RoomDetails>>>,
}

impl<'a> RoomDirectory<'a> {
    pub fn new(api: &'a dyn BookingApi) -> Self {
        Self {
            api,
            cache: DashMap::new(),
        }
    }

    pub async fn resolve(&self, room_ref: &RoomRef) -> RoomDetails {
        let slot = self.cache.entry(room_ref.clone()).or_default().clone();

        let fetched = slot
            .get_or_try_init(|| async {
                let room = self.api.get_room(room_ref).await?;
                Ok::<_, ApiError>(RoomDetails {
                    name: room.display_name(),
                    image: room.primary_image().map(str::to_string),
                })
            })
            .await;

        match fetched {
            Ok(details) => details.clone(),
            Err(e) => {
                warn!(room = %room_ref, error = %e, "could not fetch room details");
                RoomDetails::fallback(room_ref)
            }
        }
    }
}

// Rooms are resolved concurrently; the list is only returned once complete.
pub async fn load_bookings(
    api: &dyn BookingApi,
    session: &Session,
    max_concurrent_lookups: usize,
) -> Result<BookingList, ApiError> {
    let payloads = api.list_occupied_dates(session).await?;
    let record_count = payloads.len();
    let grouped = group_by_room(payloads);
    let directory = RoomDirectory::new(api);

    let resolved: Vec<_> = stream::iter(grouped)
        .map(|(room_ref, records)| {
            let directory = &directory;
            async move {
                let details = directory.resolve(&room_ref).await;
                let ranges = records.map(|records| compress(&records));
                (room_ref, details, ranges)
            }
        })
        .buffer_unordered(max_concurrent_lookups.max(1))
        .collect()
        .await;

    let mut list = BookingList::default();
    let mut seen = HashSet::new();
    for (room_ref, details, ranges) in resolved {
        match ranges {
            Ok(ranges) => {
                for range in ranges {
                    let entry = BookingEntry {
                        room_name: details.name.clone(),
                        room_image: details.image.clone(),
                        range,
                    };
                    if seen.insert(entry.key()) {
                        list.entries.push(entry);
                    }
                }
            }
            Err(e) => list.unsummarized.push(UnsummarizedRoom {
                room_ref,
                room_name: details.name,
                reason: e.to_string(),
            }),
        }
    }

    list.entries.sort_by(|a, b| {
        a.range
            .start_date
            .cmp(&b.range.start_date)
            .then_with(|| a.range.room_ref.cmp(&b.range.room_ref))
            .then_with(|| a.range.end_date.cmp(&b.range.end_date))
    });
    list.unsummarized.sort_by(|a, b| a.room_ref.cmp(&b.room_ref));

    info!(
        user = session.user().id,
        records = record_count,
        entries = list.entries.len(),
        unsummarized = list.unsummarized.len(),
        "bookings loaded"
    );
    Ok(list)
}

#[derive(Error, Debug)]
pub enum CancelError {
    #[error("No booking {0} in the current list")]
    NotFound(RangeKey),

    #[error("Already cancelling {0}")]
    Busy(RangeKey),

    #[error("Cancel failed at record {failed_id}, {} record(s) not removed: {source}", .not_removed.len())]
    Partial {
        failed_id: RecordId,
        deleted: Vec<RecordId>,
        not_removed: Vec<RecordId>,
        #[source]
        source: ApiError,
    },
}

// Clears the in-progress marker however the cancellation ends
struct CancelGuard<'a> {
    slot: &'a Mutex<Option<RangeKey>>,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

// The displayed list of bookings for one session.
pub struct MyBookings {
    list: RwLock<BookingList>,
    cancelling: Mutex<Option<RangeKey>>,
    max_concurrent_lookups: usize,
}

impl MyBookings {
    pub fn new(max_concurrent_lookups: usize) -> Self {
        Self {
            list: RwLock::new(BookingList::default()),
            cancelling: Mutex::new(None),
            max_concurrent_lookups,
        }
    }

    // Reload from the backend and swap the whole list in. On error the
    // previous list stays as it was.
    pub async fn refresh(&self, api: &dyn BookingApi, session: &Session) -> Result<usize, ApiError> {
        let list = load_bookings(api, session, self.max_concurrent_lookups).await?;
        let count = list.entries.len();
        *self.list.write() = list;
        Ok(count)
    }

    pub fn snapshot(&self) -> BookingList {
        self.list.read().clone()
    }

    pub fn entries(&self) -> Vec<BookingEntry> {
        self.list.read().entries.clone()
    }

    pub fn find(&self, key: &RangeKey) -> Option<BookingEntry> {
        self.list
            .read()
            .entries
            .iter()
            .find(|entry| entry.key() == *key)
            .cloned()
    }

    pub fn cancelling(&self) -> Option<RangeKey> {
        self.cancelling.lock().clone()
    }

    fn begin_cancel(&self, key: &RangeKey) -> Result<CancelGuard<'_>, CancelError> {
        let mut slot = self.cancelling.lock();
        if let Some(in_progress) = slot.as_ref() {
            return Err(CancelError::Busy(in_progress.clone()));
        }
        *slot = Some(key.clone());
        Ok(CancelGuard {
            slot: &self.cancelling,
        })
    }

    // Deletes the stay's records in turn and stops at the first failure.
    // Only a fully deleted stay leaves the list.
    pub async fn cancel(
        &self,
        api: &dyn BookingApi,
        session: &Session,
        key: &RangeKey,
    ) -> Result<BookingEntry, CancelError> {
        let entry = self
            .find(key)
            .ok_or_else(|| CancelError::NotFound(key.clone()))?;
        let _guard = self.begin_cancel(key)?;

        let member_ids = &entry.range.member_ids;
        let mut deleted = Vec::with_capacity(member_ids.len());
        for (index, id) in member_ids.iter().enumerate() {
            if let Err(source) = api.delete_occupied_date(session, *id).await {
                warn!(booking = %key, record = %id, error = %source, "cancel aborted");
                let not_removed = member_ids[index..].to_vec();
                // The listed stay keeps only the records still on the backend
                if let Some(listed) = self
                    .list
                    .write()
                    .entries
                    .iter_mut()
                    .find(|e| e.key() == *key)
                {
                    listed.range.member_ids = not_removed.clone();
                }
                return Err(CancelError::Partial {
                    failed_id: *id,
                    deleted,
                    not_removed,
                    source,
                });
            }
            deleted.push(*id);
        }

        self.list.write().entries.retain(|e| e.key() != *key);
        info!(booking = %key, records = deleted.len(), "booking cancelled");
        Ok(entry)
    }
}
