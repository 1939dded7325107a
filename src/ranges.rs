// Range compression: folds per-day occupied-date records into contiguous stays.
// The backend stores one row per reserved night; users think in stays.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::payloads::OccupiedDatePayload;
use crate::rooms::RoomRef;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid date {value:?} in occupied-date record {id}")]
    InvalidDate { id: RecordId, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupiedDateRecord {
    pub id: RecordId,
    pub room_ref: RoomRef,
    pub date: NaiveDate,
}

impl OccupiedDateRecord {
    pub fn new(id: RecordId, room_ref: RoomRef, date: NaiveDate) -> Self {
        Self { id, room_ref, date }
    }
}

// A maximal run of consecutive occupied days in one room.
// `member_ids` are in date order, ties in id order. Each day normally
// contributes one id; duplicate rows for a day contribute theirs too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub room_ref: RoomRef,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub member_ids: Vec<RecordId>,
}

impl DateRange {
    fn open(record: &OccupiedDateRecord) -> Self {
        Self {
            room_ref: record.room_ref.clone(),
            start_date: record.date,
            end_date: record.date,
            member_ids: vec![record.id],
        }
    }

    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    // True when both ranges belong to the same room and overlap or sit
    // back to back. Compressed output never has such a pair.
    pub fn touches(&self, other: &DateRange) -> bool {
        self.room_ref == other.room_ref
            && (self.start_date - other.end_date).num_days() <= 1
            && (other.start_date - self.end_date).num_days() <= 1
    }
}

// Records of one room into maximal contiguous ranges, in start order. A
// repeated day joins the open range as an extra member without extending it.
pub fn compress(records: &[OccupiedDateRecord]) -> Vec<DateRange> {
    let mut sorted: Vec<&OccupiedDateRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

    let mut sorted = sorted.into_iter();
    let Some(first) = sorted.next() else {
        return Vec::new();
    };
    debug_assert!(
        records.iter().all(|r| r.room_ref == first.room_ref),
        "compress expects the records of a single room"
    );

    let mut ranges = Vec::new();
    let mut current = DateRange::open(first);

    for record in sorted {
        match (record.date - current.end_date).num_days() {
            0 => current.member_ids.push(record.id),
            1 => {
                current.end_date = record.date;
                current.member_ids.push(record.id);
            }
            _ => ranges.push(std::mem::replace(&mut current, DateRange::open(record))),
        }
    }
    ranges.push(current);

    debug!(
        room = %first.room_ref,
        records = records.len(),
        ranges = ranges.len(),
        "compressed occupied dates"
    );
    ranges
}

// Compress records spanning any number of rooms. The result is ordered by
// start date across rooms, then by room reference.
pub fn compress_all(records: &[OccupiedDateRecord]) -> Vec<DateRange> {
    let mut by_room: BTreeMap<&RoomRef, Vec<OccupiedDateRecord>> = BTreeMap::new();
    for record in records {
        by_room
            .entry(&record.room_ref)
            .or_default()
            .push(record.clone());
    }

    let mut ranges: Vec<DateRange> = by_room
        .values()
        .flat_map(|room_records| compress(room_records))
        .collect();
    ranges.sort_by(|a, b| {
        a.start_date
            .cmp(&b.start_date)
            .then_with(|| a.room_ref.cmp(&b.room_ref))
    });
    ranges
}

// Rows missing an id, room or date are skipped one by one. An unparseable
// date fails its whole room and leaves the other rooms alone.
pub fn group_by_room(
    payloads: Vec<OccupiedDatePayload>,
) -> BTreeMap<RoomRef, Result<Vec<OccupiedDateRecord>, RangeError>> {
    let mut grouped: BTreeMap<RoomRef, Result<Vec<OccupiedDateRecord>, RangeError>> =
        BTreeMap::new();

    for payload in payloads {
        let (Some(id), Some(room_ref), Some(value)) = (payload.id, payload.room, payload.date)
        else {
            warn!(url = ?payload.url, "skipping occupied-date record with missing fields");
            continue;
        };
        if room_ref.as_str().is_empty() || value.trim().is_empty() {
            warn!(%id, "skipping occupied-date record with empty room or date");
            continue;
        }

        let slot = grouped
            .entry(room_ref.clone())
            .or_insert_with(|| Ok(Vec::new()));
        if slot.is_err() {
            continue;
        }
        match parse_date(&value) {
            Some(date) => {
                if let Ok(records) = slot {
                    records.push(OccupiedDateRecord::new(id, room_ref, date));
                }
            }
            None => {
                warn!(%id, room = %room_ref, value = %value, "unparseable occupied date");
                *slot = Err(RangeError::InvalidDate { id, value });
            }
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::{thread_rng, Rng};
    use test_case::test_case;

    const ROOM: &str = "http://127.0.0.1:8000/rooms/1/";

    fn date(value: &str) -> NaiveDate {
        parse_date(value).unwrap()
    }

    // ids are assigned 1, 2, 3... in the given order
    fn records(dates: &[&str]) -> Vec<OccupiedDateRecord> {
        dates
            .iter()
            .enumerate()
            .map(|(i, d)| OccupiedDateRecord::new(RecordId(i as u64 + 1), RoomRef::new(ROOM), date(d)))
            .collect()
    }

    fn ids(values: &[u64]) -> Vec<RecordId> {
        values.iter().copied().map(RecordId).collect()
    }

    fn spans(ranges: &[DateRange]) -> Vec<(String, String, Vec<u64>)> {
        ranges
            .iter()
            .map(|r| {
                (
                    r.start_date.to_string(),
                    r.end_date.to_string(),
                    r.member_ids.iter().map(|id| id.0).collect(),
                )
            })
            .collect()
    }

    fn assert_maximal(ranges: &[DateRange]) {
        for pair in ranges.windows(2) {
            assert!(
                !pair[0].touches(&pair[1]),
                "ranges {:?} and {:?} should have been merged",
                pair[0],
                pair[1]
            );
            assert!(pair[0].start_date < pair[1].start_date);
        }
        for range in ranges {
            assert!(range.end_date >= range.start_date);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(compress(&[]).is_empty());
        assert!(compress_all(&[]).is_empty());
    }

    #[test]
    fn test_single_record() {
        let ranges = compress(&records(&["2024-01-01"]));

        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start_date, date("2024-01-01"));
        assert_eq!(ranges[0].end_date, date("2024-01-01"));
        assert_eq!(ranges[0].member_ids, ids(&[1]));
        assert_eq!(ranges[0].days(), 1);
    }

    #[test_case(&["2024-01-01", "2024-01-02", "2024-01-03"],
        vec![("2024-01-01", "2024-01-03", vec![1, 2, 3])]; "consecutive days merge")]
    #[test_case(&["2024-01-01", "2024-01-03"],
        vec![("2024-01-01", "2024-01-01", vec![1]), ("2024-01-03", "2024-01-03", vec![2])]; "gap splits")]
    #[test_case(&["2024-01-05", "2024-01-01", "2024-01-02", "2024-01-06"],
        vec![("2024-01-01", "2024-01-02", vec![2, 3]), ("2024-01-05", "2024-01-06", vec![1, 4])]; "unsorted input")]
    #[test_case(&["2024-02-28", "2024-02-29", "2024-03-01"],
        vec![("2024-02-28", "2024-03-01", vec![1, 2, 3])]; "leap day")]
    #[test_case(&["2023-12-31", "2024-01-01"],
        vec![("2023-12-31", "2024-01-01", vec![1, 2])]; "year boundary")]
    fn test_compress_cases(dates: &[&str], expected: Vec<(&str, &str, Vec<u64>)>) {
        let ranges = compress(&records(dates));
        let expected: Vec<(String, String, Vec<u64>)> = expected
            .into_iter()
            .map(|(from, to, members)| (from.to_string(), to.to_string(), members))
            .collect();

        assert_eq!(spans(&ranges), expected);
        assert_maximal(&ranges);
    }

    // Duplicate days are folded into the range that covers them
    #[test]
    fn test_duplicate_dates_are_deduplicated() {
        let ranges = compress(&records(&["2024-01-01", "2024-01-01"]));

        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start_date, date("2024-01-01"));
        assert_eq!(ranges[0].end_date, date("2024-01-01"));
        assert_eq!(ranges[0].member_ids, ids(&[1, 2]));
        assert_eq!(ranges[0].days(), 1);
    }

    #[test]
    fn test_duplicate_inside_run_keeps_range_whole() {
        let ranges = compress(&records(&[
            "2024-01-02",
            "2024-01-01",
            "2024-01-02",
            "2024-01-03",
        ]));

        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].end_date, date("2024-01-03"));
        assert_eq!(ranges[0].member_ids, ids(&[2, 1, 3, 4]));
        assert_eq!(ranges[0].days(), 3);
    }

    #[test]
    fn test_sort_invariance() {
        let mut rng = thread_rng();
        let mut input = records(&[
            "2024-05-01",
            "2024-05-02",
            "2024-05-04",
            "2024-05-05",
            "2024-05-06",
            "2024-05-10",
            "2024-05-10",
        ]);
        let expected = compress(&input);

        for _ in 0..20 {
            input.shuffle(&mut rng);
            assert_eq!(compress(&input), expected);
        }

        let mut sorted = input.clone();
        sorted.sort_by_key(|r| (r.date, r.id));
        assert_eq!(compress(&sorted), expected);
    }

    #[test]
    fn test_random_inputs_are_maximal_and_complete() {
        let mut rng = thread_rng();
        let base = date("2024-01-01");

        for _ in 0..50 {
            let count = rng.gen_range(1..60);
            let input: Vec<OccupiedDateRecord> = (0..count)
                .map(|i| {
                    OccupiedDateRecord::new(
                        RecordId(i),
                        RoomRef::new(ROOM),
                        base + chrono::Duration::days(rng.gen_range(0..90)),
                    )
                })
                .collect();

            let ranges = compress(&input);
            assert_maximal(&ranges);

            // every record lands in exactly one range, inside its span
            let members: usize = ranges.iter().map(|r| r.member_ids.len()).sum();
            assert_eq!(members, input.len());
            for record in &input {
                let owner: Vec<&DateRange> = ranges
                    .iter()
                    .filter(|r| r.member_ids.contains(&record.id))
                    .collect();
                assert_eq!(owner.len(), 1);
                assert!(owner[0].contains(record.date));
            }
        }
    }

    #[test]
    fn test_compress_all_orders_across_rooms() {
        let room_a = RoomRef::new("http://127.0.0.1:8000/rooms/1/");
        let room_b = RoomRef::new("http://127.0.0.1:8000/rooms/2/");
        let input = vec![
            OccupiedDateRecord::new(RecordId(1), room_a.clone(), date("2024-06-10")),
            OccupiedDateRecord::new(RecordId(2), room_b.clone(), date("2024-06-01")),
            OccupiedDateRecord::new(RecordId(3), room_a.clone(), date("2024-06-11")),
            OccupiedDateRecord::new(RecordId(4), room_b.clone(), date("2024-06-02")),
            OccupiedDateRecord::new(RecordId(5), room_a.clone(), date("2024-06-01")),
        ];

        let ranges = compress_all(&input);
        let summary: Vec<(&RoomRef, String, usize)> = ranges
            .iter()
            .map(|r| (&r.room_ref, r.start_date.to_string(), r.member_ids.len()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (&room_a, "2024-06-01".to_string(), 1),
                (&room_b, "2024-06-01".to_string(), 2),
                (&room_a, "2024-06-10".to_string(), 2),
            ]
        );
    }

    fn payload(id: Option<u64>, room: Option<&str>, date: Option<&str>) -> OccupiedDatePayload {
        OccupiedDatePayload {
            url: id.map(|id| format!("http://127.0.0.1:8000/occupied-dates/{}/", id)),
            id: id.map(RecordId),
            room: room.map(RoomRef::new),
            user: Some("http://127.0.0.1:8000/users/1/".to_string()),
            date: date.map(str::to_string),
        }
    }

    #[test]
    fn test_group_skips_incomplete_records() {
        let grouped = group_by_room(vec![
            payload(Some(1), Some(ROOM), Some("2024-01-01")),
            payload(None, Some(ROOM), Some("2024-01-02")),
            payload(Some(3), None, Some("2024-01-03")),
            payload(Some(4), Some(ROOM), None),
            payload(Some(5), Some(ROOM), Some("  ")),
            payload(Some(6), Some(ROOM), Some("2024-01-02")),
        ]);

        assert_eq!(grouped.len(), 1);
        let records = grouped[&RoomRef::new(ROOM)].as_ref().unwrap();
        let kept: Vec<u64> = records.iter().map(|r| r.id.0).collect();
        assert_eq!(kept, vec![1, 6]);
        assert_eq!(spans(&compress(records)).len(), 1);
    }

    #[test]
    fn test_group_invalid_date_fails_only_its_room() {
        let other = "http://127.0.0.1:8000/rooms/2/";
        let grouped = group_by_room(vec![
            payload(Some(1), Some(ROOM), Some("2024-01-01")),
            payload(Some(2), Some(ROOM), Some("2024-13-45")),
            payload(Some(3), Some(ROOM), Some("2024-01-02")),
            payload(Some(4), Some(other), Some("2024-01-05")),
        ]);

        assert_eq!(
            grouped[&RoomRef::new(ROOM)],
            Err(RangeError::InvalidDate {
                id: RecordId(2),
                value: "2024-13-45".to_string()
            })
        );
        let other_records = grouped[&RoomRef::new(other)].as_ref().unwrap();
        assert_eq!(other_records.len(), 1);
    }

    #[test]
    fn test_touches() {
        let ranges = compress(&records(&["2024-01-01", "2024-01-02", "2024-01-04"]));
        assert_eq!(ranges.len(), 2);
        assert!(!ranges[0].touches(&ranges[1]));

        let mut shifted = ranges[1].clone();
        shifted.start_date = date("2024-01-03");
        assert!(ranges[0].touches(&shifted));

        shifted.room_ref = RoomRef::new("/rooms/9/");
        assert!(!ranges[0].touches(&shifted));
    }
}
