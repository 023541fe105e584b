//! Availability slots for bookable services.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::{MarketError, MarketResult};
use crate::config::ScheduleConfig;
use crate::db::Appointment;
use crate::store::MarketStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Daily bookable window in UTC, split into equal slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    pub start_hour: u32,
    pub end_hour: u32,
    pub slot_minutes: u32,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 18,
            slot_minutes: 60,
        }
    }
}

impl From<&ScheduleConfig> for WorkingHours {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            start_hour: config.day_start_hour,
            end_hour: config.day_end_hour,
            slot_minutes: config.slot_minutes,
        }
    }
}

impl WorkingHours {
    /// `[open, close)` on `date`
    pub fn window(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let midnight = date.and_time(NaiveTime::MIN).and_utc();
        (
            midnight + Duration::hours(i64::from(self.start_hour)),
            midnight + Duration::hours(i64::from(self.end_hour)),
        )
    }

    /// Every slot of the day, booked or not
    pub fn slots(&self, date: NaiveDate) -> Vec<Slot> {
        let (open, close) = self.window(date);
        let step = Duration::minutes(i64::from(self.slot_minutes.max(1)));

        let mut slots = Vec::new();
        let mut start = open;
        while start + step <= close {
            slots.push(Slot {
                start_time: start,
                end_time: start + step,
            });
            start += step;
        }
        slots
    }
}

/// Slots of `date` that overlap no non-canceled appointment
pub fn available_slots(
    hours: &WorkingHours,
    date: NaiveDate,
    appointments: &[Appointment],
) -> Vec<Slot> {
    let booked: Vec<(DateTime<Utc>, DateTime<Utc>)> = appointments
        .iter()
        .filter(|a| a.get_status().blocks_schedule())
        .filter_map(|a| a.interval())
        .collect();

    hours
        .slots(date)
        .into_iter()
        .filter(|slot| {
            !booked
                .iter()
                .any(|&(start, end)| slot.start_time < end && start < slot.end_time)
        })
        .collect()
}

pub struct SlotCalculator {
    store: Arc<dyn MarketStore>,
    hours: WorkingHours,
}

impl SlotCalculator {
    pub fn new(store: Arc<dyn MarketStore>, hours: WorkingHours) -> Self {
        Self { store, hours }
    }

    pub fn working_hours(&self) -> WorkingHours {
        self.hours
    }

    pub async fn available_slots(
        &self,
        service_id: &str,
        date: NaiveDate,
    ) -> MarketResult<Vec<Slot>> {
        if self.store.get_service(service_id).await?.is_none() {
            return Err(MarketError::NotFound("Service"));
        }

        let (open, close) = self.hours.window(date);
        let appointments = self
            .store
            .list_service_appointments_between(service_id, open, close)
            .await?;

        Ok(available_slots(&self.hours, date, &appointments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
    }

    fn at(d: u32, hour: u32, minute: u32) -> String {
        Utc.with_ymd_and_hms(2026, 3, d, hour, minute, 0)
            .unwrap()
            .to_rfc3339()
    }

    fn appointment(start: String, end: String, status: &str) -> Appointment {
        Appointment {
            id: "a".into(),
            service_id: "s".into(),
            client_id: "c".into(),
            start_time: start,
            end_time: end,
            status: status.into(),
            notes: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn start_hours(slots: &[Slot]) -> Vec<u32> {
        use chrono::Timelike;
        slots.iter().map(|s| s.start_time.hour()).collect()
    }

    #[test]
    fn test_empty_day_has_ten_hourly_slots() {
        let slots = available_slots(&WorkingHours::default(), day(), &[]);
        assert_eq!(slots.len(), 10);
        assert_eq!(start_hours(&slots), (8..18).collect::<Vec<_>>());
        assert!(slots.windows(2).all(|w| w[0].end_time == w[1].start_time));
    }

    #[test]
    fn test_confirmed_booking_blocks_its_slot_until_canceled() {
        let hours = WorkingHours::default();
        let booked = appointment(at(9, 10, 0), at(9, 11, 0), "confirmed");
        let slots = available_slots(&hours, day(), &[booked]);
        assert_eq!(slots.len(), 9);
        assert!(!start_hours(&slots).contains(&10));

        let canceled = appointment(at(9, 10, 0), at(9, 11, 0), "canceled");
        let slots = available_slots(&hours, day(), &[canceled]);
        assert_eq!(slots.len(), 10);
        assert!(start_hours(&slots).contains(&10));
    }

    #[test]
    fn test_partial_overlap_blocks_both_slots() {
        let booked = appointment(at(9, 13, 30), at(9, 14, 30), "pending");
        let slots = available_slots(&WorkingHours::default(), day(), &[booked]);
        assert_eq!(slots.len(), 8);
        assert!(!start_hours(&slots).contains(&13));
        assert!(!start_hours(&slots).contains(&14));
    }

    #[test]
    fn test_fully_booked_day_is_empty() {
        let booked = appointment(at(9, 8, 0), at(9, 18, 0), "completed");
        assert!(available_slots(&WorkingHours::default(), day(), &[booked]).is_empty());
    }

    #[test]
    fn test_booking_from_previous_day_blocks_morning() {
        let overnight = appointment(at(8, 22, 0), at(9, 9, 0), "confirmed");
        let slots = available_slots(&WorkingHours::default(), day(), &[overnight]);
        assert_eq!(start_hours(&slots).first(), Some(&9));
    }

    #[test]
    fn test_half_hour_slots() {
        let hours = WorkingHours {
            start_hour: 9,
            end_hour: 12,
            slot_minutes: 30,
        };
        let slots = available_slots(&hours, day(), &[]);
        assert_eq!(slots.len(), 6);
        assert_eq!(
            slots[1].start_time,
            Utc.with_ymd_and_hms(2026, 3, 9, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_slot_serializes_camel_case() {
        let slot = WorkingHours::default().slots(day())[0];
        let value = serde_json::to_value(slot).unwrap();
        assert_eq!(value["startTime"], "2026-03-09T08:00:00Z");
        assert_eq!(value["endTime"], "2026-03-09T09:00:00Z");
    }
}
