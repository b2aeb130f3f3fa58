use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub venue: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub total_seats: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl Event {
    pub fn new(
        name: impl Into<String>,
        venue: impl Into<String>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        total_seats: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            venue: venue.into(),
            start_at,
            end_at,
            total_seats,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Reservations are accepted until the event starts.
    pub fn is_booking_open(&self, now: DateTime<Utc>) -> bool {
        now < self.start_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn booking_closes_at_start() {
        let start = Utc::now() + Duration::hours(1);
        let event = Event::new("Concert", "Hall A", start, start + Duration::hours(2), 100);

        assert!(event.is_booking_open(start - Duration::seconds(1)));
        assert!(!event.is_booking_open(start));
        assert!(!event.is_booking_open(start + Duration::minutes(5)));
    }
}
