use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::UnknownStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Reserved,
    Confirmed,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "available",
            SeatStatus::Reserved => "reserved",
            SeatStatus::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SeatStatus::Available),
            "reserved" => Ok(SeatStatus::Reserved),
            "confirmed" => Ok(SeatStatus::Confirmed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeatStateError {
    #[error("seat is not available")]
    NotAvailable,
    #[error("seat is not reserved")]
    NotReserved,
    #[error("seat number is required")]
    SeatNumberRequired,
    #[error("seat price must be positive")]
    InvalidPrice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub event_id: Uuid,
    pub seat_number: String,
    pub status: SeatStatus,
    /// Minor currency units.
    pub price: i64,
    pub reserved_by: Option<Uuid>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl Seat {
    pub fn new(event_id: Uuid, seat_number: impl Into<String>, price: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id,
            seat_number: seat_number.into(),
            status: SeatStatus::Available,
            price,
            reserved_by: None,
            reserved_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn validate(&self) -> Result<(), SeatStateError> {
        if self.seat_number.trim().is_empty() {
            return Err(SeatStateError::SeatNumberRequired);
        }
        if self.price <= 0 {
            return Err(SeatStateError::InvalidPrice);
        }
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.status == SeatStatus::Available
    }

    pub fn reserve(&mut self, reservation_id: Uuid, now: DateTime<Utc>) -> Result<(), SeatStateError> {
        if self.status != SeatStatus::Available {
            return Err(SeatStateError::NotAvailable);
        }
        self.status = SeatStatus::Reserved;
        self.reserved_by = Some(reservation_id);
        self.reserved_at = Some(now);
        self.touch(now);
        Ok(())
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<(), SeatStateError> {
        if self.status != SeatStatus::Reserved {
            return Err(SeatStateError::NotReserved);
        }
        self.status = SeatStatus::Confirmed;
        self.touch(now);
        Ok(())
    }

    /// Always succeeds; releasing an available seat is a no-op apart from the timestamp.
    pub fn release(&mut self, now: DateTime<Utc>) {
        self.status = SeatStatus::Available;
        self.reserved_by = None;
        self.reserved_at = None;
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}
