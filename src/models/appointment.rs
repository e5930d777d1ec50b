use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub slot_id: i64,
    pub subject_id: i64,
    pub requester_id: i64,
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub status: AppointmentStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => AppointmentStatus::Confirmed,
            "cancelled" => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Virtual,
    InPerson,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Virtual => "virtual",
            AppointmentType::InPerson => "in_person",
        }
    }

    /// Exact match only; the chat prompt asks for these literal words.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "virtual" => Some(AppointmentType::Virtual),
            "in_person" => Some(AppointmentType::InPerson),
            _ => None,
        }
    }
}

/// An upcoming appointment joined with its slot and provider, as listed to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentSummary {
    pub id: String,
    pub slot_id: i64,
    pub provider_id: i64,
    pub provider_name: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub status: AppointmentStatus,
}

impl AppointmentSummary {
    /// Start time as shown to users, e.g. `3:00 PM`.
    pub fn label(&self) -> String {
        super::format_time(self.start_time)
    }
}
