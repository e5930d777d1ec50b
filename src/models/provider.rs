use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Open,
    Held,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Open => "open",
            SlotStatus::Held => "held",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "open" => SlotStatus::Open,
            _ => SlotStatus::Held,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: i64,
    pub provider_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: SlotStatus,
}

/// A provider as offered in a numbered list, with its earliest open slot if known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderOption {
    pub id: i64,
    pub name: String,
    pub next_open: Option<SlotOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotOption {
    pub id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

impl SlotOption {
    pub fn start_label(&self) -> String {
        format_time(self.start_time)
    }
}

/// Renders a time as `h:mm AM/PM` without a leading zero, e.g. `3:00 PM`.
pub fn format_time(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}
