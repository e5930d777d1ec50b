use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Schedule,
    Reschedule,
    Cancel,
    ViewAppointments,
    ShowTherapists,
    Greet,
}

impl Intent {
    /// Menu commands: the intent vocabulary typed verbatim.
    pub fn from_command(s: &str) -> Option<Self> {
        match s {
            "schedule" => Some(Intent::Schedule),
            "reschedule" => Some(Intent::Reschedule),
            "cancel" => Some(Intent::Cancel),
            "view_appointments" => Some(Intent::ViewAppointments),
            "show_therapists" => Some(Intent::ShowTherapists),
            "greet" => Some(Intent::Greet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Entities {
    pub provider_name: Option<String>,
    pub date: Option<NaiveDate>,
    /// Canonical `h:mm AM/PM`, e.g. `3:00 PM`.
    pub time: Option<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.provider_name.is_none() && self.date.is_none() && self.time.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Extraction {
    pub intent: Option<Intent>,
    pub entities: Entities,
}
