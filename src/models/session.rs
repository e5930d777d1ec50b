use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Account, AppointmentSummary, AppointmentType, ProviderOption, SlotOption, Subject};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModifyAction {
    Reschedule,
    Cancel,
}

impl ModifyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModifyAction::Reschedule => "reschedule",
            ModifyAction::Cancel => "cancel",
        }
    }
}

/// Where a conversation stands. Variants that wait on a numbered choice carry
/// the list that was rendered, so a selection always indexes what the user saw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DialogState {
    AwaitingIdentity,
    SelectingSubject {
        subjects: Vec<Subject>,
    },
    AwaitingSecret,
    /// Home state. `offered` is the provider list from the last `show_therapists`.
    Verified {
        offered: Vec<ProviderOption>,
    },
    SelectingProvider {
        providers: Vec<ProviderOption>,
    },
    SelectingDate {
        dates: Vec<NaiveDate>,
    },
    SelectingSlot {
        slots: Vec<SlotOption>,
    },
    SelectingAppointmentType,
    EnteringReason,
    ConfirmingBooking,
    SelectingAppointmentToModify {
        action: ModifyAction,
        appointments: Vec<AppointmentSummary>,
    },
    ConfirmingCancellation {
        appointment: AppointmentSummary,
    },
}

impl DialogState {
    pub fn verified() -> Self {
        DialogState::Verified {
            offered: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DialogState::AwaitingIdentity => "awaiting_identity",
            DialogState::SelectingSubject { .. } => "selecting_subject",
            DialogState::AwaitingSecret => "awaiting_secret",
            DialogState::Verified { .. } => "verified",
            DialogState::SelectingProvider { .. } => "selecting_provider",
            DialogState::SelectingDate { .. } => "selecting_date",
            DialogState::SelectingSlot { .. } => "selecting_slot",
            DialogState::SelectingAppointmentType => "selecting_appointment_type",
            DialogState::EnteringReason => "entering_reason",
            DialogState::ConfirmingBooking => "confirming_booking",
            DialogState::SelectingAppointmentToModify {
                action: ModifyAction::Reschedule,
                ..
            } => "selecting_appointment_to_modify[reschedule]",
            DialogState::SelectingAppointmentToModify {
                action: ModifyAction::Cancel,
                ..
            } => "selecting_appointment_to_modify[cancel]",
            DialogState::ConfirmingCancellation { .. } => "confirming_cancellation",
        }
    }
}

/// In-progress booking selections. Cleared whenever the conversation returns home.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Draft {
    pub provider: Option<ProviderOption>,
    pub date: Option<NaiveDate>,
    pub slot: Option<SlotOption>,
    pub appointment_type: Option<AppointmentType>,
    pub reason: Option<String>,
    /// Set when the draft reschedules an existing appointment instead of creating one.
    pub replacing: Option<AppointmentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub state: DialogState,
    pub requester: Option<Account>,
    pub verified: bool,
    pub subject: Option<Subject>,
    pub first_name: String,
    pub has_greeted: bool,
    pub draft: Draft,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: DialogState::AwaitingIdentity,
            requester: None,
            verified: false,
            subject: None,
            first_name: "there".to_string(),
            has_greeted: false,
            draft: Draft::default(),
        }
    }

    /// Drops the draft and parks the conversation in the home state.
    pub fn return_home(&mut self) {
        self.draft = Draft::default();
        self.state = DialogState::verified();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_awaits_identity() {
        let session = Session::new("abc");
        assert_eq!(session.state, DialogState::AwaitingIdentity);
        assert!(!session.verified);
        assert!(!session.has_greeted);
        assert_eq!(session.draft, Draft::default());
    }

    #[test]
    fn test_return_home_clears_draft() {
        let mut session = Session::new("abc");
        session.state = DialogState::EnteringReason;
        session.draft.reason = Some("checkup".to_string());
        session.return_home();
        assert_eq!(session.state.name(), "verified");
        assert!(session.draft.reason.is_none());
    }
}
