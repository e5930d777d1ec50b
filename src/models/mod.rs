pub mod account;
pub mod appointment;
pub mod intent;
pub mod provider;
pub mod session;

pub use account::{Account, Role, Subject};
pub use appointment::{Appointment, AppointmentStatus, AppointmentSummary, AppointmentType};
pub use intent::{Entities, Extraction, Intent};
pub use provider::{format_time, ProviderOption, Slot, SlotOption, SlotStatus};
pub use session::{DialogState, Draft, ModifyAction, Session};
