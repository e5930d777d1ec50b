pub mod booking;
pub mod dialogue;
pub mod identity;
pub mod nlu;
pub mod notify;
pub mod sessions;
