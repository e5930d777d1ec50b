use chrono::NaiveDate;

use crate::models::{AppointmentSummary, AppointmentType, ProviderOption, SlotOption, Subject};

const MENU: &str = "'show therapists' to see who's available, 'schedule' to book an appointment, 'view appointments' to check your upcoming ones, or 'reschedule' or 'cancel' to manage them";

pub const START: &str =
    "Hey there! I'm the Therapy Clinic Chatbot. Can you give me your email (username) to get started?";
pub const UNKNOWN_ACCOUNT: &str = "Hmm, that username doesn't seem right, or your account can't book appointments here. Can you try again?";
pub const NO_DEPENDENTS: &str = "Looks like you haven't registered anyone to book for yet. You can add a dependent by logging into your account.";
pub const NO_DETAILS: &str = "I couldn't find your details. Let's start again with your username.";
pub const ASK_SELF_DOB: &str = "Great! Now, can you tell me your Date of Birth (YYYY-MM-DD)?";
pub const BAD_DOB_FORMAT: &str =
    "Hmm, that date format doesn't look right. Can you try again using YYYY-MM-DD?";
pub const ASK_TYPE: &str =
    "Cool, let's pick the appointment type: type 'virtual' for online or 'in_person' for in-person.";
pub const BAD_TYPE: &str =
    "Hmm, that's not quite right. Please type 'virtual' for online or 'in_person' for in-person.";
pub const ASK_REASON: &str =
    "Got it! Now, what's the reason for this appointment? (e.g., 'Therapy session for anxiety')";
pub const EMPTY_REASON: &str =
    "I need a reason for the appointment. Can you tell me why you're booking this?";
pub const MALFORMED_TURN: &str =
    "I need both a session_id and a message to keep chatting. Can you send that again?";
pub const YES_OR_NO: &str = "Just say 'yes' to confirm or 'no' to go back, please!";
pub const NO_PROVIDERS: &str = "Sorry, there aren't any therapists available right now.";
pub const NO_PROVIDERS_RESCHEDULE: &str =
    "Sorry, there aren't any therapists available right now for rescheduling.";
pub const APPOINTMENT_GONE: &str =
    "Hmm, I couldn't find that appointment anymore. Say 'view appointments' to see what's booked.";
pub const NO_APPOINTMENTS: &str = "Looks like you don't have any upcoming appointments right now.";
pub const DRAFT_INCOMPLETE: &str =
    "Something went missing from that booking. Let's start it again from the top.";

pub fn greeting(first_name: &str) -> String {
    format!("Hi {first_name}!! You're all set! How can I help you today? Just say hi, or try things like {MENU}.")
}

pub fn hello(first_name: &str) -> String {
    format!("Hey there, {first_name}! I'm here to help with your therapy needs. You can say things like {MENU}. What's up?")
}

pub fn help() -> String {
    format!("Hmm, I didn't quite catch that. What would you like to do? You can say {MENU}.")
}

pub fn need_number(noun: &str) -> String {
    format!("Oops, I need a number to select {noun}. Can you try again?")
}

pub fn out_of_range(len: usize) -> String {
    format!("Hmm, that's not a valid choice. Please pick a number between 1 and {len}.")
}

pub fn choose_subject(subjects: &[Subject]) -> String {
    let mut text = "Alright, let's pick who the appointment is for:\n".to_string();
    for (i, subject) in subjects.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, subject.full_name()));
    }
    text.push_str("Who would you like to select?");
    text
}

pub fn ask_subject_dob(subject: &Subject) -> String {
    format!(
        "Got it! Now, what's the Date of Birth (YYYY-MM-DD) for {}?",
        subject.full_name()
    )
}

pub fn provider_availability(providers: &[ProviderOption]) -> String {
    let mut text = "Here's who's available and their next open slots:\n".to_string();
    for (i, provider) in providers.iter().enumerate() {
        match &provider.next_open {
            Some(slot) => text.push_str(&format!(
                "{}. {} - Next open slot: {} at {}\n",
                i + 1,
                provider.name,
                slot.date,
                slot.start_label()
            )),
            None => text.push_str(&format!("{}. {}\n", i + 1, provider.name)),
        }
    }
    text.push_str("Pick a therapist by number to schedule, or let me know what else you'd like to do!");
    text
}

pub fn choose_provider(providers: &[ProviderOption], rescheduling: bool) -> String {
    let mut text = if rescheduling {
        "Let's reschedule that appointment. Here are the available therapists:\n".to_string()
    } else {
        "Let's pick a therapist first! Here's who's available:\n".to_string()
    };
    for (i, provider) in providers.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, provider.name));
    }
    text.push_str(if rescheduling {
        "Who would you like to reschedule with?"
    } else {
        "Who would you like to schedule with?"
    });
    text
}

pub fn provider_not_found(name: &str) -> String {
    format!("I couldn't find a therapist matching '{name}'.")
}

pub fn choose_date(provider: &str, dates: &[NaiveDate]) -> String {
    let mut text = format!("Okay, here are some available dates for {provider}:\n");
    for (i, date) in dates.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, date));
    }
    text.push_str("Which date works for you?");
    text
}

pub fn no_dates(provider: &str) -> String {
    format!("Sorry, {provider} doesn't have any open dates right now.")
}

pub fn no_slots_on(provider: &str, date: NaiveDate) -> String {
    format!("Sorry, {provider} doesn't have any open slots on {date}.")
}

pub fn choose_slot(provider: &str, date: NaiveDate, slots: &[SlotOption]) -> String {
    let mut text = format!("Here are the available slots for {provider} on {date}:\n");
    for (i, slot) in slots.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, slot.start_label()));
    }
    text.push_str("Which slot would you like?");
    text
}

pub fn confirm_booking(
    provider: &str,
    slot: &SlotOption,
    appointment_type: AppointmentType,
    reason: &str,
    replacing: Option<&AppointmentSummary>,
) -> String {
    let details = format!(
        "{provider} on {} at {} ({}) - {reason}. Just say 'yes' to confirm or 'no' to go back.",
        slot.date,
        slot.start_label(),
        appointment_type.as_str()
    );
    match replacing {
        Some(old) => format!(
            "Let's confirm: I'll move your appointment with {} on {} at {} to {details}",
            old.provider_name,
            old.date,
            old.label()
        ),
        None => format!("Let's confirm your appointment with {details}"),
    }
}

pub fn booked(
    subject: Option<&Subject>,
    provider: &str,
    slot: &SlotOption,
    appointment_type: AppointmentType,
) -> String {
    let mut text = "Awesome, your appointment is booked!".to_string();
    if let Some(subject) = subject {
        text.push_str(&format!(" It's for {}", subject.full_name()));
    }
    text.push_str(&format!(
        " with {provider} on {} at {} ({}). Anything else I can help with? You can 'schedule' another appointment, 'view appointments', 'reschedule', or 'cancel'.",
        slot.date,
        slot.start_label(),
        appointment_type.as_str()
    ));
    text
}

pub fn rescheduled(provider: &str, slot: &SlotOption) -> String {
    format!(
        "Done! Your appointment is now with {provider} on {} at {}. Anything else I can help with?",
        slot.date,
        slot.start_label()
    )
}

pub fn booking_dropped() -> String {
    "No problem, I've dropped that booking for now. What else can I help with? You can 'show therapists', 'schedule', 'view appointments', 'reschedule', or 'cancel' an appointment.".to_string()
}

fn appointment_lines(appointments: &[AppointmentSummary]) -> String {
    let mut text = "Here are your upcoming appointments:\n".to_string();
    for (i, appt) in appointments.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} on {} at {} ({}) - {}\n",
            i + 1,
            appt.provider_name,
            appt.date,
            appt.label(),
            appt.appointment_type.as_str(),
            appt.reason
        ));
    }
    text
}

pub fn appointment_list(appointments: &[AppointmentSummary]) -> String {
    let mut text = appointment_lines(appointments);
    text.push_str("You can say 'reschedule' or 'cancel' to change one, or 'schedule' to book a new one.");
    text
}

pub fn choose_appointment(appointments: &[AppointmentSummary], action: &str) -> String {
    let mut text = appointment_lines(appointments);
    text.push_str(&format!("Which appointment would you like to {action}?"));
    text
}

pub fn nothing_to_modify(action: &str) -> String {
    format!("You don't have any upcoming appointments to {action} right now.")
}

pub fn confirm_cancellation(appt: &AppointmentSummary) -> String {
    format!(
        "Are you sure you want to cancel your appointment with {} on {} at {}? Just say 'yes' to confirm or 'no' to go back.",
        appt.provider_name,
        appt.date,
        appt.label()
    )
}

pub fn cancelled(appt: &AppointmentSummary) -> String {
    format!(
        "Okay, I've cancelled your appointment with {} on {} at {}. Anything else I can help with? You can 'schedule' a new appointment, 'view appointments', or 'reschedule' or 'cancel' others.",
        appt.provider_name,
        appt.date,
        appt.label()
    )
}

pub fn cancellation_kept() -> String {
    "No worries, I've left that appointment as it is. What else can I help with? You can 'show therapists', 'schedule', 'view appointments', 'reschedule', or 'cancel' an appointment.".to_string()
}
