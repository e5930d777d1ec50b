pub mod prompts;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use crate::db::queries::{self, DATE_FORMAT};
use crate::models::{
    AppointmentSummary, AppointmentType, DialogState, Draft, Entities, Intent, ModifyAction,
    ProviderOption, Role, Session,
};
use crate::services::booking::{self, BookingDetails, BookingError, ReserveRequest};
use crate::services::identity::IdentityVerifier;
use crate::services::nlu::Extractor;
use crate::services::notify::{self, AppointmentEvent, EventKind, Notifier};

const DATE_CHOICES: i64 = 5;

const HONORIFICS: &[&str] = &["dr", "doctor", "mr", "mrs", "ms", "miss"];

// `Display` is what the user sees.
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("{0}")]
    InputRejected(String),

    #[error("That Date of Birth doesn't match our records. Can you double-check?")]
    IdentityMismatch,

    #[error("{0}")]
    NoAvailability(String),

    #[error("Oh no, that slot isn't available anymore. Let's pick a different one.")]
    SlotUnavailable,

    #[error("You already have an appointment with that therapist on that day. Try a different date, or 'view appointments' to see it.")]
    DuplicateSameDay,

    #[error("That appointment has already been cancelled.")]
    AlreadyCancelled,

    #[error("Oops, looks like your session expired. Let's start a new chat!")]
    SessionNotFound,

    #[error("Oops, something went wrong on my end. Let's try that again!")]
    Persistence(#[from] anyhow::Error),
}

impl From<BookingError> for DialogError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::SlotUnavailable | BookingError::SlotNotFound => {
                DialogError::SlotUnavailable
            }
            BookingError::DuplicateSameDay => DialogError::DuplicateSameDay,
            BookingError::AlreadyCancelled => DialogError::AlreadyCancelled,
            BookingError::AppointmentNotFound => {
                DialogError::InputRejected(prompts::APPOINTMENT_GONE.into())
            }
            BookingError::Persistence(e) => DialogError::Persistence(e.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message: String,
    /// Present only on the turn that completes verification.
    pub token: Option<String>,
}

impl Reply {
    fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            token: None,
        }
    }
}

pub struct DialogueEngine {
    db: Arc<Mutex<Connection>>,
    identity: Arc<dyn IdentityVerifier>,
    extractor: Arc<dyn Extractor>,
    notifier: Arc<dyn Notifier>,
}

impl DialogueEngine {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        identity: Arc<dyn IdentityVerifier>,
        extractor: Arc<dyn Extractor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            identity,
            extractor,
            notifier,
        }
    }

    pub fn advance(&self, session: &mut Session, input: &str) -> Result<Reply, DialogError> {
        self.advance_at(session, input, &Local::now().naive_local())
    }

    pub fn advance_at(
        &self,
        session: &mut Session,
        input: &str,
        now: &NaiveDateTime,
    ) -> Result<Reply, DialogError> {
        let from = session.state.name();
        let result = self.transition(session, input.trim(), now);

        match &result {
            Ok(_) => tracing::info!(
                session_id = %session.id,
                from,
                to = session.state.name(),
                "turn handled"
            ),
            Err(DialogError::Persistence(e)) => tracing::error!(
                session_id = %session.id,
                state = from,
                "persistence failure: {e:#}"
            ),
            Err(e) => tracing::debug!(
                session_id = %session.id,
                from,
                to = session.state.name(),
                reason = %e,
                "turn rejected"
            ),
        }
        result
    }

    fn transition(
        &self,
        session: &mut Session,
        input: &str,
        now: &NaiveDateTime,
    ) -> Result<Reply, DialogError> {
        match session.state.clone() {
            DialogState::AwaitingIdentity => self.on_identity(session, input),
            DialogState::SelectingSubject { subjects } => {
                let subject = pick(&subjects, input, "a person")?.clone();
                let message = prompts::ask_subject_dob(&subject);
                session.subject = Some(subject);
                session.state = DialogState::AwaitingSecret;
                Ok(Reply::text(message))
            }
            DialogState::AwaitingSecret => self.on_secret(session, input),
            DialogState::Verified { offered } => self.on_verified(session, &offered, input, now),
            DialogState::SelectingProvider { providers } => {
                let provider = pick(&providers, input, "a therapist")?.clone();
                self.offer_dates(session, provider, None, now)
            }
            DialogState::SelectingDate { dates } => {
                let date = *pick(&dates, input, "a date")?;
                self.offer_slots(session, date, now)
            }
            DialogState::SelectingSlot { slots } => {
                let slot = pick(&slots, input, "a slot")?.clone();
                session.draft.slot = Some(slot);
                session.state = DialogState::SelectingAppointmentType;
                Ok(Reply::text(prompts::ASK_TYPE))
            }
            DialogState::SelectingAppointmentType => {
                let appointment_type = AppointmentType::parse(input)
                    .ok_or_else(|| DialogError::InputRejected(prompts::BAD_TYPE.into()))?;
                session.draft.appointment_type = Some(appointment_type);
                session.state = DialogState::EnteringReason;
                Ok(Reply::text(prompts::ASK_REASON))
            }
            DialogState::EnteringReason => self.on_reason(session, input),
            DialogState::ConfirmingBooking => match input.to_lowercase().as_str() {
                "yes" => self.commit_booking(session),
                "no" => {
                    session.return_home();
                    Ok(Reply::text(prompts::booking_dropped()))
                }
                _ => Err(DialogError::InputRejected(prompts::YES_OR_NO.into())),
            },
            DialogState::SelectingAppointmentToModify {
                action,
                appointments,
            } => {
                let appointment = pick(&appointments, input, "an appointment")?.clone();
                self.on_modify_selected(session, action, appointment, now)
            }
            DialogState::ConfirmingCancellation { appointment } => {
                match input.to_lowercase().as_str() {
                    "yes" => self.commit_cancellation(session, &appointment),
                    "no" => {
                        session.return_home();
                        Ok(Reply::text(prompts::cancellation_kept()))
                    }
                    _ => Err(DialogError::InputRejected(prompts::YES_OR_NO.into())),
                }
            }
        }
    }

    fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Identity ──

    fn on_identity(&self, session: &mut Session, input: &str) -> Result<Reply, DialogError> {
        let account = self
            .identity
            .resolve(input)?
            .filter(|a| a.role.can_book())
            .ok_or_else(|| DialogError::InputRejected(prompts::UNKNOWN_ACCOUNT.into()))?;

        let dependents = self.identity.list_dependents(account.id)?;
        let first_name = account
            .first_name
            .clone()
            .unwrap_or_else(|| "there".to_string());

        if !dependents.is_empty() {
            let message = prompts::choose_subject(&dependents);
            session.requester = Some(account);
            session.first_name = first_name;
            session.state = DialogState::SelectingSubject {
                subjects: dependents,
            };
            return Ok(Reply::text(message));
        }

        match self.identity.self_subject(account.id)? {
            Some(subject) => {
                session.requester = Some(account);
                session.first_name = first_name;
                session.subject = Some(subject);
                session.state = DialogState::AwaitingSecret;
                Ok(Reply::text(prompts::ASK_SELF_DOB))
            }
            None if account.role == Role::Guardian => {
                Err(DialogError::InputRejected(prompts::NO_DEPENDENTS.into()))
            }
            None => Err(DialogError::InputRejected(prompts::NO_DETAILS.into())),
        }
    }

    fn on_secret(&self, session: &mut Session, input: &str) -> Result<Reply, DialogError> {
        let (Some(requester), Some(subject)) = (session.requester.clone(), session.subject.clone())
        else {
            session.state = DialogState::AwaitingIdentity;
            return Err(DialogError::InputRejected(prompts::NO_DETAILS.into()));
        };

        let candidate = NaiveDate::parse_from_str(input, DATE_FORMAT)
            .map_err(|_| DialogError::InputRejected(prompts::BAD_DOB_FORMAT.into()))?;
        if !self.identity.match_secret(subject.id, candidate)? {
            return Err(DialogError::IdentityMismatch);
        }

        let token = self
            .identity
            .issue_credential(requester.id, subject.id, requester.role)?;

        session.verified = true;
        session.has_greeted = true;
        session.state = DialogState::verified();
        tracing::info!(session_id = %session.id, subject_id = subject.id, "identity verified");

        Ok(Reply {
            message: prompts::greeting(&session.first_name),
            token: Some(token),
        })
    }

    // ── Home ──

    fn on_verified(
        &self,
        session: &mut Session,
        offered: &[ProviderOption],
        input: &str,
        now: &NaiveDateTime,
    ) -> Result<Reply, DialogError> {
        let extraction = self.extractor.extract(input);
        let intent = extraction
            .intent
            .or_else(|| Intent::from_command(&input.to_lowercase()));

        if !session.has_greeted {
            session.has_greeted = true;
            return Ok(Reply::text(prompts::hello(&session.first_name)));
        }

        match intent {
            Some(Intent::ShowTherapists) => {
                let providers = queries::providers_with_availability(&self.db(), now)?;
                if providers.is_empty() {
                    session.return_home();
                    return Err(DialogError::NoAvailability(prompts::NO_PROVIDERS.into()));
                }
                let message = prompts::provider_availability(&providers);
                session.state = DialogState::Verified { offered: providers };
                Ok(Reply::text(message))
            }
            Some(Intent::Schedule) => self.start_schedule(session, &extraction.entities, now),
            Some(Intent::ViewAppointments) => {
                let subject_id = self.subject_id(session)?;
                let appointments = queries::upcoming_appointments(&self.db(), subject_id, now)?;
                session.return_home();
                if appointments.is_empty() {
                    return Ok(Reply::text(prompts::NO_APPOINTMENTS));
                }
                Ok(Reply::text(prompts::appointment_list(&appointments)))
            }
            Some(Intent::Reschedule) => {
                self.list_for_modify(session, ModifyAction::Reschedule, now)
            }
            Some(Intent::Cancel) => self.list_for_modify(session, ModifyAction::Cancel, now),
            Some(Intent::Greet) => Ok(Reply::text(prompts::hello(&session.first_name))),
            None if !offered.is_empty() && input.parse::<usize>().is_ok() => {
                let provider = pick(offered, input, "a therapist")?.clone();
                self.resolve_provider(session, provider, &Entities::default(), now)
            }
            None => Ok(Reply::text(prompts::help())),
        }
    }

    fn subject_id(&self, session: &mut Session) -> Result<i64, DialogError> {
        match &session.subject {
            Some(subject) if session.verified => Ok(subject.id),
            _ => {
                session.state = DialogState::AwaitingIdentity;
                Err(DialogError::InputRejected(prompts::NO_DETAILS.into()))
            }
        }
    }

    // ── Booking pipeline ──

    fn start_schedule(
        &self,
        session: &mut Session,
        entities: &Entities,
        now: &NaiveDateTime,
    ) -> Result<Reply, DialogError> {
        let providers = queries::providers_with_availability(&self.db(), now)?;
        if providers.is_empty() {
            session.return_home();
            return Err(DialogError::NoAvailability(prompts::NO_PROVIDERS.into()));
        }

        let mut message = prompts::choose_provider(&providers, false);
        if let Some(name) = entities.provider_name.as_deref() {
            if let Some(provider) = match_provider(&providers, name) {
                let provider = provider.clone();
                return self.resolve_provider(session, provider, entities, now);
            }
            message = format!("{} {message}", prompts::provider_not_found(name));
        }

        session.draft = Draft::default();
        session.state = DialogState::SelectingProvider { providers };
        Ok(Reply::text(message))
    }

    // Stops before the appointment type.
    fn resolve_provider(
        &self,
        session: &mut Session,
        provider: ProviderOption,
        entities: &Entities,
        now: &NaiveDateTime,
    ) -> Result<Reply, DialogError> {
        let Some(date) = entities.date else {
            return self.offer_dates(session, provider, None, now);
        };

        let slots = queries::open_slots_on(&self.db(), provider.id, date, now)?;
        if slots.is_empty() {
            let note = prompts::no_slots_on(&provider.name, date);
            return self.offer_dates(session, provider, Some(note), now);
        }

        let exact = entities.time.as_deref().and_then(|time| {
            let mut matching = slots.iter().filter(|s| s.start_label() == time);
            match (matching.next(), matching.next()) {
                (Some(slot), None) => Some(slot.clone()),
                _ => None,
            }
        });

        let name = provider.name.clone();
        session.draft.provider = Some(provider);
        session.draft.date = Some(date);

        match exact {
            Some(slot) => {
                let message = format!(
                    "{name} is free on {date} at {}. {}",
                    slot.start_label(),
                    prompts::ASK_TYPE
                );
                session.draft.slot = Some(slot);
                session.state = DialogState::SelectingAppointmentType;
                Ok(Reply::text(message))
            }
            None => {
                let message = prompts::choose_slot(&name, date, &slots);
                session.state = DialogState::SelectingSlot { slots };
                Ok(Reply::text(message))
            }
        }
    }

    fn offer_dates(
        &self,
        session: &mut Session,
        provider: ProviderOption,
        note: Option<String>,
        now: &NaiveDateTime,
    ) -> Result<Reply, DialogError> {
        let dates = queries::open_dates(&self.db(), provider.id, now, DATE_CHOICES)?;
        if dates.is_empty() {
            session.return_home();
            return Err(DialogError::NoAvailability(prompts::no_dates(&provider.name)));
        }

        let mut message = prompts::choose_date(&provider.name, &dates);
        if let Some(note) = note {
            message = format!("{note} {message}");
        }
        session.draft.provider = Some(provider);
        session.draft.date = None;
        session.draft.slot = None;
        session.state = DialogState::SelectingDate { dates };
        Ok(Reply::text(message))
    }

    fn offer_slots(
        &self,
        session: &mut Session,
        date: NaiveDate,
        now: &NaiveDateTime,
    ) -> Result<Reply, DialogError> {
        let Some(provider) = session.draft.provider.clone() else {
            return draft_lost(session);
        };

        let slots = queries::open_slots_on(&self.db(), provider.id, date, now)?;
        if slots.is_empty() {
            session.return_home();
            return Err(DialogError::NoAvailability(prompts::no_slots_on(
                &provider.name,
                date,
            )));
        }

        let message = prompts::choose_slot(&provider.name, date, &slots);
        session.draft.date = Some(date);
        session.state = DialogState::SelectingSlot { slots };
        Ok(Reply::text(message))
    }

    fn on_reason(&self, session: &mut Session, input: &str) -> Result<Reply, DialogError> {
        if input.is_empty() {
            return Err(DialogError::InputRejected(prompts::EMPTY_REASON.into()));
        }
        let draft = &session.draft;
        let (Some(provider), Some(slot), Some(appointment_type)) =
            (&draft.provider, &draft.slot, draft.appointment_type)
        else {
            return draft_lost(session);
        };

        let message = prompts::confirm_booking(
            &provider.name,
            slot,
            appointment_type,
            input,
            draft.replacing.as_ref(),
        );
        session.draft.reason = Some(input.to_string());
        session.state = DialogState::ConfirmingBooking;
        Ok(Reply::text(message))
    }

    fn commit_booking(&self, session: &mut Session) -> Result<Reply, DialogError> {
        let draft = session.draft.clone();
        let (Some(provider), Some(slot), Some(appointment_type), Some(reason)) = (
            draft.provider,
            draft.slot,
            draft.appointment_type,
            draft.reason,
        ) else {
            return draft_lost(session);
        };
        let (Some(requester), Some(subject)) = (session.requester.clone(), session.subject.clone())
        else {
            return draft_lost(session);
        };

        let outcome = match &draft.replacing {
            Some(old) => {
                let details = BookingDetails {
                    appointment_type,
                    reason,
                };
                booking::reschedule(&mut self.db(), &old.id, slot.id, Some(&details))
                    .map(|()| (old.id.clone(), EventKind::Rescheduled))
            }
            None => {
                let request = ReserveRequest {
                    slot_id: slot.id,
                    subject_id: subject.id,
                    requester_id: requester.id,
                    appointment_type,
                    reason,
                };
                booking::reserve(&mut self.db(), &request).map(|id| (id, EventKind::Booked))
            }
        };

        let (appointment_id, kind) = match outcome {
            Ok(done) => done,
            // Storage failures keep the draft so "yes" can be retried.
            Err(BookingError::Persistence(e)) => return Err(DialogError::Persistence(e.into())),
            Err(e) => {
                tracing::info!(session_id = %session.id, slot_id = slot.id, "booking conflict: {e}");
                session.return_home();
                return Err(e.into());
            }
        };

        self.notify(AppointmentEvent {
            kind,
            appointment_id,
            subject_id: subject.id,
            provider_name: provider.name.clone(),
            date: slot.date,
            time: slot.start_label(),
        });

        let message = match kind {
            EventKind::Rescheduled => prompts::rescheduled(&provider.name, &slot),
            _ => {
                let for_dependent = (requester.role == Role::Guardian).then_some(&subject);
                prompts::booked(for_dependent, &provider.name, &slot, appointment_type)
            }
        };
        session.return_home();
        Ok(Reply::text(message))
    }

    // ── Modify pipeline ──

    fn list_for_modify(
        &self,
        session: &mut Session,
        action: ModifyAction,
        now: &NaiveDateTime,
    ) -> Result<Reply, DialogError> {
        let subject_id = self.subject_id(session)?;
        let appointments = queries::upcoming_appointments(&self.db(), subject_id, now)?;
        session.return_home();
        if appointments.is_empty() {
            return Ok(Reply::text(prompts::nothing_to_modify(action.as_str())));
        }

        let message = prompts::choose_appointment(&appointments, action.as_str());
        session.state = DialogState::SelectingAppointmentToModify {
            action,
            appointments,
        };
        Ok(Reply::text(message))
    }

    fn on_modify_selected(
        &self,
        session: &mut Session,
        action: ModifyAction,
        appointment: AppointmentSummary,
        now: &NaiveDateTime,
    ) -> Result<Reply, DialogError> {
        match action {
            ModifyAction::Reschedule => {
                let providers = queries::providers_with_availability(&self.db(), now)?;
                if providers.is_empty() {
                    session.return_home();
                    return Err(DialogError::NoAvailability(
                        prompts::NO_PROVIDERS_RESCHEDULE.into(),
                    ));
                }
                let message = prompts::choose_provider(&providers, true);
                session.draft = Draft {
                    replacing: Some(appointment),
                    ..Draft::default()
                };
                session.state = DialogState::SelectingProvider { providers };
                Ok(Reply::text(message))
            }
            ModifyAction::Cancel => {
                let message = prompts::confirm_cancellation(&appointment);
                session.state = DialogState::ConfirmingCancellation { appointment };
                Ok(Reply::text(message))
            }
        }
    }

    fn commit_cancellation(
        &self,
        session: &mut Session,
        appointment: &AppointmentSummary,
    ) -> Result<Reply, DialogError> {
        match booking::cancel(&mut self.db(), &appointment.id) {
            Ok(()) => {}
            Err(BookingError::Persistence(e)) => return Err(DialogError::Persistence(e.into())),
            Err(e) => {
                session.return_home();
                return Err(e.into());
            }
        }

        self.notify(AppointmentEvent {
            kind: EventKind::Cancelled,
            appointment_id: appointment.id.clone(),
            subject_id: session.subject.as_ref().map_or(0, |s| s.id),
            provider_name: appointment.provider_name.clone(),
            date: appointment.date,
            time: appointment.label(),
        });

        session.return_home();
        Ok(Reply::text(prompts::cancelled(appointment)))
    }

    fn notify(&self, event: AppointmentEvent) {
        notify::dispatch(&self.notifier, event);
    }
}

fn draft_lost(session: &mut Session) -> Result<Reply, DialogError> {
    session.return_home();
    Err(DialogError::InputRejected(prompts::DRAFT_INCOMPLETE.into()))
}

fn pick<'a, T>(items: &'a [T], input: &str, noun: &str) -> Result<&'a T, DialogError> {
    let n: usize = input
        .parse()
        .map_err(|_| DialogError::InputRejected(prompts::need_number(noun)))?;
    n.checked_sub(1)
        .and_then(|i| items.get(i))
        .ok_or_else(|| DialogError::InputRejected(prompts::out_of_range(items.len())))
}

fn name_tokens(name: &str) -> Vec<String> {
    name.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty() && !HONORIFICS.contains(&w.as_str()))
        .collect()
}

fn match_provider<'a>(providers: &'a [ProviderOption], name: &str) -> Option<&'a ProviderOption> {
    let wanted = name_tokens(name);
    if wanted.is_empty() {
        return None;
    }
    let mut matches = providers.iter().filter(|p| {
        let have = name_tokens(&p.name);
        wanted.iter().all(|w| have.contains(w))
    });
    match (matches.next(), matches.next()) {
        (Some(provider), None) => Some(provider),
        _ => None,
    }
}
