use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::db::queries::{self, DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::models::{AppointmentStatus, AppointmentType, Slot, SlotStatus};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("that slot is no longer available")]
    SlotUnavailable,

    #[error("the subject already has an appointment with this provider on that day")]
    DuplicateSameDay,

    #[error("the appointment is already cancelled")]
    AlreadyCancelled,

    #[error("appointment not found")]
    AppointmentNotFound,

    #[error("slot not found")]
    SlotNotFound,

    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),
}

#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub slot_id: i64,
    pub subject_id: i64,
    pub requester_id: i64,
    pub appointment_type: AppointmentType,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct BookingDetails {
    pub appointment_type: AppointmentType,
    pub reason: String,
}

pub fn reserve(conn: &mut Connection, req: &ReserveRequest) -> Result<String, BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let slot = load_slot(&tx, req.slot_id)?;
    if slot.status != SlotStatus::Open {
        return Err(BookingError::SlotUnavailable);
    }
    if has_same_day_booking(&tx, req.subject_id, slot.provider_id, slot.date, None)? {
        return Err(BookingError::DuplicateSameDay);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = timestamp_now();
    tx.execute(
        "INSERT INTO appointments (id, slot_id, subject_id, requester_id, appointment_type, reason, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            id,
            req.slot_id,
            req.subject_id,
            req.requester_id,
            req.appointment_type.as_str(),
            req.reason,
            AppointmentStatus::Pending.as_str(),
            now,
        ],
    )?;
    hold_slot(&tx, req.slot_id)?;

    tx.commit()?;
    tracing::info!(appointment_id = %id, slot_id = req.slot_id, subject_id = req.subject_id, "appointment reserved");
    Ok(id)
}

pub fn reschedule(
    conn: &mut Connection,
    appointment_id: &str,
    new_slot_id: i64,
    details: Option<&BookingDetails>,
) -> Result<(), BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let (old_slot_id, subject_id, status) = load_appointment(&tx, appointment_id)?;
    if status == AppointmentStatus::Cancelled {
        return Err(BookingError::AlreadyCancelled);
    }

    let slot = load_slot(&tx, new_slot_id)?;
    if slot.status != SlotStatus::Open {
        return Err(BookingError::SlotUnavailable);
    }
    if has_same_day_booking(
        &tx,
        subject_id,
        slot.provider_id,
        slot.date,
        Some(appointment_id),
    )? {
        return Err(BookingError::DuplicateSameDay);
    }

    release_slot(&tx, old_slot_id)?;
    hold_slot(&tx, new_slot_id)?;

    let now = timestamp_now();
    match details {
        Some(details) => tx.execute(
            "UPDATE appointments
             SET slot_id = ?1, status = ?2, appointment_type = ?3, reason = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                new_slot_id,
                AppointmentStatus::Pending.as_str(),
                details.appointment_type.as_str(),
                details.reason,
                now,
                appointment_id,
            ],
        )?,
        None => tx.execute(
            "UPDATE appointments SET slot_id = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                new_slot_id,
                AppointmentStatus::Pending.as_str(),
                now,
                appointment_id
            ],
        )?,
    };

    tx.commit()?;
    tracing::info!(appointment_id, old_slot_id, new_slot_id, "appointment rescheduled");
    Ok(())
}

// The row is kept.
pub fn cancel(conn: &mut Connection, appointment_id: &str) -> Result<(), BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let (slot_id, _, status) = load_appointment(&tx, appointment_id)?;
    if status == AppointmentStatus::Cancelled {
        return Err(BookingError::AlreadyCancelled);
    }

    tx.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![
            AppointmentStatus::Cancelled.as_str(),
            timestamp_now(),
            appointment_id
        ],
    )?;
    release_slot(&tx, slot_id)?;

    tx.commit()?;
    tracing::info!(appointment_id, slot_id, "appointment cancelled");
    Ok(())
}

fn load_slot(tx: &Transaction, slot_id: i64) -> Result<Slot, BookingError> {
    tx.query_row(
        "SELECT id, provider_id, date, start_time, end_time, status FROM slots WHERE id = ?1",
        params![slot_id],
        queries::parse_slot_row,
    )
    .optional()?
    .ok_or(BookingError::SlotNotFound)
}

fn load_appointment(
    tx: &Transaction,
    appointment_id: &str,
) -> Result<(i64, i64, AppointmentStatus), BookingError> {
    tx.query_row(
        "SELECT slot_id, subject_id, status FROM appointments WHERE id = ?1",
        params![appointment_id],
        |row| {
            let status: String = row.get(2)?;
            Ok((row.get(0)?, row.get(1)?, AppointmentStatus::parse(&status)))
        },
    )
    .optional()?
    .ok_or(BookingError::AppointmentNotFound)
}

fn has_same_day_booking(
    tx: &Transaction,
    subject_id: i64,
    provider_id: i64,
    date: NaiveDate,
    excluding: Option<&str>,
) -> Result<bool, BookingError> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM appointments a
         JOIN slots s ON a.slot_id = s.id
         WHERE a.subject_id = ?1 AND s.provider_id = ?2 AND s.date = ?3
           AND a.status != 'cancelled' AND a.id != ?4",
        params![
            subject_id,
            provider_id,
            date.format(DATE_FORMAT).to_string(),
            excluding.unwrap_or(""),
        ],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// Zero rows touched means someone else got there first.
fn hold_slot(tx: &Transaction, slot_id: i64) -> Result<(), BookingError> {
    let changed = tx.execute(
        "UPDATE slots SET status = 'held' WHERE id = ?1 AND status = 'open'",
        params![slot_id],
    )?;
    if changed != 1 {
        return Err(BookingError::SlotUnavailable);
    }
    Ok(())
}

fn release_slot(tx: &Transaction, slot_id: i64) -> Result<(), BookingError> {
    tx.execute(
        "UPDATE slots SET status = 'open' WHERE id = ?1",
        params![slot_id],
    )?;
    Ok(())
}

fn timestamp_now() -> String {
    Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::Role;
    use chrono::{Duration, Local, NaiveTime};

    struct Fixture {
        conn: Connection,
        subject: i64,
        requester: i64,
        provider: i64,
    }

    fn setup() -> Fixture {
        let conn = db::init_db(":memory:").unwrap();
        let requester =
            queries::insert_account(&conn, "sam@example.com", Role::Subject, Some("Sam")).unwrap();
        let dob = NaiveDate::from_ymd_opt(2001, 5, 20).unwrap();
        let subject = queries::insert_subject(&conn, Some(requester), "Sam", "Jones", dob).unwrap();
        let provider = queries::insert_provider(&conn, "Dr. Lee").unwrap();
        Fixture {
            conn,
            subject,
            requester,
            provider,
        }
    }

    fn slot(conn: &Connection, provider: i64, days_ahead: i64, hour: u32) -> i64 {
        let date = Local::now().date_naive() + Duration::days(days_ahead);
        let start = NaiveTime::from_hms_opt(hour, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap();
        queries::insert_slot(conn, provider, date, start, end).unwrap()
    }

    fn request(f: &Fixture, slot_id: i64) -> ReserveRequest {
        ReserveRequest {
            slot_id,
            subject_id: f.subject,
            requester_id: f.requester,
            appointment_type: AppointmentType::Virtual,
            reason: "checkup".to_string(),
        }
    }

    fn slot_status(conn: &Connection, id: i64) -> SlotStatus {
        queries::get_slot(conn, id).unwrap().unwrap().status
    }

    fn live_appointments(conn: &Connection, slot_id: i64) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM appointments WHERE slot_id = ?1 AND status != 'cancelled'",
            params![slot_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_reserve_holds_slot() {
        let mut f = setup();
        let s = slot(&f.conn, f.provider, 1, 9);

        let id = { let req = request(&f, s); reserve(&mut f.conn, &req) }.unwrap();

        let appointment = queries::get_appointment(&f.conn, &id).unwrap().unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert_eq!(appointment.slot_id, s);
        assert_eq!(appointment.reason, "checkup");
        assert_eq!(slot_status(&f.conn, s), SlotStatus::Held);
    }

    #[test]
    fn test_reserve_held_slot_fails() {
        let mut f = setup();
        let other = queries::insert_subject(
            &f.conn,
            None,
            "Ana",
            "Diaz",
            NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
        )
        .unwrap();
        let s = slot(&f.conn, f.provider, 1, 9);
        { let req = request(&f, s); reserve(&mut f.conn, &req) }.unwrap();

        let mut second = request(&f, s);
        second.subject_id = other;
        let err = reserve(&mut f.conn, &second).unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable));
        assert_eq!(live_appointments(&f.conn, s), 1);
    }

    #[test]
    fn test_reserve_unknown_slot() {
        let mut f = setup();
        let err = { let req = request(&f, 9999); reserve(&mut f.conn, &req) }.unwrap_err();
        assert!(matches!(err, BookingError::SlotNotFound));
    }

    #[test]
    fn test_duplicate_same_day_rejected() {
        let mut f = setup();
        let morning = slot(&f.conn, f.provider, 2, 9);
        let afternoon = slot(&f.conn, f.provider, 2, 14);
        { let req = request(&f, morning); reserve(&mut f.conn, &req) }.unwrap();

        let err = { let req = request(&f, afternoon); reserve(&mut f.conn, &req) }.unwrap_err();
        assert!(matches!(err, BookingError::DuplicateSameDay));
        assert_eq!(slot_status(&f.conn, afternoon), SlotStatus::Open);
    }

    #[test]
    fn test_same_day_other_provider_allowed() {
        let mut f = setup();
        let kim = queries::insert_provider(&f.conn, "Dr. Kim").unwrap();
        let lee_slot = slot(&f.conn, f.provider, 2, 9);
        let kim_slot = slot(&f.conn, kim, 2, 14);
        { let req = request(&f, lee_slot); reserve(&mut f.conn, &req) }.unwrap();
        assert!({ let req = request(&f, kim_slot); reserve(&mut f.conn, &req) }.is_ok());
    }

    #[test]
    fn test_reserve_cancel_reserve() {
        let mut f = setup();
        let s = slot(&f.conn, f.provider, 1, 10);

        let first = { let req = request(&f, s); reserve(&mut f.conn, &req) }.unwrap();
        cancel(&mut f.conn, &first).unwrap();
        assert_eq!(slot_status(&f.conn, s), SlotStatus::Open);

        let second = { let req = request(&f, s); reserve(&mut f.conn, &req) }.unwrap();
        assert_ne!(first, second);
        assert_eq!(slot_status(&f.conn, s), SlotStatus::Held);
        assert_eq!(live_appointments(&f.conn, s), 1);

        let cancelled = queries::get_appointment(&f.conn, &first).unwrap().unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    }

    #[test]
    fn test_cancel_twice() {
        let mut f = setup();
        let s = slot(&f.conn, f.provider, 1, 10);
        let id = { let req = request(&f, s); reserve(&mut f.conn, &req) }.unwrap();
        cancel(&mut f.conn, &id).unwrap();

        let err = cancel(&mut f.conn, &id).unwrap_err();
        assert!(matches!(err, BookingError::AlreadyCancelled));
    }

    #[test]
    fn test_cancel_unknown() {
        let mut f = setup();
        let err = cancel(&mut f.conn, "missing").unwrap_err();
        assert!(matches!(err, BookingError::AppointmentNotFound));
    }

    #[test]
    fn test_reschedule_moves_slot() {
        let mut f = setup();
        let old = slot(&f.conn, f.provider, 1, 9);
        let new = slot(&f.conn, f.provider, 3, 11);
        let id = { let req = request(&f, old); reserve(&mut f.conn, &req) }.unwrap();

        let details = BookingDetails {
            appointment_type: AppointmentType::InPerson,
            reason: "follow-up".to_string(),
        };
        reschedule(&mut f.conn, &id, new, Some(&details)).unwrap();

        assert_eq!(slot_status(&f.conn, old), SlotStatus::Open);
        assert_eq!(slot_status(&f.conn, new), SlotStatus::Held);
        let appointment = queries::get_appointment(&f.conn, &id).unwrap().unwrap();
        assert_eq!(appointment.slot_id, new);
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert_eq!(appointment.appointment_type, AppointmentType::InPerson);
        assert_eq!(appointment.reason, "follow-up");
    }

    #[test]
    fn test_reschedule_same_day_excludes_itself() {
        let mut f = setup();
        let morning = slot(&f.conn, f.provider, 2, 9);
        let afternoon = slot(&f.conn, f.provider, 2, 15);
        let id = { let req = request(&f, morning); reserve(&mut f.conn, &req) }.unwrap();

        reschedule(&mut f.conn, &id, afternoon, None).unwrap();
        assert_eq!(slot_status(&f.conn, morning), SlotStatus::Open);
        assert_eq!(slot_status(&f.conn, afternoon), SlotStatus::Held);
    }

    #[test]
    fn test_reschedule_into_duplicate_day() {
        let mut f = setup();
        let day_two = slot(&f.conn, f.provider, 2, 9);
        let day_three = slot(&f.conn, f.provider, 3, 9);
        let day_three_late = slot(&f.conn, f.provider, 3, 15);
        let moving = { let req = request(&f, day_two); reserve(&mut f.conn, &req) }.unwrap();
        { let req = request(&f, day_three); reserve(&mut f.conn, &req) }.unwrap();

        let err = reschedule(&mut f.conn, &moving, day_three_late, None).unwrap_err();
        assert!(matches!(err, BookingError::DuplicateSameDay));
        // Nothing moved.
        assert_eq!(slot_status(&f.conn, day_two), SlotStatus::Held);
        assert_eq!(slot_status(&f.conn, day_three_late), SlotStatus::Open);
    }

    #[test]
    fn test_reschedule_to_held_slot() {
        let mut f = setup();
        let other = queries::insert_subject(
            &f.conn,
            None,
            "Ana",
            "Diaz",
            NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
        )
        .unwrap();
        let mine = slot(&f.conn, f.provider, 1, 9);
        let theirs = slot(&f.conn, f.provider, 4, 9);
        let id = { let req = request(&f, mine); reserve(&mut f.conn, &req) }.unwrap();
        let mut req = request(&f, theirs);
        req.subject_id = other;
        reserve(&mut f.conn, &req).unwrap();

        let err = reschedule(&mut f.conn, &id, theirs, None).unwrap_err();
        assert!(matches!(err, BookingError::SlotUnavailable));
        assert_eq!(slot_status(&f.conn, mine), SlotStatus::Held);
    }
}
