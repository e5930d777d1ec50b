use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Local, NaiveDate, NaiveTime};
use rusqlite::Connection;

use clinicbot::db;
use clinicbot::db::queries;
use clinicbot::models::{AppointmentType, Role, SlotStatus};
use clinicbot::services::booking::{self, BookingError, ReserveRequest};

const RACERS: usize = 4;

struct Fixture {
    _dir: tempfile::TempDir,
    path: String,
    accounts: Vec<(i64, i64)>,
    provider: i64,
    date: NaiveDate,
}

fn time(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clinic.db").to_string_lossy().into_owned();
    let conn = db::init_db(&path).unwrap();

    let mut accounts = vec![];
    for i in 0..RACERS {
        let account =
            queries::insert_account(&conn, &format!("racer{i}@example.com"), Role::Subject, None)
                .unwrap();
        let subject = queries::insert_subject(
            &conn,
            Some(account),
            "Racer",
            &i.to_string(),
            NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        )
        .unwrap();
        accounts.push((account, subject));
    }
    let provider = queries::insert_provider(&conn, "Dr. Lee").unwrap();
    let date = Local::now().date_naive() + Duration::days(3);

    Fixture {
        _dir: dir,
        path,
        accounts,
        provider,
        date,
    }
}

/// One connection per thread, opened up front so migrations never race.
fn connections(path: &str) -> Vec<Connection> {
    (0..RACERS).map(|_| db::init_db(path).unwrap()).collect()
}

fn race<F>(conns: Vec<Connection>, attempt: F) -> Vec<Result<String, BookingError>>
where
    F: Fn(usize, &mut Connection) -> Result<String, BookingError> + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(conns.len()));
    let attempt = Arc::new(attempt);

    let handles: Vec<_> = conns
        .into_iter()
        .enumerate()
        .map(|(i, mut conn)| {
            let barrier = Arc::clone(&barrier);
            let attempt = Arc::clone(&attempt);
            thread::spawn(move || {
                barrier.wait();
                attempt(i, &mut conn)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_racing_reservations_hold_slot_once() {
    let fx = fixture();
    let slot_id = {
        let conn = db::init_db(&fx.path).unwrap();
        queries::insert_slot(&conn, fx.provider, fx.date, time(9), time(10)).unwrap()
    };

    let accounts = fx.accounts.clone();
    let results = race(connections(&fx.path), move |i, conn| {
        let (account, subject) = accounts[i];
        booking::reserve(
            conn,
            &ReserveRequest {
                slot_id,
                subject_id: subject,
                requester_id: account,
                appointment_type: AppointmentType::Virtual,
                reason: format!("racer {i}"),
            },
        )
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::SlotUnavailable)))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(losers, RACERS - 1);

    let conn = db::init_db(&fx.path).unwrap();
    let slot = queries::get_slot(&conn, slot_id).unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::Held);

    let live: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM appointments WHERE slot_id = ?1 AND status != 'cancelled'",
            [slot_id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(live, 1);
}

#[test]
fn test_racing_same_day_bookings_keep_one() {
    let fx = fixture();
    let slots: Vec<i64> = {
        let conn = db::init_db(&fx.path).unwrap();
        (0..RACERS as u32)
            .map(|i| {
                queries::insert_slot(&conn, fx.provider, fx.date, time(9 + i), time(10 + i))
                    .unwrap()
            })
            .collect()
    };

    // Every thread books a different slot for the same subject on the same day.
    let (account, subject) = fx.accounts[0];
    let racing_slots = slots.clone();
    let results = race(connections(&fx.path), move |i, conn| {
        booking::reserve(
            conn,
            &ReserveRequest {
                slot_id: racing_slots[i],
                subject_id: subject,
                requester_id: account,
                appointment_type: AppointmentType::InPerson,
                reason: "weekly".to_string(),
            },
        )
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(BookingError::DuplicateSameDay))));

    let conn = db::init_db(&fx.path).unwrap();
    let held = slots
        .iter()
        .filter(|id| queries::get_slot(&conn, **id).unwrap().unwrap().status == SlotStatus::Held)
        .count();
    assert_eq!(held, 1);
}

#[test]
fn test_cancelled_slot_can_be_booked_again() {
    let fx = fixture();
    let mut conn = db::init_db(&fx.path).unwrap();
    let slot_id = queries::insert_slot(&conn, fx.provider, fx.date, time(14), time(15)).unwrap();

    let request = |(account, subject): (i64, i64)| ReserveRequest {
        slot_id,
        subject_id: subject,
        requester_id: account,
        appointment_type: AppointmentType::Virtual,
        reason: "follow-up".to_string(),
    };

    let first = booking::reserve(&mut conn, &request(fx.accounts[0])).unwrap();
    assert!(matches!(
        booking::reserve(&mut conn, &request(fx.accounts[1])),
        Err(BookingError::SlotUnavailable)
    ));

    booking::cancel(&mut conn, &first).unwrap();
    assert_eq!(
        queries::get_slot(&conn, slot_id).unwrap().unwrap().status,
        SlotStatus::Open
    );

    booking::reserve(&mut conn, &request(fx.accounts[1])).unwrap();
    assert_eq!(
        queries::get_slot(&conn, slot_id).unwrap().unwrap().status,
        SlotStatus::Held
    );
}
