use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{
    Account, Appointment, AppointmentStatus, AppointmentSummary, AppointmentType, ProviderOption,
    Role, Slot, SlotOption, SlotStatus, Subject,
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Slot alias `s` starting after ?1 (date) / ?2 (time).
const FUTURE_SLOT: &str = "(s.date > ?1 OR (s.date = ?1 AND s.start_time > ?2))";

// ── Accounts ──

pub fn get_account_by_username(
    conn: &Connection,
    username: &str,
) -> anyhow::Result<Option<Account>> {
    let row = conn
        .query_row(
            "SELECT id, username, role, first_name FROM accounts WHERE username = ?1",
            params![username],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    // Accounts whose role column holds an unknown value are treated as absent.
    Ok(row.and_then(|(id, username, role, first_name)| {
        Role::parse(&role).map(|role| Account {
            id,
            username,
            role,
            first_name,
        })
    }))
}

pub fn insert_account(
    conn: &Connection,
    username: &str,
    role: Role,
    first_name: Option<&str>,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO accounts (username, role, first_name) VALUES (?1, ?2, ?3)",
        params![username, role.as_str(), first_name],
    )?;
    Ok(conn.last_insert_rowid())
}

// ── Subjects ──

pub fn insert_subject(
    conn: &Connection,
    account_id: Option<i64>,
    first_name: &str,
    last_name: &str,
    date_of_birth: NaiveDate,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO subjects (account_id, first_name, last_name, date_of_birth)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            account_id,
            first_name,
            last_name,
            date_of_birth.format(DATE_FORMAT).to_string(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn link_guardian(conn: &Connection, guardian_id: i64, subject_id: i64) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO guardianships (guardian_account_id, subject_id) VALUES (?1, ?2)",
        params![guardian_id, subject_id],
    )?;
    Ok(())
}

pub fn get_subject(conn: &Connection, id: i64) -> anyhow::Result<Option<Subject>> {
    let subject = conn
        .query_row(
            "SELECT id, account_id, first_name, last_name, date_of_birth FROM subjects WHERE id = ?1",
            params![id],
            parse_subject_row,
        )
        .optional()?;
    Ok(subject)
}

pub fn get_self_subject(conn: &Connection, account_id: i64) -> anyhow::Result<Option<Subject>> {
    let subject = conn
        .query_row(
            "SELECT id, account_id, first_name, last_name, date_of_birth
             FROM subjects WHERE account_id = ?1 ORDER BY id LIMIT 1",
            params![account_id],
            parse_subject_row,
        )
        .optional()?;
    Ok(subject)
}

pub fn list_dependents(conn: &Connection, guardian_id: i64) -> anyhow::Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.account_id, s.first_name, s.last_name, s.date_of_birth
         FROM guardianships g
         JOIN subjects s ON g.subject_id = s.id
         WHERE g.guardian_account_id = ?1
         ORDER BY s.first_name, s.last_name, s.id",
    )?;

    let rows = stmt.query_map(params![guardian_id], parse_subject_row)?;

    let mut subjects = vec![];
    for row in rows {
        subjects.push(row?);
    }
    Ok(subjects)
}

fn parse_subject_row(row: &Row) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        account_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        date_of_birth: date_column(row, 4)?,
    })
}

// ── Providers & Slots ──

pub fn insert_provider(conn: &Connection, name: &str) -> anyhow::Result<i64> {
    conn.execute("INSERT INTO providers (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_slot(
    conn: &Connection,
    provider_id: i64,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO slots (provider_id, date, start_time, end_time, status)
         VALUES (?1, ?2, ?3, ?4, 'open')",
        params![
            provider_id,
            date.format(DATE_FORMAT).to_string(),
            start_time.format(TIME_FORMAT).to_string(),
            end_time.format(TIME_FORMAT).to_string(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_slot(conn: &Connection, id: i64) -> anyhow::Result<Option<Slot>> {
    let slot = conn
        .query_row(
            "SELECT id, provider_id, date, start_time, end_time, status FROM slots WHERE id = ?1",
            params![id],
            parse_slot_row,
        )
        .optional()?;
    Ok(slot)
}

pub(crate) fn parse_slot_row(row: &Row) -> rusqlite::Result<Slot> {
    let status: String = row.get(5)?;
    Ok(Slot {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        date: date_column(row, 2)?,
        start_time: time_column(row, 3)?,
        end_time: time_column(row, 4)?,
        status: SlotStatus::parse(&status),
    })
}

pub fn providers_with_availability(
    conn: &Connection,
    now: &NaiveDateTime,
) -> anyhow::Result<Vec<ProviderOption>> {
    let (date, time) = split_now(now);
    let mut stmt = conn.prepare(&format!(
        "SELECT p.id, p.name, s.id, s.date, s.start_time
         FROM slots s
         JOIN providers p ON s.provider_id = p.id
         WHERE s.status = 'open' AND {FUTURE_SLOT}
         ORDER BY p.name, p.id, s.date, s.start_time"
    ))?;

    let rows = stmt.query_map(params![date, time], |row| {
        Ok(ProviderOption {
            id: row.get(0)?,
            name: row.get(1)?,
            next_open: Some(SlotOption {
                id: row.get(2)?,
                date: date_column(row, 3)?,
                start_time: time_column(row, 4)?,
            }),
        })
    })?;

    // Rows arrive earliest-first within each provider; keep the first per provider.
    let mut providers: Vec<ProviderOption> = vec![];
    for row in rows {
        let option = row?;
        if providers.last().map(|p| p.id) != Some(option.id) {
            providers.push(option);
        }
    }
    Ok(providers)
}

pub fn open_dates(
    conn: &Connection,
    provider_id: i64,
    now: &NaiveDateTime,
    limit: i64,
) -> anyhow::Result<Vec<NaiveDate>> {
    let (date, time) = split_now(now);
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT s.date FROM slots s
         WHERE s.provider_id = ?3 AND s.status = 'open' AND {FUTURE_SLOT}
         ORDER BY s.date
         LIMIT ?4"
    ))?;

    let rows = stmt.query_map(params![date, time, provider_id, limit], |row| {
        date_column(row, 0)
    })?;

    let mut dates = vec![];
    for row in rows {
        dates.push(row?);
    }
    Ok(dates)
}

pub fn open_slots_on(
    conn: &Connection,
    provider_id: i64,
    on: NaiveDate,
    now: &NaiveDateTime,
) -> anyhow::Result<Vec<SlotOption>> {
    let (date, time) = split_now(now);
    let mut stmt = conn.prepare(&format!(
        "SELECT s.id, s.date, s.start_time FROM slots s
         WHERE s.provider_id = ?3 AND s.status = 'open' AND s.date = ?4 AND {FUTURE_SLOT}
         ORDER BY s.start_time, s.id"
    ))?;

    let rows = stmt.query_map(
        params![date, time, provider_id, on.format(DATE_FORMAT).to_string()],
        parse_slot_option_row,
    )?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

pub fn upcoming_open_slots(
    conn: &Connection,
    provider_id: i64,
    now: &NaiveDateTime,
) -> anyhow::Result<Vec<SlotOption>> {
    let (date, time) = split_now(now);
    let mut stmt = conn.prepare(&format!(
        "SELECT s.id, s.date, s.start_time FROM slots s
         WHERE s.provider_id = ?3 AND s.status = 'open' AND {FUTURE_SLOT}
         ORDER BY s.date, s.start_time, s.id"
    ))?;

    let rows = stmt.query_map(params![date, time, provider_id], parse_slot_option_row)?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

fn parse_slot_option_row(row: &Row) -> rusqlite::Result<SlotOption> {
    Ok(SlotOption {
        id: row.get(0)?,
        date: date_column(row, 1)?,
        start_time: time_column(row, 2)?,
    })
}

// ── Appointments ──

pub fn get_appointment(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let appointment = conn
        .query_row(
            "SELECT id, slot_id, subject_id, requester_id, appointment_type, reason, status, created_at, updated_at
             FROM appointments WHERE id = ?1",
            params![id],
            parse_appointment_row,
        )
        .optional()?;
    Ok(appointment)
}

pub(crate) fn parse_appointment_row(row: &Row) -> rusqlite::Result<Appointment> {
    let appointment_type: String = row.get(4)?;
    let status: String = row.get(6)?;
    Ok(Appointment {
        id: row.get(0)?,
        slot_id: row.get(1)?,
        subject_id: row.get(2)?,
        requester_id: row.get(3)?,
        appointment_type: appointment_type_column(&appointment_type, 4)?,
        reason: row.get(5)?,
        status: AppointmentStatus::parse(&status),
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
    })
}

const SUMMARY_SELECT: &str = "SELECT a.id, a.slot_id, p.id, p.name, s.date, s.start_time, a.appointment_type, a.reason, a.status
     FROM appointments a
     JOIN slots s ON a.slot_id = s.id
     JOIN providers p ON s.provider_id = p.id";

pub fn upcoming_appointments(
    conn: &Connection,
    subject_id: i64,
    now: &NaiveDateTime,
) -> anyhow::Result<Vec<AppointmentSummary>> {
    let (date, time) = split_now(now);
    let mut stmt = conn.prepare(&format!(
        "{SUMMARY_SELECT}
         WHERE a.subject_id = ?3 AND a.status != 'cancelled' AND {FUTURE_SLOT}
         ORDER BY s.date, s.start_time"
    ))?;

    let rows = stmt.query_map(params![date, time, subject_id], parse_summary_row)?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row?);
    }
    Ok(appointments)
}

pub fn get_appointment_summary(
    conn: &Connection,
    id: &str,
) -> anyhow::Result<Option<AppointmentSummary>> {
    let summary = conn
        .query_row(
            &format!("{SUMMARY_SELECT} WHERE a.id = ?1"),
            params![id],
            parse_summary_row,
        )
        .optional()?;
    Ok(summary)
}

fn parse_summary_row(row: &Row) -> rusqlite::Result<AppointmentSummary> {
    let appointment_type: String = row.get(6)?;
    let status: String = row.get(8)?;
    Ok(AppointmentSummary {
        id: row.get(0)?,
        slot_id: row.get(1)?,
        provider_id: row.get(2)?,
        provider_name: row.get(3)?,
        date: date_column(row, 4)?,
        start_time: time_column(row, 5)?,
        appointment_type: appointment_type_column(&appointment_type, 6)?,
        reason: row.get(7)?,
        status: AppointmentStatus::parse(&status),
    })
}

// ── Column helpers ──

fn split_now(now: &NaiveDateTime) -> (String, String) {
    (
        now.format(DATE_FORMAT).to_string(),
        now.format(TIME_FORMAT).to_string(),
    )
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn time_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    NaiveTime::parse_from_str(&raw, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
        .map_err(|e| conversion_error(idx, e))
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    Ok(NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| Utc::now().naive_utc()))
}

fn appointment_type_column(raw: &str, idx: usize) -> rusqlite::Result<AppointmentType> {
    AppointmentType::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown appointment type: {raw}").into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Duration;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, TIME_FORMAT).unwrap()
    }

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2030-03-10 12:00:00", TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn test_account_lookup() {
        let conn = setup_db();
        insert_account(&conn, "pat@example.com", Role::Guardian, Some("Pat")).unwrap();

        let account = get_account_by_username(&conn, "pat@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(account.role, Role::Guardian);
        assert_eq!(account.first_name.as_deref(), Some("Pat"));
        assert!(get_account_by_username(&conn, "nobody@example.com")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_dependents() {
        let conn = setup_db();
        let guardian = insert_account(&conn, "pat@example.com", Role::Guardian, Some("Pat")).unwrap();
        let dob = NaiveDate::from_ymd_opt(2015, 4, 2).unwrap();
        let zoe = insert_subject(&conn, None, "Zoe", "Smith", dob).unwrap();
        let adam = insert_subject(&conn, None, "Adam", "Smith", dob).unwrap();
        link_guardian(&conn, guardian, zoe).unwrap();
        link_guardian(&conn, guardian, adam).unwrap();

        let dependents = list_dependents(&conn, guardian).unwrap();
        let names: Vec<_> = dependents.iter().map(|s| s.full_name()).collect();
        assert_eq!(names, vec!["Adam Smith", "Zoe Smith"]);
        assert_eq!(dependents[0].date_of_birth, dob);
    }

    #[test]
    fn test_availability_excludes_past_and_held() {
        let conn = setup_db();
        let lee = insert_provider(&conn, "Dr. Lee").unwrap();
        let kim = insert_provider(&conn, "Dr. Kim").unwrap();
        let today = now().date();

        // Earlier today: already past.
        insert_slot(&conn, lee, today, t("09:00"), t("10:00")).unwrap();
        let later = insert_slot(&conn, lee, today, t("15:00"), t("16:00")).unwrap();
        insert_slot(&conn, lee, today + Duration::days(2), t("09:00"), t("10:00")).unwrap();
        // Kim only has a held slot.
        let held = insert_slot(&conn, kim, today + Duration::days(1), t("09:00"), t("10:00")).unwrap();
        conn.execute("UPDATE slots SET status = 'held' WHERE id = ?1", params![held])
            .unwrap();

        let providers = providers_with_availability(&conn, &now()).unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "Dr. Lee");
        assert_eq!(providers[0].next_open.as_ref().unwrap().id, later);

        let dates = open_dates(&conn, lee, &now(), 5).unwrap();
        assert_eq!(dates, vec![today, today + Duration::days(2)]);

        let slots = open_slots_on(&conn, lee, today, &now()).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start_label(), "3:00 PM");
    }

    #[test]
    fn test_open_dates_limit() {
        let conn = setup_db();
        let lee = insert_provider(&conn, "Dr. Lee").unwrap();
        for day in 1..=8 {
            let date = now().date() + Duration::days(day);
            insert_slot(&conn, lee, date, t("09:00"), t("10:00")).unwrap();
            insert_slot(&conn, lee, date, t("11:00"), t("12:00")).unwrap();
        }

        let dates = open_dates(&conn, lee, &now(), 5).unwrap();
        assert_eq!(dates.len(), 5);
        assert_eq!(dates[0], now().date() + Duration::days(1));
    }
}
