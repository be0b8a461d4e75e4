use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_uuid, require_role};
use crate::db::{DatabaseError, WhereClause};
use crate::models::enums::*;
use crate::models::*;

const SCHEDULE_SELECT: &str = "SELECT s.id, s.doctor_id, d.name, s.day_of_week, s.time_slots
    FROM schedules s
    JOIN users d ON d.id = s.doctor_id";

const WEEKDAY_ORDER: &str = "CASE s.day_of_week
        WHEN 'Monday' THEN 1 WHEN 'Tuesday' THEN 2 WHEN 'Wednesday' THEN 3
        WHEN 'Thursday' THEN 4 WHEN 'Friday' THEN 5 WHEN 'Saturday' THEN 6
        ELSE 7 END";

/// Replace the slot list for one doctor and weekday, creating the row if
/// needed. `slots` must already be normalized.
pub fn upsert_schedule(
    conn: &Connection,
    doctor_id: &Uuid,
    day: DayOfWeek,
    slots: &[String],
) -> Result<Schedule, DatabaseError> {
    require_role(conn, doctor_id, Role::Doctor)?;

    let encoded = serde_json::to_string(slots)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    conn.execute(
        "INSERT INTO schedules (id, doctor_id, day_of_week, time_slots)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (doctor_id, day_of_week) DO UPDATE SET time_slots = excluded.time_slots",
        params![
            Uuid::new_v4().to_string(),
            doctor_id.to_string(),
            day.as_str(),
            encoded,
        ],
    )?;

    let filter = ScheduleFilter {
        doctor_id: Some(*doctor_id),
        day_of_week: Some(day),
    };
    list_schedules(conn, &filter)?
        .into_iter()
        .next()
        .ok_or_else(|| DatabaseError::not_found("Schedule", format!("{doctor_id}/{day}")))
}

/// Ordered by doctor name, then Monday through Sunday.
pub fn list_schedules(conn: &Connection, filter: &ScheduleFilter) -> Result<Vec<Schedule>, DatabaseError> {
    let mut clause = WhereClause::new();
    clause
        .eq("s.doctor_id", filter.doctor_id.map(|id| id.to_string()))
        .eq("s.day_of_week", filter.day_of_week.map(|d| d.as_str()));

    let sql = format!(
        "{SCHEDULE_SELECT} WHERE 1=1{} ORDER BY d.name ASC, s.doctor_id, {WEEKDAY_ORDER}",
        clause.sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(clause.params().as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut schedules = Vec::new();
    for row in rows {
        let (id, doctor_id, doctor_name, day, slots) = row?;
        schedules.push(Schedule {
            id: parse_uuid(&id)?,
            doctor_id: parse_uuid(&doctor_id)?,
            doctor_name,
            day_of_week: DayOfWeek::from_str(&day)?,
            time_slots: serde_json::from_str(&slots)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        });
    }
    Ok(schedules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::{doctor, patient};
    use crate::db::sqlite::open_memory_database;

    fn slots(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn upsert_replaces_slots_in_place() {
        let mut conn = open_memory_database().unwrap();
        let d = doctor(&mut conn, "Doc");

        let first = upsert_schedule(&conn, &d.id, DayOfWeek::Monday, &slots(&["09:00"])).unwrap();
        let second =
            upsert_schedule(&conn, &d.id, DayOfWeek::Monday, &slots(&["10:00", "11:00"])).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.time_slots, vec!["10:00", "11:00"]);
        assert_eq!(list_schedules(&conn, &ScheduleFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn ordered_by_doctor_then_weekday() {
        let mut conn = open_memory_database().unwrap();
        let b = doctor(&mut conn, "Bea");
        let a = doctor(&mut conn, "Abe");

        upsert_schedule(&conn, &b.id, DayOfWeek::Monday, &slots(&["09:00"])).unwrap();
        upsert_schedule(&conn, &a.id, DayOfWeek::Friday, &slots(&["09:00"])).unwrap();
        upsert_schedule(&conn, &a.id, DayOfWeek::Tuesday, &slots(&["09:00"])).unwrap();

        let all = list_schedules(&conn, &ScheduleFilter::default()).unwrap();
        let order: Vec<_> = all
            .iter()
            .map(|s| (s.doctor_name.as_str(), s.day_of_week))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Abe", DayOfWeek::Tuesday),
                ("Abe", DayOfWeek::Friday),
                ("Bea", DayOfWeek::Monday),
            ]
        );
    }

    #[test]
    fn schedule_requires_a_doctor() {
        let mut conn = open_memory_database().unwrap();
        let p = patient(&mut conn, "Pat");
        assert!(matches!(
            upsert_schedule(&conn, &p.id, DayOfWeek::Monday, &slots(&["09:00"])),
            Err(DatabaseError::InvalidReference(_))
        ));
    }
}
