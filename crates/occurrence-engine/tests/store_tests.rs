//! Tests for the in-memory store and the snapshot document format.

use occurrence_engine::{
    Appointment, AppointmentStore, CivilTime, EngineError, Exception, ExceptionKind, Frequency,
    MemoryStore, RecurrenceRule, Status, WallClock,
};

fn civil(s: &str) -> CivilTime {
    s.parse().expect("canonical time")
}

const SNAPSHOT: &str = r#"{
  "version": 1,
  "clients": [{ "id": "c1", "name": "Juan" }],
  "appointments": [
    {
      "id": "A",
      "clientId": "c1",
      "serviceId": "haircut",
      "title": "Juan",
      "startDateTime": "2024-01-04T10:00:00",
      "durationMin": 30,
      "isRecurring": true,
      "rrule": { "freq": "WEEKLY", "interval": 1, "byweekday": [3] },
      "status": "pending",
      "notes": "prefers scissors"
    },
    {
      "id": "S",
      "serviceId": "beard",
      "startDateTime": "2024-01-10T23:30:00",
      "durationMin": 60
    }
  ],
  "exceptions": [
    {
      "id": "x1",
      "appointmentId": "A",
      "originalDateTime": "2024-01-11T10:00:00",
      "type": "skip"
    },
    {
      "id": "x2",
      "appointmentId": "A",
      "originalDateTime": "2024-01-18T10:00:00",
      "type": "move",
      "newStartDateTime": "2024-01-19T09:00:00",
      "newDurationMin": 45
    }
  ]
}"#;

// ---------------------------------------------------------------------------
// Snapshot document
// ---------------------------------------------------------------------------

#[test]
fn loads_the_stored_document_format() {
    let store = MemoryStore::from_json(SNAPSHOT).expect("should load");

    let a = store.appointment("A").unwrap().expect("A exists");
    assert_eq!(a.client_id.as_deref(), Some("c1"));
    assert_eq!(a.start, civil("2024-01-04T10:00:00"));
    assert_eq!(a.duration_minutes, 30);
    assert!(a.is_recurring);
    let rule = a.rule.as_ref().expect("rule");
    assert_eq!(rule.freq, Frequency::Weekly);
    assert_eq!(rule.byweekday, vec![3]);
    assert_eq!(a.status, Some(Status::Pending));
    assert_eq!(a.notes.as_deref(), Some("prefers scissors"));

    let s = store.appointment("S").unwrap().expect("S exists");
    assert!(!s.is_recurring);
    assert_eq!(s.status, None);

    let exceptions = store.exceptions().unwrap();
    assert_eq!(exceptions.len(), 2);
    assert!(exceptions[0].is_skip());
    assert_eq!(
        exceptions[1].kind,
        ExceptionKind::Move {
            new_start: Some(civil("2024-01-19T09:00:00")),
            new_duration_minutes: Some(45),
        }
    );
}

#[test]
fn snapshot_survives_a_save_and_reload() {
    let store = MemoryStore::from_json(SNAPSHOT).unwrap();

    let json = store.to_json().unwrap();
    let reloaded = MemoryStore::from_json(&json).unwrap();

    assert_eq!(reloaded, store);
    assert!(json.contains("\"startDateTime\": \"2024-01-04T10:00:00\""));
    assert!(json.contains("\"type\": \"move\""));
    assert!(json.contains("\"name\": \"Juan\""), "client records are kept");
}

#[test]
fn unsupported_versions_are_rejected() {
    for version in [0, 2] {
        let json = format!(r#"{{"version": {}, "appointments": [], "exceptions": []}}"#, version);
        let result = MemoryStore::from_json(&json);
        assert!(
            matches!(result, Err(EngineError::Store(_))),
            "version {} should be rejected",
            version
        );
    }
}

const MIXED: &str = r#"{
  "version": 1,
  "appointments": [
    { "id": "A", "serviceId": "x", "durationMin": 30, "startDateTime": "2024-01-04T10:00:00" },
    { "id": "B", "serviceId": "x", "durationMin": 30, "startDateTime": "2024-01-05T10:00:00.000-03:00" },
    { "id": "C", "serviceId": "x", "durationMin": 30, "startDateTime": "next tuesday" }
  ],
  "exceptions": [
    { "id": "x1", "appointmentId": "A", "originalDateTime": "2024-01-04T13:00:00Z", "type": "skip" }
  ]
}"#;

#[test]
fn one_bad_record_does_not_lose_the_others() {
    let store = MemoryStore::from_json(MIXED).expect("should load");

    assert!(store.appointment("A").unwrap().is_some());
    assert!(store.appointment("B").unwrap().is_none());
    assert!(store.exceptions().unwrap().is_empty());

    let failed: Vec<&str> = store.load_failures().iter().map(|f| f.id.as_str()).collect();
    assert_eq!(failed, vec!["B", "C", "x1"]);
    assert_eq!(store.load_failures()[0].table, "appointments");
    assert_eq!(store.load_failures()[2].table, "exceptions");
}

#[test]
fn unreadable_records_are_written_back_untouched() {
    let store = MemoryStore::from_json(MIXED).unwrap();

    let json = store.to_json().unwrap();

    assert!(json.contains("2024-01-05T10:00:00.000-03:00"));
    assert!(json.contains("next tuesday"));
    assert_eq!(MemoryStore::from_json(&json).unwrap().load_failures().len(), 3);
}

#[test]
fn replacing_an_unreadable_record_drops_the_old_copy() {
    let mut store = MemoryStore::from_json(MIXED).unwrap();

    store
        .put_appointment(Appointment::single("C", "x", civil("2024-01-06T10:00:00"), 30))
        .unwrap();
    let reloaded = MemoryStore::from_json(&store.to_json().unwrap()).unwrap();

    assert!(!reloaded.to_json().unwrap().contains("next tuesday"));
    assert_eq!(reloaded.load_failures().len(), 2);
}

#[test]
fn offset_timestamps_are_normalized_into_the_zone() {
    let clock = WallClock::from_name("America/Montevideo").unwrap();

    let store = MemoryStore::from_json_in(MIXED, &clock).expect("should load");

    let b = store.appointment("B").unwrap().expect("B is readable in a zone");
    assert_eq!(b.start, civil("2024-01-05T10:00:00"));
    let skip = &store.exceptions().unwrap()[0];
    assert_eq!(skip.original_date_time, civil("2024-01-04T10:00:00"));

    let failed: Vec<&str> = store.load_failures().iter().map(|f| f.id.as_str()).collect();
    assert_eq!(failed, vec!["C"]);
}

#[test]
fn malformed_json_is_a_store_error() {
    assert!(matches!(MemoryStore::from_json("{"), Err(EngineError::Store(_))));
}

// ---------------------------------------------------------------------------
// Point operations
// ---------------------------------------------------------------------------

#[test]
fn put_replaces_by_id() {
    let mut store = MemoryStore::new();
    store
        .put_appointment(Appointment::single("S", "x", civil("2024-01-10T10:00:00"), 30))
        .unwrap();
    store
        .put_appointment(Appointment::single("S", "x", civil("2024-01-10T11:00:00"), 45))
        .unwrap();

    let all = store.appointments().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].duration_minutes, 45);
}

#[test]
fn deleting_an_appointment_cascades_to_its_exceptions() {
    let mut store = MemoryStore::with_records(
        vec![
            Appointment::recurring(
                "A",
                "x",
                civil("2024-01-04T10:00:00"),
                30,
                RecurrenceRule::weekly([3]),
            ),
            Appointment::recurring(
                "B",
                "x",
                civil("2024-01-05T10:00:00"),
                30,
                RecurrenceRule::weekly([4]),
            ),
        ],
        vec![
            Exception::skip("x1", "A", civil("2024-01-11T10:00:00")),
            Exception::skip("x2", "B", civil("2024-01-12T10:00:00")),
        ],
    );

    store.delete_appointment("A").unwrap();

    assert!(store.appointment("A").unwrap().is_none());
    let remaining: Vec<String> = store
        .exceptions()
        .unwrap()
        .into_iter()
        .map(|x| x.id)
        .collect();
    assert_eq!(remaining, vec!["x2"]);
}

#[test]
fn set_status_on_missing_appointment_is_not_found() {
    let mut store = MemoryStore::new();

    let result = store.set_status("nope", Status::Done);

    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[test]
fn delete_exception_removes_only_that_record() {
    let mut store = MemoryStore::with_records(
        Vec::new(),
        vec![
            Exception::skip("x1", "A", civil("2024-01-11T10:00:00")),
            Exception::skip("x2", "A", civil("2024-01-18T10:00:00")),
        ],
    );

    store.delete_exception("x1").unwrap();

    assert_eq!(store.exceptions().unwrap().len(), 1);
}
