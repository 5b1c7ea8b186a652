use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use actix_web::web::Data;
use actix_web::App;
use chrono::NaiveDate;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use school_attendance::attendance::aggregate::{DateRange, aggregate_range};
use school_attendance::attendance::memory::InMemoryAttendanceStore;
use school_attendance::attendance::service;
use school_attendance::attendance::store::{AttendanceStore, EntryFilter};
use school_attendance::auth::jwt::{TokenSubject, generate_access_token, generate_refresh_token};
use school_attendance::config::Config;
use school_attendance::model::attendance::{AttendanceSlot, MarkContext};
use school_attendance::model::role::Role;
use school_attendance::model::student::RosterStudent;
use school_attendance::routes;
use school_attendance::utils::academic_year_cache::AcademicYearCache;

const SECRET: &str = "attendance-test-secret";

fn config() -> Config {
    Config {
        database_url: "mysql://unused".to_string(),
        jwt_secret: SECRET.to_string(),
        server_addr: "127.0.0.1:0".to_string(),
        access_token_ttl: 900,
        refresh_token_ttl: 604_800,
        rate_login_per_min: 60,
        rate_refresh_per_min: 30,
        rate_protected_per_min: 10_000,
        api_prefix: "/api".to_string(),
        log_dir: "logs".to_string(),
        academic_year_cache_ttl: Duration::from_secs(60),
    }
}

fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

fn subject(role: Role, profile_id: Option<u64>) -> TokenSubject {
    TokenSubject {
        user_id: 100,
        username: "tester".to_string(),
        role: role.id(),
        profile_id,
    }
}

fn bearer(role: Role, profile_id: Option<u64>) -> (&'static str, String) {
    let token = generate_access_token(&subject(role, profile_id), SECRET, 900).unwrap();
    ("Authorization", format!("Bearer {token}"))
}

fn teacher() -> (&'static str, String) {
    bearer(Role::Teacher, Some(9))
}

fn student_named(id: u64, first: &str, last: &str) -> RosterStudent {
    RosterStudent {
        id,
        admission_number: format!("ADM-{id:03}"),
        first_name: first.to_string(),
        last_name: last.to_string(),
    }
}

fn march(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

fn slot(day: u32, subject_id: Option<u64>) -> AttendanceSlot {
    AttendanceSlot {
        class_id: 1,
        section_id: 2,
        subject_id,
        attendance_date: march(day),
    }
}

fn context(day: u32) -> MarkContext {
    MarkContext {
        slot: slot(day, None),
        academic_year_id: Some(3),
        marked_by: Some(9),
    }
}

fn statuses(pairs: &[(u64, &str)]) -> BTreeMap<u64, String> {
    pairs.iter().map(|(id, s)| (*id, s.to_string())).collect()
}

#[fixture]
fn school() -> InMemoryAttendanceStore {
    InMemoryAttendanceStore::new()
        .with_class(1, "Grade 5")
        .with_section(2, "A")
        .with_section(3, "B")
        .with_subject(7, "Mathematics")
        .with_current_academic_year(3)
        .with_student(1, 2, student_named(1, "Chen", "Li"))
        .with_student(1, 2, student_named(2, "Amina", "Rahman"))
        .with_student(1, 2, student_named(3, "Bilal", "Khan"))
        .with_student(1, 3, student_named(4, "Dara", "Sok"))
        .with_inactive_student(1, 2, student_named(5, "Eli", "Moss"))
}

macro_rules! test_app {
    ($store:expr) => {{
        let store: Arc<dyn AttendanceStore> = $store;
        test::init_service(
            App::new()
                .app_data(Data::new(config()))
                .app_data(Data::from(store))
                .app_data(Data::new(AcademicYearCache::new(Duration::from_secs(60))))
                .configure(|cfg| routes::configure(cfg, config())),
        )
        .await
    }};
}

#[rstest]
#[actix_web::test]
async fn inserted_entries_show_up_in_the_range_aggregate(school: InMemoryAttendanceStore) {
    for day in 2..=6 {
        let outcome = service::insert_batch(&school, context(day), &statuses(&[(2, "present")]))
            .await
            .unwrap();
        assert_eq!(outcome.inserted_count(), 1);
    }

    let roster = school.roster(1, 2).await.unwrap();
    let entries = school.entries(&EntryFilter::default()).await.unwrap();
    let summary = aggregate_range(&roster, &entries, DateRange::new(march(1), march(31)).unwrap());

    let amina = summary.iter().find(|s| s.student_id == 2).unwrap();
    assert_eq!(amina.counts.total_days, 5);
    assert_eq!(amina.percentage, 100.0);
}

#[rstest]
#[actix_web::test]
async fn marking_twice_conflicts(school: InMemoryAttendanceStore) {
    let app = test_app!(Arc::new(school));
    let body = json!({
        "class_id": 1,
        "section_id": 2,
        "attendance_date": "2026-03-02",
        "statuses": {"1": "present", "2": "absent", "3": "excused"}
    });

    let req = TestRequest::post()
        .uri("/api/attendance")
        .peer_addr(peer())
        .insert_header(teacher())
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["inserted_count"], 2);
    assert_eq!(created["outcome"]["inserted"], json!([1, 2]));
    assert_eq!(
        created["outcome"]["skipped"],
        json!([{"student_id": 3, "reason": {"invalid_status": "excused"}}])
    );

    let req = TestRequest::post()
        .uri("/api/attendance")
        .peer_addr(peer())
        .insert_header(teacher())
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let conflict: Value = test::read_body_json(resp).await;
    assert_eq!(
        conflict["message"],
        "Attendance already marked for this date. Please edit existing attendance."
    );
}

#[rstest]
#[actix_web::test]
async fn empty_batch_is_rejected(school: InMemoryAttendanceStore) {
    let app = test_app!(Arc::new(school));
    let req = TestRequest::post()
        .uri("/api/attendance")
        .peer_addr(peer())
        .insert_header(teacher())
        .set_json(json!({"class_id": 1, "section_id": 2, "statuses": {}}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[case::student(Some(bearer(Role::Student, Some(1))), StatusCode::FORBIDDEN)]
#[case::anonymous(None, StatusCode::UNAUTHORIZED)]
#[actix_web::test]
async fn only_staff_may_mark(
    school: InMemoryAttendanceStore,
    #[case] auth: Option<(&'static str, String)>,
    #[case] expected: StatusCode,
) {
    let app = test_app!(Arc::new(school));
    let mut req = TestRequest::post()
        .uri("/api/attendance")
        .peer_addr(peer())
        .set_json(json!({"class_id": 1, "section_id": 2, "statuses": {"1": "present"}}));
    if let Some(header) = auth {
        req = req.insert_header(header);
    }
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), expected);
}

#[rstest]
#[actix_web::test]
async fn refresh_tokens_do_not_open_protected_routes(school: InMemoryAttendanceStore) {
    let app = test_app!(Arc::new(school));
    let (token, _) = generate_refresh_token(&subject(Role::Teacher, Some(9)), SECRET, 900).unwrap();
    let req = TestRequest::get()
        .uri("/api/attendance/reports/daily")
        .peer_addr(peer())
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[rstest]
#[actix_web::test]
async fn duplicate_check_distinguishes_subjects(school: InMemoryAttendanceStore) {
    let ctx = MarkContext {
        slot: slot(2, Some(7)),
        ..context(2)
    };
    service::insert_batch(&school, ctx, &statuses(&[(1, "present")]))
        .await
        .unwrap();
    let app = test_app!(Arc::new(school));

    for (query, expected) in [
        ("class_id=1&section_id=2&date=2026-03-02&subject_id=7", true),
        ("class_id=1&section_id=2&date=2026-03-02&subject_id=8", false),
        ("class_id=1&section_id=2&date=2026-03-02", false),
    ] {
        let req = TestRequest::get()
            .uri(&format!("/api/attendance/duplicate?{query}"))
            .peer_addr(peer())
            .insert_header(teacher())
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["exists"], expected, "{query}");
    }
}

#[rstest]
#[actix_web::test]
async fn day_sheet_lists_the_whole_roster(school: InMemoryAttendanceStore) {
    service::insert_batch(&school, context(2), &statuses(&[(1, "late")]))
        .await
        .unwrap();
    let app = test_app!(Arc::new(school));

    let req = TestRequest::get()
        .uri("/api/attendance?class_id=1&section_id=2&date=2026-03-02")
        .peer_addr(peer())
        .insert_header(bearer(Role::Student, Some(2)))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    let rows = resp["rows"].as_array().unwrap();
    let names: Vec<&str> = rows
        .iter()
        .map(|r| r["student"]["first_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Amina", "Bilal", "Chen"]);
    assert_eq!(rows[2]["status"], "late");
    assert_eq!(rows[2]["entry_id"], 1);
    assert!(rows[0]["status"].is_null());
}

#[rstest]
#[actix_web::test]
async fn editing_an_entry(school: InMemoryAttendanceStore) {
    service::insert_batch(&school, context(2), &statuses(&[(1, "absent")]))
        .await
        .unwrap();
    let store = Arc::new(school);
    let app = test_app!(store.clone());

    let put = |uri: &str, body: Value| {
        TestRequest::put()
            .uri(uri)
            .peer_addr(peer())
            .insert_header(teacher())
            .set_json(body)
            .to_request()
    };

    let resp = test::call_service(
        &app,
        put("/api/attendance/1", json!({"status": "late", "remarks": "Bus delay"})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(&app, put("/api/attendance/1", json!({"status": "excused"}))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, put("/api/attendance/99", json!({"status": "present"}))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let entries = store.entries(&EntryFilter::default()).await.unwrap();
    assert_eq!(entries[0].status.to_string(), "late");
    assert_eq!(entries[0].remarks.as_deref(), Some("Bus delay"));
}

#[rstest]
#[actix_web::test]
async fn class_wise_report_covers_every_roster_student(school: InMemoryAttendanceStore) {
    service::insert_batch(&school, context(2), &statuses(&[(1, "present"), (2, "present")]))
        .await
        .unwrap();
    service::insert_batch(&school, context(3), &statuses(&[(1, "absent"), (2, "present")]))
        .await
        .unwrap();
    // outside the requested range
    service::insert_batch(&school, context(20), &statuses(&[(1, "present")]))
        .await
        .unwrap();
    let app = test_app!(Arc::new(school));

    let req = TestRequest::get()
        .uri("/api/attendance/reports/class-wise?class_id=1&section_id=2&start_date=2026-03-01&end_date=2026-03-10")
        .peer_addr(peer())
        .insert_header(teacher())
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp["class_name"], "Grade 5");
    assert_eq!(resp["section_name"], "A");
    let students = resp["students"].as_array().unwrap();
    let ids: Vec<u64> = students.iter().map(|s| s["student_id"].as_u64().unwrap()).collect();
    assert_eq!(ids, [2, 3, 1]);

    assert_eq!(students[0]["percentage"], 100.0);
    assert_eq!(students[1]["counts"]["total_days"], 0);
    assert_eq!(students[1]["percentage"], 0.0);
    assert_eq!(students[2]["counts"]["total_days"], 2);
    assert_eq!(students[2]["percentage"], 50.0);
}

#[rstest]
#[case::missing_section("class_id=1")]
#[case::inverted("class_id=1&section_id=2&start_date=2026-03-10&end_date=2026-03-01")]
#[actix_web::test]
async fn class_wise_report_rejects_bad_queries(
    school: InMemoryAttendanceStore,
    #[case] query: &str,
) {
    let app = test_app!(Arc::new(school));
    let req = TestRequest::get()
        .uri(&format!("/api/attendance/reports/class-wise?{query}"))
        .peer_addr(peer())
        .insert_header(teacher())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[actix_web::test]
async fn daily_report_groups_by_class_and_section(school: InMemoryAttendanceStore) {
    service::insert_batch(
        &school,
        context(2),
        &statuses(&[(1, "present"), (2, "late"), (3, "absent")]),
    )
    .await
    .unwrap();
    let section_b = MarkContext {
        slot: AttendanceSlot {
            section_id: 3,
            ..slot(2, None)
        },
        ..context(2)
    };
    service::insert_batch(&school, section_b, &statuses(&[(4, "half_day")]))
        .await
        .unwrap();
    let app = test_app!(Arc::new(school));

    let req = TestRequest::get()
        .uri("/api/attendance/reports/daily?date=2026-03-02")
        .peer_addr(peer())
        .insert_header(bearer(Role::Admin, None))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp["report_date"], "2026-03-02");
    let rows = resp["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["section_name"], "A");
    assert_eq!(rows[0]["total_students"], 3);
    assert_eq!(rows[0]["counts"]["late"], 1);
    assert_eq!(rows[1]["section_name"], "B");
    assert_eq!(rows[1]["counts"]["half_day"], 1);
}

#[rstest]
#[case::own_report(Role::Student, Some(2), 2, StatusCode::OK)]
#[case::someone_elses(Role::Student, Some(2), 1, StatusCode::FORBIDDEN)]
#[case::staff(Role::Teacher, Some(9), 1, StatusCode::OK)]
#[case::unknown_student(Role::Admin, None, 77, StatusCode::NOT_FOUND)]
#[actix_web::test]
async fn student_report_access(
    school: InMemoryAttendanceStore,
    #[case] role: Role,
    #[case] profile_id: Option<u64>,
    #[case] student_id: u64,
    #[case] expected: StatusCode,
) {
    let app = test_app!(Arc::new(school));
    let req = TestRequest::get()
        .uri(&format!("/api/attendance/reports/student/{student_id}"))
        .peer_addr(peer())
        .insert_header(bearer(role, profile_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), expected);
}

#[rstest]
#[actix_web::test]
async fn student_report_lists_newest_first(school: InMemoryAttendanceStore) {
    for (day, status) in [(2, "present"), (3, "present"), (4, "absent")] {
        service::insert_batch(&school, context(day), &statuses(&[(2, status)]))
            .await
            .unwrap();
    }
    let app = test_app!(Arc::new(school));

    let req = TestRequest::get()
        .uri("/api/attendance/reports/student/2?start_date=2026-03-01&end_date=2026-03-31")
        .peer_addr(peer())
        .insert_header(bearer(Role::Student, Some(2)))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp["student"]["class_name"], "Grade 5");
    assert_eq!(resp["counts"]["total_days"], 3);
    assert_eq!(resp["percentage"], 66.67);
    assert_eq!(resp["records"][0]["attendance_date"], "2026-03-04");
}

#[rstest]
#[actix_web::test]
async fn student_report_names_the_subject(school: InMemoryAttendanceStore) {
    let maths = MarkContext {
        slot: slot(5, Some(7)),
        ..context(5)
    };
    service::insert_batch(&school, maths, &statuses(&[(2, "present")]))
        .await
        .unwrap();
    service::insert_batch(&school, context(4), &statuses(&[(2, "absent")]))
        .await
        .unwrap();
    let app = test_app!(Arc::new(school));

    let req = TestRequest::get()
        .uri("/api/attendance/reports/student/2?start_date=2026-03-01&end_date=2026-03-31")
        .peer_addr(peer())
        .insert_header(teacher())
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp["records"][0]["subject_id"], 7);
    assert_eq!(resp["records"][0]["subject_name"], "Mathematics");
    assert!(resp["records"][1]["subject_name"].is_null());
}

#[rstest]
#[actix_web::test]
async fn students_see_their_overview(school: InMemoryAttendanceStore) {
    service::insert_batch(&school, context(2), &statuses(&[(2, "present")]))
        .await
        .unwrap();
    service::insert_batch(&school, context(3), &statuses(&[(2, "late")]))
        .await
        .unwrap();
    let app = test_app!(Arc::new(school));

    let req = TestRequest::get()
        .uri("/api/attendance/me")
        .peer_addr(peer())
        .insert_header(bearer(Role::Student, Some(2)))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["student_id"], 2);
    assert_eq!(resp["counts"]["total_days"], 2);
    assert_eq!(resp["percentage"], 50.0);

    let req = TestRequest::get()
        .uri("/api/attendance/me")
        .peer_addr(peer())
        .insert_header(teacher())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[rstest]
#[actix_web::test]
async fn storage_failures_stay_generic(mut school: InMemoryAttendanceStore) {
    school.toggle_offline();
    let app = test_app!(Arc::new(school));

    let req = TestRequest::get()
        .uri("/api/attendance/reports/daily")
        .peer_addr(peer())
        .insert_header(teacher())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"message": "Internal Server Error"}));
}
