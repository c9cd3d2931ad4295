mod common;

use booking_ingestion::application::ingestion_service::{UploadPayload, UploadRequest};
use booking_ingestion::domain::{
    dates::date_to_serial,
    error::{IngestionError, SheetError},
    models::{AdminSession, NewAuditEntry, Role, TenantId, UploadType, UploadedFile, WriteMode},
    ports::AuditLog,
};
use booking_ingestion::infrastructure::sqlite::SqliteLogRepository;
use chrono::NaiveDate;
use common::*;

fn refunds_file(pnrs: &[&str]) -> UploadedFile {
    UploadedFile::new("refunds.xlsx", xlsx(&[("Refunds", &REFUND_HEADERS[..], refund_rows(pnrs))]))
}

fn statement(bookings: &[(&str, &str)], refunds: &[&str]) -> UploadedFile {
    UploadedFile::new(
        "statement.xlsx",
        xlsx(&[
            ("Bookings Nov", &BOOKING_HEADERS[..], booking_rows(bookings)),
            ("Refunds Nov", &REFUND_HEADERS[..], refund_rows(refunds)),
        ]),
    )
}

#[tokio::test]
async fn reupload_without_overwrite_is_idempotent() {
    let app = test_app(500).await;
    let file = statement(&[("A1", "Asha"), ("A2", "Ravi"), ("A3", "Meera")], &["R1"]);

    let first = app.service.upload(upload(ACME, WriteMode::Skip, file.clone())).await.unwrap();
    assert!(first.success);
    assert_eq!(first.bookings.inserted, 3);
    assert_eq!(first.refunds.inserted, 1);
    assert_eq!(first.preview.bookings.len(), 3);

    let second = app.service.upload(upload(ACME, WriteMode::Skip, file)).await.unwrap();
    assert_eq!(second.bookings.inserted, 0);
    assert_eq!(second.bookings.skipped, 3);
    assert_eq!(second.refunds.skipped, 1);

    assert_eq!(stored_bookings(&app.pool, ACME).await, ["A1", "A2", "A3"]);
    assert!(has_excel(&app.pool, ACME).await);
}

#[tokio::test]
async fn overwrite_replaces_every_record_of_the_tenant() {
    let app = test_app(500).await;
    app.service
        .upload(upload(ACME, WriteMode::Skip, statement(&[("A1", "x"), ("A2", "y"), ("A3", "z")], &["R1"])))
        .await
        .unwrap();

    let outcome = app
        .service
        .upload(upload(ACME, WriteMode::Replace, bookings_file(&[("B1", "p"), ("B2", "q"), ("B1", "dup")])))
        .await
        .unwrap();

    assert_eq!(outcome.bookings.inserted, 2);
    assert_eq!(outcome.bookings.skipped, 1);
    assert_eq!(stored_bookings(&app.pool, ACME).await, ["B1", "B2"]);
    assert!(stored_refunds(&app.pool, ACME).await.is_empty());
}

#[tokio::test]
async fn rows_with_blank_identifier_are_ignored() {
    let app = test_app(500).await;
    let rows = vec![
        vec![Cell::Number(1.0), Cell::Blank, Cell::text("P1"), Cell::text("a"), Cell::Number(1.0)],
        vec![Cell::Number(2.0), Cell::Blank, Cell::text("   "), Cell::text("b"), Cell::Number(1.0)],
        vec![Cell::Number(3.0), Cell::Blank, Cell::Blank, Cell::text("c"), Cell::Number(1.0)],
        vec![Cell::Number(4.0), Cell::Blank, Cell::text("P2"), Cell::text("d"), Cell::Number(1.0)],
    ];
    let file = UploadedFile::new("b.xlsx", xlsx(&[("Bookings", &BOOKING_HEADERS[..], rows)]));

    let outcome = app.service.upload(upload(ACME, WriteMode::Skip, file)).await.unwrap();
    assert_eq!(outcome.bookings.inserted, 2);
    assert_eq!(outcome.bookings.skipped, 0);
    assert_eq!(stored_bookings(&app.pool, ACME).await, ["P1", "P2"]);
}

#[tokio::test]
async fn identifier_owned_by_another_tenant_rejects_the_whole_batch() {
    let app = test_app(500).await;
    app.service
        .upload(upload(GLOBEX, WriteMode::Skip, bookings_file(&[("X1", "owned")])))
        .await
        .unwrap();

    let err = app
        .service
        .upload(upload(ACME, WriteMode::Skip, statement(&[("N1", "a"), ("X1", "b"), ("N2", "c")], &["R7"])))
        .await
        .unwrap_err();

    match err {
        IngestionError::CrossTenantConflict { identifiers } => assert_eq!(identifiers, ["X1"]),
        other => panic!("expected cross-tenant conflict, got {other:?}"),
    }
    assert!(stored_bookings(&app.pool, ACME).await.is_empty());
    assert!(stored_refunds(&app.pool, ACME).await.is_empty());
    assert!(!has_excel(&app.pool, ACME).await);

    let entries = audit_entries(&app.pool, ACME).await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].2.contains("\nERROR: PNR(s) already exist for different company: X1"));
    assert_eq!(entries[0].1, 0);
}

#[tokio::test]
async fn overwrite_does_not_bypass_the_cross_tenant_check() {
    let app = test_app(500).await;
    app.service
        .upload(upload(GLOBEX, WriteMode::Skip, bookings_file(&[("X1", "owned")])))
        .await
        .unwrap();
    app.service
        .upload(upload(ACME, WriteMode::Skip, bookings_file(&[("A1", "mine")])))
        .await
        .unwrap();

    let err = app
        .service
        .upload(upload(ACME, WriteMode::Replace, bookings_file(&[("X1", "b")])))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::CrossTenantConflict { .. }));
    // The replace delete was rolled back with the rest.
    assert_eq!(stored_bookings(&app.pool, ACME).await, ["A1"]);
}

#[tokio::test]
async fn identifier_spaces_are_separate_per_record_type() {
    let app = test_app(500).await;
    app.service
        .upload(upload(GLOBEX, WriteMode::Skip, refunds_file(&["S1"])))
        .await
        .unwrap();

    let outcome = app
        .service
        .upload(upload(ACME, WriteMode::Skip, bookings_file(&[("S1", "shared pnr")])))
        .await
        .unwrap();
    assert_eq!(outcome.bookings.inserted, 1);
}

#[tokio::test]
async fn conflict_outcome_does_not_depend_on_chunk_size() {
    let pnrs: Vec<String> = (0..60).map(|i| format!("C{i:03}")).collect();
    let mine: Vec<(&str, &str)> = pnrs.iter().map(|p| (p.as_str(), "pax")).collect();

    for chunk_size in [1, 500, 5000] {
        let app = test_app(chunk_size).await;
        app.service
            .upload(upload(GLOBEX, WriteMode::Skip, bookings_file(&[("C059", "theirs")])))
            .await
            .unwrap();
        app.service
            .upload(upload(ACME, WriteMode::Skip, bookings_file(&mine[..10])))
            .await
            .unwrap();

        let err = app
            .service
            .upload(upload(ACME, WriteMode::Skip, bookings_file(&mine)))
            .await
            .unwrap_err();
        match err {
            IngestionError::CrossTenantConflict { identifiers } => {
                assert_eq!(identifiers, ["C059"], "chunk size {chunk_size}")
            }
            other => panic!("chunk size {chunk_size}: unexpected {other:?}"),
        }

        let outcome = app
            .service
            .upload(upload(ACME, WriteMode::Skip, bookings_file(&mine[..59])))
            .await
            .unwrap();
        assert_eq!(outcome.bookings.inserted, 49, "chunk size {chunk_size}");
        assert_eq!(outcome.bookings.skipped, 10, "chunk size {chunk_size}");
    }
}

#[tokio::test]
async fn serial_and_text_dates_store_the_same_calendar_date() {
    let app = test_app(500).await;
    let march = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
    let rows = vec![
        vec![Cell::Number(1.0), Cell::Number(date_to_serial(march) as f64), Cell::text("D1"), Cell::Blank, Cell::Blank],
        vec![Cell::Number(2.0), Cell::text("2025-03-15"), Cell::text("D2"), Cell::Blank, Cell::Blank],
        vec![Cell::Number(3.0), Cell::Number(44562.0), Cell::text("D3"), Cell::Blank, Cell::Blank],
    ];
    let file = UploadedFile::new("dates.xlsx", xlsx(&[("Bookings", &BOOKING_HEADERS[..], rows)]));
    app.service.upload(upload(ACME, WriteMode::Skip, file)).await.unwrap();

    let dates: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT pnr_ticket_no, date_of_booking FROM bookings ORDER BY pnr_ticket_no")
            .fetch_all(&app.pool)
            .await
            .unwrap();
    assert_eq!(
        dates,
        [
            ("D1".to_string(), Some("2025-03-15".to_string())),
            ("D2".to_string(), Some("2025-03-15".to_string())),
            ("D3".to_string(), Some("2022-01-01".to_string())),
        ]
    );
}

#[tokio::test]
async fn update_mode_rewrites_existing_rows() {
    let app = test_app(500).await;
    app.service
        .upload(upload(ACME, WriteMode::Skip, bookings_file(&[("U1", "Old Name")])))
        .await
        .unwrap();

    let outcome = app
        .service
        .upload(upload(ACME, WriteMode::Update, bookings_file(&[("U1", "New Name"), ("U2", "Fresh")])))
        .await
        .unwrap();
    assert_eq!(outcome.bookings.updated, 1);
    assert_eq!(outcome.bookings.inserted, 1);

    let name: Option<String> = sqlx::query_scalar("SELECT passenger_name FROM bookings WHERE pnr_ticket_no = 'U1'")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(name.as_deref(), Some("New Name"));
}

#[tokio::test]
async fn unique_violation_inside_the_batch_rolls_everything_back() {
    let app = test_app(500).await;
    let headers = ["PNR/Ticket #", "Booking ID"];
    let rows = vec![
        vec![Cell::text("K1"), Cell::text("BK-1")],
        vec![Cell::text("K2"), Cell::text("BK-1")],
    ];
    let file = UploadedFile::new("dup.xlsx", xlsx(&[("Bookings", &headers[..], rows)]));

    let err = app.service.upload(upload(ACME, WriteMode::Skip, file)).await.unwrap_err();
    assert!(matches!(err, IngestionError::UniqueConflict(_)), "got {err:?}");
    assert!(stored_bookings(&app.pool, ACME).await.is_empty());
}

#[tokio::test]
async fn pre_parsed_json_rows_are_ingested() {
    let app = test_app(500).await;
    let bookings = vec![
        serde_json::from_str(r#"{"PNR/Ticket #": 4512345678, "Total Amount": "1,200.50", "Statement Period": "Nov-25"}"#)
            .unwrap(),
    ];
    let refunds = vec![serde_json::from_str(r#"{"PNR_NO": "R1", "REFUND": 99}"#).unwrap()];

    let outcome = app
        .service
        .upload(UploadRequest {
            session: admin(),
            tenant: ACME,
            mode: WriteMode::Skip,
            payload: UploadPayload::Rows {
                file_name: Some("client-parsed.xlsx".into()),
                bookings,
                refunds,
            },
        })
        .await
        .unwrap();

    assert_eq!(outcome.bookings.inserted, 1);
    assert_eq!(outcome.preview.bookings[0].total_amount, 1200.5);
    assert_eq!(stored_bookings(&app.pool, ACME).await, ["4512345678"]);
    assert_eq!(stored_refunds(&app.pool, ACME).await, ["R1"]);
}

#[tokio::test]
async fn structural_problems_fail_before_any_write() {
    let app = test_app(500).await;

    let no_sheet = UploadedFile::new("x.xlsx", xlsx(&[("Summary", &["Total"][..], vec![])]));
    let err = app.service.upload(upload(ACME, WriteMode::Skip, no_sheet)).await.unwrap_err();
    assert!(matches!(err, IngestionError::Sheet(SheetError::SheetNotFound { .. })));

    let no_column = UploadedFile::new(
        "x.xlsx",
        xlsx(&[("Bookings", &["Sector"][..], vec![vec![Cell::text("DEL-BOM")]])]),
    );
    let err = app.service.upload(upload(ACME, WriteMode::Skip, no_column)).await.unwrap_err();
    assert!(matches!(err, IngestionError::Sheet(SheetError::ColumnNotFound { .. })));

    let only_blank = UploadedFile::new(
        "x.xlsx",
        xlsx(&[("Bookings", &BOOKING_HEADERS[..], vec![vec![Cell::Number(1.0), Cell::Blank, Cell::Blank]])]),
    );
    let err = app.service.upload(upload(ACME, WriteMode::Skip, only_blank)).await.unwrap_err();
    assert!(matches!(err, IngestionError::Validation(_)));

    assert!(stored_bookings(&app.pool, ACME).await.is_empty());
    let entries = audit_entries(&app.pool, ACME).await;
    assert_eq!(entries.len(), 3);
    assert!(entries[0].2.contains("\nERROR: Sheet named"), "{}", entries[0].2);
    assert!(entries[1].2.contains("\nERROR: Column \"PNR/Ticket #\" not found"), "{}", entries[1].2);
    assert!(entries[2].2.contains("\nERROR: No booking or refund rows"), "{}", entries[2].2);
    assert!(entries.iter().all(|(kind, inserted, _)| kind == "CLIENT_EXCEL_UPLOAD" && *inserted == 0));
}

#[tokio::test]
async fn callers_and_tenants_are_checked_first() {
    let app = test_app(500).await;

    let mut request = upload(ACME, WriteMode::Skip, bookings_file(&[("A1", "a")]));
    request.session = AdminSession {
        admin_id: 5,
        role: Role::Customer,
    };
    assert!(matches!(app.service.upload(request).await, Err(IngestionError::Unauthorized)));

    let err = app
        .service
        .upload(upload(TenantId(404), WriteMode::Skip, bookings_file(&[("A1", "a")])))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::TenantNotFound(TenantId(404))));
    assert!(stored_bookings(&app.pool, ACME).await.is_empty());

    // Rejected callers leave no trace; a missing tenant is audited.
    assert!(audit_entries(&app.pool, ACME).await.is_empty());
    let entries = audit_entries(&app.pool, TenantId(404)).await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].2.ends_with("\nERROR: Customer 404 not found"), "{}", entries[0].2);

    let err = app.service.clear_tenant(&admin(), TenantId(404)).await.unwrap_err();
    assert!(matches!(err, IngestionError::TenantNotFound(TenantId(404))));
    let entries = audit_entries(&app.pool, TenantId(404)).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].0, "CLIENT_EXCEL_DELETE");
    assert!(entries[1].2.ends_with("\nERROR: Customer 404 not found"));
}

#[tokio::test]
async fn successful_upload_is_audited() {
    let app = test_app(500).await;
    app.service
        .upload(upload(ACME, WriteMode::Skip, statement(&[("A1", "a"), ("A2", "b")], &["R1"])))
        .await
        .unwrap();

    let entries = audit_entries(&app.pool, ACME).await;
    assert_eq!(entries.len(), 1);
    let (upload_type, inserted, notes) = &entries[0];
    assert_eq!(upload_type, "CLIENT_EXCEL_UPLOAD");
    assert_eq!(*inserted, 3);
    assert!(notes.contains(" → SUCCESS: bookings 2/0/0, refunds 1/0/0"));
}

#[tokio::test]
async fn existence_check_and_clear() {
    let app = test_app(500).await;
    let session = admin();
    assert!(!app.service.existing_data(&session, ACME).await.unwrap().exists());

    app.service
        .upload(upload(ACME, WriteMode::Skip, statement(&[("A1", "a"), ("A2", "b")], &["R1"])))
        .await
        .unwrap();
    let counts = app.service.existing_data(&session, ACME).await.unwrap();
    assert_eq!((counts.bookings, counts.refunds), (2, 1));

    let deleted = app.service.clear_tenant(&session, ACME).await.unwrap();
    assert_eq!(deleted, 3);
    assert!(!app.service.existing_data(&session, ACME).await.unwrap().exists());
    assert!(!has_excel(&app.pool, ACME).await);

    let entries = audit_entries(&app.pool, ACME).await;
    assert_eq!(entries.last().unwrap().0, "CLIENT_EXCEL_DELETE");
}

#[tokio::test]
async fn concurrent_audit_notes_are_all_kept() {
    let app = test_app(500).await;
    let log_repo = SqliteLogRepository::new(app.pool.clone());
    let entry = log_repo
        .open_entry(NewAuditEntry {
            admin_id: 1,
            client_id: ACME,
            upload_type: UploadType::ClientExcelUpload,
            file_name: None,
            notes: "start".into(),
        })
        .await
        .unwrap();

    let (first, second, third) = tokio::join!(
        log_repo.append_note(&entry.log_id, " [a]"),
        log_repo.append_note(&entry.log_id, " [b]"),
        log_repo.append_note(&entry.log_id, " [c]"),
    );
    first.unwrap();
    second.unwrap();
    third.unwrap();

    let notes = log_repo.find_entry(&entry.log_id).await.unwrap().unwrap().notes;
    assert!(notes.starts_with("start"));
    for note in [" [a]", " [b]", " [c]"] {
        assert!(notes.contains(note), "{notes}");
    }
    assert_eq!(notes.len(), "start [a] [b] [c]".len());

    let missing = log_repo.append_note("no-such-entry", "x").await;
    assert!(missing.is_err());
}
