//! End-to-end reconciliation flows through the shared scan engine.
//!
//! Every test runs against the demo plans with an in-memory cache and a manual clock:
//! - receiving: plan 10 drill, plan 5 drill bits, plan 20 gloves
//! - picking route: A1-01 (drill x2, tape x1), A1-02 (bits x3), B2-05 (gloves x4)
//! - placement: drill at A1-01, bits at A1-04, gloves at B2-01

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::TestEngine;
use stateset_warehouse::{
    errors::{PolicyViolation, ServiceError},
    events::Event,
    models::{
        DiscrepancyKind, DiscrepancyTag, DocumentDetails, DocumentId, DocumentStatus,
        DocumentType, InventoryScope, LineId, LineStatus,
    },
    repositories::DocumentRepository,
    services::{
        collaborators::StaticFlags, document_lifecycle::FinishOutcome, scan_engine::ScanOutcome,
    },
    sync_queue::SyncActionType,
};

const DRILL: &str = "4820000000011";
const BITS: &str = "4820000000028";
const GLOVES: &str = "4820000000035";
const TAPE: &str = "4820000000042";

fn updated_line(outcome: ScanOutcome) -> stateset_warehouse::models::Line {
    match outcome {
        ScanOutcome::LineUpdated { line, .. }
        | ScanOutcome::LineCreated { line }
        | ScanOutcome::Coalesced { line } => line,
        other => panic!("expected a line outcome, got {:?}", other),
    }
}

// ==================== Receiving ====================

#[tokio::test]
async fn ten_scans_walk_a_line_from_pending_to_completed() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Receiving, &DocumentId::new("r-1"))
        .await
        .unwrap();
    assert_eq!(session.origin(), "demo");
    assert_eq!(
        session.line(&LineId::new("r-1-1")).unwrap().status,
        LineStatus::Pending
    );

    for scan in 1..=10u32 {
        let line = updated_line(t.engine.scan(&mut session, DRILL, false).await.unwrap());
        assert_eq!(line.quantity_fact, scan);
        let expected = if scan < 10 {
            LineStatus::Partial
        } else {
            LineStatus::Completed
        };
        assert_eq!(line.status, expected, "after scan {}", scan);
    }

    assert_eq!(session.document().status, DocumentStatus::InProgress);
    assert_eq!(session.document().completed_lines, 1);
}

#[tokio::test]
async fn exceeding_plan_needs_confirmation() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Receiving, &DocumentId::new("r-1"))
        .await
        .unwrap();
    let bits = LineId::new("r-1-2");
    t.engine
        .adjust(&mut session, &bits, 5, true, false)
        .await
        .unwrap();
    assert_eq!(session.line(&bits).unwrap().status, LineStatus::Completed);

    assert_matches!(
        t.engine.scan(&mut session, BITS, false).await,
        Err(ServiceError::PolicyViolation(PolicyViolation::PlanExceeded { plan: 5, attempted: 6, .. }))
    );
    assert_eq!(session.line(&bits).unwrap().quantity_fact, 5);

    let line = updated_line(t.engine.scan(&mut session, BITS, true).await.unwrap());
    assert_eq!(line.quantity_fact, 6);
    assert_eq!(line.status, LineStatus::Over);
    assert_eq!(session.document().completed_lines, 1);
}

#[tokio::test]
async fn duplicate_scan_inside_cooldown_is_coalesced() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Receiving, &DocumentId::new("r-1"))
        .await
        .unwrap();

    for _ in 0..5 {
        t.engine.scan(&mut session, BITS, false).await.unwrap();
    }
    let bounced = t.engine.scan(&mut session, BITS, false).await.unwrap();
    assert_matches!(&bounced, ScanOutcome::Coalesced { line } if line.quantity_fact == 5);

    t.advance(Duration::from_millis(1001));
    assert_matches!(
        t.engine.scan(&mut session, BITS, false).await,
        Err(ServiceError::PolicyViolation(PolicyViolation::PlanExceeded { .. }))
    );
}

#[tokio::test]
async fn unknown_receiving_code_is_not_found_with_guidance() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Receiving, &DocumentId::new("r-1"))
        .await
        .unwrap();

    let err = t
        .engine
        .scan(&mut session, "0000000000000", false)
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
    let guidance = err.guidance().unwrap();
    assert_eq!(guidance.expected_products.len(), 3);
    assert_eq!(session.lines().len(), 3);
}

#[tokio::test]
async fn finish_with_shortage_needs_confirmation_then_completes() {
    let mut t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Receiving, &DocumentId::new("r-1"))
        .await
        .unwrap();
    t.engine.scan(&mut session, DRILL, false).await.unwrap();

    let outcome = t.engine.finish(&mut session, false, false).await.unwrap();
    assert!(outcome.needs_confirmation());
    assert_matches!(&outcome, FinishOutcome::NeedsConfirmation { discrepancies } if discrepancies.len() == 3);
    assert_eq!(session.document().status, DocumentStatus::InProgress);

    let outcome = t.engine.finish(&mut session, true, true).await.unwrap();
    let follow_on = match outcome {
        FinishOutcome::Completed {
            document,
            report,
            follow_on,
        } => {
            assert_eq!(document.status, DocumentStatus::Completed);
            assert!(document.completed_at.is_some());
            assert!(report.has_discrepancy);
            assert_eq!(document.discrepancy_snapshots.len(), 1);
            follow_on.expect("receiving asks for a placement")
        }
        other => panic!("expected completion, got {:?}", other),
    };
    assert_eq!(session.document().status, DocumentStatus::Completed);

    assert_eq!(follow_on.id, DocumentId::new("r-1-placement"));
    assert_eq!(follow_on.doc_type, DocumentType::Placement);
    assert_eq!(
        follow_on.details,
        DocumentDetails::Placement {
            source_document_id: Some(DocumentId::new("r-1"))
        }
    );

    let placement = t
        .engine
        .open(DocumentType::Placement, &follow_on.id)
        .await
        .unwrap();
    assert_eq!(placement.origin(), "cache");
    assert_eq!(placement.lines().len(), 1);
    assert_eq!(placement.lines()[0].quantity_plan, 1);
    assert_eq!(placement.lines()[0].quantity_fact, 0);

    let events = t.drain_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::DocumentCompleted { .. })));
    assert!(events.iter().any(|event| matches!(
        event,
        Event::FollowOnRequested { target_type: DocumentType::Placement, .. }
    )));

    let actions = t.sync_queue.drain();
    assert_eq!(actions.first().unwrap().action_type, SyncActionType::UpdateLine);
    assert_eq!(actions.last().unwrap().action_type, SyncActionType::CompleteDoc);
}

#[tokio::test]
async fn completed_documents_reject_mutation_but_accept_snapshots() {
    let t = TestEngine::builder().auto_create_follow_on(false).build();
    let mut session = t
        .engine
        .open(DocumentType::Receiving, &DocumentId::new("r-1"))
        .await
        .unwrap();
    let first = t.engine.finish(&mut session, true, false).await.unwrap();
    assert_matches!(&first, FinishOutcome::Completed { follow_on: None, .. });
    assert!(session.document().discrepancy_snapshots.is_empty());

    assert_matches!(
        t.engine.scan(&mut session, DRILL, false).await,
        Err(ServiceError::InvalidStatus(_))
    );
    assert_matches!(
        t.engine
            .adjust(&mut session, &LineId::new("r-1-1"), 1, false, false)
            .await,
        Err(ServiceError::InvalidStatus(_))
    );

    let again = t.engine.finish(&mut session, true, false).await.unwrap();
    assert_matches!(again, FinishOutcome::Completed { document, .. } if document.completed_at == session.document().completed_at);

    let snapshot = t.engine.append_snapshot(&mut session).await;
    assert_eq!(snapshot.records.len(), 3);
    assert_eq!(session.document().discrepancy_snapshots.len(), 1);
}

#[tokio::test]
async fn reopening_uses_the_cached_counts() {
    let t = TestEngine::new();
    let id = DocumentId::new("r-7");
    let mut session = t
        .engine
        .open(DocumentType::Receiving, &id)
        .await
        .unwrap();
    t.engine.scan(&mut session, GLOVES, false).await.unwrap();
    t.engine.scan(&mut session, GLOVES, false).await.unwrap();

    let reopened = t.engine.open(DocumentType::Receiving, &id).await.unwrap();
    assert_eq!(reopened.origin(), "cache");
    assert_eq!(reopened.line(&LineId::new("r-7-3")).unwrap().quantity_fact, 2);
    assert_eq!(reopened.document().status, DocumentStatus::InProgress);

    let cached = t
        .repository
        .get(DocumentType::Receiving, &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.revision, session.document().revision);
}

#[tokio::test]
async fn fill_to_plan_never_exceeds_or_lowers() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Receiving, &DocumentId::new("r-1"))
        .await
        .unwrap();
    let gloves = LineId::new("r-1-3");

    let line = updated_line(t.engine.fill_to_plan(&mut session, &gloves).await.unwrap());
    assert_eq!(line.quantity_fact, 20);

    t.engine
        .adjust(&mut session, &gloves, 1, false, true)
        .await
        .unwrap();
    let line = updated_line(t.engine.fill_to_plan(&mut session, &gloves).await.unwrap());
    assert_eq!(line.quantity_fact, 21);
    assert_eq!(line.status, LineStatus::Over);
}

// ==================== Picking ====================

#[tokio::test]
async fn picking_rejects_wrong_cell_without_state_change() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Picking, &DocumentId::new("p-1"))
        .await
        .unwrap();
    let before = session.route().unwrap().clone();

    assert_matches!(
        t.engine.scan(&mut session, "A1-02", false).await,
        Err(ServiceError::PolicyViolation(PolicyViolation::WrongCell { expected, scanned }))
            if expected == "A1-01" && scanned == "A1-02"
    );
    assert_eq!(session.route().unwrap(), &before);
    assert!(session.active_cell().is_none());
}

#[tokio::test]
async fn picking_requires_cell_before_product() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Picking, &DocumentId::new("p-1"))
        .await
        .unwrap();

    let err = t.engine.scan(&mut session, DRILL, false).await.unwrap_err();
    assert_matches!(
        &err,
        ServiceError::PolicyViolation(PolicyViolation::ScanCellFirst { expected_cell: Some(cell) }) if cell == "A1-01"
    );
    assert_eq!(err.guidance().unwrap().expected_cell.as_deref(), Some("A1-01"));

    t.engine.scan(&mut session, "a1-01", false).await.unwrap();
    assert_matches!(
        t.engine.scan(&mut session, BITS, false).await,
        Err(ServiceError::PolicyViolation(PolicyViolation::WrongCellProduct { .. }))
    );
}

#[tokio::test]
async fn malformed_payload_is_rejected_before_route_checks() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Picking, &DocumentId::new("p-1"))
        .await
        .unwrap();
    let before = session.route().unwrap().clone();

    for payload in ["   ", "48200\u{7}00011"] {
        assert_matches!(
            t.engine.scan(&mut session, payload, false).await,
            Err(ServiceError::ValidationError(_))
        );
    }
    assert_eq!(session.route().unwrap(), &before);
}

#[tokio::test]
async fn reopened_route_resumes_at_first_unfilled_step() {
    let t = TestEngine::new();
    let id = DocumentId::new("p-1");
    let mut session = t.engine.open(DocumentType::Picking, &id).await.unwrap();
    t.engine.scan(&mut session, "A1-01", false).await.unwrap();
    for code in [DRILL, DRILL, TAPE] {
        t.engine.scan(&mut session, code, false).await.unwrap();
    }
    assert_eq!(session.route().unwrap().current_index(), Some(0));

    let mut reopened = t.engine.open(DocumentType::Picking, &id).await.unwrap();
    assert_eq!(reopened.origin(), "cache");
    let route = reopened.route().unwrap();
    assert_eq!(route.current_index(), Some(1));
    assert_eq!(route.current_cell(), Some("A1-02"));
    assert!(route.is_consistent());

    t.engine.scan(&mut reopened, "A1-02", false).await.unwrap();
    let line = updated_line(t.engine.scan(&mut reopened, BITS, false).await.unwrap());
    assert_eq!(line.quantity_fact, 1);
}

#[tokio::test]
async fn filled_step_advances_with_a_ticket() {
    let mut t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Picking, &DocumentId::new("p-1"))
        .await
        .unwrap();

    t.engine.scan(&mut session, "A1-01", false).await.unwrap();
    let first = t.engine.scan(&mut session, DRILL, false).await.unwrap();
    assert_matches!(first, ScanOutcome::LineUpdated { advance: None, .. });
    t.engine.scan(&mut session, DRILL, false).await.unwrap();
    let ticket = match t.engine.scan(&mut session, TAPE, false).await.unwrap() {
        ScanOutcome::LineUpdated {
            advance: Some(ticket),
            ..
        } => ticket,
        other => panic!("expected an advance ticket, got {:?}", other),
    };
    assert_eq!(ticket.step_index, 0);

    let progress = t
        .engine
        .apply_auto_advance(&mut session, ticket)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress.current_step, Some(1));
    assert!(!progress.complete);
    assert!(session.active_cell().is_none());
    assert!(session.route().unwrap().is_consistent());

    assert_eq!(
        t.engine.apply_auto_advance(&mut session, ticket).await.unwrap(),
        None
    );
    assert!(t.drain_events().iter().any(|event| matches!(
        event,
        Event::RouteStepAdvanced { step_index: 0, skipped: false, .. }
    )));
}

#[tokio::test]
async fn manual_navigation_invalidates_pending_ticket() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Picking, &DocumentId::new("p-1"))
        .await
        .unwrap();

    t.engine.scan(&mut session, "A1-01", false).await.unwrap();
    let drill = LineId::new("p-1-1");
    let tape = LineId::new("p-1-2");
    t.engine.fill_to_plan(&mut session, &drill).await.unwrap();
    let ticket = match t.engine.fill_to_plan(&mut session, &tape).await.unwrap() {
        ScanOutcome::LineUpdated {
            advance: Some(ticket),
            ..
        } => ticket,
        other => panic!("expected an advance ticket, got {:?}", other),
    };

    let progress = t.engine.next_step(&mut session).await.unwrap();
    assert_eq!(progress.current_step, Some(1));
    assert_eq!(
        t.engine.apply_auto_advance(&mut session, ticket).await.unwrap(),
        None
    );
    assert_eq!(session.route().unwrap().current_index(), Some(1));
}

#[tokio::test]
async fn disabled_flag_suppresses_auto_advance() {
    let t = TestEngine::builder()
        .flags(StaticFlags {
            route_auto_advance: false,
            zone_filtering: true,
        })
        .build();
    let mut session = t
        .engine
        .open(DocumentType::Picking, &DocumentId::new("p-1"))
        .await
        .unwrap();

    t.engine.scan(&mut session, "A1-01", false).await.unwrap();
    t.engine
        .fill_to_plan(&mut session, &LineId::new("p-1-1"))
        .await
        .unwrap();
    let outcome = t
        .engine
        .fill_to_plan(&mut session, &LineId::new("p-1-2"))
        .await
        .unwrap();
    assert_matches!(outcome, ScanOutcome::LineUpdated { advance: None, .. });
}

#[tokio::test]
async fn not_in_cell_and_skip_finish_the_route_with_missing_tags() {
    let mut t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Picking, &DocumentId::new("p-1"))
        .await
        .unwrap();

    assert_matches!(
        t.engine.next_step(&mut session).await,
        Err(ServiceError::PolicyViolation(PolicyViolation::StepIncomplete { .. }))
    );
    t.engine.skip_step(&mut session).await.unwrap();

    t.engine.scan(&mut session, "A1-02", false).await.unwrap();
    t.engine.scan(&mut session, BITS, false).await.unwrap();
    let progress = t.engine.not_in_cell(&mut session).await.unwrap();
    assert_eq!(progress.missing.len(), 1);
    assert_eq!(progress.missing[0].planned, 3);
    assert_eq!(progress.missing[0].actual, 1);
    assert_eq!(progress.current_step, Some(2));

    let progress = t.engine.skip_step(&mut session).await.unwrap();
    assert!(progress.complete);
    assert_eq!(progress.current_step, None);
    assert_matches!(
        t.engine.skip_step(&mut session).await,
        Err(ServiceError::PolicyViolation(PolicyViolation::RouteComplete))
    );
    assert!(t
        .drain_events()
        .iter()
        .any(|event| matches!(event, Event::RouteCompleted { .. })));

    let outcome = t.engine.finish(&mut session, true, false).await.unwrap();
    let report = match outcome {
        FinishOutcome::Completed { report, .. } => report,
        other => panic!("expected completion, got {:?}", other),
    };
    let bits = report
        .records
        .iter()
        .find(|record| record.line_id == LineId::new("p-1-3"))
        .unwrap();
    assert_eq!(bits.kind, DiscrepancyKind::Shortage);
    assert_eq!(bits.tag, Some(DiscrepancyTag::Missing));
    assert!(report
        .records
        .iter()
        .filter(|record| record.line_id != LineId::new("p-1-3"))
        .all(|record| record.tag.is_none()));
}

// ==================== Placement ====================

#[tokio::test]
async fn placement_ranks_by_proximity_and_filters_locked_zone() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Placement, &DocumentId::new("pl-1"))
        .await
        .unwrap();

    let outcome = t.engine.scan(&mut session, "B2-01", false).await.unwrap();
    assert_matches!(outcome, ScanOutcome::CellEntered { zone_changed: Some(zone), .. } if zone == "B");

    let ranked: Vec<&str> = t
        .engine
        .ranked_lines(&session)
        .iter()
        .map(|line| line.id.as_str())
        .collect();
    assert_eq!(ranked[0], "pl-1-3");

    assert_matches!(
        t.engine.scan(&mut session, DRILL, false).await,
        Err(ServiceError::PolicyViolation(PolicyViolation::WrongCellProduct { expected_cell: Some(cell), .. }))
            if cell == "A1-01"
    );

    t.engine.lock_zone(&mut session, "a").unwrap();
    let ranked: Vec<&str> = t
        .engine
        .ranked_lines(&session)
        .iter()
        .map(|line| line.id.as_str())
        .collect();
    assert_eq!(ranked, vec!["pl-1-1", "pl-1-2"]);

    t.engine.unlock_zone(&mut session);
    assert_eq!(t.engine.ranked_lines(&session).len(), 3);
}

#[tokio::test]
async fn zone_lock_needs_a_zone_tracking_session() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .open(DocumentType::Receiving, &DocumentId::new("r-1"))
        .await
        .unwrap();
    assert_matches!(
        t.engine.lock_zone(&mut session, "A"),
        Err(ServiceError::InvalidStatus(_))
    );
}

// ==================== Inventory and returns ====================

#[tokio::test]
async fn inventory_requires_a_cell_then_counts_blind() {
    let mut t = TestEngine::new();
    let mut session = t
        .engine
        .start(DocumentDetails::Inventory {
            scope: InventoryScope::Cell,
            zones: Vec::new(),
            cells: vec!["B2-05".to_string()],
        })
        .await
        .unwrap();
    assert_eq!(session.origin(), "created");

    let err = t.engine.scan(&mut session, "999888", false).await.unwrap_err();
    assert_matches!(&err, ServiceError::NotFound { message, .. } if message == "scan cell first");

    t.engine.scan(&mut session, "B2-05", false).await.unwrap();
    let created = t.engine.scan(&mut session, "999888", false).await.unwrap();
    let line = match created {
        ScanOutcome::LineCreated { line } => line,
        other => panic!("expected a new line, got {:?}", other),
    };
    assert_eq!(line.quantity_plan, 0);
    assert_eq!(line.quantity_fact, 1);
    assert_eq!(line.status, LineStatus::Over);
    assert_eq!(line.cell_id.as_deref(), Some("B2-05"));

    let bounce = t.engine.scan(&mut session, "999888", false).await.unwrap();
    assert_matches!(&bounce, ScanOutcome::Coalesced { line } if line.quantity_fact == 1);
    assert_eq!(session.lines()[0].quantity_fact, 1);

    t.advance(Duration::from_secs(2));
    let line = updated_line(t.engine.scan(&mut session, "999888", false).await.unwrap());
    assert_eq!(line.quantity_fact, 2);
    assert_eq!(session.lines().len(), 1);

    let events = t.drain_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::PlaceholderLineCreated { .. })));
    assert!(events
        .iter()
        .any(|event| matches!(event, Event::DocumentStarted { .. })));
}

#[tokio::test]
async fn return_counts_without_plan_or_cell() {
    let t = TestEngine::new();
    let mut session = t
        .engine
        .start(DocumentDetails::default_for(DocumentType::Return))
        .await
        .unwrap();

    t.engine.scan(&mut session, GLOVES, false).await.unwrap();
    assert_matches!(
        t.engine.scan(&mut session, GLOVES, false).await.unwrap(),
        ScanOutcome::Coalesced { .. }
    );
    t.advance(Duration::from_secs(2));
    t.engine.scan(&mut session, GLOVES, false).await.unwrap();
    assert_eq!(session.lines().len(), 1);
    assert_eq!(session.lines()[0].quantity_fact, 2);

    let outcome = t.engine.finish(&mut session, false, false).await.unwrap();
    assert_matches!(outcome, FinishOutcome::NeedsConfirmation { discrepancies } if discrepancies[0].kind == DiscrepancyKind::Surplus);
}

#[tokio::test]
async fn missing_plan_everywhere_is_data_unavailable() {
    let t = TestEngine::new();
    assert_matches!(
        t.engine
            .open(DocumentType::Inventory, &DocumentId::new("inv-404"))
            .await,
        Err(ServiceError::DataUnavailable(_))
    );
}
