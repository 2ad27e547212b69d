mod common;

use assert_matches::assert_matches;
use common::TestApp;

use almacen_api::entities::{ItemStatus, RequisitionStatus};
use almacen_api::errors::WorkflowError;
use almacen_api::services::items::{
    ClassificationDecision, ClassificationInput, NewItemInput, UpdateItemInput,
};

#[tokio::test]
async fn draft_creation_assigns_number_and_initial_history() {
    let app = TestApp::new().await;
    let requisition = app.create_draft(&[("Guantes de nitrilo", 10)]).await;

    assert_eq!(requisition.status, RequisitionStatus::Borrador);
    assert!(requisition.number.starts_with("REQ-"));
    assert!(requisition.number.ends_with("-0001"));

    let history = app
        .services
        .requisitions
        .history(&app.requester, requisition.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].previous_status, None);
    assert_eq!(history[0].new_status, RequisitionStatus::Borrador);

    let second = app.create_draft(&[("Casco", 2)]).await;
    assert!(second.number.ends_with("-0002"));
}

#[tokio::test]
async fn full_stock_path_reaches_ready_for_dispatch() {
    let app = TestApp::new().await;
    let requisition = app
        .create_draft(&[("Guantes", 10), ("Cascos", 4)])
        .await;

    let requisition = app.advance_to_logistics(requisition.id).await;
    assert_eq!(requisition.status, RequisitionStatus::RevisionLogistica);

    let items = app.items_of(requisition.id).await;
    let decisions = items
        .iter()
        .map(|item| ClassificationInput {
            item_id: item.id,
            decision: ClassificationDecision::EnStock,
            cantidad_aprobada: None,
        })
        .collect();
    let classified = app
        .services
        .items
        .classify(&app.logistics, requisition.id, decisions)
        .await
        .unwrap();
    assert!(classified
        .iter()
        .all(|i| i.status == ItemStatus::ListoParaDespacho));
    // Classification fixes the approved quantity, defaulting to the
    // requested one.
    assert!(classified
        .iter()
        .all(|i| i.cantidad_aprobada == Some(i.cantidad_solicitada)));

    let requisition = app
        .services
        .requisitions
        .get(&app.logistics, requisition.id)
        .await
        .unwrap();
    assert_eq!(requisition.status, RequisitionStatus::ListoDespacho);
}

#[tokio::test]
async fn approval_records_pass_through_status_in_history() {
    let app = TestApp::new().await;
    let requisition = app.create_draft(&[("Linternas", 3)]).await;
    app.services
        .requisitions
        .submit(&app.requester, requisition.id)
        .await
        .unwrap();
    let approved = app
        .services
        .requisitions
        .approve(&app.safety, requisition.id, Some("sin observaciones".to_string()))
        .await
        .unwrap();
    assert_eq!(approved.status, RequisitionStatus::ValidacionGerencia);

    let history = app
        .services
        .requisitions
        .history(&app.requester, requisition.id)
        .await
        .unwrap();
    let statuses: Vec<_> = history.iter().map(|h| h.new_status).collect();
    assert!(statuses.contains(&RequisitionStatus::AprobadoSeguridad));
    assert!(statuses.contains(&RequisitionStatus::ValidacionGerencia));

    let pass_through = history
        .iter()
        .find(|h| h.new_status == RequisitionStatus::AprobadoSeguridad)
        .unwrap();
    assert_eq!(pass_through.comment.as_deref(), Some("sin observaciones"));
}

#[tokio::test]
async fn submission_requires_at_least_one_item() {
    let app = TestApp::new().await;
    let requisition = app.create_draft(&[]).await;
    let err = app
        .services
        .requisitions
        .submit(&app.requester, requisition.id)
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::ValidationFailed(_));
}

#[tokio::test]
async fn short_rejection_reason_leaves_state_untouched() {
    let app = TestApp::new().await;
    let requisition = app.create_draft(&[("Cables", 5)]).await;
    app.services
        .requisitions
        .submit(&app.requester, requisition.id)
        .await
        .unwrap();

    let err = app
        .services
        .requisitions
        .reject(&app.safety, requisition.id, "corto".to_string())
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::ValidationFailed(_));

    let unchanged = app
        .services
        .requisitions
        .get(&app.safety, requisition.id)
        .await
        .unwrap();
    assert_eq!(unchanged.status, RequisitionStatus::ValidacionSeguridad);

    let rejected = app
        .services
        .requisitions
        .reject(
            &app.safety,
            requisition.id,
            "incumple norma de seguridad".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, RequisitionStatus::RechazadoSeguridad);

    // The requester is told.
    let sent = app.notifier.sent();
    assert!(sent
        .iter()
        .any(|n| n.target_user_ids == vec![app.requester.id]
            && n.title.contains("rejected")));
}

#[tokio::test]
async fn only_the_stage_role_may_approve() {
    let app = TestApp::new().await;
    let requisition = app.create_draft(&[("Tornillos", 100)]).await;
    app.services
        .requisitions
        .submit(&app.requester, requisition.id)
        .await
        .unwrap();

    for wrong in [&app.logistics, &app.manager, &app.receiver, &app.requester] {
        let err = app
            .services
            .requisitions
            .approve(wrong, requisition.id, None)
            .await
            .unwrap_err();
        assert_matches!(err, WorkflowError::PermissionDenied(_));
    }

    // The admin can always act.
    let approved = app
        .services
        .requisitions
        .approve(&app.admin, requisition.id, None)
        .await
        .unwrap();
    assert_eq!(approved.status, RequisitionStatus::ValidacionGerencia);
}

#[tokio::test]
async fn draft_item_crud_is_audited_and_frozen_after_submission() {
    let app = TestApp::new().await;
    let requisition = app.create_draft(&[("Martillo", 1)]).await;

    let added = app
        .services
        .items
        .add_item(
            &app.requester,
            requisition.id,
            NewItemInput {
                description: "Clavos".to_string(),
                unit: "caja".to_string(),
                cantidad_solicitada: 3,
            },
        )
        .await
        .unwrap();

    let updated = app
        .services
        .items
        .update_item(
            &app.requester,
            requisition.id,
            added.id,
            UpdateItemInput {
                cantidad_solicitada: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.cantidad_solicitada, 5);

    let trail = app
        .services
        .items
        .modifications(&app.requester, requisition.id, added.id)
        .await
        .unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].field, "cantidad_solicitada");
    assert_eq!(trail[0].old_value.as_deref(), Some("3"));
    assert_eq!(trail[0].new_value.as_deref(), Some("5"));

    app.services
        .items
        .delete_item(&app.requester, requisition.id, added.id)
        .await
        .unwrap();
    let remaining = app.items_of(requisition.id).await;
    assert_eq!(remaining.len(), 1);

    // Past draft, the structure is frozen even for the owner.
    app.services
        .requisitions
        .submit(&app.requester, requisition.id)
        .await
        .unwrap();
    let err = app
        .services
        .items
        .add_item(
            &app.requester,
            requisition.id,
            NewItemInput {
                description: "Taladro".to_string(),
                unit: "unidad".to_string(),
                cantidad_solicitada: 1,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::PermissionDenied(_));
}

#[tokio::test]
async fn only_drafts_can_be_cancelled() {
    let app = TestApp::new().await;
    let requisition = app.create_draft(&[("Pilas", 12)]).await;

    let cancelled = app
        .services
        .requisitions
        .cancel(&app.requester, requisition.id, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, RequisitionStatus::Cancelado);

    let other = app.create_draft(&[("Cinta", 2)]).await;
    app.services
        .requisitions
        .submit(&app.requester, other.id)
        .await
        .unwrap();
    let err = app
        .services
        .requisitions
        .cancel(&app.admin, other.id, None)
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::TransitionDenied { .. });
}

#[tokio::test]
async fn visibility_follows_the_role_tables() {
    let app = TestApp::new().await;
    let requisition = app.create_draft(&[("Lentes", 6)]).await;

    // Drafts are invisible to everyone but the owner and the admin.
    let err = app
        .services
        .requisitions
        .get(&app.safety, requisition.id)
        .await
        .unwrap_err();
    assert_matches!(err, WorkflowError::PermissionDenied(_));
    assert!(app
        .services
        .requisitions
        .get(&app.requester, requisition.id)
        .await
        .is_ok());
    assert!(app
        .services
        .requisitions
        .get(&app.admin, requisition.id)
        .await
        .is_ok());

    let for_safety = app
        .services
        .requisitions
        .list_for_actor(&app.safety)
        .await
        .unwrap();
    assert!(for_safety.is_empty());

    app.services
        .requisitions
        .submit(&app.requester, requisition.id)
        .await
        .unwrap();

    let for_safety = app
        .services
        .requisitions
        .list_for_actor(&app.safety)
        .await
        .unwrap();
    assert_eq!(for_safety.len(), 1);

    // Logistics only sees the fulfillment band.
    let for_logistics = app
        .services
        .requisitions
        .list_for_actor(&app.logistics)
        .await
        .unwrap();
    assert!(for_logistics.is_empty());
}

#[tokio::test]
async fn submission_notifies_the_safety_group() {
    let app = TestApp::new().await;
    let requisition = app.create_draft(&[("Extintores", 2)]).await;
    app.services
        .requisitions
        .submit(&app.requester, requisition.id)
        .await
        .unwrap();

    let sent = app.notifier.sent();
    assert!(sent
        .iter()
        .any(|n| n.target_user_ids == vec![app.safety.id] && n.requisition_id == requisition.id));
}
