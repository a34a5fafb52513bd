use super::common::*;
use crate::workflows::benefits::dependents::DependentField;
use crate::workflows::benefits::domain::{IdempotencyKey, RequestStatus};
use crate::workflows::benefits::linking::LinkError;
use crate::workflows::benefits::storage::{StoragePath, UploadFailure};
use crate::workflows::benefits::validation::{FormField, SubmissionForm};
use crate::workflows::benefits::workflow::{
    SubmissionError, SubmissionFailure, SubmissionState, GENERIC_FAILURE_MESSAGE,
    SESSION_EXPIRED_MESSAGE, SUBMITTED_MESSAGE,
};
use rust_decimal::Decimal;

#[tokio::test]
async fn submits_form_with_two_invoices() {
    let mut harness = workflow_for(Some(requester()));
    *harness.workflow.form_mut() = valid_form();
    harness
        .workflow
        .invoices_mut()
        .replace_all(vec![invoice("pharmacy.pdf", MIB), invoice("clinic.pdf", MIB)]);

    let receipt = harness.workflow.submit().await.expect("submission succeeds");

    let request = &receipt.request;
    assert_eq!(request.requester, requester());
    assert_eq!(request.amount, Decimal::new(50_000, 2));
    assert_eq!(request.cpf.as_str(), "12345678901");
    assert_eq!(request.polo.0, "3M Sumaré");
    assert_eq!(request.status, RequestStatus::Pending);
    assert!(request.dependents.is_empty());
    assert!(!receipt.replayed);

    let expected = vec![
        StoragePath(format!("{}/{}-pharmacy.pdf", request.id, FROZEN_MILLIS)),
        StoragePath(format!("{}/{}-clinic.pdf", request.id, FROZEN_MILLIS + 1)),
    ];
    assert_eq!(harness.storage.keys().len(), 2);
    for path in &expected {
        assert!(harness.storage.get(path).is_some(), "missing {path}");
    }
    let linked: Vec<_> = receipt
        .invoices
        .iter()
        .map(|invoice| StoragePath(invoice.storage_path.clone()))
        .collect();
    assert_eq!(linked, expected);

    let stored = harness.repository.records();
    assert_eq!(stored.len(), 1);
    assert!(stored[0]
        .invoices
        .iter()
        .all(|invoice| invoice.storage_path.is_some()));

    assert_eq!(harness.workflow.state(), SubmissionState::Done);
    assert_eq!(
        harness.workflow.transitions(),
        &[
            SubmissionState::Idle,
            SubmissionState::Validating,
            SubmissionState::CreatingRequest,
            SubmissionState::UploadingInvoices,
            SubmissionState::Done,
        ]
    );
    assert_eq!(harness.workflow.form(), &SubmissionForm::default());
    assert!(harness.workflow.invoices().is_empty());
    assert!(harness.workflow.dependents().is_empty());
    assert_eq!(
        harness.feedback.toasts(),
        vec![Toast::Success(SUBMITTED_MESSAGE.to_string())]
    );
}

#[tokio::test]
async fn skips_upload_stage_without_files() {
    let mut harness = workflow_for(Some(requester()));
    *harness.workflow.form_mut() = valid_form();
    let index = harness.workflow.dependents_mut().add();
    harness
        .workflow
        .dependents_mut()
        .update(index, DependentField::Name, "Lia Prado")
        .expect("row exists");
    harness
        .workflow
        .dependents_mut()
        .update(index, DependentField::Relationship, "child")
        .expect("row exists");

    let receipt = harness.workflow.submit().await.expect("submission succeeds");

    assert!(receipt.invoices.is_empty());
    assert_eq!(receipt.request.dependents.len(), 1);
    assert!(harness.storage.is_empty());
    assert!(!harness
        .workflow
        .transitions()
        .contains(&SubmissionState::UploadingInvoices));
    assert_eq!(harness.workflow.state(), SubmissionState::Done);
}

#[tokio::test]
async fn validation_failure_makes_no_remote_calls() {
    let mut harness = workflow_for(Some(requester()));
    *harness.workflow.form_mut() = valid_form();
    harness.workflow.form_mut().cpf = "123.456.789-01".to_string();
    harness
        .workflow
        .invoices_mut()
        .push(invoice("pharmacy.pdf", 10));

    match harness.workflow.submit().await {
        Err(SubmissionError::Validation(errors)) => {
            assert!(errors.for_field(FormField::Cpf).is_some());
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    assert_eq!(harness.repository.create_calls(), 0);
    assert!(harness.storage.is_empty());
    assert_eq!(harness.workflow.state(), SubmissionState::Idle);
    assert_eq!(harness.workflow.form().polo, "3M Sumaré", "form kept for editing");
    assert!(harness.feedback.toasts().is_empty());
}

#[tokio::test]
async fn missing_identity_errors_before_creation() {
    let mut harness = workflow_for(None);
    *harness.workflow.form_mut() = valid_form();

    match harness.workflow.submit().await {
        Err(SubmissionError::IdentityMissing) => {}
        other => panic!("expected missing identity, got {other:?}"),
    }

    assert_eq!(harness.repository.create_calls(), 0);
    assert_eq!(
        harness.workflow.state(),
        SubmissionState::Errored(SubmissionFailure::MissingIdentity)
    );
    assert_eq!(
        harness.feedback.toasts(),
        vec![Toast::Failure(SESSION_EXPIRED_MESSAGE.to_string())]
    );
}

#[tokio::test]
async fn creation_failure_shows_generic_message() {
    let mut harness = workflow_for(Some(requester()));
    harness.repository.fail_creates(true);
    *harness.workflow.form_mut() = valid_form();
    harness
        .workflow
        .invoices_mut()
        .push(invoice("pharmacy.pdf", 10));

    let error = harness.workflow.submit().await.expect_err("creation fails");

    assert!(matches!(error, SubmissionError::Creation(_)));
    assert_eq!(error.user_message(), GENERIC_FAILURE_MESSAGE);
    assert!(harness.storage.is_empty(), "no upload after failed creation");
    assert_eq!(
        harness.workflow.state(),
        SubmissionState::Errored(SubmissionFailure::Creation)
    );
    assert_eq!(
        harness.feedback.toasts(),
        vec![Toast::Failure(GENERIC_FAILURE_MESSAGE.to_string())]
    );
}

#[tokio::test]
async fn oversized_second_invoice_orphans_the_first() {
    let mut harness = workflow_for(Some(requester()));
    *harness.workflow.form_mut() = valid_form();
    harness.workflow.invoices_mut().replace_all(vec![
        invoice("pharmacy.pdf", MIB),
        invoice("scan.tiff", 60 * MIB),
    ]);

    let error = harness.workflow.submit().await.expect_err("upload fails");

    let request_id = match &error {
        SubmissionError::Upload {
            request_id,
            source: LinkError::Upload(upload),
        } => {
            assert_eq!(upload.file_name, "scan.tiff");
            assert!(matches!(upload.cause, UploadFailure::TooLarge { .. }));
            assert_eq!(upload.uploaded.len(), 1);
            request_id.clone()
        }
        other => panic!("expected upload failure, got {other:?}"),
    };
    assert_eq!(error.orphaned_request(), Some(&request_id));
    assert_eq!(error.user_message(), GENERIC_FAILURE_MESSAGE);

    let keys = harness.storage.keys();
    assert_eq!(
        keys,
        vec![StoragePath(format!("{request_id}/{FROZEN_MILLIS}-pharmacy.pdf"))]
    );

    let records = harness.repository.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RequestStatus::Created);
    assert!(records[0]
        .invoices
        .iter()
        .all(|invoice| invoice.storage_path.is_none()));

    assert_eq!(
        harness.workflow.state(),
        SubmissionState::Errored(SubmissionFailure::Upload)
    );
    assert_eq!(harness.workflow.invoices().len(), 2, "queue kept for retry");
}

#[tokio::test]
async fn retry_after_lost_response_reuses_the_record() {
    let mut harness = workflow_for(Some(requester()));
    *harness.workflow.form_mut() = valid_form();
    harness.repository.lose_create_response(true);

    harness
        .workflow
        .submit()
        .await
        .expect_err("response lost in transit");
    let first_key = harness
        .workflow
        .idempotency_key()
        .cloned()
        .expect("key issued on first attempt");

    harness.repository.lose_create_response(false);
    let receipt = harness.workflow.submit().await.expect("retry succeeds");

    assert_eq!(harness.repository.create_calls(), 2);
    assert_eq!(harness.repository.records().len(), 1);
    assert_eq!(receipt.request.idempotency_key, first_key);
    assert_eq!(receipt.request.status, RequestStatus::Pending);
}

#[tokio::test]
async fn edited_form_gets_a_fresh_key() {
    let mut harness = workflow_for(Some(requester()));
    *harness.workflow.form_mut() = valid_form();
    harness.repository.fail_creates(true);

    harness.workflow.submit().await.expect_err("offline");
    let first_key = harness.workflow.idempotency_key().cloned();

    harness.workflow.form_mut().amount = Some(Decimal::new(75_000, 2));
    harness.workflow.submit().await.expect_err("still offline");

    assert_ne!(harness.workflow.idempotency_key().cloned(), first_key);
}

#[tokio::test]
async fn supplied_key_is_sent_to_the_repository() {
    let harness = workflow_for(Some(requester()));
    let key = IdempotencyKey("client-key-1".to_string());
    let mut workflow = harness.workflow.with_idempotency_key(key.clone());
    *workflow.form_mut() = valid_form();

    let receipt = workflow.submit().await.expect("submission succeeds");

    assert_eq!(receipt.request.idempotency_key, key);
}

#[tokio::test]
async fn finalize_failure_reports_the_created_request() {
    let mut harness = workflow_for(Some(requester()));
    harness.repository.fail_status_updates(true);
    *harness.workflow.form_mut() = valid_form();

    let error = harness.workflow.submit().await.expect_err("queueing fails");

    assert!(matches!(error, SubmissionError::Finalize { .. }));
    assert!(error.orphaned_request().is_some());
    assert_eq!(
        harness.workflow.state(),
        SubmissionState::Errored(SubmissionFailure::Creation)
    );
}

#[tokio::test]
async fn retry_after_storage_outage_uploads_only_the_missing_invoice() {
    let mut harness = workflow_for(Some(requester()));
    *harness.workflow.form_mut() = valid_form();
    harness
        .workflow
        .invoices_mut()
        .replace_all(vec![invoice("pharmacy.pdf", MIB), invoice("clinic.pdf", MIB)]);
    harness.storage.refuse_writes_after(1);

    let error = harness.workflow.submit().await.expect_err("second write refused");
    assert!(matches!(
        error,
        SubmissionError::Upload {
            source: LinkError::Upload(_),
            ..
        }
    ));
    assert_eq!(
        harness.workflow.state(),
        SubmissionState::Errored(SubmissionFailure::Upload)
    );
    let first_keys = harness.storage.keys();
    assert_eq!(first_keys.len(), 1);

    harness.storage.recover();
    let receipt = harness.workflow.submit().await.expect("retry succeeds");

    assert_eq!(harness.repository.create_calls(), 2);
    assert_eq!(harness.storage.len(), 2, "pharmacy.pdf is not stored twice");
    assert_eq!(receipt.invoices.len(), 2);
    assert_eq!(
        StoragePath(receipt.invoices[0].storage_path.clone()),
        first_keys[0]
    );

    let records = harness.repository.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RequestStatus::Pending);
    assert_eq!(records[0].invoices.len(), 2);
    let mut recorded: Vec<StoragePath> = records[0]
        .invoices
        .iter()
        .filter_map(|invoice| invoice.storage_path.clone().map(StoragePath))
        .collect();
    recorded.sort();
    assert_eq!(recorded, harness.storage.keys());
}

#[tokio::test]
async fn retry_after_finalize_failure_keeps_one_entry_per_invoice() {
    let mut harness = workflow_for(Some(requester()));
    *harness.workflow.form_mut() = valid_form();
    harness
        .workflow
        .invoices_mut()
        .replace_all(vec![invoice("pharmacy.pdf", MIB), invoice("clinic.pdf", MIB)]);
    harness.repository.fail_status_updates(true);

    harness.workflow.submit().await.expect_err("queueing fails");
    let linked_first = harness.repository.records()[0].invoices.clone();
    assert_eq!(linked_first.len(), 2);
    assert_eq!(harness.storage.len(), 2);

    harness.repository.fail_status_updates(false);
    let receipt = harness.workflow.submit().await.expect("retry succeeds");

    assert_eq!(receipt.request.status, RequestStatus::Pending);
    assert_eq!(harness.storage.len(), 2, "nothing uploaded again");
    let records = harness.repository.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].invoices, linked_first);
    assert_eq!(receipt.request.status_view().invoice_count, 2);
}

#[test]
fn suggested_amount_follows_the_form_salary() {
    let mut harness = workflow_for(Some(requester()));
    harness.workflow.form_mut().salary = Some(Decimal::new(1_500, 0));
    assert_eq!(harness.workflow.suggested_amount(), Decimal::new(201_836, 2));

    harness.workflow.form_mut().salary = Some(Decimal::new(5_000, 0));
    assert_eq!(harness.workflow.suggested_amount(), Decimal::new(4_500, 0));

    harness.workflow.form_mut().salary = None;
    assert_eq!(harness.workflow.suggested_amount(), Decimal::ZERO);
}
