use crate::infra::{in_memory_service, load_invoice, InMemoryService};
use benefit_requests::config::{AppConfig, DEFAULT_MAX_UPLOAD_BYTES};
use benefit_requests::error::AppError;
use benefit_requests::workflows::benefits::{
    clamp_salary, suggest_reimbursement, BenefitServiceError, DependentDraft, IdempotencyKey,
    InMemoryObjectStorage, InvoiceFile, LinkError, PendingInvoice, RequestKind, RequesterId,
    SubmissionDraft, SubmissionError, SubmissionForm, SubmissionReceipt,
};
use clap::Args;
use rust_decimal::Decimal;
use std::path::PathBuf;

const MIB: usize = 1024 * 1024;

#[derive(Args, Debug)]
pub(crate) struct SuggestArgs {
    /// Monthly gross salary; commas are accepted as decimal separators
    #[arg(long)]
    pub(crate) salary: String,
}

#[derive(Args, Debug)]
pub(crate) struct SubmitArgs {
    /// Requester identity the request is filed under
    #[arg(long)]
    pub(crate) requester: String,
    /// Requester CPF, exactly 11 digits
    #[arg(long)]
    pub(crate) cpf: String,
    /// Requested amount
    #[arg(long, value_parser = crate::infra::parse_decimal)]
    pub(crate) amount: Decimal,
    /// Polo (site) the request belongs to
    #[arg(long)]
    pub(crate) polo: String,
    /// Benefit kind, e.g. medical_reimbursement
    #[arg(long, value_parser = crate::infra::parse_kind, default_value = "medical_reimbursement")]
    pub(crate) kind: RequestKind,
    /// Monthly gross salary, used only for the printed suggestion
    #[arg(long, value_parser = crate::infra::parse_decimal)]
    pub(crate) salary: Option<Decimal>,
    /// Dependent as NAME:RELATIONSHIP; repeat for more than one
    #[arg(long = "dependent", value_parser = crate::infra::parse_dependent)]
    pub(crate) dependents: Vec<DependentDraft>,
    /// Invoice file to attach; repeat for more than one
    #[arg(long = "invoice")]
    pub(crate) invoices: Vec<PathBuf>,
    /// Reuse a key from an earlier attempt
    #[arg(long)]
    pub(crate) idempotency_key: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Size of the second invoice in the failing scenario
    #[arg(long, default_value_t = 60)]
    pub(crate) oversized_mib: usize,
}

pub(crate) fn run_suggest(args: SuggestArgs) -> Result<(), AppError> {
    let salary = clamp_salary(&args.salary);
    println!(
        "Salary {salary} -> suggested reimbursement {}",
        suggest_reimbursement(salary)
    );
    Ok(())
}

pub(crate) async fn run_submit(args: SubmitArgs) -> Result<(), AppError> {
    let SubmitArgs {
        requester,
        cpf,
        amount,
        polo,
        kind,
        salary,
        dependents,
        invoices,
        idempotency_key,
    } = args;

    let max_file_bytes = AppConfig::load()?.uploads.max_file_bytes;
    let (service, storage) = in_memory_service(max_file_bytes);

    let mut pending = Vec::with_capacity(invoices.len());
    for path in &invoices {
        pending.push(PendingInvoice::with_file(load_invoice(path).await?, None));
    }

    let draft = SubmissionDraft {
        form: SubmissionForm {
            kind,
            amount: Some(amount),
            polo,
            cpf,
            salary,
        },
        dependents,
        invoices: pending,
        idempotency_key: idempotency_key.map(IdempotencyKey),
    };

    if let Some(salary) = salary {
        println!(
            "Suggested reimbursement for salary {salary}: {}",
            suggest_reimbursement(salary)
        );
    }

    match service.submit(Some(RequesterId(requester)), draft).await {
        Ok(receipt) => {
            print_receipt(&receipt, &storage);
            Ok(())
        }
        Err(BenefitServiceError::Submission(err)) => {
            println!("{}", err.user_message());
            print_failure_details(&err, &storage);
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let requester = RequesterId("emp-0042".to_string());
    let (service, storage) = in_memory_service(DEFAULT_MAX_UPLOAD_BYTES);

    println!("Benefit request submission demo");
    let salary = Decimal::new(1_500, 0);
    println!(
        "Suggested reimbursement for salary {salary}: {}",
        suggest_reimbursement(salary)
    );

    println!("\nScenario 1: two 1 MiB invoices");
    let draft = demo_draft(vec![
        demo_invoice("pharmacy-receipt.pdf", MIB),
        demo_invoice("clinic-receipt.pdf", MIB),
    ]);
    report(&service, &storage, requester.clone(), draft).await?;

    println!("\nScenario 2: second invoice of {} MiB", args.oversized_mib);
    let draft = demo_draft(vec![
        demo_invoice("pharmacy-receipt.pdf", MIB),
        demo_invoice("scanned-bundle.pdf", args.oversized_mib * MIB),
    ]);
    report(&service, &storage, requester, draft).await?;

    Ok(())
}

async fn report(
    service: &InMemoryService,
    storage: &InMemoryObjectStorage,
    requester: RequesterId,
    draft: SubmissionDraft,
) -> Result<(), AppError> {
    match service.submit(Some(requester), draft).await {
        Ok(receipt) => print_receipt(&receipt, storage),
        Err(BenefitServiceError::Submission(err)) => {
            println!("- Submission failed: {}", err.user_message());
            print_failure_details(&err, storage);
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn demo_draft(invoices: Vec<PendingInvoice>) -> SubmissionDraft {
    SubmissionDraft {
        form: SubmissionForm {
            kind: RequestKind::PharmacyReimbursement,
            amount: Some(Decimal::new(50_000, 2)),
            polo: "3M Sumaré".to_string(),
            cpf: "12345678901".to_string(),
            salary: Some(Decimal::new(1_500, 0)),
        },
        invoices,
        ..SubmissionDraft::default()
    }
}

fn demo_invoice(name: &str, size: usize) -> PendingInvoice {
    PendingInvoice::with_file(
        InvoiceFile::new(name, "application/pdf", vec![0u8; size]),
        None,
    )
}

fn print_receipt(receipt: &SubmissionReceipt, storage: &InMemoryObjectStorage) {
    let view = receipt.request.status_view();
    println!(
        "- Request {} ({}) -> status {}",
        view.request_id, view.kind.label(), view.status
    );
    if receipt.replayed {
        println!("  Idempotency key matched an earlier submission; nothing re-uploaded");
    }
    for invoice in &receipt.invoices {
        println!(
            "  Linked {} at {} ({} bytes)",
            invoice.file_name, invoice.storage_path, invoice.size_bytes
        );
    }
    println!("  Objects in storage: {}", storage.len());
}

fn print_failure_details(err: &SubmissionError, storage: &InMemoryObjectStorage) {
    if let Some(orphan) = err.orphaned_request() {
        println!("  Request {orphan} stays in created status without invoices");
    }
    if let SubmissionError::Upload {
        source: LinkError::Upload(upload),
        ..
    } = err
    {
        println!("  Rejected file: {} ({})", upload.file_name, upload.cause);
        for path in &upload.uploaded {
            println!("  Already stored, not rolled back: {path}");
        }
    }
    println!("  Objects in storage: {}", storage.len());
}
