use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned by the repository when a request is created.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated employee submitting requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequesterId(pub String);

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Manager approving or rejecting requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReviewerId(pub String);

impl fmt::Display for ReviewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client generated token letting the repository collapse retried creations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub String);

impl IdempotencyKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Brazilian national identifier; exactly 11 ASCII digits, no mask characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cpf(String);

impl Cpf {
    pub const LENGTH: usize = 11;

    pub fn parse(raw: &str) -> Result<Self, InvalidCpf> {
        if raw.len() == Self::LENGTH && raw.bytes().all(|byte| byte.is_ascii_digit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidCpf)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Cpf {
    type Error = InvalidCpf;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Cpf> for String {
    fn from(value: Cpf) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("CPF must contain exactly 11 digits")]
pub struct InvalidCpf;

/// Work-site tag identifying the requester's facility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Polo(pub String);

impl Polo {
    /// Returns `None` when nothing was selected.
    pub fn selected(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    #[default]
    MedicalReimbursement,
    DentalReimbursement,
    PharmacyReimbursement,
    EducationAllowance,
    Other,
}

impl RequestKind {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::MedicalReimbursement,
            Self::DentalReimbursement,
            Self::PharmacyReimbursement,
            Self::EducationAllowance,
            Self::Other,
        ]
    }

    /// Wire tag, identical to the serde representation.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::MedicalReimbursement => "medical_reimbursement",
            Self::DentalReimbursement => "dental_reimbursement",
            Self::PharmacyReimbursement => "pharmacy_reimbursement",
            Self::EducationAllowance => "education_allowance",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ordered().into_iter().find(|kind| kind.tag() == normalized)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::MedicalReimbursement => "Medical reimbursement",
            Self::DentalReimbursement => "Dental reimbursement",
            Self::PharmacyReimbursement => "Pharmacy reimbursement",
            Self::EducationAllowance => "Education allowance",
            Self::Other => "Other",
        }
    }
}

/// Fixed set of relationships a dependent may have with the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Spouse,
    Child,
    Stepchild,
    Parent,
    LegalWard,
    Other,
}

impl Relationship {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::Spouse,
            Self::Child,
            Self::Stepchild,
            Self::Parent,
            Self::LegalWard,
            Self::Other,
        ]
    }

    pub const fn tag(self) -> &'static str {
        match self {
            Self::Spouse => "spouse",
            Self::Child => "child",
            Self::Stepchild => "stepchild",
            Self::Parent => "parent",
            Self::LegalWard => "legal_ward",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ordered()
            .into_iter()
            .find(|relationship| relationship.tag() == normalized)
    }
}

/// Editable dependent row; both fields stay free text until submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentDraft {
    pub name: String,
    pub relationship: String,
}

/// Dependent shape accepted by the creation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentRecord {
    pub name: String,
    pub relationship: Relationship,
}

/// Descriptive data travelling with an invoice before and after upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceMetadata {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}

/// Stored invoice linked to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceReference {
    pub file_name: String,
    pub storage_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub size_bytes: u64,
}

/// Validated payload handed to the creation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBenefitRequest {
    pub kind: RequestKind,
    pub amount: Decimal,
    pub polo: Polo,
    pub cpf: Cpf,
    pub dependents: Vec<DependentRecord>,
    pub invoices: Vec<InvoiceMetadata>,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Created,
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Pending)
                | (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
        )
    }
}

/// Stored request record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenefitRequest {
    pub id: RequestId,
    pub requester: RequesterId,
    pub kind: RequestKind,
    pub amount: Decimal,
    pub polo: Polo,
    pub cpf: Cpf,
    pub dependents: Vec<DependentRecord>,
    pub invoices: Vec<InvoiceMetadata>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub idempotency_key: IdempotencyKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewNote>,
}

impl BenefitRequest {
    /// Build the stored record for a freshly created request.
    pub fn from_new(
        id: RequestId,
        requester: RequesterId,
        request: NewBenefitRequest,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            requester,
            kind: request.kind,
            amount: request.amount,
            polo: request.polo,
            cpf: request.cpf,
            dependents: request.dependents,
            invoices: request.invoices,
            status: RequestStatus::Created,
            created_at,
            idempotency_key: request.idempotency_key,
            review: None,
        }
    }

    /// Record where each invoice is stored, matching entries by file name.
    ///
    /// An entry that already carries a path is overwritten, so attaching the same
    /// batch twice leaves one entry per file. Repeated file names pair up in order.
    pub fn attach_invoices(&mut self, invoices: Vec<InvoiceReference>) {
        let mut claimed = vec![false; self.invoices.len()];
        for reference in invoices {
            let slot = (0..self.invoices.len()).find(|&index| {
                !claimed[index] && self.invoices[index].file_name == reference.file_name
            });
            match slot {
                Some(index) => {
                    claimed[index] = true;
                    let metadata = &mut self.invoices[index];
                    metadata.storage_path = Some(reference.storage_path);
                    if reference.description.is_some() {
                        metadata.description = reference.description;
                    }
                }
                None => {
                    claimed.push(true);
                    self.invoices.push(InvoiceMetadata {
                        file_name: reference.file_name,
                        description: reference.description,
                        storage_path: Some(reference.storage_path),
                    });
                }
            }
        }
    }

    pub fn status_view(&self) -> RequestStatusView {
        RequestStatusView {
            request_id: self.id.clone(),
            status: self.status.label(),
            kind: self.kind,
            amount: self.amount,
            polo: self.polo.0.clone(),
            invoice_count: self.invoices.len(),
            dependent_count: self.dependents.len(),
            created_at: self.created_at,
            review_note: self.review.as_ref().and_then(|review| review.note.clone()),
        }
    }
}

/// Outcome recorded by a manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewNote {
    pub reviewer: ReviewerId,
    pub decided_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Sanitized representation of a request for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStatusView {
    pub request_id: RequestId,
    pub status: &'static str,
    pub kind: RequestKind,
    pub amount: Decimal,
    pub polo: String,
    pub invoice_count: usize,
    pub dependent_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
}
