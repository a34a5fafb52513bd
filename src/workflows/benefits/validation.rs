use std::fmt;

use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use super::domain::{Cpf, DependentDraft, DependentRecord, Polo, Relationship, RequestKind};

/// Minimum number of characters in a dependent's name.
pub const MIN_DEPENDENT_NAME_CHARS: usize = 2;

/// Editable request fields as entered by the requester.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionForm {
    pub kind: RequestKind,
    pub amount: Option<Decimal>,
    pub polo: String,
    pub cpf: String,
    /// Monthly gross salary; only feeds the reimbursement suggestion.
    pub salary: Option<Decimal>,
}

impl SubmissionForm {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Form contents after schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub kind: RequestKind,
    pub amount: Decimal,
    pub polo: Polo,
    pub cpf: Cpf,
    pub dependents: Vec<DependentRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Cpf,
    Amount,
    Polo,
    DependentName(usize),
    DependentRelationship(usize),
    InvoiceContent(usize),
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormField::Cpf => f.write_str("cpf"),
            FormField::Amount => f.write_str("amount"),
            FormField::Polo => f.write_str("polo"),
            FormField::DependentName(index) => write!(f, "dependents[{index}].name"),
            FormField::DependentRelationship(index) => {
                write!(f, "dependents[{index}].relationship")
            }
            FormField::InvoiceContent(index) => write!(f, "invoices[{index}].content"),
        }
    }
}

impl Serialize for FormField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: FormField,
    pub message: String,
}

impl FieldError {
    pub fn new(field: FormField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Every field-level problem found in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("submission has {} invalid field(s)", .errors.len())]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn single(field: FormField, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn for_field(&self, field: FormField) -> Option<&FieldError> {
        self.errors.iter().find(|error| error.field == field)
    }
}

/// Check the form and dependent rows, collecting every failure before returning.
pub fn validate_submission(
    form: &SubmissionForm,
    dependents: &[DependentDraft],
) -> Result<ValidatedSubmission, ValidationErrors> {
    let mut errors = Vec::new();

    let cpf = match Cpf::parse(form.cpf.trim()) {
        Ok(cpf) => Some(cpf),
        Err(err) => {
            errors.push(FieldError::new(FormField::Cpf, err.to_string()));
            None
        }
    };

    let amount = match form.amount {
        Some(amount) if amount > Decimal::ZERO => Some(amount),
        Some(_) => {
            errors.push(FieldError::new(
                FormField::Amount,
                "amount must be greater than zero",
            ));
            None
        }
        None => {
            errors.push(FieldError::new(FormField::Amount, "amount is required"));
            None
        }
    };

    let polo = Polo::selected(&form.polo);
    if polo.is_none() {
        errors.push(FieldError::new(FormField::Polo, "select a polo"));
    }

    let mut records = Vec::with_capacity(dependents.len());
    for (index, draft) in dependents.iter().enumerate() {
        let name = draft.name.trim();
        if name.chars().count() < MIN_DEPENDENT_NAME_CHARS {
            errors.push(FieldError::new(
                FormField::DependentName(index),
                format!("name needs at least {MIN_DEPENDENT_NAME_CHARS} characters"),
            ));
        }

        let relationship = if draft.relationship.trim().is_empty() {
            errors.push(FieldError::new(
                FormField::DependentRelationship(index),
                "relationship is required",
            ));
            None
        } else {
            let parsed = Relationship::parse(&draft.relationship);
            if parsed.is_none() {
                errors.push(FieldError::new(
                    FormField::DependentRelationship(index),
                    format!("unknown relationship '{}'", draft.relationship.trim()),
                ));
            }
            parsed
        };

        if let Some(relationship) = relationship {
            records.push(DependentRecord {
                name: name.to_string(),
                relationship,
            });
        }
    }

    match (cpf, amount, polo) {
        (Some(cpf), Some(amount), Some(polo)) if errors.is_empty() => Ok(ValidatedSubmission {
            kind: form.kind,
            amount,
            polo,
            cpf,
            dependents: records,
        }),
        _ => Err(ValidationErrors { errors }),
    }
}
