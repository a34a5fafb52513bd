//! Advisory reimbursement suggestion derived from the requester's monthly gross salary.

use std::str::FromStr;

use rust_decimal::Decimal;

/// Minimum suggested reimbursement (R$ 2018.36).
pub const REIMBURSEMENT_FLOOR: Decimal = Decimal::from_parts(201_836, 0, 0, false, 2);

/// Share of the salary suggested once it clears the floor (90%).
pub const SALARY_SHARE: Decimal = Decimal::from_parts(90, 0, 0, false, 2);

/// Suggest a reimbursement for `salary`.
///
/// Non-positive salaries yield zero rather than the floor. The value is never
/// enforced against the amount the requester finally submits.
pub fn suggest_reimbursement(salary: Decimal) -> Decimal {
    if salary <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let cap = salary * SALARY_SHARE;
    if cap <= REIMBURSEMENT_FLOOR {
        REIMBURSEMENT_FLOOR
    } else {
        cap
    }
}

/// Parse free-form salary input, clamping unparseable or negative values to zero.
///
/// Exponent notation (`1e6`) is accepted since JSON numbers may render that way.
pub fn clamp_salary(raw: &str) -> Decimal {
    let normalized = raw.trim().replace(',', ".");
    let parsed =
        Decimal::from_str(&normalized).or_else(|_| Decimal::from_scientific(&normalized));
    match parsed {
        Ok(value) if value > Decimal::ZERO => value,
        _ => Decimal::ZERO,
    }
}
