use stmtflow_core::Transaction;

use crate::similarity::similarity;

/// How a newly extracted transaction is matched against stored ones.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DuplicatePolicy {
    /// Same date, same inflow and same outflow. Description is ignored.
    #[default]
    Exact,
    /// Same date and inflow, and fingerprint similarity above `threshold`.
    Fuzzy { threshold: f64 },
}

impl DuplicatePolicy {
    pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.9;

    pub fn is_duplicate(&self, existing: &Transaction, candidate: &Transaction) -> bool {
        match *self {
            DuplicatePolicy::Exact => {
                existing.date == candidate.date
                    && existing.inflow_amount() == candidate.inflow_amount()
                    && existing.outflow_amount() == candidate.outflow_amount()
            }
            DuplicatePolicy::Fuzzy { threshold } => {
                if existing.date != candidate.date
                    || existing.inflow_amount() != candidate.inflow_amount()
                {
                    return false;
                }
                similarity(&existing.fingerprint(), &candidate.fingerprint()).similarity > threshold
            }
        }
    }
}

/// Drop every extracted transaction that matches a stored one under the
/// exact policy. Survivors keep their relative order.
pub fn remove_duplicates(existing: &[Transaction], extracted: Vec<Transaction>) -> Vec<Transaction> {
    remove_duplicates_with(DuplicatePolicy::Exact, existing, extracted)
}

/// Linear scan per candidate; the first match wins. Meant for
/// statement-sized batches, not bulk reconciliation.
pub fn remove_duplicates_with(
    policy: DuplicatePolicy,
    existing: &[Transaction],
    extracted: Vec<Transaction>,
) -> Vec<Transaction> {
    extracted
        .into_iter()
        .filter(|candidate| !existing.iter().any(|et| policy.is_duplicate(et, candidate)))
        .collect()
}
