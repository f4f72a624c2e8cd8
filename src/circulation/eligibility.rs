//! Who may borrow restricted books

use chrono::NaiveDate;

use crate::models::Member;

/// Decides whether a member may borrow a restricted book
pub trait BorrowerEligibility: Send + Sync {
    fn may_borrow_restricted(&self, member: &Member, on: NaiveDate) -> bool;
}

/// Staff always qualify; other members must be at least `min_age` years old
/// with a known birthdate.
#[derive(Debug, Clone, Copy)]
pub struct AgeAndRoleEligibility {
    pub min_age: u32,
}

impl BorrowerEligibility for AgeAndRoleEligibility {
    fn may_borrow_restricted(&self, member: &Member, on: NaiveDate) -> bool {
        if member.account_type.is_staff() {
            return true;
        }
        member.age_on(on).is_some_and(|age| age >= self.min_age)
    }
}
