//! Circulation domain rules: policy, borrow lifecycle, fines and reminders.
//!
//! Nothing in this module touches the database; the services load state,
//! apply these rules and hand the result to the store.

pub mod eligibility;
pub mod fines;
pub mod lifecycle;
pub mod policy;
pub mod reminders;

pub use eligibility::{AgeAndRoleEligibility, BorrowerEligibility};
pub use reminders::ReminderThresholds;
