//! Business logic services

pub mod books;
pub mod borrows;
pub mod notifications;
pub mod sweep;

use std::sync::Arc;

use crate::{
    circulation::{AgeAndRoleEligibility, ReminderThresholds},
    config::CirculationConfig,
    repository::CirculationStore,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub books: books::BooksService,
    pub borrows: borrows::BorrowsService,
    pub sweep: sweep::ReconciliationSweep,
}

impl Services {
    /// Create all services over the given store
    pub fn new(
        store: Arc<dyn CirculationStore>,
        circulation: CirculationConfig,
        notifier: Arc<dyn notifications::Notifier>,
    ) -> Self {
        let thresholds = ReminderThresholds::from(&circulation);
        let eligibility = Arc::new(AgeAndRoleEligibility {
            min_age: circulation.restricted_min_age,
        });
        let settings = Arc::new(circulation);

        Self {
            books: books::BooksService::new(store.clone()),
            borrows: borrows::BorrowsService::new(store.clone(), settings, eligibility),
            sweep: sweep::ReconciliationSweep::new(store, notifier, thresholds),
        }
    }
}
