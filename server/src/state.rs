use std::sync::Arc;

use crate::services::{BookingService, CheckInService};
use crate::store::Store;

pub struct AppState<S: Store> {
    pub bookings: Arc<BookingService<S>>,
    pub check_ins: Arc<CheckInService<S>>,
}

impl<S: Store> AppState<S> {
    pub fn new(bookings: BookingService<S>, check_ins: CheckInService<S>) -> Self {
        Self {
            bookings: Arc::new(bookings),
            check_ins: Arc::new(check_ins),
        }
    }
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            bookings: Arc::clone(&self.bookings),
            check_ins: Arc::clone(&self.check_ins),
        }
    }
}
