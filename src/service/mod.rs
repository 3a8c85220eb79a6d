//! Transactional operations against the store. Each public function owns a
//! whole transaction; callers never see partial effects.

pub mod catalog;
pub mod ledger;
pub mod orders;
