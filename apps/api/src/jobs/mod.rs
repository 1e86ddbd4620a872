pub mod handlers;
pub mod marketplace;
pub mod payload;
pub mod prefill;
pub mod save;
pub mod sync;
