pub mod convert;
pub mod rates;
pub mod serve;
pub mod session;
pub mod setup;
pub mod subscribers;
pub mod ui;
