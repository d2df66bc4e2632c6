//! Core business logic: rates, caching, conversion and scheduling

pub mod cache;
pub mod config;
pub mod currency;
pub mod engine;
pub mod error;
pub mod format;
pub mod log;
pub mod notify;
pub mod rates;
pub mod retry;
pub mod scheduler;
pub mod session;

// Re-export main types for cleaner imports
pub use cache::{CachePolicy, Freshness, RateCache, RateSnapshot};
pub use currency::Currency;
pub use engine::{ConversionEngine, Quote};
pub use error::{ConversionError, ConversionResult};
pub use notify::{DailyDigest, Notifier, UserDirectory};
pub use rates::{RateSource, RateTable};
pub use session::{ConversionReport, ConversionSession, SessionRegistry, UserId};
