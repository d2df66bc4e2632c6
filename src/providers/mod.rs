pub mod cbu;
pub mod telegram;

pub use cbu::CbuRateSource;
pub use telegram::{LogNotifier, TelegramNotifier};
