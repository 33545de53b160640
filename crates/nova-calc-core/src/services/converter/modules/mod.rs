//! Concrete modules, in the order hosts register them

pub mod crypto;
pub mod currency;
pub mod math;
pub mod pattern;
pub mod time;

pub use crypto::CryptoModule;
pub use currency::CurrencyModule;
pub use math::MathModule;
pub use pattern::{PatternRule, PatternSet};
pub use time::TimeModule;
