//! Nova calculator engine
//!
//! Evaluates short unit-aware expressions typed into a launcher:
//! `1+2*3`, `100usd in eur`, `1btc + 100usd`, `9am est to pst`,
//! `days until 25th dec`.
//!
//! [`ConverterPlugin`] is the host-facing entry point. The engine itself
//! lives in [`services::converter`].

pub mod config;
pub mod error;
pub mod executor;
pub mod search;
pub mod services;

pub use config::Config;
pub use error::{ConverterError, ConverterResult, TokenizeError};
pub use executor::{ClipboardAccess, ExecutionAction};
pub use search::{ConverterPlugin, QueryResult, Startup};
pub use services::converter::{CalcResult, Unit, UnitType};
pub use services::{Favorite, FavoriteStore};
