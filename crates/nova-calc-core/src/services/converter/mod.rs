//! Unit-aware expression engine
//!
//! A query flows through three stages:
//! - [`Tokenizer`] splits the text using patterns contributed by every module
//! - [`Evaluator`] gives each token a meaning and folds the expression
//! - [`ModuleRegistry`] routes conversions between modules, bridging through
//!   a common unit when no module converts directly
//!
//! Currency and crypto prices live in a [`RateCache`] per module, kept
//! current by a background [`RateRefresher`] so evaluation never touches
//! the network.

pub mod evaluator;
pub mod module;
pub mod modules;
pub mod rates;
pub mod registry;
pub mod sources;
pub mod token;
pub mod tokenizer;
pub mod unit;

pub use evaluator::{Evaluator, Operator, ParsedExpression};
pub use module::Module;
pub use modules::{CryptoModule, CurrencyModule, MathModule, TimeModule};
pub use rates::{RateCache, RateRefresher, RateTable};
pub use registry::ModuleRegistry;
pub use sources::{
    CoinGeckoSource, EcbSource, ErApiSource, Prices, RateSource, SourceChain, SourceError,
};
pub use token::{Token, TokenKind, TokenPattern};
pub use tokenizer::Tokenizer;
pub use unit::{CalcResult, Unit, UnitType};
