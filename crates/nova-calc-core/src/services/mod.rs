pub mod converter;
pub mod favorites;
pub mod format;

pub use favorites::{Favorite, FavoriteStore};
