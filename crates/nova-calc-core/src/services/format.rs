use rust_decimal::{Decimal, RoundingStrategy};

/// Maximum decimal places shown for plain numbers
const NUMBER_PRECISION: u32 = 10;

/// Format a decimal number for display
/// Removes unnecessary decimal places (e.g., 4.0 -> "4")
/// Limits precision to 10 decimal places
pub fn format_number(value: Decimal) -> String {
    format_trimmed(value, NUMBER_PRECISION)
}

/// Round to at most `max_dp` places and drop trailing zeros
pub fn format_trimmed(value: Decimal, max_dp: u32) -> String {
    let rounded = value
        .round_dp_with_strategy(max_dp, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    // normalize() keeps the sign of a rounded-away negative zero
    if rounded.is_zero() {
        "0".to_string()
    } else {
        rounded.to_string()
    }
}

/// Round to exactly `dp` places (e.g., 92 -> "92.00")
pub fn format_fixed(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", dp as usize, rounded)
}
