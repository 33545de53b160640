//! Units and calculation results

use std::fmt;

use rust_decimal::Decimal;

/// Name of the bridging currency every rate table is priced against
pub const BRIDGE_CURRENCY: &str = "USD";

/// Name of the bridging absolute-time unit (unix seconds)
pub const BRIDGE_TIME: &str = "UTCTimestamp";

/// Name of the unit durations do arithmetic in
pub const SECONDS: &str = "s";

/// Name of the dimensionless unit
pub const NUMBER: &str = "number";

/// The family a unit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitType {
    Number,
    Crypto,
    Currency,
    Time,
}

impl UnitType {
    /// Currency and crypto values price against the same bridge
    pub fn is_monetary(self) -> bool {
        matches!(self, UnitType::Currency | UnitType::Crypto)
    }
}

/// A semantic unit: a name plus its family
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Unit {
    pub name: String,
    pub unit_type: UnitType,
}

impl Unit {
    pub fn new(name: impl Into<String>, unit_type: UnitType) -> Self {
        Self {
            name: name.into(),
            unit_type,
        }
    }

    pub fn number() -> Self {
        Self::new(NUMBER, UnitType::Number)
    }

    pub fn currency(code: impl Into<String>) -> Self {
        Self::new(code, UnitType::Currency)
    }

    /// The bridging currency unit
    pub fn usd() -> Self {
        Self::currency(BRIDGE_CURRENCY)
    }

    /// The bridging time unit
    pub fn utc_timestamp() -> Self {
        Self::new(BRIDGE_TIME, UnitType::Time)
    }

    /// Seconds, the unit of time differences
    pub fn seconds() -> Self {
        Self::new(SECONDS, UnitType::Time)
    }

    /// The bridge used when no direct path to a unit of this family exists
    pub fn bridge_for(unit_type: UnitType) -> Option<Self> {
        match unit_type {
            UnitType::Currency | UnitType::Crypto => Some(Self::usd()),
            UnitType::Time => Some(Self::utc_timestamp()),
            UnitType::Number => None,
        }
    }

    pub fn is_number(&self) -> bool {
        self.unit_type == UnitType::Number
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A value produced by a module.
///
/// `raw_value` is always in the producing module's native representation for
/// `unit`; `display_value` is regenerated whenever either changes.
#[derive(Debug, Clone, PartialEq)]
pub struct CalcResult {
    pub display_value: String,
    pub raw_value: Decimal,
    pub unit: Unit,
    /// Name of the module that produced this value
    pub module: String,
}

impl CalcResult {
    pub fn new(
        display_value: impl Into<String>,
        raw_value: Decimal,
        unit: Unit,
        module: impl Into<String>,
    ) -> Self {
        Self {
            display_value: display_value.into(),
            raw_value,
            unit,
            module: module.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_for_families() {
        assert_eq!(Unit::bridge_for(UnitType::Crypto), Some(Unit::usd()));
        assert_eq!(Unit::bridge_for(UnitType::Currency), Some(Unit::usd()));
        assert_eq!(
            Unit::bridge_for(UnitType::Time),
            Some(Unit::utc_timestamp())
        );
        assert_eq!(Unit::bridge_for(UnitType::Number), None);
    }

    #[test]
    fn test_monetary_types() {
        assert!(UnitType::Currency.is_monetary());
        assert!(UnitType::Crypto.is_monetary());
        assert!(!UnitType::Time.is_monetary());
        assert!(!UnitType::Number.is_monetary());
    }
}
