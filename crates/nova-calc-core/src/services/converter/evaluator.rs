//! Expression evaluation over a token stream
//!
//! Evaluation runs in two phases:
//! 1. `parse_expression` gives every value token a meaning by asking each
//!    module in registration order, and collects operators and an optional
//!    conversion target.
//! 2. `calculate_expression` brings operands into a common unit, folds them
//!    strictly left to right (no operator precedence: `1+2*3` is 9) and
//!    converts the total into the target unit.

use std::fmt;

use rust_decimal::Decimal;
use tracing::debug;

use super::registry::ModuleRegistry;
use super::token::{Token, TokenKind};
use super::unit::{CalcResult, Unit, UnitType, BRIDGE_TIME};
use crate::error::{ConverterError, ConverterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Operator::Add),
            "-" => Some(Operator::Subtract),
            "*" => Some(Operator::Multiply),
            "/" => Some(Operator::Divide),
            _ => None,
        }
    }

    pub fn apply(self, left: Decimal, right: Decimal) -> ConverterResult<Decimal> {
        let value = match self {
            Operator::Add => left.checked_add(right),
            Operator::Subtract => left.checked_sub(right),
            Operator::Multiply => left.checked_mul(right),
            Operator::Divide => {
                if right.is_zero() {
                    return Err(ConverterError::DivisionByZero);
                }
                left.checked_div(right)
            }
        };
        value.ok_or(ConverterError::ArithmeticOverflow)
    }

    /// Whether the operator needs both sides in the same unit family
    fn is_additive(self) -> bool {
        matches!(self, Operator::Add | Operator::Subtract)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        };
        f.write_str(symbol)
    }
}

/// Output of the first evaluation phase
#[derive(Debug, Clone)]
pub struct ParsedExpression {
    pub results: Vec<CalcResult>,
    pub operators: Vec<Operator>,
    pub target: Option<Unit>,
}

pub struct Evaluator<'r> {
    registry: &'r ModuleRegistry,
    display_currency: Unit,
}

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r ModuleRegistry) -> Self {
        Self {
            registry,
            display_currency: Unit::usd(),
        }
    }

    /// Unit that mixed currency/crypto expressions are shown in by default
    pub fn with_display_currency(mut self, unit: Unit) -> Self {
        self.display_currency = unit;
        self
    }

    pub fn evaluate(&self, tokens: &[Token]) -> ConverterResult<CalcResult> {
        let parsed = self.parse_expression(tokens)?;
        self.calculate_expression(parsed)
    }

    pub fn parse_expression(&self, tokens: &[Token]) -> ConverterResult<ParsedExpression> {
        let mut results = Vec::new();
        let mut operators = Vec::new();
        let mut target = None;
        let mut expect_value = true;

        let tokens: Vec<&Token> = tokens.iter().take_while(|t| !t.is_end()).collect();
        let mut i = 0;
        while let Some(&token) = tokens.get(i) {
            i += 1;
            match token.kind {
                TokenKind::Operator => {
                    let op = Operator::from_symbol(&token.text).ok_or_else(|| {
                        ConverterError::MalformedExpression(format!(
                            "unsupported operator '{}' at position {}",
                            token.text, token.offset
                        ))
                    })?;
                    if expect_value {
                        return Err(ConverterError::MalformedExpression(format!(
                            "operator '{op}' at position {} has no left operand",
                            token.offset
                        )));
                    }
                    operators.push(op);
                    expect_value = true;
                }
                TokenKind::ConversionDirective => {
                    if target.is_some() {
                        return Err(ConverterError::MalformedExpression(format!(
                            "second conversion directive at position {}",
                            token.offset
                        )));
                    }
                    let (unit, used) = self.resolve_target(token, &tokens[i..])?;
                    debug!(unit = %unit, words = used, "conversion target");
                    i += used;
                    target = Some(unit);
                }
                _ => {
                    let result = self
                        .registry
                        .modules()
                        .find_map(|m| m.calculate(token).transpose())
                        .transpose()?
                        .ok_or_else(|| ConverterError::UnhandledToken {
                            token: token.text.clone(),
                        })?;
                    if !expect_value {
                        return Err(ConverterError::MalformedExpression(format!(
                            "missing operator before '{}' at position {}",
                            token.text, token.offset
                        )));
                    }
                    results.push(result);
                    expect_value = false;
                }
            }
        }

        if results.is_empty() || operators.len() != results.len() - 1 {
            return Err(ConverterError::MalformedExpression(format!(
                "{} operators for {} operands",
                operators.len(),
                results.len()
            )));
        }

        debug!(
            operands = results.len(),
            operators = operators.len(),
            unit = ?target.as_ref().map(|u| u.name.as_str()),
            "parsed expression"
        );
        Ok(ParsedExpression {
            results,
            operators,
            target,
        })
    }

    /// Resolve the words following `directive` into a unit.
    ///
    /// The longest run of words that names a unit wins, so "new york" and
    /// "hong kong" resolve as one zone. Returns the unit and the number of
    /// tokens it took.
    fn resolve_target(
        &self,
        directive: &Token,
        rest: &[&Token],
    ) -> ConverterResult<(Unit, usize)> {
        let first = rest.first().ok_or_else(|| ConverterError::UnresolvedTargetUnit {
            token: directive.text.clone(),
        })?;
        let words = rest
            .iter()
            .take_while(|t| t.kind == TokenKind::Identifier)
            .count();

        for len in (1..=words).rev() {
            let text = rest[..len]
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            if let Some(unit) = self.registry.resolve_unit(&text) {
                return Ok((unit, len));
            }
        }

        Err(ConverterError::UnresolvedTargetUnit {
            token: first.text.clone(),
        })
    }

    pub fn calculate_expression(&self, expr: ParsedExpression) -> ConverterResult<CalcResult> {
        let ParsedExpression {
            results,
            operators,
            target,
        } = expr;

        if results.len() == 1 && operators.is_empty() {
            let only = results
                .into_iter()
                .next()
                .ok_or_else(|| ConverterError::MalformedExpression("no operands".to_string()))?;
            return match target {
                None => Ok(only),
                Some(target) => self.registry.convert(&only, &target),
            };
        }

        let mut operands = results.iter().cloned().map(|r| self.normalize(r));
        let mut total = operands
            .next()
            .ok_or_else(|| ConverterError::MalformedExpression("no operands".to_string()))??;
        for (op, next) in operators.iter().zip(operands) {
            total = combine(total, *op, next?)?;
        }

        match target {
            Some(target) => self.finish(total, &target),
            None => self.convert_inferred(total, &results),
        }
    }

    /// Unit the owning module does arithmetic in for `value`
    fn arithmetic_unit(&self, value: &CalcResult) -> Unit {
        self.registry
            .module(&value.module)
            .and_then(|m| m.arithmetic_unit(&value.unit))
            .unwrap_or_else(|| value.unit.clone())
    }

    /// Bring a value into the unit its module does arithmetic in
    fn normalize(&self, value: CalcResult) -> ConverterResult<CalcResult> {
        let unit = self.arithmetic_unit(&value);
        if unit == value.unit {
            return Ok(value);
        }
        self.registry.convert(&value, &unit)
    }

    /// Convert a folded total when no target was given.
    ///
    /// Plain numbers are dimensionless and do not count as operands here.
    /// - only numbers: a number
    /// - only time values: the last mentioned unit of the total's kind (a zone
    ///   for instants, a duration unit for durations), else the total's own
    /// - only money: the display currency
    /// - anything else: the bridge currency
    fn convert_inferred(
        &self,
        total: CalcResult,
        results: &[CalcResult],
    ) -> ConverterResult<CalcResult> {
        let valued: Vec<&CalcResult> = results.iter().filter(|r| !r.unit.is_number()).collect();

        if valued.is_empty() {
            return self.finish(total, &Unit::number());
        }

        if valued.iter().all(|r| r.unit.unit_type == UnitType::Time) {
            let target = valued
                .iter()
                .rev()
                .find(|r| self.arithmetic_unit(r) == total.unit)
                .map(|r| r.unit.clone())
                .unwrap_or_else(|| total.unit.clone());
            debug!(unit = %target, "inferred time target");
            return self.finish(total, &target);
        }

        let target = if valued.iter().all(|r| r.unit.unit_type.is_monetary()) {
            self.display_currency.clone()
        } else {
            Unit::usd()
        };
        debug!(unit = %target, "inferred conversion target");
        self.finish(total, &target)
    }

    fn finish(&self, total: CalcResult, target: &Unit) -> ConverterResult<CalcResult> {
        self.registry.convert(&retarget(total, target), target)
    }
}

/// Stamp the generic display of `total` for `target` before conversion
fn retarget(mut total: CalcResult, target: &Unit) -> CalcResult {
    total.display_value = format!("{} {}", total.raw_value, target.name);
    total
}

fn same_family(left: UnitType, right: UnitType) -> bool {
    left == right || (left.is_monetary() && right.is_monetary())
}

/// What a normalized operand measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Measure {
    Number,
    Duration,
    Instant,
    Other,
}

impl Measure {
    fn of(value: &CalcResult) -> Self {
        match value.unit.unit_type {
            UnitType::Number => Measure::Number,
            UnitType::Time if value.unit.name == BRIDGE_TIME => Measure::Instant,
            UnitType::Time => Measure::Duration,
            _ => Measure::Other,
        }
    }
}

/// Unit of a step with a time operand.
///
/// Durations shift instants either way round, two instants differ by a
/// duration in seconds, and nothing else applies to an instant.
fn time_step(left: &CalcResult, op: Operator, right: &CalcResult) -> Option<Unit> {
    use Measure::{Duration, Instant, Number};
    use Operator::{Add, Divide, Multiply, Subtract};

    match (Measure::of(left), op, Measure::of(right)) {
        (Duration, Add | Subtract, Duration | Number) => Some(left.unit.clone()),
        (Duration, Multiply | Divide, Number) => Some(left.unit.clone()),
        (Number, Add | Multiply, Duration) => Some(right.unit.clone()),
        (Instant, Add | Subtract, Duration) | (Duration, Add, Instant) => {
            Some(Unit::utc_timestamp())
        }
        (Instant, Subtract, Instant) => Some(Unit::seconds()),
        _ => None,
    }
}

/// One step of the left-to-right fold
fn combine(left: CalcResult, op: Operator, right: CalcResult) -> ConverterResult<CalcResult> {
    let incompatible = || ConverterError::IncompatibleUnits {
        left: left.unit.name.clone(),
        right: right.unit.name.clone(),
    };

    let (unit, module) = if left.unit.unit_type == UnitType::Time {
        (time_step(&left, op, &right).ok_or_else(incompatible)?, &left.module)
    } else if right.unit.unit_type == UnitType::Time {
        (time_step(&left, op, &right).ok_or_else(incompatible)?, &right.module)
    } else if op.is_additive()
        && !left.unit.is_number()
        && !right.unit.is_number()
        && !same_family(left.unit.unit_type, right.unit.unit_type)
    {
        return Err(incompatible());
    } else if left.unit.is_number() && !right.unit.is_number() {
        // A plain number takes on the unit of what it is combined with
        (right.unit.clone(), &right.module)
    } else {
        (left.unit.clone(), &left.module)
    };

    let raw = op.apply(left.raw_value, right.raw_value)?;
    Ok(CalcResult::new(
        format!("{raw} {unit}"),
        raw,
        unit,
        module.clone(),
    ))
}
