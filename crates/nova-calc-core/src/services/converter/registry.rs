//! Ordered module registry and conversion router

use tracing::debug;

use super::module::Module;
use super::rates::RateRefresher;
use super::token::TokenPattern;
use super::unit::{CalcResult, Unit};
use crate::error::{ConverterError, ConverterResult};

/// Registered modules, in registration order.
///
/// Order is significant: the first module that claims a token, resolves a
/// unit name or can convert to a unit wins. The registry is built once at
/// startup and only read afterwards, so lookups need no locking.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module; it loses every tie to modules registered before it
    pub fn register(&mut self, module: Box<dyn Module>) {
        debug!(module = module.name(), position = self.modules.len(), "registered module");
        self.modules.push(module);
    }

    pub fn modules(&self) -> impl Iterator<Item = &dyn Module> {
        self.modules.iter().map(|m| m.as_ref())
    }

    pub fn module(&self, name: &str) -> Option<&dyn Module> {
        self.modules().find(|m| m.name() == name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// All patterns, concatenated in registration order
    pub fn get_token_patterns(&self) -> Vec<TokenPattern> {
        self.modules().flat_map(|m| m.token_patterns()).collect()
    }

    /// Resolve a target unit name through the first module that knows it
    pub fn resolve_unit(&self, text: &str) -> Option<Unit> {
        self.modules().find_map(|m| m.resolve_unit(text))
    }

    /// Background refreshers of every network-backed module
    pub fn refreshers(&self) -> impl Iterator<Item = &RateRefresher> {
        self.modules().filter_map(|m| m.refresher())
    }

    /// Convert `value` into `to`.
    ///
    /// Routing is at most two hops:
    /// 1. the module that produced `value` converts directly, if it can;
    /// 2. otherwise the first module that can reach `to` does, after the
    ///    producing module has brought `value` into the bridge unit of
    ///    `to`'s family (USD for money, `UTCTimestamp` for time).
    ///
    /// There is no general path search. A unit family that does not price
    /// against one of the bridges needs this routing extended.
    pub fn convert(&self, value: &CalcResult, to: &Unit) -> ConverterResult<CalcResult> {
        let no_path = || ConverterError::NoConversionPath {
            from: value.unit.name.clone(),
            to: to.name.clone(),
        };

        let owner = self.module(&value.module);

        if let Some(owner) = owner.filter(|m| m.can_convert_to(&to.name)) {
            debug!(module = owner.name(), from = %value.unit, to = %to, "direct conversion");
            return owner.convert(value, to);
        }

        let target = self
            .modules()
            .find(|m| m.can_convert_to(&to.name))
            .ok_or_else(no_path)?;
        let bridge = Unit::bridge_for(to.unit_type).ok_or_else(no_path)?;

        let bridged = if value.unit == bridge {
            value.clone()
        } else {
            let owner = owner
                .filter(|m| m.can_convert_to(&bridge.name))
                .ok_or_else(no_path)?;
            debug!(module = owner.name(), from = %value.unit, bridge = %bridge, "bridging");
            owner.convert(value, &bridge)?
        };

        debug!(module = target.name(), from = %bridged.unit, to = %to, "bridged conversion");
        target.convert(&bridged, to)
    }
}
