//! Parameters: named values with a default and an override track
//!
//! Each track is a literal (value + unit expression) or a formula, plus the
//! SI value buffered from it. Reads come from the active track. Formula
//! evaluation is memoized per calculation pass through the tracer, the last
//! [`PassToken`] the parameter was evaluated under.

use quanta_core::{PassToken, QuantaError, Result};
use quanta_formula::{FormulaEvaluator, Resolver};
use quanta_units::{filter_expression, QuantityRegistry, QuantityValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    Default,
    Override,
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Track::Default => write!(f, "default"),
            Track::Override => write!(f, "override"),
        }
    }
}

/// Where a track's value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TrackSource {
    Literal { value: f64, unit: String },
    /// `unit` is the display unit; empty shows the SI value
    Formula { text: String, unit: String },
}

impl TrackSource {
    pub fn unit(&self) -> &str {
        match self {
            TrackSource::Literal { unit, .. } | TrackSource::Formula { unit, .. } => unit,
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, TrackSource::Formula { .. })
    }
}

/// One track: its source and the SI value buffered from it
#[derive(Debug, Clone, PartialEq)]
pub struct TrackState {
    source: TrackSource,
    cached: Option<QuantityValue>,
    stale: bool,
}

impl TrackState {
    pub(crate) fn unbuffered(source: TrackSource) -> Self {
        TrackState {
            source,
            cached: None,
            stale: true,
        }
    }

    pub fn source(&self) -> &TrackSource {
        &self.source
    }

    pub fn cached(&self) -> Option<QuantityValue> {
        self.cached
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

/// Receives a notification when a parameter's buffered value changes
pub trait ChangeListener: Send + Sync {
    fn parameter_changed(&self, id: &str, old: Option<QuantityValue>, new: QuantityValue);
}

#[derive(Clone)]
pub struct Parameter {
    pub(crate) id: String,
    pub(crate) name: Option<String>,
    pub(crate) notes: String,
    pub(crate) modified_by: String,
    pub(crate) modified_on: String,
    pub(crate) default: TrackState,
    pub(crate) override_track: Option<TrackState>,
    pub(crate) active: Track,
    tracer: Option<PassToken>,
    /// Failure recorded under `tracer`, replayed for the rest of that pass
    last_error: Option<QuantaError>,
    evaluations: u64,
    listeners: Vec<Arc<dyn ChangeListener>>,
}

impl Parameter {
    fn with_default(id: impl Into<String>, source: TrackSource) -> Self {
        Parameter {
            id: id.into(),
            name: None,
            notes: String::new(),
            modified_by: String::new(),
            modified_on: String::new(),
            default: TrackState::unbuffered(source),
            override_track: None,
            active: Track::Default,
            tracer: None,
            last_error: None,
            evaluations: 0,
            listeners: Vec::new(),
        }
    }

    /// Parameter whose default track is a literal, buffered immediately
    pub fn literal(
        id: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        registry: &QuantityRegistry,
    ) -> Result<Self> {
        let unit = unit.into();
        let mut parameter = Self::with_default(id, TrackSource::Literal { value, unit: unit.clone() });
        parameter.default.cached = Some(QuantityValue::from_unit(value, &unit, registry)?);
        parameter.default.stale = false;
        Ok(parameter)
    }

    /// Parameter whose default track is a formula; nothing is evaluated yet
    pub fn formula(id: impl Into<String>, text: impl Into<String>, unit: impl Into<String>) -> Self {
        Self::with_default(
            id,
            TrackSource::Formula {
                text: text.into(),
                unit: unit.into(),
            },
        )
    }

    /// Parameter with a source that has not been buffered yet
    pub(crate) fn unbuffered(id: impl Into<String>, source: TrackSource) -> Self {
        Self::with_default(id, source)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn modified_by(&self) -> &str {
        &self.modified_by
    }

    pub fn modified_on(&self) -> &str {
        &self.modified_on
    }

    pub fn set_modified(&mut self, by: impl Into<String>, on: impl Into<String>) {
        self.modified_by = by.into();
        self.modified_on = on.into();
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    pub fn track(&self, track: Track) -> Option<&TrackState> {
        match track {
            Track::Default => Some(&self.default),
            Track::Override => self.override_track.as_ref(),
        }
    }

    pub fn active_track(&self) -> Track {
        self.active
    }

    /// Select the track reads come from. The override track must exist.
    pub fn set_active_track(&mut self, track: Track) -> Result<()> {
        if track == Track::Override && self.override_track.is_none() {
            return Err(QuantaError::evaluation(format!(
                "parameter '{}' has no override track",
                self.id
            )));
        }
        if self.active != track {
            self.active = track;
            self.mark_stale();
        }
        Ok(())
    }

    /// Drop the override track and read from the default one again
    pub fn clear_override(&mut self) {
        self.override_track = None;
        self.active = Track::Default;
        self.mark_stale();
    }

    /// Last pass this parameter was evaluated under
    pub fn tracer(&self) -> Option<PassToken> {
        self.tracer
    }

    /// Number of formula evaluations performed so far
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Forget the tracer so the next pass re-evaluates
    pub fn mark_stale(&mut self) {
        self.tracer = None;
        self.last_error = None;
        self.active_state_mut().stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.active_state().stale
    }

    fn active_state(&self) -> &TrackState {
        match (self.active, &self.override_track) {
            (Track::Override, Some(state)) => state,
            _ => &self.default,
        }
    }

    fn active_state_mut(&mut self) -> &mut TrackState {
        match (self.active, &mut self.override_track) {
            (Track::Override, Some(state)) => state,
            _ => &mut self.default,
        }
    }

    fn state_mut(&mut self, track: Track, source: TrackSource) -> &mut TrackState {
        match track {
            Track::Default => {
                self.default.source = source;
                &mut self.default
            }
            Track::Override => {
                let state = self
                    .override_track
                    .get_or_insert_with(|| TrackState::unbuffered(source.clone()));
                state.source = source;
                state
            }
        }
    }

    /// Write a literal to a track, replacing any formula on it.
    ///
    /// Listeners hear about it only when the track is the active one and its
    /// buffered value actually changed.
    pub fn set_literal(
        &mut self,
        track: Track,
        value: f64,
        unit: impl Into<String>,
        registry: &QuantityRegistry,
    ) -> Result<()> {
        let unit = unit.into();
        let buffered = QuantityValue::from_unit(value, &unit, registry)?;

        let state = self.state_mut(track, TrackSource::Literal { value, unit });
        let previous = state.cached.replace(buffered);
        state.stale = false;
        self.tracer = None;
        self.last_error = None;

        if track == self.active && previous != Some(buffered) {
            self.notify(previous, buffered);
        }
        Ok(())
    }

    /// Write a formula to a track; it is evaluated by the next `update_buffers`
    pub fn set_formula(&mut self, track: Track, text: impl Into<String>, unit: impl Into<String>) {
        let source = TrackSource::Formula {
            text: text.into(),
            unit: unit.into(),
        };
        self.state_mut(track, source).stale = true;
        self.tracer = None;
        self.last_error = None;
    }

    /// Refresh the active track's buffer for a calculation pass.
    ///
    /// A no-op when this parameter was already evaluated under `pass`, and a
    /// failure from that evaluation is returned again without re-running the
    /// formula. [`PassToken::NONE`] always re-evaluates.
    ///
    /// A failed evaluation drops the buffered value, so readers get an error
    /// instead of the previous pass's number.
    pub fn update_buffers(
        &mut self,
        pass: PassToken,
        evaluator: &FormulaEvaluator,
        resolver: &mut dyn Resolver,
    ) -> Result<()> {
        if !pass.is_none() && self.tracer == Some(pass) {
            return match &self.last_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            };
        }

        let fresh = match self.recompute(pass, evaluator, resolver) {
            Ok(Some(fresh)) => fresh,
            Ok(None) => {
                self.tracer = Some(pass);
                self.last_error = None;
                return Ok(());
            }
            Err(e) => {
                let state = self.active_state_mut();
                state.cached = None;
                state.stale = true;
                self.tracer = Some(pass);
                self.last_error = Some(e.clone());
                return Err(e);
            }
        };

        let state = self.active_state_mut();
        let previous = state.cached.replace(fresh);
        state.stale = false;
        self.tracer = Some(pass);
        self.last_error = None;

        if previous != Some(fresh) {
            self.notify(previous, fresh);
        }
        Ok(())
    }

    /// New SI value of the active track; `None` when a literal is already
    /// buffered
    fn recompute(
        &mut self,
        pass: PassToken,
        evaluator: &FormulaEvaluator,
        resolver: &mut dyn Resolver,
    ) -> Result<Option<QuantityValue>> {
        let state = self.active_state();
        let fresh = match state.source.clone() {
            TrackSource::Literal { value, unit } => {
                if !state.stale && state.cached.is_some() {
                    return Ok(None);
                }
                QuantityValue::from_unit(value, &unit, evaluator.registry())?
            }
            TrackSource::Formula { text, unit } => {
                tracing::debug!(id = %self.id, %pass, formula = %text, "evaluating parameter");
                self.evaluations += 1;
                let result = evaluator.evaluate(&text, resolver, pass)?;
                if !unit.is_empty() {
                    let display = filter_expression(evaluator.registry(), &unit)?;
                    if display.dimension != result.quantity.dimension {
                        return Err(QuantaError::incompatible(
                            result.quantity.dimension,
                            format!("{} [{}]", unit, display.dimension),
                        ));
                    }
                }
                result.quantity
            }
        };
        Ok(Some(fresh))
    }

    /// Buffered SI value of the active track
    pub fn to_quantity_value(&self) -> Result<QuantityValue> {
        self.active_state().cached.ok_or_else(|| {
            QuantaError::evaluation(format!("parameter '{}' has not been evaluated", self.id))
        })
    }

    /// Active track value expressed in the track's own unit expression.
    ///
    /// A formula without a display unit reports the SI magnitude.
    pub fn value_in_default_unit(&self, registry: &QuantityRegistry) -> Result<f64> {
        let state = self.active_state();
        match &state.source {
            TrackSource::Literal { value, .. } if !state.stale => Ok(*value),
            source => {
                let quantity = self.to_quantity_value()?;
                if source.unit().is_empty() {
                    Ok(quantity.magnitude)
                } else {
                    quantity.in_unit(source.unit(), registry)
                }
            }
        }
    }

    /// Unit expression of the active track
    pub fn unit(&self) -> &str {
        self.active_state().source.unit()
    }

    fn notify(&self, old: Option<QuantityValue>, new: QuantityValue) {
        for listener in &self.listeners {
            listener.parameter_changed(&self.id, old, new);
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("default", &self.default)
            .field("override", &self.override_track)
            .field("tracer", &self.tracer)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta_formula::{MapResolver, NoReferences};
    use quanta_units::DimensionVector;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> Arc<QuantityRegistry> {
        Arc::new(QuantityRegistry::builtin().unwrap())
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl ChangeListener for Counter {
        fn parameter_changed(&self, _id: &str, _old: Option<QuantityValue>, _new: QuantityValue) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Resolver counting how often each lookup reaches it
    struct CountingResolver {
        inner: MapResolver,
        calls: usize,
    }

    impl Resolver for CountingResolver {
        fn resolve(&mut self, identifier: &str, pass: PassToken) -> Result<QuantityValue> {
            self.calls += 1;
            self.inner.resolve(identifier, pass)
        }
    }

    #[test]
    fn test_literal_buffers_si() {
        let registry = registry();
        let p = Parameter::literal("mass", 1500.0, "g", &registry).unwrap();
        let q = p.to_quantity_value().unwrap();
        assert!((q.magnitude - 1.5).abs() < 1e-12);
        assert_eq!(q.dimension, DimensionVector::MASS);
        assert_eq!(p.value_in_default_unit(&registry).unwrap(), 1500.0);
        assert_eq!(p.unit(), "g");
    }

    #[test]
    fn test_set_literal_notifies_only_on_change() {
        let registry = registry();
        let counter = Arc::new(Counter::default());
        let mut p = Parameter::literal("mass", 1.0, "kg", &registry).unwrap();
        p.add_listener(counter.clone());

        p.set_literal(Track::Default, 1.0, "kg", &registry).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        p.set_literal(Track::Default, 2.0, "kg", &registry).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        // same SI value written in another unit
        p.set_literal(Track::Default, 2000.0, "g", &registry).unwrap();
        let q = p.to_quantity_value().unwrap();
        assert!((q.magnitude - 2.0).abs() < 1e-12);
        assert_eq!(p.unit(), "g");
    }

    #[test]
    fn test_inactive_track_write_is_silent() {
        let registry = registry();
        let counter = Arc::new(Counter::default());
        let mut p = Parameter::literal("mass", 1.0, "kg", &registry).unwrap();
        p.add_listener(counter.clone());

        p.set_literal(Track::Override, 5.0, "kg", &registry).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
        assert_eq!(p.value_in_default_unit(&registry).unwrap(), 1.0);

        p.set_active_track(Track::Override).unwrap();
        p.set_literal(Track::Override, 6.0, "kg", &registry).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_is_recorded_for_the_pass() {
        let evaluator = FormulaEvaluator::new(registry());
        let mut ok = MapResolver::new().with("a", QuantityValue::ratio(1.0));
        let mut p = Parameter::formula("p", "[a] + 1", "");
        p.update_buffers(PassToken::mint(), &evaluator, &mut ok).unwrap();
        assert_eq!(p.to_quantity_value().unwrap(), QuantityValue::ratio(2.0));

        let mut broken = MapResolver::new().with("a", QuantityValue::new(1.0, DimensionVector::MASS));
        let pass = PassToken::mint();
        let first = p.update_buffers(pass, &evaluator, &mut broken).unwrap_err();
        assert_eq!(first.code(), quanta_core::codes::INCOMPATIBLE_DIMENSION);
        // the previous value is gone, not served as current
        assert!(p.to_quantity_value().is_err());
        assert!(p.is_stale());

        // same pass: the failure is replayed without evaluating again
        let again = p.update_buffers(pass, &evaluator, &mut ok).unwrap_err();
        assert_eq!(again, first);
        assert_eq!(p.evaluations(), 2);

        p.update_buffers(PassToken::mint(), &evaluator, &mut ok).unwrap();
        assert_eq!(p.evaluations(), 3);
        assert_eq!(p.to_quantity_value().unwrap(), QuantityValue::ratio(2.0));
    }

    #[test]
    fn test_set_literal_replaces_formula() {
        let registry = registry();
        let mut p = Parameter::formula("x", "[a] * 2", "");
        assert!(p.track(Track::Default).unwrap().source().is_formula());
        p.set_literal(Track::Default, 4.0, "", &registry).unwrap();
        let state = p.track(Track::Default).unwrap();
        assert!(!state.source().is_formula());
        assert!(!state.is_stale());
    }

    #[test]
    fn test_update_buffers_memoizes_per_pass() {
        let registry = registry();
        let evaluator = FormulaEvaluator::new(registry);
        let mut resolver = CountingResolver {
            inner: MapResolver::new().with("a", QuantityValue::ratio(3.0)),
            calls: 0,
        };
        let mut p = Parameter::formula("p", "[a] * 2", "");

        let pass = PassToken::mint();
        p.update_buffers(pass, &evaluator, &mut resolver).unwrap();
        p.update_buffers(pass, &evaluator, &mut resolver).unwrap();
        assert_eq!(p.evaluations(), 1);
        assert_eq!(resolver.calls, 1);
        assert_eq!(p.to_quantity_value().unwrap(), QuantityValue::ratio(6.0));

        p.update_buffers(PassToken::mint(), &evaluator, &mut resolver).unwrap();
        assert_eq!(p.evaluations(), 2);

        // the empty token always re-evaluates
        p.update_buffers(PassToken::NONE, &evaluator, &mut resolver).unwrap();
        p.update_buffers(PassToken::NONE, &evaluator, &mut resolver).unwrap();
        assert_eq!(p.evaluations(), 4);
    }

    #[test]
    fn test_mutation_forces_reevaluation() {
        let evaluator = FormulaEvaluator::new(registry());
        let mut p = Parameter::formula("p", "2 + 2", "");
        let pass = PassToken::mint();
        p.update_buffers(pass, &evaluator, &mut NoReferences).unwrap();

        p.set_formula(Track::Default, "3 + 3", "");
        assert!(p.is_stale());
        p.update_buffers(pass, &evaluator, &mut NoReferences).unwrap();
        assert_eq!(p.to_quantity_value().unwrap(), QuantityValue::ratio(6.0));
        assert_eq!(p.evaluations(), 2);
    }

    #[test]
    fn test_formula_display_unit() {
        let registry = registry();
        let evaluator = FormulaEvaluator::new(registry.clone());
        let mut p = Parameter::formula("m", "2{kg} + 500{g}", "g");
        p.update_buffers(PassToken::NONE, &evaluator, &mut NoReferences).unwrap();
        let shown = p.value_in_default_unit(&registry).unwrap();
        assert!((shown - 2500.0).abs() < 1e-9);

        let mut bad = Parameter::formula("t", "1{kg}", "s");
        let err = bad.update_buffers(PassToken::NONE, &evaluator, &mut NoReferences).unwrap_err();
        assert_eq!(err.code(), quanta_core::codes::INCOMPATIBLE_DIMENSION);
        assert!(bad.to_quantity_value().is_err());
    }

    #[test]
    fn test_override_track() {
        let registry = registry();
        let evaluator = FormulaEvaluator::new(registry.clone());
        let mut p = Parameter::literal("e", 1.0, "MJ", &registry).unwrap();
        assert!(p.set_active_track(Track::Override).is_err());

        p.set_formula(Track::Override, "2{MJ}", "MJ");
        p.set_active_track(Track::Override).unwrap();
        p.update_buffers(PassToken::mint(), &evaluator, &mut NoReferences).unwrap();
        let shown = p.value_in_default_unit(&registry).unwrap();
        assert!((shown - 2.0).abs() < 1e-9);

        p.clear_override();
        assert_eq!(p.active_track(), Track::Default);
        assert_eq!(p.value_in_default_unit(&registry).unwrap(), 1.0);
    }
}
