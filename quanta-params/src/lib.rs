//! Quanta Params - buffered, pass-scoped parameters
//!
//! A [`Parameter`] is a named value with a default and an override track,
//! each a literal or a formula. [`ParameterStore`] holds parameters by id and
//! resolves the `[id]` references between their formulas, evaluating each
//! parameter at most once per calculation pass.

mod compare;
mod parameter;
mod persisted;
mod store;

pub use compare::compare_values;
pub use parameter::{ChangeListener, Parameter, Track, TrackSource, TrackState};
pub use persisted::{join_fields, split_fields};
pub use store::ParameterStore;
