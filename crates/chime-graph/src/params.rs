//! Parameter registry with range clamping and change hooks.

use arrayvec::ArrayString;

/// A closed numeric interval with a default value, used as static
/// parameter metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParameterRange<T = f32> {
    pub min: T,
    pub max: T,
    pub default: T,
}

impl<T: Copy + PartialOrd> ParameterRange<T> {
    pub const fn new(min: T, max: T, default: T) -> Self {
        Self { min, max, default }
    }

    /// Clamp `value` into the interval.
    pub fn clamp(&self, value: T) -> T {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Identifier for a registered parameter. Ids are dense per host, assigned
/// in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParamId(pub(crate) u16);

#[derive(Clone, Debug)]
struct Parameter {
    name: ArrayString<16>,
    value: f32,
    range: ParameterRange,
}

/// Storage for a host object's registered parameters.
///
/// The stored value always lies within its range: out-of-range writes are
/// clamped, never ignored. Looking up an unregistered id is a programmer
/// error and panics — ids are compile-time-known metadata, not user input.
#[derive(Clone, Debug, Default)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter, initialized to its range default.
    pub fn add(&mut self, name: &str, range: ParameterRange) -> ParamId {
        let mut param_name = ArrayString::new();
        let _ = param_name.try_push_str(name);
        let id = ParamId(self.params.len() as u16);
        self.params.push(Parameter {
            name: param_name,
            value: range.default,
            range,
        });
        id
    }

    /// Clamp `value` into the parameter's range and store it. Returns true
    /// when the stored value changed.
    pub fn store(&mut self, id: ParamId, value: f32) -> bool {
        let param = self.param_mut(id);
        let clamped = param.range.clamp(value);
        let changed = clamped != param.value;
        param.value = clamped;
        changed
    }

    /// Current (clamped) value of a parameter.
    pub fn value(&self, id: ParamId) -> f32 {
        self.param(id).value
    }

    pub fn name(&self, id: ParamId) -> &str {
        &self.param(id).name
    }

    pub fn range(&self, id: ParamId) -> ParameterRange {
        self.param(id).range
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn param(&self, id: ParamId) -> &Parameter {
        match self.params.get(id.0 as usize) {
            Some(param) => param,
            None => panic!("unregistered parameter id {}", id.0),
        }
    }

    fn param_mut(&mut self, id: ParamId) -> &mut Parameter {
        match self.params.get_mut(id.0 as usize) {
            Some(param) => param,
            None => panic!("unregistered parameter id {}", id.0),
        }
    }
}

/// Store-then-hook parameter contract shared by the envelope and oscillator.
///
/// `set_parameter` stores the clamped value first, then fires
/// `on_parameter_update` only when the stored value actually changed, so the
/// hook always observes the new value. Hosts deriving secondary values
/// inside the hook must write them with [`ParameterSet::store`] directly to
/// avoid re-entering the hook.
pub trait ParameterHost {
    fn params(&self) -> &ParameterSet;
    fn params_mut(&mut self) -> &mut ParameterSet;

    /// Derive secondary state after a parameter change.
    fn on_parameter_update(&mut self, _id: ParamId) {}

    fn set_parameter(&mut self, id: ParamId, value: f32) {
        if self.params_mut().store(id, value) {
            self.on_parameter_update(id);
        }
    }

    fn parameter(&self, id: ParamId) -> f32 {
        self.params().value(id)
    }
}
