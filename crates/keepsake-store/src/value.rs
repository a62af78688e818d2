use serde_json::Value;

/// A property value held by a reactive store.
///
/// Besides plain JSON data, stores may hold two collection shapes that have
/// no direct JSON counterpart: an insertion-ordered key/value map whose keys
/// can be any value, and an insertion-ordered set. Both are flattened to
/// arrays before they reach storage.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreValue {
    Plain(Value),
    /// Ordered key/value pairs with unique keys.
    Map(Vec<(Value, Value)>),
    /// Ordered unique values.
    Set(Vec<Value>),
}

impl StoreValue {
    /// Build a map. A repeated key keeps its first position and last value.
    pub fn map(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut out: Vec<(Value, Value)> = Vec::new();
        for (key, value) in pairs {
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => out.push((key, value)),
            }
        }
        Self::Map(out)
    }

    /// Build a set, dropping repeated values.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Self::Set(out)
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Self::Plain(v) => Some(v),
            _ => None,
        }
    }

    /// Flatten into plain JSON.
    ///
    /// Maps become `[[key, value], ...]`, sets become `[value, ...]`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Plain(v) => v.clone(),
            Self::Map(pairs) => Value::Array(
                pairs
                    .iter()
                    .map(|(k, v)| Value::Array(vec![k.clone(), v.clone()]))
                    .collect(),
            ),
            Self::Set(items) => Value::Array(items.clone()),
        }
    }

    /// Rebuild a map from its flattened form, if `value` has that shape.
    pub fn map_from_json(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        let mut pairs = Vec::with_capacity(items.len());
        for item in items {
            match item.as_array().map(Vec::as_slice) {
                Some([k, v]) => pairs.push((k.clone(), v.clone())),
                _ => return None,
            }
        }
        Some(Self::map(pairs))
    }

    /// Rebuild a set from its flattened form, if `value` is an array.
    pub fn set_from_json(value: &Value) -> Option<Self> {
        value.as_array().map(|items| Self::set(items.iter().cloned()))
    }
}

impl From<Value> for StoreValue {
    fn from(value: Value) -> Self {
        Self::Plain(value)
    }
}
