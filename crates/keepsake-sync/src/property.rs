use std::sync::Arc;

use keepsake_storage::METADATA_FIELD;
use keepsake_store::StoreValue;
use tracing::{debug, warn};

/// Transform applied to a live value before it is persisted.
pub type SerializeFn = Arc<dyn Fn(&StoreValue) -> StoreValue + Send + Sync>;
/// Transform applied to a stored value before it is assigned to the store.
pub type DeserializeFn = Arc<dyn Fn(StoreValue) -> StoreValue + Send + Sync>;

/// A watched property with its (de)serialization transforms.
#[derive(Clone)]
pub struct SerializableProperty {
    key: String,
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

impl SerializableProperty {
    /// A property persisted as-is.
    pub fn identity(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            serialize: Arc::new(StoreValue::clone),
            deserialize: Arc::new(|value| value),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn serialize(&self, value: &StoreValue) -> StoreValue {
        (self.serialize)(value)
    }

    pub fn deserialize(&self, value: StoreValue) -> StoreValue {
        (self.deserialize)(value)
    }
}

impl std::fmt::Debug for SerializableProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializableProperty")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// A custom property description, possibly incomplete.
///
/// Descriptors arrive from callers field by field; one missing its key or
/// either transform is rejected when the property list is normalized.
#[derive(Clone, Default)]
pub struct PropertyDescriptor {
    key: Option<String>,
    serialize: Option<SerializeFn>,
    deserialize: Option<DeserializeFn>,
}

impl PropertyDescriptor {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn serialize<F>(mut self, f: F) -> Self
    where
        F: Fn(&StoreValue) -> StoreValue + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(f));
        self
    }

    pub fn deserialize<F>(mut self, f: F) -> Self
    where
        F: Fn(StoreValue) -> StoreValue + Send + Sync + 'static,
    {
        self.deserialize = Some(Arc::new(f));
        self
    }

    fn into_property(self) -> Result<SerializableProperty, &'static str> {
        let key = self.key.ok_or("key")?;
        let serialize = self.serialize.ok_or("serialize")?;
        let deserialize = self.deserialize.ok_or("deserialize")?;
        Ok(SerializableProperty {
            key,
            serialize,
            deserialize,
        })
    }
}

impl std::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("key", &self.key)
            .field("serialize", &self.serialize.is_some())
            .field("deserialize", &self.deserialize.is_some())
            .finish()
    }
}

/// One entry of a caller-supplied property list.
#[derive(Clone, Debug)]
pub enum PropertySpec {
    /// A bare property name, persisted as-is.
    Name(String),
    /// A property with custom transforms.
    Descriptor(PropertyDescriptor),
}

impl From<&str> for PropertySpec {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for PropertySpec {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<PropertyDescriptor> for PropertySpec {
    fn from(descriptor: PropertyDescriptor) -> Self {
        Self::Descriptor(descriptor)
    }
}

/// Normalize a mixed property list into serializable properties.
///
/// Bare names get identity transforms. Incomplete descriptors are dropped
/// (noted in debug mode). Empty keys, the reserved metadata field and
/// repeated keys are dropped with a warning.
pub fn make_serializable_properties(
    specs: impl IntoIterator<Item = PropertySpec>,
    debug_mode: bool,
) -> Vec<SerializableProperty> {
    let mut properties: Vec<SerializableProperty> = Vec::new();

    for spec in specs {
        let property = match spec {
            PropertySpec::Name(name) => SerializableProperty::identity(name),
            PropertySpec::Descriptor(descriptor) => {
                let shown = format!("{descriptor:?}");
                match descriptor.into_property() {
                    Ok(property) => property,
                    Err(missing) => {
                        if debug_mode {
                            debug!(descriptor = %shown, missing, "property descriptor rejected");
                        }
                        continue;
                    }
                }
            }
        };

        if property.key.is_empty() || property.key == METADATA_FIELD {
            if cfg!(debug_assertions) {
                warn!(key = %property.key, "property name cannot be persisted; ignoring it");
            }
            continue;
        }
        if properties.iter().any(|p| p.key == property.key) {
            if cfg!(debug_assertions) {
                warn!(key = %property.key, "property listed more than once; keeping the first");
            }
            continue;
        }
        properties.push(property);
    }

    properties
}
