//! Typed views over opaque resource specs.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::types::{Metadata, Resource};

/// A Rust type stored as the spec of one resource type.
pub trait ResourceSpec:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
    /// Resource type name, e.g. `EtcFileSpecs.files`.
    const TYPE: &'static str;

    /// Namespace resources of this type live in by default.
    const NAMESPACE: &'static str;
}

/// A resource whose spec has been decoded into `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Typed<T> {
    metadata: Metadata,
    spec: T,
}

impl<T: ResourceSpec> Typed<T> {
    /// Decode a raw resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the resource is of another type and
    /// [`Error::Serialization`] if the spec does not decode.
    pub fn from_resource(resource: Resource) -> Result<Self> {
        let (metadata, spec) = resource.into_parts();
        if metadata.resource_type() != T::TYPE {
            return Err(Error::type_mismatch(
                metadata.key(),
                T::TYPE,
                metadata.resource_type(),
            ));
        }
        let spec = decode(spec)?;
        Ok(Self { metadata, spec })
    }

    /// Resource metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Decoded spec.
    #[must_use]
    pub const fn spec(&self) -> &T {
        &self.spec
    }

    /// Consume into the decoded spec.
    #[must_use]
    pub fn into_spec(self) -> T {
        self.spec
    }
}

/// Decode a spec payload; a null payload (not yet written) decodes to `T::default()`.
///
/// # Errors
///
/// Returns [`Error::Serialization`] on malformed payloads.
pub fn decode<T: ResourceSpec>(value: serde_json::Value) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(Error::serialization)
}

/// Encode a spec payload.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if `spec` cannot be represented as JSON.
pub fn encode<T: ResourceSpec>(spec: &T) -> Result<serde_json::Value> {
    serde_json::to_value(spec).map_err(Error::serialization)
}
