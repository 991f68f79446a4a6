//! Typed access to a decoded attestation statement (`attStmt`).

use std::collections::BTreeMap;

use serde_cbor_2::Value;

use crate::error::{AttestationError, AttestationResult};

/// A borrowed view over the CBOR map of an attestation statement.
///
/// Construction only asserts the statement is a map. Every accessor is fallible, and a present
/// field with the wrong CBOR type is reported as [AttestationError::MalformedStatement].
#[derive(Debug, Clone, Copy)]
pub struct AttestationStatement<'a> {
    map: &'a BTreeMap<Value, Value>,
}

impl<'a> TryFrom<&'a Value> for AttestationStatement<'a> {
    type Error = AttestationError;

    fn try_from(value: &'a Value) -> Result<Self, Self::Error> {
        let map = cbor_try_map!(value).map_err(|e| {
            debug!("attestation statement is not a map");
            e
        })?;
        Ok(AttestationStatement { map })
    }
}

impl<'a> AttestationStatement<'a> {
    /// True if the statement map has no entries. Only the `none` format allows this.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Fail with [AttestationError::MalformedStatement] if the statement is empty.
    pub fn ensure_populated(&self) -> AttestationResult<()> {
        if self.is_empty() {
            debug!("attestation statement is empty");
            Err(AttestationError::MalformedStatement)
        } else {
            Ok(())
        }
    }

    /// Get a raw field by its text key.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(&Value::Text(key.to_string()))
    }

    /// True if the field is present, whatever its type.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// A byte string field.
    pub fn bytes(&self, key: &str) -> AttestationResult<Option<&'a [u8]>> {
        self.get(key)
            .map(|v| {
                cbor_try_bytes!(v).map(|b| b.as_slice()).map_err(|e| {
                    debug!(%key, "statement field is not a byte string");
                    e
                })
            })
            .transpose()
    }

    /// A text string field.
    pub fn text(&self, key: &str) -> AttestationResult<Option<&'a str>> {
        self.get(key)
            .map(|v| {
                cbor_try_string!(v).map(|s| s.as_str()).map_err(|e| {
                    debug!(%key, "statement field is not a text string");
                    e
                })
            })
            .transpose()
    }

    /// A byte string field that must be present and non-empty.
    pub fn require_bytes(&self, key: &str) -> AttestationResult<&'a [u8]> {
        match self.bytes(key)? {
            Some(b) if !b.is_empty() => Ok(b),
            _ => {
                debug!(%key, "required statement field is missing or empty");
                Err(AttestationError::MalformedStatement)
            }
        }
    }

    /// The `alg` COSE algorithm identifier, if present.
    pub fn alg(&self) -> AttestationResult<Option<i32>> {
        self.get("alg")
            .map(|v| {
                cbor_try_i128!(v).and_then(|i| {
                    i32::try_from(i).map_err(|_| {
                        debug!(alg = %i, "alg is out of range");
                        AttestationError::MalformedStatement
                    })
                })
            })
            .transpose()
    }

    /// The `alg` field, which must be present.
    pub fn require_alg(&self) -> AttestationResult<i32> {
        self.alg()?.ok_or_else(|| {
            debug!("alg is missing");
            AttestationError::MalformedStatement
        })
    }

    /// The `sig` field, which must be a non-empty byte string.
    pub fn sig(&self) -> AttestationResult<&'a [u8]> {
        self.require_bytes("sig")
    }

    /// The `x5c` certificate chain, leaf first, as DER byte strings.
    ///
    /// Absent gives `None`. A present `x5c` that is not an array, or that contains an element
    /// that is not a non-empty byte string, is malformed. An empty array is returned as-is so
    /// each format can decide how to treat it.
    pub fn x5c(&self) -> AttestationResult<Option<Vec<&'a [u8]>>> {
        let Some(value) = self.get("x5c") else {
            return Ok(None);
        };

        let array = cbor_try_array!(value).map_err(|e| {
            debug!("x5c is not an array");
            e
        })?;

        array
            .iter()
            .map(|v| match v {
                Value::Bytes(b) if !b.is_empty() => Ok(b.as_slice()),
                _ => {
                    debug!("x5c element is not a non-empty byte string");
                    Err(AttestationError::MalformedStatement)
                }
            })
            .collect::<AttestationResult<Vec<_>>>()
            .map(Some)
    }

    /// The `ecdaaKeyId` field, if present.
    pub fn ecdaa_key_id(&self) -> AttestationResult<Option<&'a [u8]>> {
        self.bytes("ecdaaKeyId")
    }
}
