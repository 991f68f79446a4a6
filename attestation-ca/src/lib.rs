//! Authenticator metadata used to constrain attestation trust decisions.
//!
//! A [MetadataStore] maps an authenticator model (its AAGUID) to the roots that are
//! allowed to certify its attestation certificates and to the last known
//! [AuthenticatorStatus] of that model. The store is populated by the host application
//! (for example from a FIDO MDS blob) and is only read during verification.

#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
extern crate tracing;

use base64::{engine::general_purpose::STANDARD, Engine};
use openssl::error::ErrorStack as OpenSSLErrorStack;
use openssl::x509;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Errors that may occur while loading metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// A root certificate was not valid base64.
    #[error("invalid base64 in root certificate: {0}")]
    Base64(#[from] base64::DecodeError),
    /// A root certificate could not be decoded.
    #[error("invalid root certificate: {0}")]
    OpenSSL(#[from] OpenSSLErrorStack),
}

/// The FIDO certification or compromise status of an authenticator model.
///
/// <https://fidoalliance.org/specs/mds/fido-metadata-service-v3.0-ps-20210518.html#authenticatorstatus-enum>
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthenticatorStatus {
    /// The device is NOT fido certified
    #[serde(rename = "NOT_FIDO_CERTIFIED")]
    NotFidoCertified,
    /// The device is fido certified.
    #[serde(rename = "FIDO_CERTIFIED")]
    FidoCertified,
    /// Malware is able to bypass the user verification of this authenticator.
    #[serde(rename = "USER_VERIFICATION_BYPASS")]
    UserVerificationBypass,
    /// An attestation key for this authenticator is known to be compromised.
    #[serde(rename = "ATTESTATION_KEY_COMPROMISE")]
    AttestationKeyCompromise,
    /// Registered keys of this authenticator can be compromised remotely.
    #[serde(rename = "USER_KEY_REMOTE_COMPROMISE")]
    UserKeyRemoteCompromise,
    /// Registered keys can be extracted by an adversary holding the device.
    #[serde(rename = "USER_KEY_PHYSICAL_COMPROMISE")]
    UserKeyPhysicalCompromise,
    /// A software or firmware update is available for the device.
    #[serde(rename = "UPDATE_AVAILABLE")]
    UpdateAvailable,
    /// The FIDO Alliance has determined that this authenticator should not be trusted.
    #[serde(rename = "REVOKED")]
    Revoked,
    /// The vendor has submitted the self-certification checklist.
    #[serde(rename = "SELF_ASSERTION_SUBMITTED")]
    SelfAssertionSubmitted,
    /// Certified at level 1
    #[serde(rename = "FIDO_CERTIFIED_L1")]
    FidoCertifiedL1,
    /// Certified at level 1 plus
    #[serde(rename = "FIDO_CERTIFIED_L1plus")]
    FidoCertifiedL1Plus,
    /// Certified at level 2
    #[serde(rename = "FIDO_CERTIFIED_L2")]
    FidoCertifiedL2,
    /// Certified at level 2 plus
    #[serde(rename = "FIDO_CERTIFIED_L2plus")]
    FidoCertifiedL2Plus,
    /// Certified at level 3
    #[serde(rename = "FIDO_CERTIFIED_L3")]
    FidoCertifiedL3,
    /// Certified at level 3 plus
    #[serde(rename = "FIDO_CERTIFIED_L3plus")]
    FidoCertifiedL3Plus,
}

/// Statuses that mean new registrations of this model must be refused.
pub const UNDESIRED_AUTHENTICATOR_STATUS: [AuthenticatorStatus; 5] = [
    AuthenticatorStatus::AttestationKeyCompromise,
    AuthenticatorStatus::UserVerificationBypass,
    AuthenticatorStatus::UserKeyRemoteCompromise,
    AuthenticatorStatus::UserKeyPhysicalCompromise,
    AuthenticatorStatus::Revoked,
];

impl AuthenticatorStatus {
    /// True if an authenticator in this status must not be accepted for registration.
    pub fn is_undesired(self) -> bool {
        UNDESIRED_AUTHENTICATOR_STATUS.contains(&self)
    }
}

impl fmt::Display for AuthenticatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthenticatorStatus::NotFidoCertified => "NOT_FIDO_CERTIFIED",
            AuthenticatorStatus::FidoCertified => "FIDO_CERTIFIED",
            AuthenticatorStatus::UserVerificationBypass => "USER_VERIFICATION_BYPASS",
            AuthenticatorStatus::AttestationKeyCompromise => "ATTESTATION_KEY_COMPROMISE",
            AuthenticatorStatus::UserKeyRemoteCompromise => "USER_KEY_REMOTE_COMPROMISE",
            AuthenticatorStatus::UserKeyPhysicalCompromise => "USER_KEY_PHYSICAL_COMPROMISE",
            AuthenticatorStatus::UpdateAvailable => "UPDATE_AVAILABLE",
            AuthenticatorStatus::Revoked => "REVOKED",
            AuthenticatorStatus::SelfAssertionSubmitted => "SELF_ASSERTION_SUBMITTED",
            AuthenticatorStatus::FidoCertifiedL1 => "FIDO_CERTIFIED_L1",
            AuthenticatorStatus::FidoCertifiedL1Plus => "FIDO_CERTIFIED_L1plus",
            AuthenticatorStatus::FidoCertifiedL2 => "FIDO_CERTIFIED_L2",
            AuthenticatorStatus::FidoCertifiedL2Plus => "FIDO_CERTIFIED_L2plus",
            AuthenticatorStatus::FidoCertifiedL3 => "FIDO_CERTIFIED_L3",
            AuthenticatorStatus::FidoCertifiedL3Plus => "FIDO_CERTIFIED_L3plus",
        };
        f.write_str(s)
    }
}

impl FromStr for AuthenticatorStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "not-certified" => Ok(AuthenticatorStatus::NotFidoCertified),
            "certified" => Ok(AuthenticatorStatus::FidoCertified),
            "uv-bypass" => Ok(AuthenticatorStatus::UserVerificationBypass),
            "key-compromise" => Ok(AuthenticatorStatus::AttestationKeyCompromise),
            "remote-exploit" => Ok(AuthenticatorStatus::UserKeyRemoteCompromise),
            "physical-compromise" => Ok(AuthenticatorStatus::UserKeyPhysicalCompromise),
            "update-available" => Ok(AuthenticatorStatus::UpdateAvailable),
            "revoked" => Ok(AuthenticatorStatus::Revoked),
            "self-asserted" => Ok(AuthenticatorStatus::SelfAssertionSubmitted),
            "l1" => Ok(AuthenticatorStatus::FidoCertifiedL1),
            "l1plus" => Ok(AuthenticatorStatus::FidoCertifiedL1Plus),
            "l2" => Ok(AuthenticatorStatus::FidoCertifiedL2),
            "l2plus" => Ok(AuthenticatorStatus::FidoCertifiedL2Plus),
            "l3" => Ok(AuthenticatorStatus::FidoCertifiedL3),
            "l3plus" => Ok(AuthenticatorStatus::FidoCertifiedL3Plus),
            _ => Err(()),
        }
    }
}

/// A serialised metadata entry. Roots are stored as base64 DER.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialisableMetadataEntry {
    pub(crate) roots: Vec<String>,
    pub(crate) status: AuthenticatorStatus,
}

/// What is known about one authenticator model.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "SerialisableMetadataEntry")]
pub struct MetadataEntry {
    /// The roots an attestation trust path for this model must chain to. If empty, the
    /// chain is not constrained.
    pub trusted_roots: Vec<x509::X509>,
    /// The latest status reported for this model.
    pub status: AuthenticatorStatus,
}

impl MetadataEntry {
    /// Create an entry with no trust roots.
    pub fn new(status: AuthenticatorStatus) -> Self {
        MetadataEntry {
            trusted_roots: Vec::new(),
            status,
        }
    }

    /// Add a root certificate from its DER encoding.
    pub fn add_root_der(&mut self, der: &[u8]) -> Result<(), MetadataError> {
        let root = x509::X509::from_der(der)?;
        self.trusted_roots.push(root);
        Ok(())
    }
}

impl TryFrom<&MetadataEntry> for SerialisableMetadataEntry {
    type Error = MetadataError;

    fn try_from(entry: &MetadataEntry) -> Result<Self, Self::Error> {
        let roots = entry
            .trusted_roots
            .iter()
            .map(|root| root.to_der().map(|der| STANDARD.encode(der)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                error!(?e, "unable to encode root certificate");
                MetadataError::from(e)
            })?;

        Ok(SerialisableMetadataEntry {
            roots,
            status: entry.status,
        })
    }
}

impl Serialize for MetadataEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        SerialisableMetadataEntry::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl TryFrom<SerialisableMetadataEntry> for MetadataEntry {
    type Error = MetadataError;

    fn try_from(data: SerialisableMetadataEntry) -> Result<Self, Self::Error> {
        let trusted_roots = data
            .roots
            .iter()
            .map(|b64| {
                let der = STANDARD.decode(b64)?;
                x509::X509::from_der(&der).map_err(MetadataError::from)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MetadataEntry {
            trusted_roots,
            status: data.status,
        })
    }
}

/// Read access to authenticator metadata, keyed by AAGUID.
///
/// Implementations are shared between concurrent verifications, so they must be safe for
/// concurrent reads.
pub trait MetadataLookup: Send + Sync {
    /// Find the metadata for this AAGUID. `None` means nothing is known about the
    /// authenticator, which is not an error.
    fn lookup(&self, aaguid: &Uuid) -> Option<&MetadataEntry>;
}

/// An in memory metadata store.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MetadataStore {
    entries: BTreeMap<Uuid, MetadataEntry>,
}

impl MetadataStore {
    /// Determine if this store contains any entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of authenticator models in this store.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Insert or replace the entry of this AAGUID, returning the previous one.
    pub fn insert(&mut self, aaguid: Uuid, entry: MetadataEntry) -> Option<MetadataEntry> {
        self.entries.insert(aaguid, entry)
    }

    /// Build a store from (root, aaguid, status) triples. Multiple roots for the same AAGUID
    /// are merged; the last status seen wins.
    pub fn from_roots<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (x509::X509, Uuid, AuthenticatorStatus)>,
    {
        let mut entries: BTreeMap<Uuid, MetadataEntry> = BTreeMap::new();

        for (root, aaguid, status) in iter {
            let entry = entries
                .entry(aaguid)
                .or_insert_with(|| MetadataEntry::new(status));
            entry.status = status;
            entry.trusted_roots.push(root);
        }

        MetadataStore { entries }
    }
}

impl MetadataLookup for MetadataStore {
    fn lookup(&self, aaguid: &Uuid) -> Option<&MetadataEntry> {
        let entry = self.entries.get(aaguid);
        trace!(%aaguid, found = entry.is_some(), "metadata lookup");
        entry
    }
}
