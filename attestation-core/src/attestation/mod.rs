//! Attestation statement verification, dispatched by attestation format.
//!
//! <https://www.w3.org/TR/webauthn-3/#sctn-defined-attestation-formats>

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use openssl::x509;
use serde::{Deserialize, Serialize};
use serde_cbor_2::Value;
use webauthn_attestation_ca::MetadataLookup;

use crate::authdata::{AttestedCredentialData, AuthenticatorData};
use crate::cose::{COSEAlgorithm, CredentialPublicKey};
use crate::error::{AttestationError, AttestationResult};
use crate::statement::AttestationStatement;

mod android_key;
mod android_safetynet;
mod fido_u2f;
mod none;
mod packed;
mod tpm;

pub use self::android_key::AndroidKeyVerifier;
pub use self::android_safetynet::AndroidSafetyNetVerifier;
pub use self::fido_u2f::FidoU2fVerifier;
pub use self::none::NoneVerifier;
pub use self::packed::PackedVerifier;
pub use self::tpm::TpmVerifier;

/// The format of an attestation statement, as declared by `fmt` in the attestation object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttestationFormat {
    /// `packed`
    #[serde(rename = "packed")]
    Packed,
    /// `tpm`
    #[serde(rename = "tpm")]
    Tpm,
    /// `android-key`
    #[serde(rename = "android-key")]
    AndroidKey,
    /// `android-safetynet`
    #[serde(rename = "android-safetynet")]
    AndroidSafetyNet,
    /// `fido-u2f`
    #[serde(rename = "fido-u2f")]
    FIDOU2F,
    /// `none`
    #[serde(rename = "none")]
    None,
}

/// Every format this engine knows how to verify.
pub const ALL_ATTESTATION_FORMATS: [AttestationFormat; 6] = [
    AttestationFormat::Packed,
    AttestationFormat::Tpm,
    AttestationFormat::AndroidKey,
    AttestationFormat::AndroidSafetyNet,
    AttestationFormat::FIDOU2F,
    AttestationFormat::None,
];

impl TryFrom<&str> for AttestationFormat {
    type Error = AttestationError;

    fn try_from(a: &str) -> Result<AttestationFormat, Self::Error> {
        match a {
            "packed" => Ok(AttestationFormat::Packed),
            "tpm" => Ok(AttestationFormat::Tpm),
            "android-key" => Ok(AttestationFormat::AndroidKey),
            "android-safetynet" => Ok(AttestationFormat::AndroidSafetyNet),
            "fido-u2f" => Ok(AttestationFormat::FIDOU2F),
            "none" => Ok(AttestationFormat::None),
            _ => {
                debug!(format = %a, "unknown attestation format");
                Err(AttestationError::UnsupportedFormat)
            }
        }
    }
}

impl AttestationFormat {
    /// The format identifier as it appears in an attestation object.
    pub fn as_str(self) -> &'static str {
        match self {
            AttestationFormat::Packed => "packed",
            AttestationFormat::Tpm => "tpm",
            AttestationFormat::AndroidKey => "android-key",
            AttestationFormat::AndroidSafetyNet => "android-safetynet",
            AttestationFormat::FIDOU2F => "fido-u2f",
            AttestationFormat::None => "none",
        }
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of attestation a statement conveyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationType {
    /// The authenticator model's attestation key signed the statement.
    Basic,
    /// A privacy CA issued the attestation key.
    AttCa,
    /// ECDAA. Defined, but never produced since it isn't verifiable.
    Ecdaa,
    /// The credential key signed its own statement.
    Self_,
    /// No attestation was provided.
    None,
    /// The statement was valid but its kind could not be determined.
    Uncertain,
}

/// The outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// The kind of attestation.
    pub attestation_type: AttestationType,
    /// The certificates the statement offered as evidence, leaf first, in the order they
    /// were supplied. `None` for self and none attestation.
    pub trust_path: Option<Vec<x509::X509>>,
}

impl VerificationResult {
    pub(crate) fn new(attestation_type: AttestationType, trust_path: Vec<x509::X509>) -> Self {
        VerificationResult {
            attestation_type,
            trust_path: Some(trust_path),
        }
    }

    pub(crate) fn without_trust_path(attestation_type: AttestationType) -> Self {
        VerificationResult {
            attestation_type,
            trust_path: None,
        }
    }

    /// The leaf (attestation) certificate of the trust path, if there is one.
    pub fn leaf(&self) -> Option<&x509::X509> {
        self.trust_path.as_ref().and_then(|chain| chain.first())
    }
}

/// The per ceremony inputs of a verification. `data` is `authenticatorData || clientDataHash`
/// and is computed once, when the input is created.
#[derive(Debug)]
pub struct VerificationInput<'a> {
    auth_data: &'a AuthenticatorData,
    client_data_hash: &'a [u8],
    data: Vec<u8>,
}

impl<'a> VerificationInput<'a> {
    /// Build the input of a verification. `client_data_hash` must be a SHA-256 digest.
    pub fn new(
        auth_data: &'a AuthenticatorData,
        client_data_hash: &'a [u8],
    ) -> AttestationResult<Self> {
        if client_data_hash.len() != 32 {
            debug!(len = client_data_hash.len(), "client data hash is not 32 bytes");
            return Err(AttestationError::InvalidClientDataHash);
        }

        let data = auth_data
            .as_bytes()
            .iter()
            .chain(client_data_hash.iter())
            .copied()
            .collect();

        Ok(VerificationInput {
            auth_data,
            client_data_hash,
            data,
        })
    }

    /// The parsed authenticator data.
    pub fn auth_data(&self) -> &'a AuthenticatorData {
        self.auth_data
    }

    /// The SHA-256 hash of the client data.
    pub fn client_data_hash(&self) -> &'a [u8] {
        self.client_data_hash
    }

    /// `authenticatorData || clientDataHash`
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn attested_credential_data(&self) -> AttestationResult<&'a AttestedCredentialData> {
        self.auth_data.attested_credential_data()
    }
}

/// A verifier of one attestation format.
///
/// Implementations hold no per ceremony state, so one instance can serve concurrent
/// verifications.
pub trait AttestationVerifier: Send + Sync {
    /// Verify `statement` against `input`. Every failure is terminal.
    fn verify(
        &self,
        statement: &AttestationStatement<'_>,
        input: &VerificationInput<'_>,
    ) -> AttestationResult<VerificationResult>;
}

/// The COSE algorithm declared by `alg`, which must be present.
pub(crate) fn declared_algorithm(
    statement: &AttestationStatement<'_>,
) -> AttestationResult<COSEAlgorithm> {
    COSEAlgorithm::try_from(statement.require_alg()?)
}

/// Verify `signature` over `data` with the public key of `certificate`, used with `alg`.
pub(crate) fn verify_certificate_signature(
    alg: COSEAlgorithm,
    certificate: &x509::X509Ref,
    signature: &[u8],
    data: &[u8],
) -> AttestationResult<()> {
    let public_key = CredentialPublicKey::from_certificate(certificate, alg)?;
    if public_key.verify(data, signature) {
        Ok(())
    } else {
        error!(?alg, subject = ?certificate.subject_name(), "signature verification failed!");
        Err(AttestationError::InvalidSignature)
    }
}

fn default_formats() -> BTreeSet<AttestationFormat> {
    ALL_ATTESTATION_FORMATS.into_iter().collect()
}

fn default_allow_insecure_sha1() -> bool {
    true
}

/// Which formats are accepted, and how strictly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierPolicy {
    /// The formats that will be verified. Others fail with
    /// [AttestationError::UnsupportedFormat].
    #[serde(default = "default_formats")]
    pub formats: BTreeSet<AttestationFormat>,
    /// Added to both ends of the SafetyNet response freshness window.
    #[serde(default)]
    pub safetynet_drift_tolerance_ms: u64,
    /// Accept RS1 (RSASSA-PKCS1-v1_5 with SHA-1) keys and statements. Many TPMs still use it.
    #[serde(default = "default_allow_insecure_sha1")]
    pub allow_insecure_sha1: bool,
}

impl Default for VerifierPolicy {
    fn default() -> Self {
        VerifierPolicy {
            formats: default_formats(),
            safetynet_drift_tolerance_ms: 0,
            allow_insecure_sha1: default_allow_insecure_sha1(),
        }
    }
}

/// A builder for a [VerifierRegistry].
#[derive(Debug, Clone, Default)]
pub struct VerifierRegistryBuilder {
    policy: VerifierPolicy,
}

impl VerifierRegistryBuilder {
    /// A builder with the default policy: every format enabled.
    pub fn new() -> Self {
        VerifierRegistryBuilder::default()
    }

    /// Replace the policy.
    pub fn policy(mut self, policy: VerifierPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop accepting a format.
    pub fn disable_format(mut self, format: AttestationFormat) -> Self {
        self.policy.formats.remove(&format);
        self
    }

    /// Set the SafetyNet timestamp drift tolerance.
    pub fn safetynet_drift_tolerance(mut self, tolerance_ms: u64) -> Self {
        self.policy.safetynet_drift_tolerance_ms = tolerance_ms;
        self
    }

    /// Accept or reject RS1 keys and statements.
    pub fn allow_insecure_sha1(mut self, allow: bool) -> Self {
        self.policy.allow_insecure_sha1 = allow;
        self
    }

    /// Build the registry.
    pub fn build(self) -> VerifierRegistry {
        let policy = self.policy;

        let verifiers = policy
            .formats
            .iter()
            .map(|format| {
                let verifier: Box<dyn AttestationVerifier> = match format {
                    AttestationFormat::Packed => Box::new(PackedVerifier),
                    AttestationFormat::Tpm => Box::new(TpmVerifier),
                    AttestationFormat::AndroidKey => Box::new(AndroidKeyVerifier),
                    AttestationFormat::AndroidSafetyNet => Box::new(AndroidSafetyNetVerifier::new(
                        policy.safetynet_drift_tolerance_ms,
                    )),
                    AttestationFormat::FIDOU2F => Box::new(FidoU2fVerifier),
                    AttestationFormat::None => Box::new(NoneVerifier),
                };
                (*format, verifier)
            })
            .collect();

        VerifierRegistry { policy, verifiers }
    }
}

/// Verifies attestation statements by dispatching on their declared format.
///
/// The registry is immutable once built and can be shared between threads.
pub struct VerifierRegistry {
    policy: VerifierPolicy,
    verifiers: BTreeMap<AttestationFormat, Box<dyn AttestationVerifier>>,
}

impl fmt::Debug for VerifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VerifierRegistry")
            .field("policy", &self.policy)
            .field("formats", &self.verifiers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for VerifierRegistry {
    fn default() -> Self {
        VerifierRegistryBuilder::new().build()
    }
}

impl VerifierRegistry {
    /// The policy this registry was built with.
    pub fn policy(&self) -> &VerifierPolicy {
        &self.policy
    }

    fn reject_insecure_sha1(
        &self,
        statement: &AttestationStatement<'_>,
        auth_data: &AuthenticatorData,
    ) -> AttestationResult<()> {
        if self.policy.allow_insecure_sha1 {
            return Ok(());
        }

        let rs1 = i32::from(COSEAlgorithm::INSECURE_RS1);
        let credential_rs1 = auth_data
            .acd
            .as_ref()
            .map(|acd| acd.credential_pk.same_algorithm(rs1))
            .unwrap_or(false);
        // A malformed alg is left for the format verifier to report.
        let statement_rs1 = matches!(statement.alg(), Ok(Some(alg)) if alg == rs1);

        if credential_rs1 || statement_rs1 {
            debug!(credential_rs1, statement_rs1, "RS1 is not accepted by policy");
            Err(AttestationError::UnsupportedAlgorithm(rs1.into()))
        } else {
            Ok(())
        }
    }

    /// Verify the attestation `statement` of declared `format`.
    ///
    /// Fails with [AttestationError::UnsupportedFormat] if the format is unknown or not
    /// enabled. Failures of the format verifier are returned unchanged.
    pub fn verify(
        &self,
        format: &str,
        statement: &Value,
        auth_data: &AuthenticatorData,
        client_data_hash: &[u8],
    ) -> AttestationResult<VerificationResult> {
        let span = debug_span!("attestation", format);
        let _enter = span.enter();

        let attestation_format = AttestationFormat::try_from(format)?;
        let verifier = self.verifiers.get(&attestation_format).ok_or_else(|| {
            debug!("attestation format is disabled by policy");
            AttestationError::UnsupportedFormat
        })?;

        let statement = AttestationStatement::try_from(statement)?;
        let input = VerificationInput::new(auth_data, client_data_hash)?;

        self.reject_insecure_sha1(&statement, auth_data)?;

        let result = verifier.verify(&statement, &input);
        match &result {
            Ok(r) => debug!(
                attestation_type = ?r.attestation_type,
                trust_path_len = r.trust_path.as_ref().map(Vec::len),
                "attestation verified"
            ),
            Err(e) => debug!(?e, "attestation rejected"),
        }
        result
    }

    /// As [VerifierRegistry::verify], then cross check the result with the metadata of the
    /// authenticator model, if any is known.
    pub fn verify_with_metadata(
        &self,
        format: &str,
        statement: &Value,
        auth_data: &AuthenticatorData,
        client_data_hash: &[u8],
        metadata: &dyn MetadataLookup,
    ) -> AttestationResult<VerificationResult> {
        let result = self.verify(format, statement, auth_data, client_data_hash)?;
        crate::trust::check_metadata(&result, auth_data, metadata)?;
        Ok(result)
    }
}
