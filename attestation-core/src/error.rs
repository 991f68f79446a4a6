//! Possible errors that may occur during attestation verification.

use openssl::error::ErrorStack as OpenSSLErrorStack;
use webauthn_attestation_ca::AuthenticatorStatus;

/// Wrapper for verification results.
pub type AttestationResult<T> = core::result::Result<T, AttestationError>;

/// Possible errors that may occur during attestation verification.
///
/// Every error is terminal for the verification that raised it. Callers should treat every
/// variant as "reject this registration".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[allow(missing_docs)]
pub enum AttestationError {
    #[error("The attestation statement is empty, missing required fields, or has invalid CBOR types")]
    MalformedStatement,

    #[error("A certificate is not valid DER")]
    MalformedCertificate,

    #[error("A certificate extension could not be decoded")]
    MalformedExtension,

    #[error("A distinguished name is missing required fields or could not be parsed")]
    MalformedSubject,

    #[error("A certificate is expired or not yet valid")]
    ExpiredOrInvalidCertificate,

    #[error("The attestation certificate is not an X.509 version 3 certificate")]
    CertificateVersionMismatch,

    #[error("The attestation certificate subject does not meet requirements")]
    InvalidCertificateSubject,

    #[error("The attestation certificate is a CA certificate")]
    UnexpectedCACertificate,

    #[error("The certificate AAGUID does not match the authenticator AAGUID")]
    AaguidMismatch,

    #[error("The declared algorithm does not match the algorithm of the key")]
    AlgorithmMismatch,

    #[error("The attestation signature is invalid")]
    InvalidSignature,

    #[error("No verifier is registered for this attestation format")]
    UnsupportedFormat,

    #[error("The attestation type {0} is not supported")]
    UnsupportedAttestation(&'static str),

    #[error("The authenticator data is truncated or malformed")]
    MalformedAuthenticatorData,

    #[error("The authenticator data does not contain attested credential data")]
    MissingAttestedCredentialData,

    #[error("The client data hash must be 32 bytes")]
    InvalidClientDataHash,

    #[error("The COSE algorithm {0} is not supported")]
    UnsupportedAlgorithm(i64),

    #[error("The attestation certificate key does not match the credential key")]
    CredentialKeyMismatch,

    #[error("A required certificate extension is missing")]
    MissingExtension,

    #[error("A certificate extension value does not match the expected value")]
    ExtensionMismatch,

    #[error("The attestation certificate does not meet the format requirements")]
    CertificateRequirementsNotMet,

    #[error("A TPM structure is malformed or has an unexpected type")]
    TpmStructureInvalid,

    #[error("The TPM version is not supported")]
    UnsupportedTpmVersion,

    #[error("The TPM public area does not match the credential key")]
    TpmPubAreaMismatch,

    #[error("The TPM extra data does not match the attested data")]
    TpmExtraDataMismatch,

    #[error("The TPM attested name does not match the public area")]
    TpmNameMismatch,

    #[error("The SafetyNet response is malformed")]
    SafetyNetResponseInvalid,

    #[error("The SafetyNet nonce does not match the attested data")]
    SafetyNetNonceMismatch,

    #[error("The SafetyNet response was not issued to attest.android.com")]
    SafetyNetHostnameInvalid,

    #[error("The SafetyNet response does not have a CTS profile match")]
    SafetyNetCtsProfileMismatch,

    #[error("The SafetyNet response timestamp is outside the accepted window")]
    SafetyNetTimestampInvalid,

    #[error("The authenticator has an undesired status: {0}")]
    UndesiredAuthenticatorStatus(AuthenticatorStatus),

    #[error("The attestation chain is not trusted: {0}")]
    CertificateChainNotTrusted(String),

    #[error("OpenSSL Error: {0}")]
    OpenSSL(String),
}

impl From<OpenSSLErrorStack> for AttestationError {
    fn from(e: OpenSSLErrorStack) -> Self {
        AttestationError::OpenSSL(e.to_string())
    }
}
