//! Webauthn Attestation Statement Verification
//!
//! During registration an authenticator may prove where a new credential key pair was
//! created by returning an attestation statement alongside the credential. This crate checks
//! those statements for the `packed`, `tpm`, `android-key`, `android-safetynet`, `fido-u2f`
//! and `none` formats, and reports the attestation type and the certificate trust path that
//! an application can then evaluate.
//!
//! The entry point is [VerifierRegistry]: build one with [VerifierRegistryBuilder] from a
//! [VerifierPolicy], then call [VerifierRegistry::verify] with the `fmt` and `attStmt` of the
//! attestation object, the parsed [AuthenticatorData] and the client data hash. To also apply
//! authenticator metadata (model status and trusted roots), use
//! [VerifierRegistry::verify_with_metadata] with a [webauthn_attestation_ca::MetadataLookup].
//!
//! Every failure is terminal: an [AttestationError] means the registration must be refused.

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

#[macro_use]
mod macros;

mod constants;

pub mod attestation;
pub mod authdata;
pub mod certificate;
pub mod cose;
pub mod error;
pub mod statement;
pub mod subject;
pub mod tpm;
pub mod trust;

#[cfg(test)]
mod test_support;

pub use crate::attestation::{
    AttestationFormat, AttestationType, AttestationVerifier, VerificationInput,
    VerificationResult, VerifierPolicy, VerifierRegistry, VerifierRegistryBuilder,
};
pub use crate::authdata::{AttestedCredentialData, AuthenticatorData, AuthenticatorFlags};
pub use crate::cose::{COSEAlgorithm, CredentialPublicKey};
pub use crate::error::{AttestationError, AttestationResult};
pub use crate::statement::AttestationStatement;
pub use crate::trust::verify_attestation_ca_chain;
