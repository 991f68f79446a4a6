//! <https://www.w3.org/TR/webauthn-3/#sctn-none-attestation>

use crate::error::{AttestationError, AttestationResult};
use crate::statement::AttestationStatement;

use super::{AttestationType, AttestationVerifier, VerificationInput, VerificationResult};

/// Verifies `none` attestation statements, which carry no proof at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneVerifier;

impl AttestationVerifier for NoneVerifier {
    fn verify(
        &self,
        statement: &AttestationStatement<'_>,
        _input: &VerificationInput<'_>,
    ) -> AttestationResult<VerificationResult> {
        // The attestation statement for this format is an empty CBOR map.
        if !statement.is_empty() {
            debug!("none attestation statement is not an empty map");
            return Err(AttestationError::MalformedStatement);
        }

        Ok(VerificationResult::without_trust_path(AttestationType::None))
    }
}
