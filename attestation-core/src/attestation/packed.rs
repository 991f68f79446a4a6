//! <https://www.w3.org/TR/webauthn-3/#sctn-packed-attestation>

use crate::certificate::{
    extract_u2f_transports, is_ca_certificate, is_version_3, parse_x5c_chain, validate_extension,
    FidoGenCeAaguid,
};
use crate::cose::COSEAlgorithm;
use crate::error::{AttestationError, AttestationResult};
use crate::statement::AttestationStatement;
use crate::subject::SubjectFields;

use super::{
    verify_certificate_signature, AttestationType, AttestationVerifier, VerificationInput,
    VerificationResult,
};

/// Verifies `packed` attestation statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedVerifier;

impl AttestationVerifier for PackedVerifier {
    fn verify(
        &self,
        statement: &AttestationStatement<'_>,
        input: &VerificationInput<'_>,
    ) -> AttestationResult<VerificationResult> {
        // 1. Verify that attStmt is valid CBOR conforming to the syntax defined above and perform
        // CBOR decoding on it to extract the contained fields.
        statement.ensure_populated()?;
        let sig = statement.sig()?;
        let alg = statement.require_alg()?;

        let x5c = statement.x5c()?;
        let ecdaa_key_id = statement.ecdaa_key_id()?;

        trace!(x5c = ?x5c.as_ref().map(Vec::len), ecdaa = ecdaa_key_id.is_some());

        match (x5c, ecdaa_key_id) {
            (Some(x5c), ecdaa_key_id) => {
                // 2. If x5c is present, this indicates that the attestation type is not ECDAA.
                if x5c.is_empty() || ecdaa_key_id.is_some() {
                    debug!("x5c is empty, or present alongside ecdaaKeyId");
                    return Err(AttestationError::MalformedStatement);
                }

                // x5c: [ attestnCert: bytes, * (caCert: bytes) ]
                let chain = parse_x5c_chain(&x5c)?;
                let attestn_cert = chain.first().ok_or(AttestationError::MalformedStatement)?;

                // 2.a Verify that sig is a valid signature over the concatenation of
                // authenticatorData and clientDataHash using the attestation public key in
                // attestnCert with the algorithm specified in alg.
                let alg = COSEAlgorithm::try_from(alg)?;
                verify_certificate_signature(alg, attestn_cert, sig, input.data())?;

                // 2.b Verify that attestnCert meets the requirements in § 8.2.1 Packed
                // Attestation Statement Certificate Requirements.
                if !is_version_3(attestn_cert) {
                    debug!(version = attestn_cert.version(), "attestnCert is not version 3");
                    return Err(AttestationError::CertificateVersionMismatch);
                }

                let valid_subject = SubjectFields::try_from(attestn_cert.subject_name())
                    .map(|fields| fields.is_attestation_subject())
                    .unwrap_or(false);
                if !valid_subject {
                    debug!(subject = ?attestn_cert.subject_name(), "attestnCert subject is invalid");
                    return Err(AttestationError::InvalidCertificateSubject);
                }

                // 2.c If attestnCert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4
                // (id-fido-gen-ce-aaguid) verify that the value of this extension matches the
                // aaguid in authenticatorData.
                let acd = input.attested_credential_data()?;
                validate_extension::<FidoGenCeAaguid>(attestn_cert, &acd.aaguid)?;

                if is_ca_certificate(attestn_cert)? {
                    debug!("attestnCert has the CA flag set");
                    return Err(AttestationError::UnexpectedCACertificate);
                }

                // Informational only.
                match extract_u2f_transports(attestn_cert) {
                    Ok(transports) => trace!(?transports),
                    Err(e) => debug!(?e, "ignoring undecodable u2f transports"),
                }

                // 2.d Optionally, inspect x5c and consult externally provided knowledge to
                // determine whether attStmt conveys a Basic or AttCA attestation.
                Ok(VerificationResult::new(AttestationType::AttCa, chain))
            }
            (None, Some(_ecdaa_key_id)) => {
                // 3. If ecdaaKeyId is present, then the attestation type is ECDAA.
                debug!("ECDAA attestation is not supported");
                Err(AttestationError::UnsupportedAttestation("ECDAA"))
            }
            (None, None) => {
                // 4. If neither x5c nor ecdaaKeyId is present, self attestation is in use.
                let credential_pk = &input.attested_credential_data()?.credential_pk;

                // 4.a Validate that alg matches the algorithm of the credentialPublicKey in
                // authenticatorData.
                if !credential_pk.same_algorithm(alg) {
                    debug!(%alg, credential_alg = ?credential_pk.type_, "self attestation alg mismatch");
                    return Err(AttestationError::AlgorithmMismatch);
                }

                // 4.b Verify that sig is a valid signature over the concatenation of
                // authenticatorData and clientDataHash using the credential public key with alg.
                if !credential_pk.verify(input.data(), sig) {
                    error!("Invalid Self Attestation Signature");
                    return Err(AttestationError::InvalidSignature);
                }

                // 4.c If successful, return attestation type Self and an empty trust path.
                Ok(VerificationResult::without_trust_path(AttestationType::Self_))
            }
        }
    }
}
