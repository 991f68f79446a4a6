//! <https://www.w3.org/TR/webauthn-3/#sctn-fido-u2f-attestation>

use crate::certificate::parse_x5c_chain;
use crate::cose::{COSEAlgorithm, COSEKeyType, CredentialPublicKey, ECDSACurve};
use crate::error::{AttestationError, AttestationResult};
use crate::statement::AttestationStatement;

use super::{AttestationType, AttestationVerifier, VerificationInput, VerificationResult};

/// Verifies `fido-u2f` attestation statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct FidoU2fVerifier;

impl AttestationVerifier for FidoU2fVerifier {
    fn verify(
        &self,
        statement: &AttestationStatement<'_>,
        input: &VerificationInput<'_>,
    ) -> AttestationResult<VerificationResult> {
        // Verify that attStmt is valid CBOR conforming to the syntax defined above and perform
        // CBOR decoding on it to extract the contained fields.
        statement.ensure_populated()?;
        let sig = statement.sig()?;
        let x5c = statement.x5c()?.ok_or_else(|| {
            debug!("fido-u2f statement has no x5c");
            AttestationError::MalformedStatement
        })?;

        // Check that x5c has exactly one element and let attCert be that element.
        if x5c.len() != 1 {
            debug!(len = x5c.len(), "fido-u2f x5c must hold exactly one certificate");
            return Err(AttestationError::MalformedStatement);
        }
        let chain = parse_x5c_chain(&x5c)?;
        let att_cert = chain.first().ok_or(AttestationError::MalformedStatement)?;

        // Let certificate public key be the public key conveyed by attCert. If certificate
        // public key is not an Elliptic Curve (EC) public key over the P-256 curve, terminate
        // this algorithm and return an appropriate error.
        let certificate_public_key = CredentialPublicKey::from_certificate(
            att_cert,
            COSEAlgorithm::ES256,
        )
        .map_err(|e| match e {
            AttestationError::AlgorithmMismatch => {
                debug!("fido-u2f certificate key is not a P-256 key");
                AttestationError::CertificateRequirementsNotMet
            }
            e => e,
        })?;

        // Extract the claimed rpIdHash from authenticatorData, and the claimed credentialId and
        // credentialPublicKey from authenticatorData.attestedCredentialData.
        let auth_data = input.auth_data();
        let acd = input.attested_credential_data()?;

        // U2F devices predate AAGUIDs, so the AAGUID must be zero.
        if acd.aaguid != [0u8; 16] {
            debug!(aaguid = %acd.aaguid(), "fido-u2f authenticator has a non zero aaguid");
            return Err(AttestationError::AaguidMismatch);
        }

        // Convert the COSE_KEY formatted credentialPublicKey to Raw ANSI X9.62 public key
        // format.
        let credential_pk = &acd.credential_pk;
        match &credential_pk.key {
            COSEKeyType::EC_EC2(ec2) if ec2.curve == ECDSACurve::SECP256R1 => {}
            _ => {
                debug!(type_ = ?credential_pk.type_, "fido-u2f credential key is not an ES256 key");
                return Err(AttestationError::AlgorithmMismatch);
            }
        }
        let public_key_u2f = credential_pk.x962_raw()?;

        // Let verificationData be the concatenation of
        // (0x00 || rpIdHash || clientDataHash || credentialId || publicKeyU2F)
        let r: [u8; 1] = [0x00];
        let verification_data: Vec<u8> = r
            .iter()
            .chain(auth_data.rp_id_hash.iter())
            .chain(input.client_data_hash().iter())
            .chain(acd.credential_id.iter())
            .chain(public_key_u2f.iter())
            .copied()
            .collect();

        // Verify the sig using verificationData and the certificate public key per [SEC1].
        if !certificate_public_key.verify(&verification_data, sig) {
            error!("signature verification failed!");
            return Err(AttestationError::InvalidSignature);
        }

        // Optionally, inspect x5c and consult externally provided knowledge to determine
        // whether attStmt conveys a Basic or AttCA attestation.
        Ok(VerificationResult::new(AttestationType::Basic, chain))
    }
}
