//! <https://www.w3.org/TR/webauthn-3/#sctn-tpm-attestation>

use openssl::x509;
use x509_parser::error::X509Error;
use x509_parser::extensions::GeneralName;

use crate::certificate::{
    is_ca_certificate, is_version_3, parse_x5c_chain, validate_extension, with_parsed,
    FidoGenCeAaguid,
};
use crate::constants::{
    TCG_AT_TPM_MANUFACTURER_OID, TCG_AT_TPM_MODEL_OID, TCG_AT_TPM_VERSION_OID,
    TCG_KP_AIK_CERTIFICATE_OID, TPM_MANUFACTURERS, TPM_VERSION,
};
use crate::cose::{COSEKeyType, CredentialPublicKey, ECDSACurve};
use crate::error::{AttestationError, AttestationResult};
use crate::statement::AttestationStatement;
use crate::tpm::{TpmiEccCurve, TpmsAttest, TpmtPublic, TpmuPublicId, TpmuPublicParms};

use super::{
    declared_algorithm, verify_certificate_signature, AttestationType, AttestationVerifier,
    VerificationInput, VerificationResult,
};

/// Verifies `tpm` attestation statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct TpmVerifier;

struct TpmSanData {
    manufacturer: String,
    model: String,
    version: String,
}

#[derive(Default)]
struct TpmSanDataBuilder {
    manufacturer: Option<String>,
    model: Option<String>,
    version: Option<String>,
}

impl TpmSanDataBuilder {
    fn manufacturer(mut self, value: &str) -> Self {
        self.manufacturer = Some(value.to_string());
        self
    }

    fn model(mut self, value: &str) -> Self {
        self.model = Some(value.to_string());
        self
    }

    fn version(mut self, value: &str) -> Self {
        self.version = Some(value.to_string());
        self
    }

    fn build(self) -> AttestationResult<TpmSanData> {
        self.manufacturer
            .zip(self.model)
            .zip(self.version)
            .map(|((manufacturer, model), version)| TpmSanData {
                manufacturer,
                model,
                version,
            })
            .ok_or_else(|| {
                debug!("AIK subject alternative name lacks manufacturer, model or version");
                AttestationError::CertificateRequirementsNotMet
            })
    }
}

/// Strip leading zero bytes of a big endian integer.
fn trim_be(v: &[u8]) -> &[u8] {
    let start = v.iter().position(|b| *b != 0).unwrap_or(v.len());
    &v[start..]
}

/// Verify that the public key specified by the parameters and unique fields of pubArea is
/// identical to the credentialPublicKey in the attestedCredentialData in authenticatorData.
fn assert_pubarea_matches(
    credential_pk: &CredentialPublicKey,
    pubarea: &TpmtPublic,
) -> AttestationResult<()> {
    match (&credential_pk.key, &pubarea.parameters, &pubarea.unique) {
        (
            COSEKeyType::RSA(cose_rsa),
            TpmuPublicParms::Rsa(tpm_parms),
            TpmuPublicId::Rsa(tpm_modulus),
        ) => {
            if cose_rsa.n != *tpm_modulus {
                debug!("pubArea RSA modulus differs from the credential key");
                return Err(AttestationError::TpmPubAreaMismatch);
            }

            let exponent = tpm_parms.exponent().to_be_bytes();
            if trim_be(&cose_rsa.e) != trim_be(&exponent) {
                debug!(exponent = %tpm_parms.exponent(), "pubArea RSA exponent differs from the credential key");
                return Err(AttestationError::TpmPubAreaMismatch);
            }
        }
        (
            COSEKeyType::EC_EC2(ec2),
            TpmuPublicParms::Ecc(ecc_parms),
            TpmuPublicId::Ecc { x, y },
        ) => {
            match (ec2.curve, ecc_parms.curve_id) {
                (ECDSACurve::SECP256R1, TpmiEccCurve::NistP256)
                | (ECDSACurve::SECP384R1, TpmiEccCurve::NistP384)
                | (ECDSACurve::SECP521R1, TpmiEccCurve::NistP521) => {}
                c_mismatch => {
                    debug!(?c_mismatch, "TpmiEccCurve ID mismatch");
                    return Err(AttestationError::TpmPubAreaMismatch);
                }
            }

            if ec2.x != *x || ec2.y != *y {
                debug!("Invalid X or Y coords in TpmuPublicId");
                return Err(AttestationError::TpmPubAreaMismatch);
            }
        }
        ex => {
            debug!(?ex, "Unrecognised combination");
            return Err(AttestationError::TpmPubAreaMismatch);
        }
    }
    Ok(())
}

/// § 8.3.1 TPM Attestation Statement Certificate Requirements.
fn assert_tpm_attest_req(aik_cert: &x509::X509Ref) -> AttestationResult<()> {
    // Version MUST be set to 3.
    if !is_version_3(aik_cert) {
        debug!(version = aik_cert.version(), "AIK certificate is not version 3");
        return Err(AttestationError::CertificateVersionMismatch);
    }

    // Subject field MUST be set to empty.
    if aik_cert.subject_name().entries().next().is_some() {
        debug!(subject = ?aik_cert.subject_name(), "AIK certificate subject is not empty");
        return Err(AttestationError::CertificateRequirementsNotMet);
    }

    with_parsed(aik_cert, |parsed| {
        // The Subject Alternative Name extension MUST be set as defined in [TPMv2-EK-Profile]
        // section 3.2.9.
        let san = parsed
            .subject_alternative_name()
            .map_err(|e| {
                debug!(?e, "invalid subject alternative name");
                AttestationError::MalformedExtension
            })?
            .ok_or_else(|| {
                debug!("AIK certificate has no subject alternative name");
                AttestationError::CertificateRequirementsNotMet
            })?;

        let san_data = san
            .value
            .general_names
            .iter()
            .filter_map(|general_name| match general_name {
                GeneralName::DirectoryName(name) => Some(name),
                _ => None,
            })
            .flat_map(|name| name.iter_attributes())
            .try_fold(TpmSanDataBuilder::default(), |builder, attr| -> Result<_, X509Error> {
                let oid = attr.attr_type();
                let next = if *oid == TCG_AT_TPM_MANUFACTURER_OID {
                    builder.manufacturer(attr.as_str()?)
                } else if *oid == TCG_AT_TPM_MODEL_OID {
                    builder.model(attr.as_str()?)
                } else if *oid == TCG_AT_TPM_VERSION_OID {
                    builder.version(attr.as_str()?)
                } else {
                    builder
                };
                Ok(next)
            })
            .map_err(|e| {
                debug!(?e, "TPM subject alternative name attribute is not a string");
                AttestationError::MalformedExtension
            })
            .and_then(TpmSanDataBuilder::build)?;

        trace!(
            manufacturer = %san_data.manufacturer,
            model = %san_data.model,
            version = %san_data.version,
            "AIK certificate TPM"
        );

        if !TPM_MANUFACTURERS
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&san_data.manufacturer))
        {
            debug!(manufacturer = %san_data.manufacturer, "unknown TPM manufacturer");
            return Err(AttestationError::CertificateRequirementsNotMet);
        }

        // The Extended Key Usage extension MUST contain the OID 2.23.133.8.3
        // ("joint-iso-itu-t(2) internationalorganizations(23) 133 tcg-kp(8)
        // tcg-kp-AIKCertificate(3)").
        let has_aik_eku = parsed
            .extended_key_usage()
            .map_err(|e| {
                debug!(?e, "invalid extended key usage");
                AttestationError::MalformedExtension
            })?
            .map(|eku| eku.value.other.contains(&TCG_KP_AIK_CERTIFICATE_OID))
            .unwrap_or(false);

        if !has_aik_eku {
            debug!("AIK certificate lacks the tcg-kp-AIKCertificate usage");
            return Err(AttestationError::CertificateRequirementsNotMet);
        }

        Ok(())
    })?;

    // The Basic Constraints extension MUST have the CA component set to false.
    if is_ca_certificate(aik_cert)? {
        debug!("AIK certificate has the CA flag set");
        return Err(AttestationError::UnexpectedCACertificate);
    }

    Ok(())
}

impl AttestationVerifier for TpmVerifier {
    fn verify(
        &self,
        statement: &AttestationStatement<'_>,
        input: &VerificationInput<'_>,
    ) -> AttestationResult<VerificationResult> {
        // Verify that attStmt is valid CBOR conforming to the syntax defined above and perform
        // CBOR decoding on it to extract the contained fields.
        statement.ensure_populated()?;

        // The version of the TPM specification to which the signature conforms.
        let ver = statement.text("ver")?.ok_or_else(|| {
            debug!("tpm statement has no ver");
            AttestationError::MalformedStatement
        })?;
        if ver != TPM_VERSION {
            debug!(%ver, "unsupported TPM version");
            return Err(AttestationError::UnsupportedTpmVersion);
        }

        let alg = declared_algorithm(statement)?;
        let sig = statement.sig()?;
        let certinfo_bytes = statement.require_bytes("certInfo")?;
        let pubarea_bytes = statement.require_bytes("pubArea")?;

        let x5c = match (statement.x5c()?, statement.ecdaa_key_id()?) {
            (Some(x5c), None) if !x5c.is_empty() => x5c,
            (None, Some(_ecdaa_key_id)) => {
                debug!("ECDAA attestation is not supported");
                return Err(AttestationError::UnsupportedAttestation("ECDAA"));
            }
            _ => {
                debug!("tpm statement needs exactly one of x5c or ecdaaKeyId");
                return Err(AttestationError::MalformedStatement);
            }
        };

        let pubarea = TpmtPublic::try_from(pubarea_bytes)?;
        let certinfo = TpmsAttest::try_from(certinfo_bytes)?;

        let acd = input.attested_credential_data()?;
        assert_pubarea_matches(&acd.credential_pk, &pubarea)?;

        // Validate that certInfo is valid. magic and type are checked when parsing.

        // Verify that extraData is set to the hash of attToBeSigned using the hash algorithm
        // employed in "alg".
        let att_to_be_signed_hash = alg.only_hash(input.data())?;
        if certinfo.extra_data != att_to_be_signed_hash {
            debug!("certInfo extraData is not the hash of attToBeSigned");
            return Err(AttestationError::TpmExtraDataMismatch);
        }

        // Verify that attested contains a TPMS_CERTIFY_INFO structure whose name field contains
        // a valid Name for pubArea, as computed using the algorithm in the nameAlg field of
        // pubArea. The nameAlg prefix is compared too.
        if certinfo.name != pubarea.name(pubarea_bytes)? {
            debug!("certInfo name is not the name of pubArea");
            return Err(AttestationError::TpmNameMismatch);
        }

        // qualifiedSigner, clockInfo and firmwareVersion are ignored. These fields MAY be used
        // as an input to risk engines.
        trace!(firmware_version = %certinfo.firmware_version);

        // If x5c is present:
        let chain = parse_x5c_chain(&x5c)?;
        let aik_cert = chain.first().ok_or(AttestationError::MalformedStatement)?;

        // Verify the sig is a valid signature over certInfo using the attestation public key
        // in aikCert with the algorithm specified in alg.
        verify_certificate_signature(alg, aik_cert, sig, certinfo_bytes)?;

        // Verify that aikCert meets the requirements in § 8.3.1 TPM Attestation Statement
        // Certificate Requirements.
        assert_tpm_attest_req(aik_cert)?;

        // If aikCert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4
        // (id-fido-gen-ce-aaguid) verify that the value of this extension matches the aaguid in
        // authenticatorData.
        validate_extension::<FidoGenCeAaguid>(aik_cert, &acd.aaguid)?;

        // If successful, return implementation-specific values representing attestation type
        // AttCA and attestation trust path x5c.
        Ok(VerificationResult::new(AttestationType::AttCa, chain))
    }
}
