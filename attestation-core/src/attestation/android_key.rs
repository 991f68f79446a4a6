//! <https://www.w3.org/TR/webauthn-3/#sctn-android-key-attestation>

use der_parser::ber::BerObjectContent;
use x509_parser::oid_registry::Oid;

use crate::certificate::{parse_x5c_chain, validate_extension, AttestationX509Extension};
use crate::constants::{ANDROID_KEY_ATTESTATION_OID, KM_ORIGIN_GENERATED, KM_PURPOSE_SIGN};
use crate::cose::CredentialPublicKey;
use crate::error::{AttestationError, AttestationResult};
use crate::statement::AttestationStatement;

use super::{
    declared_algorithm, verify_certificate_signature, AttestationType, AttestationVerifier,
    VerificationInput, VerificationResult,
};

/// The Android key attestation extension. Its value is the `attestationChallenge`, once the
/// authorization lists have been checked.
pub(crate) struct AndroidKeyAttestationExtensionData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SecurityLevel {
    Software,
    TrustedEnvironment,
    StrongBox,
}

impl TryFrom<u32> for SecurityLevel {
    type Error = der_parser::error::BerError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(SecurityLevel::Software),
            1 => Ok(SecurityLevel::TrustedEnvironment),
            2 => Ok(SecurityLevel::StrongBox),
            _ => Err(der_parser::error::BerError::InvalidTag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AuthorizationList {
    all_applications: bool,
    origin: Option<u32>,
    purpose: Option<u32>,
}

impl AuthorizationList {
    fn parse(i: &[u8]) -> der_parser::error::BerResult<Self> {
        use der_parser::{der::*, error::BerError};
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }

            let mut all_applications = false;
            let mut origin = None;
            let mut purpose = None;

            let mut i = i;
            while let Ok((k, obj)) = parse_der(i) {
                i = k;
                if obj.content == BerObjectContent::Optional(None) {
                    continue;
                }

                match obj.tag() {
                    // allApplications [600] EXPLICIT NULL
                    Tag(600) => {
                        all_applications = true;
                    }
                    // origin [702] EXPLICIT INTEGER
                    Tag(702) => {
                        if let BerObjectContent::Unknown(o) = obj.content {
                            let (_, val) = parse_der_integer(o.data)?;
                            origin = Some(val.as_u32()?);
                        }
                    }
                    // purpose [1] EXPLICIT SET OF INTEGER
                    Tag(1) => {
                        if let BerObjectContent::Unknown(o) = obj.content {
                            let (_, val) =
                                parse_der_container(|i, _| parse_der_integer(i))(o.data)?;
                            purpose = Some(val.as_u32()?);
                        }
                    }
                    _ => continue,
                };
            }

            Ok((
                i,
                AuthorizationList {
                    all_applications,
                    origin,
                    purpose,
                },
            ))
        })(i)
    }

    /// True if the key was generated in the keystore for signing. A list with neither field
    /// is not set; a list with only one, or other values, is invalid.
    fn is_generated_signing_key(
        &self,
        list: &'static str,
    ) -> Result<bool, der_parser::error::BerError> {
        match (self.origin, self.purpose) {
            (Some(KM_ORIGIN_GENERATED), Some(KM_PURPOSE_SIGN)) => Ok(true),
            (None, None) => Ok(false),
            (origin, purpose) => {
                debug!(?origin, ?purpose, %list, "invalid key master values");
                Err(der_parser::error::BerError::InvalidValue {
                    tag: der_parser::der::Tag(702),
                    msg: format!("invalid key master values ({list})"),
                })
            }
        }
    }
}

impl AttestationX509Extension for AndroidKeyAttestationExtensionData {
    // 1.3.6.1.4.1.11129.2.1.17 (android key attestation)
    const OID: Oid<'static> = ANDROID_KEY_ATTESTATION_OID;

    // verify that the attestationChallenge of this extension matches the clientDataHash.
    type Output = Vec<u8>;

    fn parse(i: &[u8]) -> der_parser::error::BerResult<Self::Output> {
        use der_parser::{der::*, error::BerError};
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError));
            }
            let (i, attestation_version) = parse_der_integer(i)?;
            let attestation_version = attestation_version.as_i64()?;

            let (i, attest_sec_level) = parse_der_enum(i)?;
            let attest_sec_level = SecurityLevel::try_from(attest_sec_level.as_u32()?)?;
            let (i, _km_version) = parse_der_integer(i)?;
            let (i, km_sec_level) = parse_der_enum(i)?;
            let km_sec_level = SecurityLevel::try_from(km_sec_level.as_u32()?)?;

            let (i, attestation_challenge) = parse_der_octetstring(i)?;
            let attestation_challenge = attestation_challenge.as_slice()?.to_vec();

            let (i, _unique_id) = parse_der_octetstring(i)?;

            let (i, software_enforced) = AuthorizationList::parse(i)?;
            let (i, tee_enforced) = AuthorizationList::parse(i)?;

            trace!(
                %attestation_version,
                ?attest_sec_level,
                ?km_sec_level,
                "android key description"
            );

            // The AuthorizationList.allApplications field is not present on either
            // authorization list (softwareEnforced nor teeEnforced), since
            // PublicKeyCredential MUST be scoped to the RP ID.
            if software_enforced.all_applications || tee_enforced.all_applications {
                debug!("allApplications is set");
                return Err(BerError::InvalidValue {
                    tag: Tag(600),
                    msg: "all_applications must not be set".to_string(),
                })?;
            }

            // The value in the AuthorizationList.origin field is equal to KM_ORIGIN_GENERATED,
            // and AuthorizationList.purpose is KM_PURPOSE_SIGN, in the union of teeEnforced and
            // softwareEnforced.
            let software_set = software_enforced.is_generated_signing_key("software")?;
            let tee_set = tee_enforced.is_generated_signing_key("tee")?;

            if !tee_set && !software_set {
                debug!("neither authorization list carries origin and purpose");
                return Err(BerError::InvalidValue {
                    tag: Tag(702),
                    msg: "both software and tee not set (keymaster values)".to_string(),
                })?;
            }

            Ok((i, attestation_challenge))
        })(i)
    }

    const IS_REQUIRED: bool = true;

    const VALIDATION_ERROR: AttestationError = AttestationError::ExtensionMismatch;
}

/// Verifies `android-key` attestation statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct AndroidKeyVerifier;

impl AttestationVerifier for AndroidKeyVerifier {
    fn verify(
        &self,
        statement: &AttestationStatement<'_>,
        input: &VerificationInput<'_>,
    ) -> AttestationResult<VerificationResult> {
        // 1. Verify that attStmt is valid CBOR conforming to the syntax defined above and perform
        // CBOR decoding on it to extract the contained fields.
        statement.ensure_populated()?;
        let sig = statement.sig()?;
        let alg = declared_algorithm(statement)?;
        let x5c = match statement.x5c()? {
            Some(x5c) if !x5c.is_empty() => x5c,
            _ => {
                debug!("android-key statement has no x5c");
                return Err(AttestationError::MalformedStatement);
            }
        };

        let chain = parse_x5c_chain(&x5c)?;
        let attestn_cert = chain.first().ok_or(AttestationError::MalformedStatement)?;

        // 2. Verify that sig is a valid signature over the concatenation of authenticatorData
        // and clientDataHash using the public key in the first certificate in x5c with the
        // algorithm specified in alg.
        verify_certificate_signature(alg, attestn_cert, sig, input.data())?;

        // 3. Verify that the public key in the first certificate in x5c matches the
        // credentialPublicKey in the attestedCredentialData in authenticatorData.
        let credential_pk = &input.attested_credential_data()?.credential_pk;
        let subject_pk = CredentialPublicKey::from_certificate(attestn_cert, credential_pk.type_)
            .map_err(|e| match e {
                AttestationError::AlgorithmMismatch => AttestationError::CredentialKeyMismatch,
                e => e,
            })?;

        if !credential_pk.same_key(&subject_pk) {
            debug!("attestation certificate key is not the credential key");
            return Err(AttestationError::CredentialKeyMismatch);
        }

        // 4. Verify that the attestationChallenge field in the attestation certificate
        // extension data is identical to clientDataHash.
        validate_extension::<AndroidKeyAttestationExtensionData>(
            attestn_cert,
            &input.client_data_hash().to_vec(),
        )?;

        // 5. If successful, return implementation-specific values representing attestation
        // type Basic and attestation trust path x5c.
        Ok(VerificationResult::new(AttestationType::Basic, chain))
    }
}

#[cfg(test)]
mod tests {
    use openssl::pkey::{PKey, Private};
    use serde_cbor_2::Value;

    use super::*;
    use crate::authdata::AuthenticatorData;
    use crate::cose::COSEAlgorithm;
    use crate::test_support::{self, der_tag, der_tlv, AuthDataBuilder, CertBuilder};

    const OID: &str = "1.3.6.1.4.1.11129.2.1.17";

    fn purpose(p: u8) -> Vec<u8> {
        der_tlv(0xa1, &der_tlv(0x31, &der_tlv(0x02, &[p])))
    }

    fn origin(o: u8) -> Vec<u8> {
        der_tag(&[0xbf, 0x85, 0x3e], &der_tlv(0x02, &[o]))
    }

    fn all_applications() -> Vec<u8> {
        der_tag(&[0xbf, 0x84, 0x58], &der_tlv(0x05, &[]))
    }

    fn key_description(challenge: &[u8], software: &[u8], tee: &[u8]) -> Vec<u8> {
        let mut content = Vec::new();
        content.extend(der_tlv(0x02, &[3])); // attestationVersion
        content.extend(der_tlv(0x0a, &[1])); // attestationSecurityLevel
        content.extend(der_tlv(0x02, &[4])); // keymasterVersion
        content.extend(der_tlv(0x0a, &[1])); // keymasterSecurityLevel
        content.extend(der_tlv(0x04, challenge));
        content.extend(der_tlv(0x04, &[])); // uniqueId
        content.extend(der_tlv(0x30, software));
        content.extend(der_tlv(0x30, tee));
        der_tlv(0x30, &content)
    }

    fn tee_generated_signing_key() -> Vec<u8> {
        [purpose(2), origin(0)].concat()
    }

    struct Fixture {
        ad_bytes: Vec<u8>,
        auth_data: AuthenticatorData,
        cdh: [u8; 32],
        cred_key: PKey<Private>,
    }

    impl Fixture {
        fn new() -> Self {
            let cred_key = test_support::generate_key(COSEAlgorithm::ES256);
            let ad_bytes = AuthDataBuilder::new(&cred_key, COSEAlgorithm::ES256).build();
            Fixture {
                auth_data: AuthenticatorData::try_from(ad_bytes.as_slice()).unwrap(),
                ad_bytes,
                cdh: test_support::client_data_hash(),
                cred_key,
            }
        }

        fn statement_for(&self, key: &PKey<Private>, extension: Option<&[u8]>) -> Value {
            let builder = CertBuilder::new().subject(&[("CN", "Android Keystore Key")]);
            let builder = match extension {
                Some(ext) => builder.extension(OID, ext),
                None => builder,
            };
            let cert = builder.build(key);
            let sig = test_support::sign(
                key,
                COSEAlgorithm::ES256,
                &test_support::signed_data(&self.ad_bytes, &self.cdh),
            );
            test_support::statement(vec![
                ("alg", Value::Integer(-7)),
                ("sig", Value::Bytes(sig)),
                ("x5c", test_support::x5c(&[&cert])),
            ])
        }

        fn verify(&self, stmt: &Value) -> AttestationResult<VerificationResult> {
            let statement = AttestationStatement::try_from(stmt).unwrap();
            let input = VerificationInput::new(&self.auth_data, &self.cdh).unwrap();
            AndroidKeyVerifier.verify(&statement, &input)
        }
    }

    #[test]
    fn valid_android_key_attestation() {
        let _ = tracing_subscriber::fmt::try_init();
        let fx = Fixture::new();
        let ext = key_description(&fx.cdh, &[], &tee_generated_signing_key());
        let stmt = fx.statement_for(&fx.cred_key, Some(&ext));

        let result = fx.verify(&stmt).unwrap();
        assert_eq!(result.attestation_type, AttestationType::Basic);
        assert_eq!(result.trust_path.map(|p| p.len()), Some(1));
    }

    #[test]
    fn software_enforced_list_is_accepted() {
        let fx = Fixture::new();
        let ext = key_description(&fx.cdh, &tee_generated_signing_key(), &[]);
        let stmt = fx.statement_for(&fx.cred_key, Some(&ext));
        assert!(fx.verify(&stmt).is_ok());
    }

    #[test]
    fn tampered_signature() {
        let fx = Fixture::new();
        let ext = key_description(&fx.cdh, &[], &tee_generated_signing_key());
        let stmt = fx.statement_for(&fx.cred_key, Some(&ext));

        let mut stmt = stmt;
        if let Value::Map(m) = &mut stmt {
            if let Some(Value::Bytes(sig)) = m.get_mut(&Value::Text("sig".to_string())) {
                let last = sig.len() - 1;
                sig[last] ^= 0x01;
            }
        }
        assert_eq!(
            fx.verify(&stmt).unwrap_err(),
            AttestationError::InvalidSignature
        );
    }

    #[test]
    fn certificate_key_must_be_credential_key() {
        let fx = Fixture::new();
        let other = test_support::generate_key(COSEAlgorithm::ES256);
        let ext = key_description(&fx.cdh, &[], &tee_generated_signing_key());
        let stmt = fx.statement_for(&other, Some(&ext));

        assert_eq!(
            fx.verify(&stmt).unwrap_err(),
            AttestationError::CredentialKeyMismatch
        );
    }

    #[test]
    fn extension_is_required() {
        let fx = Fixture::new();
        let stmt = fx.statement_for(&fx.cred_key, None);
        assert_eq!(
            fx.verify(&stmt).unwrap_err(),
            AttestationError::MissingExtension
        );
    }

    #[test]
    fn challenge_must_be_client_data_hash() {
        let fx = Fixture::new();
        let ext = key_description(&[0u8; 32], &[], &tee_generated_signing_key());
        let stmt = fx.statement_for(&fx.cred_key, Some(&ext));
        assert_eq!(
            fx.verify(&stmt).unwrap_err(),
            AttestationError::ExtensionMismatch
        );
    }

    #[test]
    fn authorization_list_requirements() {
        let fx = Fixture::new();

        for (software, tee) in [
            // allApplications present
            (all_applications(), tee_generated_signing_key()),
            // imported rather than generated
            (vec![], [purpose(2), origin(2)].concat()),
            // encryption key
            (vec![], [purpose(0), origin(0)].concat()),
            // origin without purpose
            (vec![], origin(0)),
            // neither list set
            (vec![], vec![]),
        ] {
            let ext = key_description(&fx.cdh, &software, &tee);
            let stmt = fx.statement_for(&fx.cred_key, Some(&ext));
            assert_eq!(
                fx.verify(&stmt).unwrap_err(),
                AttestationError::MalformedExtension
            );
        }
    }
}
