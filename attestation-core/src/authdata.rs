//! Authenticator data, as signed by the authenticator during registration.
//!
//! <https://www.w3.org/TR/webauthn-3/#sctn-authenticator-data>

use nom::bytes::complete::take;
use nom::combinator::cond;
use nom::number::complete::{be_u16, be_u32, be_u8};
use serde_cbor_2::Value;
use uuid::Uuid;

use crate::cose::CredentialPublicKey;
use crate::error::{AttestationError, AttestationResult};

bitflags::bitflags! {
    /// The flags byte of authenticator data.
    pub struct AuthenticatorFlags: u8 {
        /// UP
        const USER_PRESENT = 0x01;
        /// UV
        const USER_VERIFIED = 0x04;
        /// BE
        const BACKUP_ELIGIBLE = 0x08;
        /// BS
        const BACKED_UP = 0x10;
        /// AT
        const ATTESTED_CREDENTIAL_DATA = 0x40;
        /// ED
        const EXTENSION_DATA = 0x80;
    }
}

/// The credential created by the authenticator, and the model that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    /// The AAGUID of the authenticator model.
    pub aaguid: [u8; 16],
    /// The credential id.
    pub credential_id: Vec<u8>,
    /// The credential public key.
    pub credential_pk: CredentialPublicKey,
}

impl AttestedCredentialData {
    /// The AAGUID as a [Uuid].
    pub fn aaguid(&self) -> Uuid {
        Uuid::from_bytes(self.aaguid)
    }
}

/// Parsed authenticator data. The raw bytes are retained since they are what the attestation
/// signature covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    /// SHA-256 of the relying party id.
    pub rp_id_hash: [u8; 32],
    /// The flags byte.
    pub flags: AuthenticatorFlags,
    /// The signature counter.
    pub counter: u32,
    /// Present when [AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA] is set.
    pub acd: Option<AttestedCredentialData>,
    /// Present when [AuthenticatorFlags::EXTENSION_DATA] is set.
    pub extensions: Option<Value>,
    raw: Vec<u8>,
}

struct RawAttestedCredentialData<'a> {
    aaguid: &'a [u8],
    credential_id: &'a [u8],
    credential_pk: Value,
}

struct RawAuthenticatorData<'a> {
    rp_id_hash: &'a [u8],
    flags: AuthenticatorFlags,
    counter: u32,
    acd: Option<RawAttestedCredentialData<'a>>,
    extensions: Option<Value>,
}

fn cbor_parser(i: &[u8]) -> nom::IResult<&[u8], Value> {
    let mut deserializer = serde_cbor_2::Deserializer::from_slice(i);
    let v = serde::de::Deserialize::deserialize(&mut deserializer).map_err(|e| {
        debug!(?e, "invalid cbor item in authenticator data");
        nom::Err::Failure(nom::error::Error::new(i, nom::error::ErrorKind::Verify))
    })?;

    let len = deserializer.byte_offset();
    let (_, rem) = i.split_at(len);

    Ok((rem, v))
}

fn acd_parser(i: &[u8]) -> nom::IResult<&[u8], RawAttestedCredentialData<'_>> {
    let (i, aaguid) = take(16usize)(i)?;
    let (i, cred_id_len) = be_u16(i)?;
    let (i, credential_id) = take(cred_id_len as usize)(i)?;
    let (i, credential_pk) = cbor_parser(i)?;

    Ok((
        i,
        RawAttestedCredentialData {
            aaguid,
            credential_id,
            credential_pk,
        },
    ))
}

fn authenticator_data_parser(i: &[u8]) -> nom::IResult<&[u8], RawAuthenticatorData<'_>> {
    let (i, rp_id_hash) = take(32usize)(i)?;
    let (i, flags) = be_u8(i)?;
    // Reserved bits are ignored.
    let flags = AuthenticatorFlags::from_bits_truncate(flags);
    let (i, counter) = be_u32(i)?;
    let (i, acd) = cond(
        flags.contains(AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA),
        acd_parser,
    )(i)?;
    let (i, extensions) = cond(
        flags.contains(AuthenticatorFlags::EXTENSION_DATA),
        cbor_parser,
    )(i)?;

    Ok((
        i,
        RawAuthenticatorData {
            rp_id_hash,
            flags,
            counter,
            acd,
            extensions,
        },
    ))
}

impl TryFrom<&[u8]> for AuthenticatorData {
    type Error = AttestationError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        let (rem, raw_ad) = authenticator_data_parser(data).map_err(|e| {
            debug!(?e, "authenticator data parse failure");
            AttestationError::MalformedAuthenticatorData
        })?;

        if !rem.is_empty() {
            debug!(trailing = rem.len(), "authenticator data has trailing bytes");
            return Err(AttestationError::MalformedAuthenticatorData);
        }

        let rp_id_hash = raw_ad
            .rp_id_hash
            .try_into()
            .map_err(|_| AttestationError::MalformedAuthenticatorData)?;

        let acd = raw_ad
            .acd
            .map(|raw_acd| {
                let aaguid = raw_acd
                    .aaguid
                    .try_into()
                    .map_err(|_| AttestationError::MalformedAuthenticatorData)?;
                let credential_pk = CredentialPublicKey::try_from(&raw_acd.credential_pk)?;
                Ok::<_, AttestationError>(AttestedCredentialData {
                    aaguid,
                    credential_id: raw_acd.credential_id.to_vec(),
                    credential_pk,
                })
            })
            .transpose()?;

        Ok(AuthenticatorData {
            rp_id_hash,
            flags: raw_ad.flags,
            counter: raw_ad.counter,
            acd,
            extensions: raw_ad.extensions,
            raw: data.to_vec(),
        })
    }
}

impl AuthenticatorData {
    /// The bytes this was parsed from.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The attested credential data, which every registration must carry.
    pub fn attested_credential_data(&self) -> AttestationResult<&AttestedCredentialData> {
        self.acd.as_ref().ok_or_else(|| {
            debug!("authenticator data has no attested credential data");
            AttestationError::MissingAttestedCredentialData
        })
    }

    /// The AAGUID of the authenticator, if credential data is present.
    pub fn aaguid(&self) -> Option<Uuid> {
        self.acd.as_ref().map(AttestedCredentialData::aaguid)
    }

    /// User presence was asserted.
    pub fn user_present(&self) -> bool {
        self.flags.contains(AuthenticatorFlags::USER_PRESENT)
    }

    /// User verification was performed.
    pub fn user_verified(&self) -> bool {
        self.flags.contains(AuthenticatorFlags::USER_VERIFIED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cose::COSEAlgorithm;
    use crate::test_support;

    #[test]
    fn parse_with_credential() {
        let key = test_support::generate_key(COSEAlgorithm::ES256);
        let aaguid = [0x11; 16];
        let bytes = test_support::AuthDataBuilder::new(&key, COSEAlgorithm::ES256)
            .aaguid(aaguid)
            .credential_id(vec![1, 2, 3, 4])
            .counter(7)
            .build();

        let ad = AuthenticatorData::try_from(bytes.as_slice()).unwrap();
        assert_eq!(ad.as_bytes(), bytes.as_slice());
        assert_eq!(ad.counter, 7);
        assert!(ad.user_present());
        assert!(!ad.user_verified());

        let acd = ad.attested_credential_data().unwrap();
        assert_eq!(acd.aaguid, aaguid);
        assert_eq!(acd.credential_id, vec![1, 2, 3, 4]);
        assert_eq!(acd.credential_pk.type_, COSEAlgorithm::ES256);
        assert_eq!(ad.aaguid(), Some(Uuid::from_bytes(aaguid)));
    }

    #[test]
    fn parse_without_credential() {
        let mut bytes = vec![0u8; 32];
        bytes.push(AuthenticatorFlags::USER_PRESENT.bits());
        bytes.extend_from_slice(&1u32.to_be_bytes());

        let ad = AuthenticatorData::try_from(bytes.as_slice()).unwrap();
        assert!(ad.acd.is_none());
        assert_eq!(
            ad.attested_credential_data(),
            Err(AttestationError::MissingAttestedCredentialData)
        );
    }

    #[test]
    fn truncated_and_trailing_bytes() {
        let key = test_support::generate_key(COSEAlgorithm::ES256);
        let mut bytes = test_support::AuthDataBuilder::new(&key, COSEAlgorithm::ES256).build();

        let truncated = &bytes[..bytes.len() - 1];
        assert_eq!(
            AuthenticatorData::try_from(truncated),
            Err(AttestationError::MalformedAuthenticatorData)
        );

        bytes.push(0);
        assert_eq!(
            AuthenticatorData::try_from(bytes.as_slice()),
            Err(AttestationError::MalformedAuthenticatorData)
        );

        assert_eq!(
            AuthenticatorData::try_from([0u8; 36].as_slice()),
            Err(AttestationError::MalformedAuthenticatorData)
        );
    }

    #[test]
    fn extensions_are_parsed() {
        let key = test_support::generate_key(COSEAlgorithm::EDDSA);
        let mut bytes = test_support::AuthDataBuilder::new(&key, COSEAlgorithm::EDDSA).build();
        bytes[32] |= AuthenticatorFlags::EXTENSION_DATA.bits();
        // {"credProtect": 2}
        bytes.extend_from_slice(&[
            0xa1, 0x6b, b'c', b'r', b'e', b'd', b'P', b'r', b'o', b't', b'e', b'c', b't', 0x02,
        ]);

        let ad = AuthenticatorData::try_from(bytes.as_slice()).unwrap();
        assert!(matches!(ad.extensions, Some(Value::Map(_))));
        assert_eq!(
            ad.attested_credential_data().unwrap().credential_pk.type_,
            COSEAlgorithm::EDDSA
        );
    }
}
