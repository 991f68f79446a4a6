//! Credential public keys, COSE algorithm identifiers, and signature verification. This module
//! wraps the OpenSSL primitives so that every signature check in the engine goes through one
//! auditable place.

#![allow(non_camel_case_types)]

use std::collections::BTreeMap;

use openssl::{bn, ec, hash, nid, pkey, rsa, sign, x509};
use serde::{Deserialize, Serialize};
use serde_cbor_2::Value;

use crate::error::{AttestationError, AttestationResult};

/// A COSE signature algorithm identifier.
///
/// <https://www.iana.org/assignments/cose/cose.xhtml#algorithms>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum COSEAlgorithm {
    /// ECDSA with SHA-256 over P-256
    ES256 = -7,
    /// ECDSA with SHA-384 over P-384
    ES384 = -35,
    /// ECDSA with SHA-512 over P-521
    ES512 = -36,
    /// EdDSA over Ed25519 or Ed448
    EDDSA = -8,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256 = -257,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    RS384 = -258,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    RS512 = -259,
    /// RSASSA-PSS with SHA-256
    PS256 = -37,
    /// RSASSA-PSS with SHA-384
    PS384 = -38,
    /// RSASSA-PSS with SHA-512
    PS512 = -39,
    /// RSASSA-PKCS1-v1_5 with SHA-1. Only TPM attestations still use this.
    INSECURE_RS1 = -65535,
}

impl TryFrom<i128> for COSEAlgorithm {
    type Error = AttestationError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            -7 => Ok(COSEAlgorithm::ES256),
            -35 => Ok(COSEAlgorithm::ES384),
            -36 => Ok(COSEAlgorithm::ES512),
            -8 => Ok(COSEAlgorithm::EDDSA),
            -257 => Ok(COSEAlgorithm::RS256),
            -258 => Ok(COSEAlgorithm::RS384),
            -259 => Ok(COSEAlgorithm::RS512),
            -37 => Ok(COSEAlgorithm::PS256),
            -38 => Ok(COSEAlgorithm::PS384),
            -39 => Ok(COSEAlgorithm::PS512),
            -65535 => Ok(COSEAlgorithm::INSECURE_RS1),
            _ => {
                debug!(alg = %i, "unsupported COSE algorithm");
                Err(AttestationError::UnsupportedAlgorithm(
                    i64::try_from(i).unwrap_or(i64::MIN),
                ))
            }
        }
    }
}

impl TryFrom<i32> for COSEAlgorithm {
    type Error = AttestationError;

    fn try_from(i: i32) -> Result<Self, Self::Error> {
        COSEAlgorithm::try_from(i128::from(i))
    }
}

impl From<COSEAlgorithm> for i32 {
    fn from(alg: COSEAlgorithm) -> i32 {
        alg as i32
    }
}

impl COSEAlgorithm {
    /// The message digest this algorithm signs with. EdDSA hashes internally and has none.
    pub(crate) fn message_digest(self) -> Option<hash::MessageDigest> {
        match self {
            COSEAlgorithm::ES256 | COSEAlgorithm::RS256 | COSEAlgorithm::PS256 => {
                Some(hash::MessageDigest::sha256())
            }
            COSEAlgorithm::ES384 | COSEAlgorithm::RS384 | COSEAlgorithm::PS384 => {
                Some(hash::MessageDigest::sha384())
            }
            COSEAlgorithm::ES512 | COSEAlgorithm::RS512 | COSEAlgorithm::PS512 => {
                Some(hash::MessageDigest::sha512())
            }
            COSEAlgorithm::INSECURE_RS1 => Some(hash::MessageDigest::sha1()),
            COSEAlgorithm::EDDSA => None,
        }
    }

    /// Hash `input` with the digest of this algorithm.
    pub(crate) fn only_hash(self, input: &[u8]) -> AttestationResult<Vec<u8>> {
        if self == COSEAlgorithm::INSECURE_RS1 {
            warn!("INSECURE SHA1 USAGE DETECTED");
        }
        let md = self
            .message_digest()
            .ok_or(AttestationError::UnsupportedAlgorithm(i32::from(self).into()))?;
        hash::hash(md, input)
            .map(|d| d.to_vec())
            .map_err(AttestationError::from)
    }

    fn is_rsa(self) -> bool {
        matches!(
            self,
            COSEAlgorithm::RS256
                | COSEAlgorithm::RS384
                | COSEAlgorithm::RS512
                | COSEAlgorithm::PS256
                | COSEAlgorithm::PS384
                | COSEAlgorithm::PS512
                | COSEAlgorithm::INSECURE_RS1
        )
    }

    fn is_pss(self) -> bool {
        matches!(
            self,
            COSEAlgorithm::PS256 | COSEAlgorithm::PS384 | COSEAlgorithm::PS512
        )
    }

    /// The curve an ECDSA algorithm is bound to.
    fn ecdsa_curve(self) -> Option<ECDSACurve> {
        match self {
            COSEAlgorithm::ES256 => Some(ECDSACurve::SECP256R1),
            COSEAlgorithm::ES384 => Some(ECDSACurve::SECP384R1),
            COSEAlgorithm::ES512 => Some(ECDSACurve::SECP521R1),
            _ => None,
        }
    }
}

/// The COSE key type (`kty`) identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum COSEKeyTypeId {
    EC_OKP = 1,
    EC_EC2 = 2,
    EC_RSA = 3,
}

/// An ECDSA curve, by its COSE identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ECDSACurve {
    /// NIST P-256
    SECP256R1 = 1,
    /// NIST P-384
    SECP384R1 = 2,
    /// NIST P-521
    SECP521R1 = 3,
}

impl TryFrom<i128> for ECDSACurve {
    type Error = AttestationError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            1 => Ok(ECDSACurve::SECP256R1),
            2 => Ok(ECDSACurve::SECP384R1),
            3 => Ok(ECDSACurve::SECP521R1),
            _ => Err(AttestationError::MalformedAuthenticatorData),
        }
    }
}

impl ECDSACurve {
    /// The size in bytes of one affine coordinate on this curve.
    pub fn coordinate_size(self) -> usize {
        match self {
            ECDSACurve::SECP256R1 => 32,
            ECDSACurve::SECP384R1 => 48,
            ECDSACurve::SECP521R1 => 66,
        }
    }

    fn to_openssl_nid(self) -> nid::Nid {
        match self {
            ECDSACurve::SECP256R1 => nid::Nid::X9_62_PRIME256V1,
            ECDSACurve::SECP384R1 => nid::Nid::SECP384R1,
            ECDSACurve::SECP521R1 => nid::Nid::SECP521R1,
        }
    }
}

/// An EdDSA curve, by its COSE identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EDDSACurve {
    /// Ed25519
    ED25519 = 6,
    /// Ed448
    ED448 = 7,
}

impl TryFrom<i128> for EDDSACurve {
    type Error = AttestationError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            6 => Ok(EDDSACurve::ED25519),
            7 => Ok(EDDSACurve::ED448),
            _ => Err(AttestationError::MalformedAuthenticatorData),
        }
    }
}

impl EDDSACurve {
    /// The size in bytes of a public key on this curve.
    pub fn coordinate_size(self) -> usize {
        match self {
            EDDSACurve::ED25519 => 32,
            EDDSACurve::ED448 => 57,
        }
    }

    fn to_openssl_id(self) -> pkey::Id {
        match self {
            EDDSACurve::ED25519 => pkey::Id::ED25519,
            EDDSACurve::ED448 => pkey::Id::ED448,
        }
    }
}

/// An EC2 (ECDSA) public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct COSEEC2Key {
    /// The curve of this key.
    pub curve: ECDSACurve,
    /// The affine x coordinate, padded to the curve's coordinate size.
    pub x: Vec<u8>,
    /// The affine y coordinate, padded to the curve's coordinate size.
    pub y: Vec<u8>,
}

/// An OKP (EdDSA) public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct COSEOKPKey {
    /// The curve of this key.
    pub curve: EDDSACurve,
    /// The raw public key.
    pub x: Vec<u8>,
}

/// An RSA public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct COSERSAKey {
    /// The modulus, big endian.
    pub n: Vec<u8>,
    /// The public exponent, big endian.
    pub e: Vec<u8>,
}

/// The key material of a [CredentialPublicKey].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum COSEKeyType {
    /// An EdDSA key
    EC_OKP(COSEOKPKey),
    /// An ECDSA key
    EC_EC2(COSEEC2Key),
    /// An RSA key
    RSA(COSERSAKey),
}

/// An algorithm tagged public key, as found in authenticator data or extracted from an
/// attestation certificate.
///
/// The key material has been validated by OpenSSL at construction, and is immutable after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPublicKey {
    /// The algorithm this key signs with.
    pub type_: COSEAlgorithm,
    /// The key material.
    pub key: COSEKeyType,
}

fn cose_field<'a>(m: &'a BTreeMap<Value, Value>, label: i128) -> AttestationResult<&'a Value> {
    m.get(&Value::Integer(label)).ok_or_else(|| {
        debug!(%label, "COSE key is missing a field");
        AttestationError::MalformedAuthenticatorData
    })
}

fn cose_bytes(m: &BTreeMap<Value, Value>, label: i128) -> AttestationResult<Vec<u8>> {
    cose_field(m, label).and_then(|v| {
        cbor_try_bytes!(v)
            .map(|b| b.to_vec())
            .map_err(|_| AttestationError::MalformedAuthenticatorData)
    })
}

fn cose_i128(m: &BTreeMap<Value, Value>, label: i128) -> AttestationResult<i128> {
    cose_field(m, label)
        .and_then(|v| cbor_try_i128!(v).map_err(|_| AttestationError::MalformedAuthenticatorData))
}

impl TryFrom<&Value> for CredentialPublicKey {
    type Error = AttestationError;

    fn try_from(d: &Value) -> Result<CredentialPublicKey, Self::Error> {
        let m = cbor_try_map!(d).map_err(|_| AttestationError::MalformedAuthenticatorData)?;

        // See also https://tools.ietf.org/html/rfc8152#section-3.1
        // 1 is the key type, 3 the algorithm. Negative labels are specific to the key type.
        let key_type = cose_i128(m, 1)?;
        let type_ = COSEAlgorithm::try_from(cose_i128(m, 3)?)?;

        let key = if key_type == COSEKeyTypeId::EC_EC2 as i128 {
            let Some(expected_curve) = type_.ecdsa_curve() else {
                debug!(?type_, "EC2 key with a non ECDSA algorithm");
                return Err(AttestationError::UnsupportedAlgorithm(i32::from(type_).into()));
            };

            let curve = ECDSACurve::try_from(cose_i128(m, -1)?)?;
            if curve != expected_curve {
                debug!(?curve, ?type_, "EC2 curve is not the curve of the algorithm");
                return Err(AttestationError::UnsupportedAlgorithm(i32::from(type_).into()));
            }

            let x = cose_bytes(m, -2)?;
            let y = cose_bytes(m, -3)?;

            let coord_len = curve.coordinate_size();
            if x.len() != coord_len || y.len() != coord_len {
                debug!("EC2 coordinates have an invalid length");
                return Err(AttestationError::MalformedAuthenticatorData);
            }

            COSEKeyType::EC_EC2(COSEEC2Key { curve, x, y })
        } else if key_type == COSEKeyTypeId::EC_RSA as i128 && type_.is_rsa() {
            let n = cose_bytes(m, -1)?;
            let e = cose_bytes(m, -2)?;

            if n.is_empty() || e.is_empty() {
                debug!("RSA n or e is empty");
                return Err(AttestationError::MalformedAuthenticatorData);
            }

            COSEKeyType::RSA(COSERSAKey { n, e })
        } else if key_type == COSEKeyTypeId::EC_OKP as i128 && type_ == COSEAlgorithm::EDDSA {
            // https://datatracker.ietf.org/doc/html/rfc8152#section-13.2
            let curve = EDDSACurve::try_from(cose_i128(m, -1)?)?;
            let x = cose_bytes(m, -2)?;

            if x.len() != curve.coordinate_size() {
                debug!("OKP x has an invalid length");
                return Err(AttestationError::MalformedAuthenticatorData);
            }

            COSEKeyType::EC_OKP(COSEOKPKey { curve, x })
        } else {
            debug!(?key_type, ?type_, "key type is not consistent with the algorithm");
            return Err(AttestationError::UnsupportedAlgorithm(i32::from(type_).into()));
        };

        let cose_key = CredentialPublicKey { type_, key };

        // "Applications MUST check that the curve and the key type are consistent and reject a
        // key if they are not." Feed the values to openssl to validate them for us.
        cose_key.get_openssl_pkey().map_err(|e| {
            debug!(?e, "credential public key rejected by openssl");
            AttestationError::MalformedAuthenticatorData
        })?;

        Ok(cose_key)
    }
}

impl CredentialPublicKey {
    /// Extract the public key of a certificate, for use with the declared algorithm. A key whose
    /// family or curve does not fit `alg` fails with [AttestationError::AlgorithmMismatch].
    pub fn from_certificate(
        certificate: &x509::X509Ref,
        alg: COSEAlgorithm,
    ) -> AttestationResult<Self> {
        let pkey = certificate.public_key().map_err(|e| {
            debug!(?e, "unable to read certificate public key");
            AttestationError::MalformedCertificate
        })?;

        let key = if let Some(curve) = alg.ecdsa_curve() {
            let ec_key = pkey.ec_key().map_err(|_| {
                debug!(?alg, "certificate key is not an EC key");
                AttestationError::AlgorithmMismatch
            })?;

            if ec_key.group().curve_name() != Some(curve.to_openssl_nid()) {
                debug!(?alg, "certificate key is not on the curve of the algorithm");
                return Err(AttestationError::AlgorithmMismatch);
            }

            let mut ctx = bn::BigNumContext::new()?;
            let mut xbn = bn::BigNum::new()?;
            let mut ybn = bn::BigNum::new()?;

            ec_key.public_key().affine_coordinates_gfp(
                ec_key.group(),
                &mut xbn,
                &mut ybn,
                &mut ctx,
            )?;

            let coord_len = curve.coordinate_size() as i32;

            COSEKeyType::EC_EC2(COSEEC2Key {
                curve,
                x: xbn.to_vec_padded(coord_len)?,
                y: ybn.to_vec_padded(coord_len)?,
            })
        } else if alg.is_rsa() {
            let rsa_key = pkey.rsa().map_err(|_| {
                debug!(?alg, "certificate key is not an RSA key");
                AttestationError::AlgorithmMismatch
            })?;

            COSEKeyType::RSA(COSERSAKey {
                n: rsa_key.n().to_vec(),
                e: rsa_key.e().to_vec(),
            })
        } else {
            let curve = match pkey.id() {
                pkey::Id::ED25519 => EDDSACurve::ED25519,
                pkey::Id::ED448 => EDDSACurve::ED448,
                _ => {
                    debug!(?alg, "certificate key is not an EdDSA key");
                    return Err(AttestationError::AlgorithmMismatch);
                }
            };

            COSEKeyType::EC_OKP(COSEOKPKey {
                curve,
                x: pkey.raw_public_key()?,
            })
        };

        Ok(CredentialPublicKey { type_: alg, key })
    }

    /// True if `alg` is the algorithm of this key.
    pub fn same_algorithm(&self, alg: i32) -> bool {
        i32::from(self.type_) == alg
    }

    /// True if both keys have identical key material, regardless of their algorithm.
    pub fn same_key(&self, other: &CredentialPublicKey) -> bool {
        self.key == other.key
    }

    /// The raw ANSI X9.62 uncompressed point `0x04 || x || y` of an EC2 key.
    pub fn x962_raw(&self) -> AttestationResult<Vec<u8>> {
        match &self.key {
            COSEKeyType::EC_EC2(ecpk) => {
                let r: [u8; 1] = [0x04];
                Ok(r.iter()
                    .chain(ecpk.x.iter())
                    .chain(ecpk.y.iter())
                    .copied()
                    .collect())
            }
            _ => {
                debug!(type_ = ?self.type_, "x962_raw of a non EC2 key");
                Err(AttestationError::UnsupportedAlgorithm(
                    i32::from(self.type_).into(),
                ))
            }
        }
    }

    /// Retrieve the public key as an OpenSSL structure.
    fn get_openssl_pkey(&self) -> Result<pkey::PKey<pkey::Public>, openssl::error::ErrorStack> {
        match &self.key {
            COSEKeyType::EC_EC2(ec2k) => {
                let group = ec::EcGroup::from_curve_name(ec2k.curve.to_openssl_nid())?;
                let xbn = bn::BigNum::from_slice(&ec2k.x)?;
                let ybn = bn::BigNum::from_slice(&ec2k.y)?;

                let ec_key = ec::EcKey::from_public_key_affine_coordinates(&group, &xbn, &ybn)?;
                ec_key.check_key()?;
                pkey::PKey::from_ec_key(ec_key)
            }
            COSEKeyType::RSA(rsak) => {
                let nbn = bn::BigNum::from_slice(&rsak.n)?;
                let ebn = bn::BigNum::from_slice(&rsak.e)?;

                let rsa_key = rsa::Rsa::from_public_components(nbn, ebn)?;
                pkey::PKey::from_rsa(rsa_key)
            }
            COSEKeyType::EC_OKP(edk) => {
                pkey::PKey::public_key_from_raw_bytes(&edk.x, edk.curve.to_openssl_id())
            }
        }
    }

    /// Verify that `signature` over `message` was made by this key with its algorithm.
    ///
    /// Any failure, including a signature that cannot be decoded, is reported as `false`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self.verify_inner(message, signature) {
            Ok(valid) => valid,
            Err(e) => {
                debug!(?e, "signature verification error");
                false
            }
        }
    }

    fn verify_inner(
        &self,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, openssl::error::ErrorStack> {
        let pkey = self.get_openssl_pkey()?;

        match self.type_.message_digest() {
            None => {
                let mut verifier = sign::Verifier::new_without_digest(&pkey)?;
                verifier.verify_oneshot(signature, message)
            }
            Some(md) => {
                let mut verifier = sign::Verifier::new(md, &pkey)?;
                if self.type_.is_pss() {
                    verifier.set_rsa_padding(rsa::Padding::PKCS1_PSS)?;
                    verifier.set_rsa_pss_saltlen(sign::RsaPssSaltlen::DIGEST_LENGTH)?;
                }
                verifier.update(message)?;
                verifier.verify(signature)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;
    use crate::test_support;
    use hex_literal::hex;

    #[test]
    fn cbor_es256() {
        let hex_data = hex!(
            "A5"         // Map - 5 elements
            "01 02"      //   1:   2,  ; kty: EC2 key type
            "03 26"      //   3:  -7,  ; alg: ES256 signature algorithm
            "20 01"      //  -1:   1,  ; crv: P-256 curve
            "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d" // -2:   x,  ; x-coordinate
            "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c" // -3:   y,  ; y-coordinate
        );

        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        let key = CredentialPublicKey::try_from(&val).unwrap();

        assert_eq!(key.type_, COSEAlgorithm::ES256);
        assert!(key.same_algorithm(-7));
        assert!(!key.same_algorithm(-8));
        match &key.key {
            COSEKeyType::EC_EC2(pkey) => {
                assert_eq!(
                    pkey.x.as_slice(),
                    hex!("65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d")
                );
                assert_eq!(
                    pkey.y.as_slice(),
                    hex!("1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c")
                );
                assert_eq!(pkey.curve, ECDSACurve::SECP256R1);
            }
            _ => panic!("Key should be parsed EC2 key"),
        }

        let raw = key.x962_raw().unwrap();
        assert_eq!(raw.len(), 65);
        assert_eq!(raw[0], 0x04);
    }

    #[test]
    fn cbor_es384() {
        let hex_data = hex!(
            "A5"         // Map - 5 elements
            "01 02"      //   1:   2,  ; kty: EC2 key type
            "03 38 22"   //   3:  -35,  ; alg: ES384 signature algorithm
            "20 02"      //  -1:   2,  ; crv: P-384 curve
            "21 58 30   ceeaf818731db7af2d02e029854823d71bdbf65fb0c6ff69" // -2: x, ; x-coordinate
                       "42c9cf891efe18ea81430517d777f5c43550da801be5bf2f"
            "22 58 30   dda1d0ead72e042efb7c36a38cc021abb2ca1a2e38159edd" // -3: y ; y-coordinate
                       "a8c25f391e9a38d79dd56b9427d1c7c70cfa778ab849b087"
        );

        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        let key = CredentialPublicKey::try_from(&val).unwrap();

        assert_eq!(key.type_, COSEAlgorithm::ES384);
        match key.key {
            COSEKeyType::EC_EC2(pkey) => assert_eq!(pkey.curve, ECDSACurve::SECP384R1),
            _ => panic!("Key should be parsed EC2 key"),
        }
    }

    #[test]
    fn cbor_es512() {
        let hex_data = hex!(
            "A5"         // Map - 5 elements
            "01 02"      //   1:   2,  ; kty: EC2 key type
            "03 38 23"   //   3:  -36,  ; alg: ES512 signature algorithm
            "20 03"      //  -1:   3,  ; crv: P-521 curve
            "21 58 42   0106cfaacf34b13f24bbb2f806fd9cfacff9a2a5ef9ecfcd85664609a0b2f6d4fd" // -2:   x,  ; x-coordinate
                       "b8e1d58630905f13f38d8eed8714eceb716920a3a235581623261fed961f7b7d72"
            "22 58 42   0089597a052a8d3c8b2b5692d467dea19f8e1b9ca17fa563a1a826855dade04811" // -3:   y,  ; y-coordinate
                       "b2881819e72f1706daeaf7d3773b2e284983a0eec33c2fe3ff5697722e95b29536"
        );

        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        let key = CredentialPublicKey::try_from(&val).unwrap();

        assert_eq!(key.type_, COSEAlgorithm::ES512);
        match key.key {
            COSEKeyType::EC_EC2(pkey) => assert_eq!(pkey.curve, ECDSACurve::SECP521R1),
            _ => panic!("Key should be parsed EC2 key"),
        }
    }

    #[test]
    fn cbor_ed25519() {
        let hex_data = hex!(
            "A4"         // Map - 4 elements
            "01 01"      //   1:   1,  ; kty: OKP key type
            "03 27"      //   3:  -8,  ; alg: EDDSA signature algorithm
            "20 06"      //  -1:   6,  ; crv: Ed25519 curve
            "21 58 20   43565027f918beb00257d112b903d15b93f5cbc7562dfc8458fbefd714546e3c" // -2:   x
        );
        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        let key = CredentialPublicKey::try_from(&val).unwrap();
        assert_eq!(key.type_, COSEAlgorithm::EDDSA);
        match key.key {
            COSEKeyType::EC_OKP(pkey) => {
                assert_eq!(
                    pkey.x.as_slice(),
                    hex!("43565027f918beb00257d112b903d15b93f5cbc7562dfc8458fbefd714546e3c")
                );
                assert_eq!(pkey.curve, EDDSACurve::ED25519);
            }
            _ => panic!("Key should be parsed OKP key"),
        }
    }

    #[test]
    fn cbor_alg_inconsistent_with_kty() {
        // An EC2 key claiming to be RS256.
        let hex_data = hex!(
            "A5"
            "01 02"
            "03 39 0100" // -257
            "20 01"
            "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
            "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c"
        );
        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        assert_eq!(
            CredentialPublicKey::try_from(&val),
            Err(AttestationError::UnsupportedAlgorithm(-257))
        );
    }

    #[test]
    fn cbor_unknown_alg() {
        let hex_data = hex!(
            "A4"
            "01 01"
            "03 38 63" // -100
            "20 06"
            "21 58 20   43565027f918beb00257d112b903d15b93f5cbc7562dfc8458fbefd714546e3c"
        );
        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        assert_eq!(
            CredentialPublicKey::try_from(&val),
            Err(AttestationError::UnsupportedAlgorithm(-100))
        );
    }

    #[test]
    fn cbor_point_not_on_curve() {
        let hex_data = hex!(
            "A5"
            "01 02"
            "03 26"
            "20 01"
            "21 58 20   0000000000000000000000000000000000000000000000000000000000000001"
            "22 58 20   0000000000000000000000000000000000000000000000000000000000000001"
        );
        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        assert_eq!(
            CredentialPublicKey::try_from(&val),
            Err(AttestationError::MalformedAuthenticatorData)
        );
    }

    #[test]
    fn verify_each_algorithm_family() {
        let _ = tracing_subscriber::fmt::try_init();
        let message = b"attested data";

        for alg in [
            COSEAlgorithm::ES256,
            COSEAlgorithm::ES384,
            COSEAlgorithm::ES512,
            COSEAlgorithm::EDDSA,
            COSEAlgorithm::RS256,
            COSEAlgorithm::PS256,
        ] {
            let key = test_support::generate_key(alg);
            let cose = test_support::cose_key(&key, alg);
            let public = CredentialPublicKey::try_from(&cose).unwrap();

            let mut sig = test_support::sign(&key, alg, message);
            assert!(public.verify(message, &sig), "{alg:?} failed to verify");
            assert!(!public.verify(b"other data", &sig));

            let last = sig.len() - 1;
            sig[last] ^= 0x01;
            assert!(!public.verify(message, &sig), "{alg:?} accepted a tampered sig");
        }
    }

    #[test]
    fn from_certificate_matches_cose() {
        let key = test_support::generate_key(COSEAlgorithm::ES256);
        let cert = test_support::CertBuilder::new().build(&key);

        let from_cert = CredentialPublicKey::from_certificate(&cert, COSEAlgorithm::ES256).unwrap();
        let from_cose = CredentialPublicKey::try_from(&test_support::cose_key(
            &key,
            COSEAlgorithm::ES256,
        ))
        .unwrap();

        assert!(from_cert.same_key(&from_cose));
        assert_eq!(from_cert, from_cose);

        let other = test_support::generate_key(COSEAlgorithm::ES256);
        let other = CredentialPublicKey::try_from(&test_support::cose_key(
            &other,
            COSEAlgorithm::ES256,
        ))
        .unwrap();
        assert!(!from_cert.same_key(&other));
    }

    #[test]
    fn from_certificate_family_mismatch() {
        let key = test_support::generate_key(COSEAlgorithm::ES256);
        let cert = test_support::CertBuilder::new().build(&key);

        assert_eq!(
            CredentialPublicKey::from_certificate(&cert, COSEAlgorithm::RS256),
            Err(AttestationError::AlgorithmMismatch)
        );
        assert_eq!(
            CredentialPublicKey::from_certificate(&cert, COSEAlgorithm::ES384),
            Err(AttestationError::AlgorithmMismatch)
        );
        assert_eq!(
            CredentialPublicKey::from_certificate(&cert, COSEAlgorithm::EDDSA),
            Err(AttestationError::AlgorithmMismatch)
        );
    }

    #[test]
    fn only_hash_digest_sizes() {
        assert_eq!(COSEAlgorithm::RS256.only_hash(b"x").unwrap().len(), 32);
        assert_eq!(COSEAlgorithm::ES384.only_hash(b"x").unwrap().len(), 48);
        assert_eq!(COSEAlgorithm::INSECURE_RS1.only_hash(b"x").unwrap().len(), 20);
        assert_eq!(
            COSEAlgorithm::EDDSA.only_hash(b"x"),
            Err(AttestationError::UnsupportedAlgorithm(-8))
        );
    }
}
