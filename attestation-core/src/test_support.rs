//! Fixtures for unit tests. Keys and certificates are generated with OpenSSL at test time.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, PKeyRef, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Signer};
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage};
use openssl::x509::{X509Extension, X509NameBuilder, X509Ref, X509};
use serde_cbor_2::Value;

use crate::authdata::AuthenticatorFlags;
use crate::cose::COSEAlgorithm;

pub(crate) const DEFAULT_AAGUID: [u8; 16] = [
    0xcb, 0x69, 0x48, 0x1e, 0x8f, 0xf7, 0x40, 0x39, 0x93, 0xec, 0x0a, 0x27, 0x29, 0xa1, 0x54, 0xa8,
];

pub(crate) fn generate_key(alg: COSEAlgorithm) -> PKey<Private> {
    let curve = match alg {
        COSEAlgorithm::ES256 => Some(Nid::X9_62_PRIME256V1),
        COSEAlgorithm::ES384 => Some(Nid::SECP384R1),
        COSEAlgorithm::ES512 => Some(Nid::SECP521R1),
        _ => None,
    };

    if let Some(curve) = curve {
        let group = EcGroup::from_curve_name(curve).unwrap();
        PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
    } else if alg == COSEAlgorithm::EDDSA {
        PKey::generate_ed25519().unwrap()
    } else {
        PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
    }
}

fn cose_map(entries: Vec<(i128, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::Integer(k), v))
            .collect(),
    )
}

/// The COSE encoding of the public half of `key`, tagged with `alg`.
pub(crate) fn cose_key(key: &PKeyRef<Private>, alg: COSEAlgorithm) -> Value {
    let alg_id = Value::Integer(i32::from(alg).into());
    match key.id() {
        Id::EC => {
            let ec = key.ec_key().unwrap();
            let (crv, size) = match ec.group().curve_name().unwrap() {
                Nid::X9_62_PRIME256V1 => (1, 32),
                Nid::SECP384R1 => (2, 48),
                Nid::SECP521R1 => (3, 66),
                other => panic!("unexpected curve {other:?}"),
            };
            let mut ctx = BigNumContext::new().unwrap();
            let mut x = BigNum::new().unwrap();
            let mut y = BigNum::new().unwrap();
            ec.public_key()
                .affine_coordinates_gfp(ec.group(), &mut x, &mut y, &mut ctx)
                .unwrap();
            cose_map(vec![
                (1, Value::Integer(2)),
                (3, alg_id),
                (-1, Value::Integer(crv)),
                (-2, Value::Bytes(x.to_vec_padded(size).unwrap())),
                (-3, Value::Bytes(y.to_vec_padded(size).unwrap())),
            ])
        }
        Id::RSA => {
            let rsa = key.rsa().unwrap();
            cose_map(vec![
                (1, Value::Integer(3)),
                (3, alg_id),
                (-1, Value::Bytes(rsa.n().to_vec())),
                (-2, Value::Bytes(rsa.e().to_vec())),
            ])
        }
        Id::ED25519 => cose_map(vec![
            (1, Value::Integer(1)),
            (3, alg_id),
            (-1, Value::Integer(6)),
            (-2, Value::Bytes(key.raw_public_key().unwrap())),
        ]),
        other => panic!("unexpected key type {other:?}"),
    }
}

/// Sign `data` with `key` the way an authenticator using `alg` would.
pub(crate) fn sign(key: &PKeyRef<Private>, alg: COSEAlgorithm, data: &[u8]) -> Vec<u8> {
    match alg.message_digest() {
        None => {
            let mut signer = Signer::new_without_digest(key).unwrap();
            signer.sign_oneshot_to_vec(data).unwrap()
        }
        Some(md) => {
            let mut signer = Signer::new(md, key).unwrap();
            if matches!(
                alg,
                COSEAlgorithm::PS256 | COSEAlgorithm::PS384 | COSEAlgorithm::PS512
            ) {
                signer.set_rsa_padding(Padding::PKCS1_PSS).unwrap();
                signer
                    .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                    .unwrap();
            }
            signer.update(data).unwrap();
            signer.sign_to_vec().unwrap()
        }
    }
}

/// Encode a DER TLV with a (possibly multi byte) identifier.
pub(crate) fn der_tag(tag: &[u8], content: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x100 {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(content);
    out
}

/// Encode a DER TLV with a single byte identifier.
pub(crate) fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    der_tag(&[tag], content)
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Build test certificates. The defaults give a valid packed attestation leaf: version 3,
/// the attestation subject, no basic constraints, and valid from an hour ago until tomorrow.
pub(crate) struct CertBuilder<'a> {
    version: i32,
    subject: Vec<(String, String)>,
    ca: bool,
    expired: bool,
    eku: Option<String>,
    extensions: Vec<(String, Vec<u8>)>,
    issuer: Option<(&'a X509Ref, &'a PKeyRef<Private>)>,
}

impl<'a> CertBuilder<'a> {
    pub(crate) fn new() -> Self {
        CertBuilder {
            version: 2,
            subject: vec![
                ("C".to_string(), "US".to_string()),
                ("O".to_string(), "Vendor".to_string()),
                ("OU".to_string(), "Authenticator Attestation".to_string()),
                ("CN".to_string(), "Model1".to_string()),
            ],
            ca: false,
            expired: false,
            eku: None,
            extensions: Vec::new(),
            issuer: None,
        }
    }

    /// The raw X.509 version number; 2 is version 3.
    pub(crate) fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub(crate) fn subject(mut self, subject: &[(&str, &str)]) -> Self {
        self.subject = subject
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    pub(crate) fn ca(mut self) -> Self {
        self.ca = true;
        self
    }

    pub(crate) fn expired(mut self) -> Self {
        self.expired = true;
        self
    }

    pub(crate) fn eku(mut self, oid: &str) -> Self {
        self.eku = Some(oid.to_string());
        self
    }

    /// Add an extension from the DER of its value.
    pub(crate) fn extension(mut self, oid: &str, der: &[u8]) -> Self {
        self.extensions.push((oid.to_string(), der.to_vec()));
        self
    }

    pub(crate) fn aaguid(self, aaguid: [u8; 16]) -> Self {
        let der = der_tlv(0x04, &aaguid);
        self.extension("1.3.6.1.4.1.45724.1.1.4", &der)
    }

    pub(crate) fn issuer(mut self, issuer: &'a X509Ref, issuer_key: &'a PKeyRef<Private>) -> Self {
        self.issuer = Some((issuer, issuer_key));
        self
    }

    pub(crate) fn build(self, key: &PKeyRef<Private>) -> X509 {
        let mut name = X509NameBuilder::new().unwrap();
        for (k, v) in self.subject.iter() {
            name.append_entry_by_text(k, v).unwrap();
        }
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(self.version).unwrap();

        let mut serial = BigNum::new().unwrap();
        serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
        builder
            .set_serial_number(&serial.to_asn1_integer().unwrap())
            .unwrap();

        builder.set_subject_name(&name).unwrap();
        match self.issuer {
            Some((issuer, _)) => builder.set_issuer_name(issuer.subject_name()).unwrap(),
            None => builder.set_issuer_name(&name).unwrap(),
        }

        let now = now_unix();
        let (not_before, not_after) = if self.expired {
            (now - 10 * 86400, now - 86400)
        } else {
            (now - 3600, now + 86400)
        };
        builder
            .set_not_before(&Asn1Time::from_unix(not_before).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::from_unix(not_after).unwrap())
            .unwrap();

        builder.set_pubkey(key).unwrap();

        if self.ca {
            builder
                .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
                .unwrap();
        }

        if let Some(eku) = self.eku.as_deref() {
            builder
                .append_extension(ExtendedKeyUsage::new().other(eku).build().unwrap())
                .unwrap();
        }

        for (oid, der) in self.extensions.iter() {
            let oid = Asn1Object::from_str(oid).unwrap();
            let value = Asn1OctetString::new_from_bytes(der).unwrap();
            let ext = X509Extension::new_from_der(&oid, false, &value).unwrap();
            builder.append_extension(ext).unwrap();
        }

        let signing_key = self.issuer.map(|(_, k)| k).unwrap_or(key);
        let md = match signing_key.id() {
            Id::ED25519 | Id::ED448 => MessageDigest::null(),
            _ => MessageDigest::sha256(),
        };
        builder.sign(signing_key, md).unwrap();
        builder.build()
    }
}

/// Build raw authenticator data carrying a credential for `key`.
pub(crate) struct AuthDataBuilder {
    rp_id_hash: [u8; 32],
    flags: AuthenticatorFlags,
    counter: u32,
    aaguid: [u8; 16],
    credential_id: Vec<u8>,
    credential_pk: Value,
}

impl AuthDataBuilder {
    pub(crate) fn new(key: &PKeyRef<Private>, alg: COSEAlgorithm) -> Self {
        AuthDataBuilder {
            rp_id_hash: openssl::sha::sha256(b"example.com"),
            flags: AuthenticatorFlags::USER_PRESENT | AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA,
            counter: 0,
            aaguid: DEFAULT_AAGUID,
            credential_id: vec![0xc1; 16],
            credential_pk: cose_key(key, alg),
        }
    }

    pub(crate) fn aaguid(mut self, aaguid: [u8; 16]) -> Self {
        self.aaguid = aaguid;
        self
    }

    pub(crate) fn credential_id(mut self, credential_id: Vec<u8>) -> Self {
        self.credential_id = credential_id;
        self
    }

    pub(crate) fn counter(mut self, counter: u32) -> Self {
        self.counter = counter;
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut out = self.rp_id_hash.to_vec();
        out.push(self.flags.bits());
        out.extend_from_slice(&self.counter.to_be_bytes());
        out.extend_from_slice(&self.aaguid);
        out.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.credential_id);
        out.extend_from_slice(&serde_cbor_2::to_vec(&self.credential_pk).unwrap());
        out
    }
}

pub(crate) fn client_data_hash() -> [u8; 32] {
    openssl::sha::sha256(br#"{"type":"webauthn.create","challenge":"AAAA","origin":"https://example.com"}"#)
}

/// authenticatorData || clientDataHash
pub(crate) fn signed_data(auth_data: &[u8], client_data_hash: &[u8]) -> Vec<u8> {
    auth_data
        .iter()
        .chain(client_data_hash.iter())
        .copied()
        .collect()
}

/// An attestation statement map with text keys.
pub(crate) fn statement(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::Text(k.to_string()), v))
            .collect::<BTreeMap<_, _>>(),
    )
}

pub(crate) fn x5c(chain: &[&X509]) -> Value {
    Value::Array(
        chain
            .iter()
            .map(|c| Value::Bytes(c.to_der().unwrap()))
            .collect(),
    )
}
