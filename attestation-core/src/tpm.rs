//! TPM 2.0 structures carried in a `tpm` attestation statement.
//!
//! <https://trustedcomputinggroup.org/wp-content/uploads/TCG_TPM2_r1p59_Part2_Structures_pub.pdf>

use nom::bytes::complete::take;
use nom::combinator::{cond, map_res};
use nom::number::complete::{be_u16, be_u32, be_u64};
use openssl::hash::MessageDigest;

use crate::constants::{TPM_GENERATED_VALUE, TPM_ST_ATTEST_CERTIFY};
use crate::error::{AttestationError, AttestationResult};

/// TPM_ALG_ID values used by attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmAlgId {
    /// TPM_ALG_RSA
    Rsa,
    /// TPM_ALG_SHA1
    Sha1,
    /// TPM_ALG_SHA256
    Sha256,
    /// TPM_ALG_SHA384
    Sha384,
    /// TPM_ALG_SHA512
    Sha512,
    /// TPM_ALG_NULL
    Null,
    /// TPM_ALG_ECC
    Ecc,
    /// Any other algorithm.
    Other(u16),
}

impl From<u16> for TpmAlgId {
    fn from(v: u16) -> Self {
        match v {
            0x0001 => TpmAlgId::Rsa,
            0x0004 => TpmAlgId::Sha1,
            0x000b => TpmAlgId::Sha256,
            0x000c => TpmAlgId::Sha384,
            0x000d => TpmAlgId::Sha512,
            0x0010 => TpmAlgId::Null,
            0x0023 => TpmAlgId::Ecc,
            v => TpmAlgId::Other(v),
        }
    }
}

impl From<TpmAlgId> for u16 {
    fn from(a: TpmAlgId) -> u16 {
        match a {
            TpmAlgId::Rsa => 0x0001,
            TpmAlgId::Sha1 => 0x0004,
            TpmAlgId::Sha256 => 0x000b,
            TpmAlgId::Sha384 => 0x000c,
            TpmAlgId::Sha512 => 0x000d,
            TpmAlgId::Null => 0x0010,
            TpmAlgId::Ecc => 0x0023,
            TpmAlgId::Other(v) => v,
        }
    }
}

impl TpmAlgId {
    /// The digest of a name algorithm.
    pub(crate) fn message_digest(self) -> Option<MessageDigest> {
        match self {
            TpmAlgId::Sha1 => Some(MessageDigest::sha1()),
            TpmAlgId::Sha256 => Some(MessageDigest::sha256()),
            TpmAlgId::Sha384 => Some(MessageDigest::sha384()),
            TpmAlgId::Sha512 => Some(MessageDigest::sha512()),
            _ => None,
        }
    }
}

/// TPM_ECC_CURVE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmiEccCurve {
    /// TPM_ECC_NIST_P256
    NistP256,
    /// TPM_ECC_NIST_P384
    NistP384,
    /// TPM_ECC_NIST_P521
    NistP521,
    /// Any other curve.
    Other(u16),
}

impl From<u16> for TpmiEccCurve {
    fn from(v: u16) -> Self {
        match v {
            0x0003 => TpmiEccCurve::NistP256,
            0x0004 => TpmiEccCurve::NistP384,
            0x0005 => TpmiEccCurve::NistP521,
            v => TpmiEccCurve::Other(v),
        }
    }
}

/// TPMS_RSA_PARMS, reduced to what attestation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsRsaParms {
    /// keyBits
    pub key_bits: u16,
    /// exponent. Zero means the default exponent of 65537.
    pub exponent: u32,
}

impl TpmsRsaParms {
    /// The effective exponent.
    pub fn exponent(&self) -> u32 {
        if self.exponent == 0 {
            65537
        } else {
            self.exponent
        }
    }
}

/// TPMS_ECC_PARMS, reduced to what attestation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsEccParms {
    /// curveID
    pub curve_id: TpmiEccCurve,
}

/// TPMU_PUBLIC_PARMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicParms {
    /// RSA parameters
    Rsa(TpmsRsaParms),
    /// ECC parameters
    Ecc(TpmsEccParms),
}

/// TPMU_PUBLIC_ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicId {
    /// The RSA modulus
    Rsa(Vec<u8>),
    /// The ECC point
    Ecc {
        /// x
        x: Vec<u8>,
        /// y
        y: Vec<u8>,
    },
}

/// TPMT_PUBLIC, the `pubArea` of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    /// type
    pub type_: TpmAlgId,
    /// nameAlg
    pub name_alg: TpmAlgId,
    /// objectAttributes
    pub object_attributes: u32,
    /// authPolicy
    pub auth_policy: Vec<u8>,
    /// parameters
    pub parameters: TpmuPublicParms,
    /// unique
    pub unique: TpmuPublicId,
}

/// TPMS_ATTEST, the `certInfo` of a statement. Only TPMS_CERTIFY_INFO attestations are
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    /// magic
    pub magic: u32,
    /// type
    pub type_: u16,
    /// qualifiedSigner
    pub qualified_signer: Vec<u8>,
    /// extraData
    pub extra_data: Vec<u8>,
    /// clockInfo, not interpreted
    pub clock_info: Vec<u8>,
    /// firmwareVersion
    pub firmware_version: u64,
    /// attested.certify.name
    pub name: Vec<u8>,
    /// attested.certify.qualifiedName
    pub qualified_name: Vec<u8>,
}

fn tpm2b_parser(i: &[u8]) -> nom::IResult<&[u8], &[u8]> {
    let (i, size) = be_u16(i)?;
    take(size as usize)(i)
}

fn tpm_alg_id_parser(i: &[u8]) -> nom::IResult<&[u8], TpmAlgId> {
    let (i, v) = be_u16(i)?;
    Ok((i, TpmAlgId::from(v)))
}

// TPMT_SYM_DEF_OBJECT: keyBits and mode are only present for a non null algorithm.
fn sym_def_object_parser(i: &[u8]) -> nom::IResult<&[u8], TpmAlgId> {
    let (i, algorithm) = tpm_alg_id_parser(i)?;
    let (i, _details) = cond(algorithm != TpmAlgId::Null, take(4usize))(i)?;
    Ok((i, algorithm))
}

// TPMT_RSA_SCHEME / TPMT_ECC_SCHEME / TPMT_KDF_SCHEME: a hashAlg follows a non null scheme.
fn scheme_parser(i: &[u8]) -> nom::IResult<&[u8], TpmAlgId> {
    let (i, scheme) = tpm_alg_id_parser(i)?;
    let (i, _hash_alg) = cond(scheme != TpmAlgId::Null, be_u16)(i)?;
    Ok((i, scheme))
}

fn rsa_parms_parser(i: &[u8]) -> nom::IResult<&[u8], TpmuPublicParms> {
    let (i, _symmetric) = sym_def_object_parser(i)?;
    let (i, _scheme) = scheme_parser(i)?;
    let (i, key_bits) = be_u16(i)?;
    let (i, exponent) = be_u32(i)?;
    Ok((
        i,
        TpmuPublicParms::Rsa(TpmsRsaParms { key_bits, exponent }),
    ))
}

fn ecc_parms_parser(i: &[u8]) -> nom::IResult<&[u8], TpmuPublicParms> {
    let (i, _symmetric) = sym_def_object_parser(i)?;
    let (i, _scheme) = scheme_parser(i)?;
    let (i, curve_id) = be_u16(i)?;
    let (i, _kdf) = scheme_parser(i)?;
    Ok((
        i,
        TpmuPublicParms::Ecc(TpmsEccParms {
            curve_id: TpmiEccCurve::from(curve_id),
        }),
    ))
}

fn tpmt_public_parser(i: &[u8]) -> nom::IResult<&[u8], TpmtPublic> {
    let (i, type_) = map_res(tpm_alg_id_parser, |t| match t {
        TpmAlgId::Rsa | TpmAlgId::Ecc => Ok(t),
        _ => Err(()),
    })(i)?;
    let (i, name_alg) = tpm_alg_id_parser(i)?;
    let (i, object_attributes) = be_u32(i)?;
    let (i, auth_policy) = tpm2b_parser(i)?;

    let (i, parameters, unique) = if type_ == TpmAlgId::Rsa {
        let (i, parameters) = rsa_parms_parser(i)?;
        let (i, n) = tpm2b_parser(i)?;
        (i, parameters, TpmuPublicId::Rsa(n.to_vec()))
    } else {
        let (i, parameters) = ecc_parms_parser(i)?;
        let (i, x) = tpm2b_parser(i)?;
        let (i, y) = tpm2b_parser(i)?;
        (
            i,
            parameters,
            TpmuPublicId::Ecc {
                x: x.to_vec(),
                y: y.to_vec(),
            },
        )
    };

    Ok((
        i,
        TpmtPublic {
            type_,
            name_alg,
            object_attributes,
            auth_policy: auth_policy.to_vec(),
            parameters,
            unique,
        },
    ))
}

fn tpms_attest_parser(i: &[u8]) -> nom::IResult<&[u8], TpmsAttest> {
    let (i, magic) = be_u32(i)?;
    let (i, type_) = be_u16(i)?;
    let (i, qualified_signer) = tpm2b_parser(i)?;
    let (i, extra_data) = tpm2b_parser(i)?;
    // clock, resetCount, restartCount, safe
    let (i, clock_info) = take(17usize)(i)?;
    let (i, firmware_version) = be_u64(i)?;
    let (i, name) = tpm2b_parser(i)?;
    let (i, qualified_name) = tpm2b_parser(i)?;

    Ok((
        i,
        TpmsAttest {
            magic,
            type_,
            qualified_signer: qualified_signer.to_vec(),
            extra_data: extra_data.to_vec(),
            clock_info: clock_info.to_vec(),
            firmware_version,
            name: name.to_vec(),
            qualified_name: qualified_name.to_vec(),
        },
    ))
}

impl TryFrom<&[u8]> for TpmtPublic {
    type Error = AttestationError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        match tpmt_public_parser(data) {
            Ok((rem, pubarea)) if rem.is_empty() => Ok(pubarea),
            Ok((rem, _)) => {
                debug!(trailing = rem.len(), "pubArea has trailing bytes");
                Err(AttestationError::TpmStructureInvalid)
            }
            Err(e) => {
                debug!(?e, "pubArea parse failure");
                Err(AttestationError::TpmStructureInvalid)
            }
        }
    }
}

impl TryFrom<&[u8]> for TpmsAttest {
    type Error = AttestationError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        let certinfo = match tpms_attest_parser(data) {
            Ok((rem, certinfo)) if rem.is_empty() => certinfo,
            Ok((rem, _)) => {
                debug!(trailing = rem.len(), "certInfo has trailing bytes");
                return Err(AttestationError::TpmStructureInvalid);
            }
            Err(e) => {
                debug!(?e, "certInfo parse failure");
                return Err(AttestationError::TpmStructureInvalid);
            }
        };

        // Verify that magic is set to TPM_GENERATED_VALUE.
        if certinfo.magic != TPM_GENERATED_VALUE {
            debug!(magic = %certinfo.magic, "certInfo magic is not TPM_GENERATED_VALUE");
            return Err(AttestationError::TpmStructureInvalid);
        }

        // Verify that type is set to TPM_ST_ATTEST_CERTIFY.
        if certinfo.type_ != TPM_ST_ATTEST_CERTIFY {
            debug!(type_ = %certinfo.type_, "certInfo type is not TPM_ST_ATTEST_CERTIFY");
            return Err(AttestationError::TpmStructureInvalid);
        }

        Ok(certinfo)
    }
}

impl TpmtPublic {
    /// The TPM Name of the object this area describes: `nameAlg || H_nameAlg(pubArea)`.
    pub fn name(&self, pubarea_bytes: &[u8]) -> AttestationResult<Vec<u8>> {
        let md = self.name_alg.message_digest().ok_or_else(|| {
            debug!(name_alg = ?self.name_alg, "unsupported pubArea name algorithm");
            AttestationError::TpmStructureInvalid
        })?;

        let digest = openssl::hash::hash(md, pubarea_bytes)?;
        let mut name = u16::from(self.name_alg).to_be_bytes().to_vec();
        name.extend_from_slice(&digest);
        Ok(name)
    }
}
