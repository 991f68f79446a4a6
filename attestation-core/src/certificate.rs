//! X.509 utilities shared by the format verifiers.
//!
//! Certificates are held as OpenSSL [x509::X509] values, which is what signature and chain
//! verification need. Extensions that OpenSSL can't decode for us are read with x509-parser.

use std::cmp::Ordering;

use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::x509;
use x509_parser::certificate::X509Certificate;
use x509_parser::oid_registry::Oid;

use crate::constants::{FIDO_GEN_CE_AAGUID_OID, FIDO_U2F_TRANSPORTS_OID};
use crate::error::{AttestationError, AttestationResult};

/// x509 certificate extensions are validated by checking that the value of the extension is
/// equal to some other value.
pub(crate) trait AttestationX509Extension {
    /// the type of the value in the certificate extension
    type Output: Eq;

    /// the oid of the extension
    const OID: Oid<'static>;

    /// how to parse the value out of the certificate extension
    fn parse(i: &[u8]) -> der_parser::error::BerResult<Self::Output>;

    /// if `true`, then validating this certificate fails if this extension is missing
    const IS_REQUIRED: bool;

    /// what error to return if the extension value is not equal to the expected value
    const VALIDATION_ERROR: AttestationError;
}

/// The FIDO AAGUID extension, `id-fido-gen-ce-aaguid`.
pub(crate) struct FidoGenCeAaguid;

impl AttestationX509Extension for FidoGenCeAaguid {
    const OID: Oid<'static> = FIDO_GEN_CE_AAGUID_OID;

    type Output = [u8; 16];

    fn parse(i: &[u8]) -> der_parser::error::BerResult<Self::Output> {
        let (rem, aaguid) = der_parser::der::parse_der_octetstring(i)?;
        let aaguid: [u8; 16] = aaguid
            .as_slice()?
            .try_into()
            .map_err(|_| der_parser::error::BerError::InvalidLength)?;

        Ok((rem, aaguid))
    }

    const IS_REQUIRED: bool = false;

    const VALIDATION_ERROR: AttestationError = AttestationError::AaguidMismatch;
}

bitflags::bitflags! {
    /// Transports from the FIDO U2F transports extension.
    pub struct U2fTransports: u8 {
        /// Bluetooth classic
        const BLUETOOTH_CLASSIC = 0x01;
        /// Bluetooth low energy
        const BLUETOOTH_LOW_ENERGY = 0x02;
        /// USB
        const USB = 0x04;
        /// NFC
        const NFC = 0x08;
        /// USB internal (platform)
        const USB_INTERNAL = 0x10;
    }
}

/// The FIDO U2F transports extension, `id-fido-u2f-ce-transports`.
pub(crate) struct FidoU2fTransports;

impl AttestationX509Extension for FidoU2fTransports {
    const OID: Oid<'static> = FIDO_U2F_TRANSPORTS_OID;

    type Output = U2fTransports;

    fn parse(i: &[u8]) -> der_parser::error::BerResult<Self::Output> {
        let (rem, obj) = der_parser::der::parse_der_bitstring(i)?;
        let bits = obj.as_bitstring()?;

        // Named bits are numbered from the most significant bit of the first octet.
        let transports = [
            U2fTransports::BLUETOOTH_CLASSIC,
            U2fTransports::BLUETOOTH_LOW_ENERGY,
            U2fTransports::USB,
            U2fTransports::NFC,
            U2fTransports::USB_INTERNAL,
        ]
        .into_iter()
        .enumerate()
        .filter(|(bit, _)| bits.is_set(*bit))
        .fold(U2fTransports::empty(), |acc, (_, t)| acc | t);

        Ok((rem, transports))
    }

    const IS_REQUIRED: bool = false;

    const VALIDATION_ERROR: AttestationError = AttestationError::ExtensionMismatch;
}

/// Re-parse an OpenSSL certificate with x509-parser.
pub(crate) fn with_parsed<T, F>(certificate: &x509::X509Ref, f: F) -> AttestationResult<T>
where
    F: FnOnce(&X509Certificate<'_>) -> AttestationResult<T>,
{
    let der = certificate.to_der()?;
    let (_, parsed) = x509_parser::parse_x509_certificate(&der).map_err(|e| {
        debug!(?e, "x509-parser rejected certificate");
        AttestationError::MalformedCertificate
    })?;
    f(&parsed)
}

/// Find and decode the extension `T` in a certificate. A present extension that can't be
/// decoded fails with [AttestationError::MalformedExtension].
pub(crate) fn find_extension<T>(
    certificate: &x509::X509Ref,
) -> AttestationResult<Option<T::Output>>
where
    T: AttestationX509Extension,
{
    with_parsed(certificate, |parsed| {
        parsed
            .extensions()
            .iter()
            .find(|extension| extension.oid == T::OID)
            .map(|extension| {
                T::parse(extension.value)
                    .map(|(_, output)| output)
                    .map_err(|e| {
                        debug!(?e, oid = %T::OID, "unable to decode certificate extension");
                        AttestationError::MalformedExtension
                    })
            })
            .transpose()
    })
}

/// Validate the value of extension `T` in a certificate equals `data`.
pub(crate) fn validate_extension<T>(
    certificate: &x509::X509Ref,
    data: &<T as AttestationX509Extension>::Output,
) -> AttestationResult<()>
where
    T: AttestationX509Extension,
{
    match find_extension::<T>(certificate)? {
        Some(output) if &output == data => Ok(()),
        Some(_) => {
            debug!(oid = %T::OID, "certificate extension value mismatch");
            Err(T::VALIDATION_ERROR)
        }
        None if T::IS_REQUIRED => {
            debug!(oid = %T::OID, "required certificate extension is missing");
            Err(AttestationError::MissingExtension)
        }
        None => Ok(()),
    }
}

/// Decode a DER certificate.
pub fn parse_certificate(der: &[u8]) -> AttestationResult<x509::X509> {
    if der.is_empty() {
        debug!("certificate is empty");
        return Err(AttestationError::MalformedCertificate);
    }
    x509::X509::from_der(der).map_err(|e| {
        debug!(?e, "invalid certificate DER");
        AttestationError::MalformedCertificate
    })
}

/// True if `now` lies within `[notBefore, notAfter]` of the certificate.
pub fn is_temporally_valid(certificate: &x509::X509Ref, now: &Asn1TimeRef) -> bool {
    let started = certificate
        .not_before()
        .compare(now)
        .map(|o| o != Ordering::Greater);
    let not_ended = now
        .compare(certificate.not_after())
        .map(|o| o != Ordering::Greater);

    matches!((started, not_ended), (Ok(true), Ok(true)))
}

/// The AAGUID extension of a certificate, if present. A present extension that is not a 16
/// byte OCTET STRING fails with [AttestationError::MalformedExtension].
pub fn extract_aaguid_extension(certificate: &x509::X509Ref) -> AttestationResult<Option<[u8; 16]>> {
    find_extension::<FidoGenCeAaguid>(certificate)
}

/// The U2F transports extension of a certificate, if present.
pub fn extract_u2f_transports(
    certificate: &x509::X509Ref,
) -> AttestationResult<Option<U2fTransports>> {
    find_extension::<FidoU2fTransports>(certificate)
}

/// True if the basic constraints extension marks the certificate as a CA. A certificate
/// without basic constraints is not a CA.
pub fn is_ca_certificate(certificate: &x509::X509Ref) -> AttestationResult<bool> {
    with_parsed(certificate, |parsed| {
        parsed
            .basic_constraints()
            .map(|bc| bc.map(|bc| bc.value.ca).unwrap_or(false))
            .map_err(|e| {
                debug!(?e, "invalid basic constraints");
                AttestationError::MalformedExtension
            })
    })
}

/// True if the certificate is X.509 version 3 (encoded as the integer 2).
pub fn is_version_3(certificate: &x509::X509Ref) -> bool {
    certificate.version() == 2
}

/// Decode an `x5c` chain, leaf first, checking that every certificate is valid at the current
/// wall clock time. The order of the chain is preserved.
pub fn parse_x5c_chain(x5c: &[&[u8]]) -> AttestationResult<Vec<x509::X509>> {
    if x5c.is_empty() {
        debug!("x5c chain is empty");
        return Err(AttestationError::MalformedStatement);
    }

    let now = Asn1Time::days_from_now(0)?;

    x5c.iter()
        .map(|der| {
            let crt = parse_certificate(der)?;
            if is_temporally_valid(&crt, &now) {
                Ok(crt)
            } else {
                debug!(
                    subject = ?crt.subject_name(),
                    not_before = %crt.not_before(),
                    not_after = %crt.not_after(),
                    "certificate is not valid at this time"
                );
                Err(AttestationError::ExpiredOrInvalidCertificate)
            }
        })
        .collect()
}
