use x509_parser::oid_registry::Oid;

/// id-fido-gen-ce-aaguid
pub(crate) const FIDO_GEN_CE_AAGUID_OID: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);

/// id-fido-u2f-ce-transports
pub(crate) const FIDO_U2F_TRANSPORTS_OID: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .45724 .2 .1 .1);

/// Android key attestation description.
pub(crate) const ANDROID_KEY_ATTESTATION_OID: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .11129 .2 .1 .17);

/// tcg-kp-AIKCertificate
pub(crate) const TCG_KP_AIK_CERTIFICATE_OID: Oid<'static> = der_parser::oid!(2.23.133 .8 .3);

pub(crate) const TCG_AT_TPM_MANUFACTURER_OID: Oid<'static> = der_parser::oid!(2.23.133 .2 .1);
pub(crate) const TCG_AT_TPM_MODEL_OID: Oid<'static> = der_parser::oid!(2.23.133 .2 .2);
pub(crate) const TCG_AT_TPM_VERSION_OID: Oid<'static> = der_parser::oid!(2.23.133 .2 .3);

/// The required OU of a packed attestation certificate.
pub const ATTESTATION_CERT_OU: &str = "Authenticator Attestation";

/// The hostname a SafetyNet attestation certificate must be issued to.
pub(crate) const SAFETYNET_HOSTNAME: &str = "attest.android.com";

/// How old a SafetyNet response may be, before drift tolerance is applied.
pub(crate) const SAFETYNET_MAX_AGE_MS: u64 = 60_000;

/// The only supported TPM attestation version.
pub(crate) const TPM_VERSION: &str = "2.0";

pub(crate) const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
pub(crate) const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

/// TPM vendor ids from the TCG vendor id registry, as they appear in the AIK certificate
/// subject alternative name.
pub(crate) const TPM_MANUFACTURERS: [&str; 21] = [
    "id:414D4400", // AMD
    "id:41544D4C", // Atmel
    "id:4252434D", // Broadcom
    "id:49424D00", // IBM
    "id:49465800", // Infineon
    "id:494E5443", // Intel
    "id:4C454E00", // Lenovo
    "id:4E534D20", // National Semiconductor
    "id:4E545A00", // Nationz
    "id:4E544300", // Nuvoton
    "id:51434F4D", // Qualcomm
    "id:534D5343", // SMSC
    "id:53544D20", // ST Microelectronics
    "id:534D534E", // Samsung
    "id:534E5300", // Sinosun
    "id:54584E00", // Texas Instruments
    "id:57454300", // Winbond
    "id:524F4343", // Fuzhou Rockchip
    "id:474F4F47", // Google
    "id:4D534654", // Microsoft
    "id:48504500", // HPE
];

pub(crate) const KM_ORIGIN_GENERATED: u32 = 0;
pub(crate) const KM_PURPOSE_SIGN: u32 = 2;
