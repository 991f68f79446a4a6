//! <https://www.w3.org/TR/webauthn-3/#sctn-android-safetynet-attestation>

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use compact_jwt::{Jws, JwsUnverified};
use openssl::nid::Nid;
use openssl::sha::sha256;
use serde::{Deserialize, Serialize};

use crate::constants::{SAFETYNET_HOSTNAME, SAFETYNET_MAX_AGE_MS};
use crate::error::{AttestationError, AttestationResult};
use crate::statement::AttestationStatement;

use super::{AttestationType, AttestationVerifier, VerificationInput, VerificationResult};

/// Verifies `android-safetynet` attestation statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct AndroidSafetyNetVerifier {
    drift_tolerance_ms: u64,
}

impl AndroidSafetyNetVerifier {
    /// A verifier that widens the accepted timestamp window by `drift_tolerance_ms` on both
    /// ends.
    pub fn new(drift_tolerance_ms: u64) -> Self {
        AndroidSafetyNetVerifier { drift_tolerance_ms }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SafetyNetAttestResponse {
    timestamp_ms: u64,
    nonce: String,
    cts_profile_match: bool,
    #[serde(default)]
    basic_integrity: bool,
    #[serde(default)]
    apk_package_name: Option<String>,
    #[serde(default)]
    evaluation_type: Option<String>,
}

fn safetynet_invalid<E: std::fmt::Debug>(what: &'static str) -> impl FnOnce(E) -> AttestationError {
    move |e| {
        debug!(?e, "{}", what);
        AttestationError::SafetyNetResponseInvalid
    }
}

fn now_ms() -> AttestationResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|e| {
            error!(?e, "system clock is before the unix epoch");
            AttestationError::SafetyNetTimestampInvalid
        })
}

impl AttestationVerifier for AndroidSafetyNetVerifier {
    fn verify(
        &self,
        statement: &AttestationStatement<'_>,
        input: &VerificationInput<'_>,
    ) -> AttestationResult<VerificationResult> {
        // Verify that attStmt is valid CBOR conforming to the syntax defined above and perform
        // CBOR decoding on it to extract the contained fields.
        statement.ensure_populated()?;

        // there's only 1 version now
        let ver = statement.text("ver")?.ok_or_else(|| {
            debug!("android-safetynet statement has no ver");
            AttestationError::MalformedStatement
        })?;
        if ver.is_empty() {
            debug!("android-safetynet ver is empty");
            return Err(AttestationError::MalformedStatement);
        }
        let response = statement.require_bytes("response")?;

        // Verify that response is a valid SafetyNet response of version ver by following the
        // steps indicated by the SafetyNet online documentation.
        let token = std::str::from_utf8(response)
            .map_err(safetynet_invalid("SafetyNet response is not utf8"))?;
        trace!(?token);

        let jwsu = JwsUnverified::from_str(token)
            .map_err(safetynet_invalid("SafetyNet response is not a compact JWS"))?;

        let chain = jwsu
            .get_x5c_chain()
            .map_err(safetynet_invalid("SafetyNet x5c chain is invalid"))?
            .ok_or_else(|| {
                debug!("SafetyNet response has no x5c chain");
                AttestationError::SafetyNetResponseInvalid
            })?;

        let leaf_cert = chain.first().ok_or_else(|| {
            debug!("SafetyNet x5c chain is empty");
            AttestationError::SafetyNetResponseInvalid
        })?;

        // Verify with the leaf certificate.
        let jws: Jws<SafetyNetAttestResponse> = jwsu
            .validate_embeded()
            .map_err(safetynet_invalid("SafetyNet signature did not verify"))?;
        let claims = jws.into_inner();

        // Verify that the nonce attribute in the payload of response is identical to the Base64
        // encoding of the SHA-256 hash of the concatenation of authenticatorData and
        // clientDataHash.
        let expected_nonce = sha256(input.data());
        let nonce = STANDARD
            .decode(&claims.nonce)
            .map_err(safetynet_invalid("SafetyNet nonce is not base64"))?;
        if nonce != expected_nonce {
            debug!("SafetyNet nonce mismatch");
            return Err(AttestationError::SafetyNetNonceMismatch);
        }

        // Verify that the SafetyNet response actually came from the SafetyNet service: the
        // attestationCert is issued to the hostname "attest.android.com".
        let common_name = leaf_cert
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .map(|cn| cn.data().as_slice().to_vec());

        if common_name.as_deref() != Some(SAFETYNET_HOSTNAME.as_bytes()) {
            debug!(
                common_name = ?common_name.as_deref().map(String::from_utf8_lossy),
                "SafetyNet certificate is not issued to attest.android.com"
            );
            return Err(AttestationError::SafetyNetHostnameInvalid);
        }

        // Verify that the ctsProfileMatch attribute in the payload of response is true.
        if !claims.cts_profile_match {
            debug!(basic_integrity = %claims.basic_integrity, "False CTS Profile Match");
            return Err(AttestationError::SafetyNetCtsProfileMismatch);
        }

        // Verify sanity of timestamp in the payload
        let now = now_ms()?;
        let latest = now.saturating_add(self.drift_tolerance_ms);
        let max_age = SAFETYNET_MAX_AGE_MS.saturating_add(self.drift_tolerance_ms);
        let earliest = now.saturating_sub(max_age);
        if claims.timestamp_ms > latest || claims.timestamp_ms < earliest {
            debug!(
                timestamp_ms = %claims.timestamp_ms,
                %now,
                "SafetyNet response timestamp outside the accepted window"
            );
            return Err(AttestationError::SafetyNetTimestampInvalid);
        }

        trace!(
            apk_package_name = ?claims.apk_package_name,
            evaluation_type = ?claims.evaluation_type,
            "SafetyNet response accepted"
        );

        // If successful, return implementation-specific values representing attestation type
        // Basic and attestation trust path x5c.
        Ok(VerificationResult::new(AttestationType::Basic, chain))
    }
}
