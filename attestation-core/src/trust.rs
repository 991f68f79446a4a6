//! Trust decisions made after a statement has been verified: chaining the trust path to known
//! roots and honouring the metadata status of the authenticator model.

use openssl::stack;
use openssl::x509::{self, store};
use webauthn_attestation_ca::MetadataLookup;

use crate::attestation::VerificationResult;
use crate::authdata::AuthenticatorData;
use crate::error::{AttestationError, AttestationResult};

/// Verify that `chain` (leaf first, as returned in a trust path) chains to one of `roots`.
pub fn verify_attestation_ca_chain(
    chain: &[x509::X509],
    roots: &[x509::X509],
) -> AttestationResult<()> {
    for crt in chain {
        trace!(subject = ?crt.subject_name());
    }

    let (leaf, intermediates) = chain.split_first().ok_or_else(|| {
        debug!("trust path is empty");
        AttestationError::CertificateChainNotTrusted("empty trust path".to_string())
    })?;

    // Convert the chain to a stackref so that openssl can use it.
    let mut chain_stack = stack::Stack::new()?;
    for crt in intermediates.iter() {
        chain_stack.push(crt.clone())?;
    }

    // Create the x509 store that we will validate against.
    let mut ca_store = store::X509StoreBuilder::new()?;
    for root in roots.iter() {
        ca_store.add_cert(root.clone())?;
    }
    let ca_store = ca_store.build();

    let mut ca_ctx = x509::X509StoreContext::new()?;

    // Note this is a result<result ... because the inner .init must return an errorstack
    // for openssl.
    let res: AttestationResult<()> = ca_ctx
        .init(&ca_store, leaf, &chain_stack, |ca_ctx_ref| {
            ca_ctx_ref.verify_cert().map(|_| {
                // The value as passed in is a boolean that we ignore in favour of the richer
                // error type.
                let res = ca_ctx_ref.error();
                if res == x509::X509VerifyResult::OK {
                    Ok(())
                } else {
                    debug!(
                        "ca_ctx_ref verify cert - error depth={}, sn={:?}",
                        ca_ctx_ref.error_depth(),
                        ca_ctx_ref.current_cert().map(|crt| crt.subject_name())
                    );
                    Err(AttestationError::CertificateChainNotTrusted(res.to_string()))
                }
            })
        })
        .map_err(|e| {
            // If an openssl error occured, dump it here.
            error!(?e);
            e
        })?;

    res
}

/// Apply the metadata of the authenticator model to a verified result. An unknown model adds
/// no constraint.
pub(crate) fn check_metadata(
    result: &VerificationResult,
    auth_data: &AuthenticatorData,
    lookup: &dyn MetadataLookup,
) -> AttestationResult<()> {
    let Some(aaguid) = auth_data.aaguid() else {
        return Ok(());
    };

    let Some(entry) = lookup.lookup(&aaguid) else {
        trace!(%aaguid, "no metadata for authenticator");
        return Ok(());
    };

    if entry.status.is_undesired() {
        warn!(%aaguid, status = %entry.status, "authenticator has an undesired status");
        return Err(AttestationError::UndesiredAuthenticatorStatus(entry.status));
    }

    match result.trust_path.as_deref() {
        Some(chain) if !entry.trusted_roots.is_empty() => {
            verify_attestation_ca_chain(chain, &entry.trusted_roots)
        }
        _ => Ok(()),
    }
}
