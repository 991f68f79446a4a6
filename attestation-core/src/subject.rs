//! Attestation certificate subject checks.
//!
//! A packed attestation certificate subject must carry C, O, OU and CN, and OU must be the
//! literal `Authenticator Attestation`.

use openssl::nid::Nid;
use openssl::x509::X509NameRef;

use crate::constants::ATTESTATION_CERT_OU;
use crate::error::{AttestationError, AttestationResult};

/// The subject fields that an attestation certificate must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectFields {
    /// C
    pub country: String,
    /// O
    pub organisation: String,
    /// OU
    pub organisational_unit: String,
    /// CN
    pub common_name: String,
}

#[derive(Default)]
struct SubjectFieldsBuilder {
    country: Option<String>,
    organisation: Option<String>,
    organisational_unit: Option<String>,
    common_name: Option<String>,
}

impl SubjectFieldsBuilder {
    // The first occurrence of an attribute wins.
    fn set(mut self, key: &str, value: String) -> Self {
        let slot = match key.to_ascii_uppercase().as_str() {
            "C" => &mut self.country,
            "O" => &mut self.organisation,
            "OU" => &mut self.organisational_unit,
            "CN" => &mut self.common_name,
            _ => return self,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
        self
    }

    fn build(self) -> AttestationResult<SubjectFields> {
        fn required(v: Option<String>, name: &str) -> AttestationResult<String> {
            match v {
                Some(v) if !v.is_empty() => Ok(v),
                _ => {
                    debug!(%name, "subject field is missing or empty");
                    Err(AttestationError::MalformedSubject)
                }
            }
        }

        Ok(SubjectFields {
            country: required(self.country, "C")?,
            organisation: required(self.organisation, "O")?,
            organisational_unit: required(self.organisational_unit, "OU")?,
            common_name: required(self.common_name, "CN")?,
        })
    }
}

/// Split a distinguished name into `(attribute, value)` pairs.
///
/// RDNs are separated by `,`, `;` or `+`. Separators inside double quotes, or escaped with a
/// backslash, are part of the value. Quotes are removed and escapes resolved.
fn split_dn(dn: &str) -> AttestationResult<Vec<(String, String)>> {
    let mut pairs = Vec::new();

    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;
    let mut escaped = false;

    let mut finish = |key: &mut String, value: &mut String, in_value: bool| {
        let k = key.trim();
        if k.is_empty() && value.trim().is_empty() && !in_value {
            // Tolerate empty components such as a trailing separator.
            return Ok(());
        }
        if !in_value || k.is_empty() {
            debug!(component = %k, "distinguished name component has no attribute type");
            return Err(AttestationError::MalformedSubject);
        }
        pairs.push((k.to_string(), value.trim().to_string()));
        key.clear();
        value.clear();
        Ok(())
    };

    for c in dn.chars() {
        if escaped {
            if in_value {
                value.push(c);
            } else {
                key.push(c);
            }
            escaped = false;
            continue;
        }

        match c {
            '\\' => escaped = true,
            '"' if in_value => in_quotes = !in_quotes,
            '=' if !in_value => in_value = true,
            ',' | ';' | '+' if !in_quotes => {
                finish(&mut key, &mut value, in_value)?;
                in_value = false;
            }
            c if in_value => value.push(c),
            c => key.push(c),
        }
    }

    if escaped || in_quotes {
        debug!("distinguished name has an unterminated quote or escape");
        return Err(AttestationError::MalformedSubject);
    }
    finish(&mut key, &mut value, in_value)?;

    Ok(pairs)
}

/// Parse a textual distinguished name such as
/// `C=US, O="Vendor, Inc.", OU=Authenticator Attestation, CN=Model1`.
///
/// Fails with [AttestationError::MalformedSubject] if the name cannot be split, or if any of
/// C, O, OU or CN is missing or empty.
pub fn parse_subject_fields(dn: &str) -> AttestationResult<SubjectFields> {
    split_dn(dn)?
        .into_iter()
        .fold(SubjectFieldsBuilder::default(), |builder, (k, v)| {
            builder.set(&k, v)
        })
        .build()
}

/// True if the distinguished name carries every required field, and OU is
/// `Authenticator Attestation`.
pub fn is_valid_attestation_cert_subject(dn: &str) -> bool {
    parse_subject_fields(dn)
        .map(|fields| fields.is_attestation_subject())
        .unwrap_or(false)
}

impl SubjectFields {
    /// True if OU is `Authenticator Attestation`. The other fields are known non-empty.
    pub fn is_attestation_subject(&self) -> bool {
        self.organisational_unit == ATTESTATION_CERT_OU
    }
}

impl TryFrom<&X509NameRef> for SubjectFields {
    type Error = AttestationError;

    fn try_from(name: &X509NameRef) -> Result<Self, Self::Error> {
        let builder = [
            (Nid::COUNTRYNAME, "C"),
            (Nid::ORGANIZATIONNAME, "O"),
            (Nid::ORGANIZATIONALUNITNAME, "OU"),
            (Nid::COMMONNAME, "CN"),
        ]
        .into_iter()
        .try_fold(
            SubjectFieldsBuilder::default(),
            |builder, (nid, key)| -> AttestationResult<SubjectFieldsBuilder> {
                match name.entries_by_nid(nid).next() {
                    Some(entry) => {
                        let value = std::str::from_utf8(entry.data().as_slice()).map_err(|e| {
                            debug!(?e, %key, "subject field is not a valid string");
                            AttestationError::MalformedSubject
                        })?;
                        Ok(builder.set(key, value.to_string()))
                    }
                    None => Ok(builder),
                }
            },
        )?;

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cose::COSEAlgorithm;
    use crate::test_support;

    #[test]
    fn parse_plain_subject() {
        let fields =
            parse_subject_fields("C=US,O=Vendor,OU=Authenticator Attestation,CN=Model1").unwrap();
        assert_eq!(fields.country, "US");
        assert_eq!(fields.organisation, "Vendor");
        assert_eq!(fields.organisational_unit, "Authenticator Attestation");
        assert_eq!(fields.common_name, "Model1");
        assert!(fields.is_attestation_subject());
    }

    #[test]
    fn parse_quoted_and_escaped_commas() {
        let fields = parse_subject_fields(
            r#"CN=Model1, OU=Authenticator Attestation, O="Vendor, Inc.", C=SE"#,
        )
        .unwrap();
        assert_eq!(fields.organisation, "Vendor, Inc.");
        assert_eq!(fields.country, "SE");

        let fields =
            parse_subject_fields(r"cn=Model\, 2;ou=Authenticator Attestation;o=Acme;c=DE").unwrap();
        assert_eq!(fields.common_name, "Model, 2");
        assert_eq!(fields.organisation, "Acme");
    }

    #[test]
    fn missing_or_empty_field_is_malformed() {
        assert_eq!(
            parse_subject_fields("C=US,O=Vendor,OU=Authenticator Attestation"),
            Err(AttestationError::MalformedSubject)
        );
        assert_eq!(
            parse_subject_fields("C=US,O=,OU=Authenticator Attestation,CN=Model1"),
            Err(AttestationError::MalformedSubject)
        );
        assert_eq!(
            parse_subject_fields(r#"C=US,O="Vendor,OU=Authenticator Attestation,CN=Model1"#),
            Err(AttestationError::MalformedSubject)
        );
        assert_eq!(
            parse_subject_fields("C=US,Vendor,OU=Authenticator Attestation,CN=Model1"),
            Err(AttestationError::MalformedSubject)
        );
    }

    #[test]
    fn attestation_subject_requires_ou() {
        assert!(is_valid_attestation_cert_subject(
            "C=US,O=Vendor,OU=Authenticator Attestation,CN=Model1"
        ));
        assert!(!is_valid_attestation_cert_subject(
            "C=US,O=Vendor,OU=Engineering,CN=Model1"
        ));
        assert!(!is_valid_attestation_cert_subject("CN=Model1"));
    }

    #[test]
    fn subject_from_certificate() {
        let key = test_support::generate_key(COSEAlgorithm::ES256);
        let cert = test_support::CertBuilder::new().build(&key);
        let fields = SubjectFields::try_from(cert.subject_name()).unwrap();
        assert!(fields.is_attestation_subject());

        let cert = test_support::CertBuilder::new()
            .subject(&[("C", "US"), ("O", "Vendor"), ("CN", "Model1")])
            .build(&key);
        assert_eq!(
            SubjectFields::try_from(cert.subject_name()),
            Err(AttestationError::MalformedSubject)
        );
    }
}
