//! Certificate-store-backed metadata source.
//!
//! Some platforms deliver the instance payload through the machine
//! certificate store: a certificate issued by a well-known issuer carries
//! the payload base64-encoded in its subject common name. The store here is
//! a directory of certificate text exports, one certificate per file, with
//! `Issuer:` and `Subject:` fields in the openssl text form.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use crate::error::MetadataError;
use crate::source::Source;

/// Configuration for a [`CertSource`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CertConfig {
    /// Directory holding the exported certificates.
    pub store_dir: PathBuf,
    /// Issuer string matched verbatim. `None` (or empty) disables the
    /// source entirely: queries return an empty result without touching
    /// the store.
    pub issuer: Option<String>,
}

/// Metadata source over a certificate store directory.
pub struct CertSource {
    config: CertConfig,
    finished: AtomicBool,
}

impl CertSource {
    pub fn new(config: CertConfig) -> Self {
        Self {
            config,
            finished: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Source for CertSource {
    async fn query(&self, _path: &str) -> Result<String, MetadataError> {
        let issuer = match self.config.issuer.as_deref() {
            Some(issuer) if !issuer.is_empty() => issuer,
            _ => return Ok(String::new()),
        };

        let mut entries = tokio::fs::read_dir(&self.config.store_dir)
            .await
            .map_err(|e| {
                MetadataError::QueryFailed(format!(
                    "certificate store {}: {}",
                    self.config.store_dir.display(),
                    e
                ))
            })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MetadataError::QueryFailed(format!("certificate store read: {}", e)))?
        {
            let Ok(text) = tokio::fs::read_to_string(entry.path()).await else {
                continue;
            };
            if field_value(&text, "Issuer:") != Some(issuer.to_string()) {
                continue;
            }
            let subject = field_value(&text, "Subject:").ok_or_else(|| {
                MetadataError::ParseFailed(format!(
                    "certificate {} has no subject",
                    entry.path().display()
                ))
            })?;
            let payload = common_name(&subject).ok_or_else(|| {
                MetadataError::ParseFailed(format!(
                    "certificate {} subject has no CN",
                    entry.path().display()
                ))
            })?;
            return decode_payload(&payload);
        }

        Err(MetadataError::QueryFailed(format!(
            "no certificate matched issuer {:?}",
            issuer
        )))
    }

    async fn finish(&self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            tracing::debug!("certificate source finished");
        }
    }
}

/// Value of the first `Label: value` line in a certificate text export.
fn field_value(text: &str, label: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(label))
        .map(|rest| rest.trim().to_string())
}

/// Extract `CN=` from a subject/issuer distinguished name.
fn common_name(subject: &str) -> Option<String> {
    subject.split(',').map(str::trim).find_map(|rdn| {
        rdn.strip_prefix("CN=")
            .or_else(|| rdn.strip_prefix("CN = "))
            .map(|v| v.trim().to_string())
    })
}

fn decode_payload(b64: &str) -> Result<String, MetadataError> {
    let bytes = STANDARD
        .decode(b64.trim())
        .map_err(|e| MetadataError::ParseFailed(format!("subject CN base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| MetadataError::ParseFailed("subject CN payload is not utf-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "DC=instance-agent, CN=Metadata Issuer";

    fn cert_text(issuer: &str, payload: &str) -> String {
        format!(
            "Certificate:\n    Issuer: {}\n    Subject: C=US, CN={}\n",
            issuer,
            STANDARD.encode(payload)
        )
    }

    #[tokio::test]
    async fn test_unset_issuer_short_circuits() {
        let source = CertSource::new(CertConfig {
            store_dir: PathBuf::from("/nonexistent"),
            issuer: None,
        });
        // The store must not be touched: a missing store dir would fail.
        assert_eq!(source.query("meta-data").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_matching_issuer_decodes_cn() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("other.crt"), cert_text("CN=Other", "nope")).unwrap();
        std::fs::write(
            dir.path().join("payload.crt"),
            cert_text(ISSUER, "region=dfw&host=web01"),
        )
        .unwrap();

        let source = CertSource::new(CertConfig {
            store_dir: dir.path().to_path_buf(),
            issuer: Some(ISSUER.to_string()),
        });
        assert_eq!(
            source.query("meta-data").await.unwrap(),
            "region=dfw&host=web01"
        );
    }

    #[tokio::test]
    async fn test_unmatched_issuer_is_query_failed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("other.crt"), cert_text("CN=Other", "x")).unwrap();

        let source = CertSource::new(CertConfig {
            store_dir: dir.path().to_path_buf(),
            issuer: Some(ISSUER.to_string()),
        });
        assert!(matches!(
            source.query("meta-data").await,
            Err(MetadataError::QueryFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_base64_is_parse_failed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bad.crt"),
            format!("Issuer: {}\nSubject: CN=!!not-base64!!\n", ISSUER),
        )
        .unwrap();

        let source = CertSource::new(CertConfig {
            store_dir: dir.path().to_path_buf(),
            issuer: Some(ISSUER.to_string()),
        });
        assert!(matches!(
            source.query("meta-data").await,
            Err(MetadataError::ParseFailed(_))
        ));
    }

    #[test]
    fn test_common_name_variants() {
        assert_eq!(common_name("C=US, O=Org, CN=abc"), Some("abc".into()));
        assert_eq!(common_name("CN = abc"), Some("abc".into()));
        assert_eq!(common_name("C=US, O=Org"), None);
    }
}
