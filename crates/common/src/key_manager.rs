//! Gateway public key cache for certificate mode.
//!
//! Keys are pinned by certificate serial. An unknown serial triggers a
//! download of the certificate, which is only pinned after it chains to the
//! configured root. Refreshes are serialized per serial, so concurrent callers
//! waiting on the same unseen certificate share a single download while
//! refreshes of other serials proceed independently. Pinned keys are never
//! evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use error_stack::{Report, ResultExt};

use crate::cert;
use crate::error::AlipayError;
use crate::parser::CertItem;
use crate::settings::AlipayOptions;
use crate::verifier::check_response_sign;

/// Certificate returned by a [`CertificateFetcher`].
#[derive(Debug, Clone, Default)]
pub struct DownloadedCertificate {
    /// PEM or base64-encoded PEM.
    pub content: String,
    /// Signature of the download response when it was signed by a
    /// certificate that is not pinned yet, typically the downloaded one.
    pub unverified: Option<CertItem>,
}

/// Downloads a gateway certificate by serial.
///
/// Implementations must not call back into [`PublicKeyManager::ensure_pinned`]
/// for the response they fetch; an unverifiable response signature is
/// returned in [`DownloadedCertificate::unverified`] instead.
#[async_trait]
pub trait CertificateFetcher: Send + Sync {
    async fn fetch_certificate(
        &self,
        serial: &str,
    ) -> Result<DownloadedCertificate, Report<AlipayError>>;
}

/// A caller's share of a per-serial refresh lock. The map entry is removed
/// when the last share is dropped, including on cancellation.
struct RefreshLock<'a> {
    manager: &'a PublicKeyManager,
    serial: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for RefreshLock<'_> {
    fn drop(&mut self) {
        self.manager.release_refresh_lock(&self.serial, &self.lock);
    }
}

#[derive(Debug, Default)]
pub struct PublicKeyManager {
    keys: RwLock<HashMap<String, String>>,
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

fn untrusted(serial: &str, message: &str) -> AlipayError {
    AlipayError::UntrustedCertificate {
        serial: serial.to_string(),
        message: message.to_string(),
    }
}

impl PublicKeyManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, serial: &str) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(serial)
    }

    #[must_use]
    pub fn get(&self, serial: &str) -> Option<String> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(serial)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pins `public_key` under `serial`. A later pin of the same serial wins.
    pub fn pin(&self, serial: impl Into<String>, public_key: impl Into<String>) {
        let serial = serial.into();
        log::debug!("pinning gateway key for certificate {}", serial);
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(serial, public_key.into());
    }

    /// Seeds an empty cache with the locally configured gateway certificate.
    fn seed(&self, options: &AlipayOptions) {
        if !self.is_empty()
            || options.alipay_public_cert_sn.is_empty()
            || options.alipay_public_key.is_empty()
        {
            return;
        }
        self.pin(
            options.alipay_public_cert_sn.as_str(),
            options.alipay_public_key.as_str(),
        );
    }

    fn refresh_lock(&self, serial: &str) -> RefreshLock<'_> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        RefreshLock {
            manager: self,
            serial: serial.to_string(),
            lock: Arc::clone(locks.entry(serial.to_string()).or_default()),
        }
    }

    /// Drops the lock entry for `serial` once no other caller holds it.
    fn release_refresh_lock(&self, serial: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Clones are only taken under this mutex: one for the map, one for us.
        let idle = locks
            .get(serial)
            .is_some_and(|entry| Arc::ptr_eq(entry, lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(serial);
        }
    }

    #[cfg(test)]
    fn refresh_lock_count(&self) -> usize {
        self.refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the pinned key for `serial`, downloading and pinning it first
    /// if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`AlipayError::UntrustedCertificate`] if the download fails or
    /// reports an error, the certificate does not chain to the configured
    /// root, its serial differs from `serial`, or the download response
    /// signature does not verify.
    pub async fn ensure_pinned(
        &self,
        serial: &str,
        options: &AlipayOptions,
        fetcher: &dyn CertificateFetcher,
    ) -> Result<String, Report<AlipayError>> {
        self.seed(options);
        if let Some(key) = self.get(serial) {
            return Ok(key);
        }

        let lock = self.refresh_lock(serial);
        let _guard = lock.lock.lock().await;

        // Another caller may have finished the refresh while we waited.
        if let Some(key) = self.get(serial) {
            return Ok(key);
        }

        log::info!("refreshing gateway certificate {}", serial);

        let downloaded = fetcher
            .fetch_certificate(serial)
            .await
            .change_context(untrusted(serial, "certificate download failed"))?;

        let pem = cert::decode_cert_content(&downloaded.content)
            .change_context(untrusted(serial, "downloaded certificate is malformed"))?;

        let trusted = cert::is_trusted(&pem, &options.root_cert)
            .change_context(untrusted(serial, "certificate chain could not be checked"))?;
        if !trusted {
            return Err(Report::new(untrusted(
                serial,
                "certificate does not chain to the configured root",
            )));
        }

        let downloaded_serial = cert::cert_sn(&pem)
            .change_context(untrusted(serial, "downloaded certificate is malformed"))?;
        if downloaded_serial != serial {
            return Err(Report::new(untrusted(
                serial,
                "downloaded certificate has a different serial",
            ))
            .attach(format!("downloaded serial: {}", downloaded_serial)));
        }

        let public_key = cert::public_key_base64(&pem)
            .change_context(untrusted(serial, "downloaded certificate is malformed"))?;

        if let Some(item) = downloaded.unverified {
            if item.cert_sn != serial {
                return Err(Report::new(untrusted(
                    serial,
                    "download response is signed by an unknown certificate",
                ))
                .attach(format!("response signer: {}", item.cert_sn)));
            }
            check_response_sign(
                &item.sign_item(),
                false,
                &public_key,
                &options.charset,
                &options.sign_type,
            )
            .change_context(untrusted(serial, "download response signature is invalid"))?;
        }

        self.pin(serial, public_key.as_str());
        log::info!("pinned gateway certificate {}", serial);

        Ok(public_key)
    }
}
