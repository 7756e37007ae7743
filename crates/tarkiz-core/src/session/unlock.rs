//! Credential unlock attempts.
//!
//! Verification is asynchronous (an NFC scan or biometric prompt can take
//! seconds). [`UnlockGate`] allows one attempt in flight: a second caller
//! joins the pending attempt and receives the same outcome, including the
//! same attempt id, so the session machine applies it once.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::credentials::{hash_passcode, CredentialStore, NFC_TAG_KEY, PASSCODE_KEY};
use crate::error::{CoreError, Result};
use crate::events::UnlockMethod;

/// Something that can prove the user holds the credential.
pub trait UnlockVerifier: Send + Sync {
    fn method(&self) -> UnlockMethod;

    /// False when the hardware or enrolment needed for this method is missing.
    fn is_available(&self) -> bool;

    /// Resolve to `Ok(())` on success, `VerificationFailed` on mismatch.
    fn verify(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Proof of a successful verification, consumed by
/// [`SessionMachine::unlock`](super::SessionMachine::unlock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedUnlock {
    pub attempt_id: u64,
    pub method: UnlockMethod,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum Outcome {
    Verified(VerifiedUnlock),
    Rejected(String),
    Unavailable(String),
    Cancelled,
}

impl Outcome {
    fn into_result(self) -> Result<VerifiedUnlock> {
        match self {
            Outcome::Verified(v) => Ok(v),
            Outcome::Rejected(reason) => Err(CoreError::VerificationFailed(reason)),
            Outcome::Unavailable(reason) => Err(CoreError::Unavailable(reason)),
            Outcome::Cancelled => Err(CoreError::Cancelled),
        }
    }
}

type Pending = Mutex<Option<watch::Receiver<Option<Outcome>>>>;

enum Role {
    Lead(watch::Sender<Option<Outcome>>),
    Join(watch::Receiver<Option<Outcome>>),
}

/// Clears the pending slot when the leading attempt finishes or is dropped.
struct PendingGuard<'a>(&'a Pending);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}

fn lock(pending: &Pending) -> MutexGuard<'_, Option<watch::Receiver<Option<Outcome>>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct UnlockGate {
    next_id: AtomicU64,
    pending: Pending,
}

impl UnlockGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending).is_some()
    }

    /// Run `verifier`, or join the attempt already in flight.
    ///
    /// Cancelling `cancel` resolves this caller with `Cancelled`; a joiner
    /// cancelling does not abort the leading attempt.
    pub async fn attempt<V: UnlockVerifier>(
        &self,
        verifier: &V,
        cancel: &CancellationToken,
    ) -> Result<VerifiedUnlock> {
        let role = {
            let mut slot = lock(&self.pending);
            match slot.as_ref() {
                Some(rx) => Role::Join(rx.clone()),
                None => {
                    if !verifier.is_available() {
                        return Err(CoreError::Unavailable(format!(
                            "{} is not set up on this device",
                            verifier.method()
                        )));
                    }
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    Role::Lead(tx)
                }
            }
        };

        match role {
            Role::Join(rx) => {
                tracing::debug!("joining unlock attempt in flight");
                Self::join(rx, cancel).await
            }
            Role::Lead(tx) => {
                let guard = PendingGuard(&self.pending);
                let attempt_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                let method = verifier.method();
                let outcome = tokio::select! {
                    result = verifier.verify() => match result {
                        Ok(()) => Outcome::Verified(VerifiedUnlock {
                            attempt_id,
                            method,
                            verified_at: Utc::now(),
                        }),
                        Err(CoreError::VerificationFailed(reason)) => Outcome::Rejected(reason),
                        Err(CoreError::Unavailable(reason)) => Outcome::Unavailable(reason),
                        Err(CoreError::Cancelled) => Outcome::Cancelled,
                        // Store or reader failures say nothing about the credential.
                        Err(other) => Outcome::Unavailable(other.to_string()),
                    },
                    _ = cancel.cancelled() => Outcome::Cancelled,
                };
                drop(guard);
                tracing::info!(attempt_id, %method, ?outcome, "unlock attempt resolved");
                let _ = tx.send(Some(outcome.clone()));
                outcome.into_result()
            }
        }
    }

    async fn join(
        mut rx: watch::Receiver<Option<Outcome>>,
        cancel: &CancellationToken,
    ) -> Result<VerifiedUnlock> {
        let outcome = tokio::select! {
            changed = rx.wait_for(|o| o.is_some()) => match changed {
                Ok(value) => value.clone().unwrap_or(Outcome::Cancelled),
                // Leader dropped without resolving.
                Err(_) => Outcome::Cancelled,
            },
            _ = cancel.cancelled() => Outcome::Cancelled,
        };
        outcome.into_result()
    }
}

/// Checks an entered passcode against the stored digest.
pub struct PasscodeVerifier<'a, C: ?Sized> {
    store: &'a C,
    entered: String,
}

impl<'a, C: CredentialStore + ?Sized> PasscodeVerifier<'a, C> {
    pub fn new(store: &'a C, entered: impl Into<String>) -> Self {
        Self {
            store,
            entered: entered.into(),
        }
    }

    fn check(&self) -> Result<()> {
        let Some(expected) = self.store.get(PASSCODE_KEY)? else {
            return Err(CoreError::Unavailable("no passcode has been set".into()));
        };
        if hash_passcode(self.entered.trim()) == expected {
            Ok(())
        } else {
            Err(CoreError::VerificationFailed("incorrect passcode".into()))
        }
    }
}

impl<C: CredentialStore + ?Sized> UnlockVerifier for PasscodeVerifier<'_, C> {
    fn method(&self) -> UnlockMethod {
        UnlockMethod::Passcode
    }

    fn is_available(&self) -> bool {
        matches!(self.store.get(PASSCODE_KEY), Ok(Some(_)))
    }

    fn verify(&self) -> impl Future<Output = Result<()>> + Send {
        async move { self.check() }
    }
}

/// NFC reader hardware.
pub trait TagReader: Send + Sync {
    fn is_present(&self) -> bool;

    /// Wait for a tag and return its id.
    fn read_tag(&self) -> impl Future<Output = Result<String>> + Send;
}

/// Scans a tag and compares it to the paired one.
pub struct NfcTagVerifier<'a, C: ?Sized, R> {
    store: &'a C,
    reader: R,
}

impl<'a, C: CredentialStore + ?Sized, R: TagReader> NfcTagVerifier<'a, C, R> {
    pub fn new(store: &'a C, reader: R) -> Self {
        Self { store, reader }
    }
}

impl<C: CredentialStore + ?Sized, R: TagReader> UnlockVerifier for NfcTagVerifier<'_, C, R> {
    fn method(&self) -> UnlockMethod {
        UnlockMethod::Nfc
    }

    fn is_available(&self) -> bool {
        self.reader.is_present() && matches!(self.store.get(NFC_TAG_KEY), Ok(Some(_)))
    }

    fn verify(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            let paired = self.store.require(NFC_TAG_KEY)?;
            let scanned = self.reader.read_tag().await?;
            if scanned.trim().eq_ignore_ascii_case(paired.trim()) {
                Ok(())
            } else {
                Err(CoreError::VerificationFailed("tag is not the paired tag".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{pair_tag, set_passcode, MemoryStore};
    use std::sync::Arc;
    use std::time::Duration;

    struct SlowTag {
        id: &'static str,
        delay: Duration,
        reads: Arc<AtomicU64>,
    }

    impl TagReader for SlowTag {
        fn is_present(&self) -> bool {
            true
        }

        fn read_tag(&self) -> impl Future<Output = Result<String>> + Send {
            async move {
                self.reads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                Ok(self.id.to_string())
            }
        }
    }

    struct NoReader;

    impl TagReader for NoReader {
        fn is_present(&self) -> bool {
            false
        }

        fn read_tag(&self) -> impl Future<Output = Result<String>> + Send {
            async { Err(CoreError::Unavailable("no reader".into())) }
        }
    }

    fn tag(id: &'static str, delay_ms: u64) -> (SlowTag, Arc<AtomicU64>) {
        let reads = Arc::new(AtomicU64::new(0));
        (
            SlowTag {
                id,
                delay: Duration::from_millis(delay_ms),
                reads: reads.clone(),
            },
            reads,
        )
    }

    #[tokio::test]
    async fn passcode_success_and_failure() {
        let store = MemoryStore::new();
        set_passcode(&store, "1234").unwrap();
        let gate = UnlockGate::new();
        let token = CancellationToken::new();

        let ok = gate
            .attempt(&PasscodeVerifier::new(&store, "1234"), &token)
            .await
            .unwrap();
        assert_eq!(ok.method, UnlockMethod::Passcode);

        let err = gate
            .attempt(&PasscodeVerifier::new(&store, "9999"), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::VerificationFailed(_)));
        assert!(!gate.is_pending());
    }

    #[tokio::test]
    async fn missing_passcode_is_unavailable() {
        let store = MemoryStore::new();
        let gate = UnlockGate::new();
        let err = gate
            .attempt(&PasscodeVerifier::new(&store, "1234"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn absent_reader_is_unavailable() {
        let store = MemoryStore::new();
        pair_tag(&store, "04:AA").unwrap();
        let gate = UnlockGate::new();
        let err = gate
            .attempt(&NfcTagVerifier::new(&store, NoReader), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn concurrent_attempts_share_one_outcome() {
        let store = MemoryStore::new();
        pair_tag(&store, "04:AA").unwrap();
        let gate = UnlockGate::new();
        let token = CancellationToken::new();
        let (first_reader, first_reads) = tag("04:aa", 50);
        let (second_reader, second_reads) = tag("04:aa", 50);
        let first = NfcTagVerifier::new(&store, first_reader);
        let second = NfcTagVerifier::new(&store, second_reader);

        let (a, b) = tokio::join!(gate.attempt(&first, &token), gate.attempt(&second, &token));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.attempt_id, b.attempt_id);
        assert_eq!(first_reads.load(Ordering::SeqCst), 1);
        assert_eq!(second_reads.load(Ordering::SeqCst), 0);
        assert!(!gate.is_pending());
    }

    #[tokio::test]
    async fn wrong_tag_is_rejected() {
        let store = MemoryStore::new();
        pair_tag(&store, "04:AA").unwrap();
        let gate = UnlockGate::new();
        let (reader, _) = tag("04:BB", 1);
        let err = gate
            .attempt(&NfcTagVerifier::new(&store, reader), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::VerificationFailed(_)));
    }

    struct BrokenReader;

    impl TagReader for BrokenReader {
        fn is_present(&self) -> bool {
            true
        }

        fn read_tag(&self) -> impl Future<Output = Result<String>> + Send {
            async { Err(CoreError::Io(std::io::Error::other("reader disconnected"))) }
        }
    }

    #[tokio::test]
    async fn reader_fault_is_unavailable_not_rejected() {
        let store = MemoryStore::new();
        pair_tag(&store, "04:A2:19").unwrap();
        let gate = UnlockGate::new();
        let verifier = NfcTagVerifier::new(&store, BrokenReader);
        let err = gate.attempt(&verifier, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)), "got {err:?}");
        assert!(!gate.is_pending());
    }

    #[tokio::test]
    async fn cancellation_resolves_as_cancelled() {
        let store = MemoryStore::new();
        pair_tag(&store, "04:AA").unwrap();
        let gate = UnlockGate::new();
        let token = CancellationToken::new();
        let (reader, _) = tag("04:AA", 10_000);
        let verifier = NfcTagVerifier::new(&store, reader);

        let canceller = token.clone();
        let (result, ()) = tokio::join!(gate.attempt(&verifier, &token), async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert!(!gate.is_pending());

        // A fresh attempt starts cleanly afterwards.
        set_passcode(&store, "1111").unwrap();
        let next = gate
            .attempt(&PasscodeVerifier::new(&store, "1111"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(next.attempt_id > 1);
    }
}
