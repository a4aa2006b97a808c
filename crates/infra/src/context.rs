//! Per-call scope: tenant, deadline and cancellation.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use storefront_core::{CatalogError, CatalogResult, TenantId};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation flag. Cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    state: Arc<CancelState>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not lost.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Tenant scope plus the caller's deadline and cancel signal.
///
/// Every engine operation takes one. Each store call made on its behalf is
/// raced against both the signal and the deadline; the loser of the race is
/// dropped and the operation reports [`CatalogError::Cancelled`].
#[derive(Debug, Clone)]
pub struct CallContext {
    tenant_id: TenantId,
    deadline: Option<Instant>,
    cancel: CancelSignal,
}

impl CallContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            deadline: None,
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Fail fast if the call is already cancelled or past its deadline.
    pub fn check(&self, operation: &str) -> CatalogResult<()> {
        if self.cancel.is_cancelled() {
            return Err(CatalogError::cancelled(format!("{operation} was cancelled")));
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(CatalogError::cancelled(format!(
                "{operation} exceeded its deadline"
            )));
        }
        Ok(())
    }

    /// Run one store call under this context.
    ///
    /// The up-front [`check`](Self::check) matters: store futures that never
    /// yield would otherwise win every race.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> CatalogResult<T>
    where
        F: Future<Output = CatalogResult<T>>,
    {
        self.check(operation)?;

        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(CatalogError::cancelled(format!("{operation} was cancelled")))
            }
            _ = deadline => {
                Err(CatalogError::cancelled(format!("{operation} exceeded its deadline")))
            }
            result = fut => result,
        }
    }

    /// Same tenant, fresh cancel signal, own deadline. Used for cleanup that
    /// must outlive the caller's cancellation.
    pub fn detached(&self, timeout: Duration) -> CallContext {
        CallContext::new(self.tenant_id).with_timeout(timeout)
    }
}
