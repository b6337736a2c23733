use crate::store::{ClinicStore, StoreError};
use std::{future::Future, sync::Arc, time::Duration};

/// The clinic workflows over a shared store. Every store call is bounded by `store_timeout`.
#[derive(Clone, Debug)]
pub struct Clinic {
    store: Arc<dyn ClinicStore>,
    store_timeout: Duration,
}

impl Clinic {
    pub fn new(store: Arc<dyn ClinicStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    pub(crate) fn store(&self) -> &dyn ClinicStore {
        self.store.as_ref()
    }

    /// An elapsed deadline is reported as a failure, the call may still have taken effect.
    pub(crate) async fn within<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(timeout = ?self.store_timeout, "store call timed out");
                Err(StoreError::TimedOut(self.store_timeout))
            }
        }
    }
}
