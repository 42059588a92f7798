//! Panic recovery around compute function calls.
//!
//! A panicking function client must not take the worker down with it; the
//! panic becomes an `Error::Internal` and follows the dead-letter path.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::types::{Error, Result};

/// Execute an async operation with panic recovery.
///
/// Panics are caught both while `operation` builds the future and while the
/// future is polled.
pub async fn with_recovery_async<F, Fut, T>(operation: F, operation_name: &str) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let future = match catch_unwind(AssertUnwindSafe(operation)) {
        Ok(future) => future,
        Err(panic_payload) => return Err(recovered(operation_name, &*panic_payload)),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic_payload) => Err(recovered(operation_name, &*panic_payload)),
    }
}

fn recovered(operation_name: &str, panic_payload: &(dyn Any + Send)) -> Error {
    let panic_msg = extract_panic_message(panic_payload);
    tracing::error!(
        operation = operation_name,
        panic = %panic_msg,
        "panic_recovered"
    );

    Error::internal(format!("Panic in {}: {}", operation_name, panic_msg))
}

/// Extract panic message from panic payload.
fn extract_panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (no message)".to_string()
    }
}
