//! Sync/async execution adapter.
//!
//! Hooks and validators may be plain functions or async functions. The
//! adapter hides the difference from callers:
//!
//! - async callables are used as-is,
//! - sync callables are moved onto the blocking pool when the host can run
//!   async code, so they never stall the runtime,
//! - otherwise awaiting the callable fails with a [`CapabilityError`]
//!   instead of quietly running it inline.
//!
//! Synchronous callers use [`Adapted::call_blocking`], which works for
//! every variant.

use crate::compat::{ASYNC_SINCE, Capabilities, FrameworkVersion};
use crate::error::CapabilityError;
use futures::FutureExt;
use futures::future::BoxFuture;
use rootcause::prelude::Report;
use std::future::Future;
use tokio::runtime::{Handle, RuntimeFlavor};
use std::sync::Arc;

type SyncFn<I, O> = Arc<dyn Fn(I) -> O + Send + Sync>;
type AsyncFn<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, O> + Send + Sync>;

/// A function of `I` that is either synchronous or asynchronous.
pub enum Callable<I, O> {
    Sync(SyncFn<I, O>),
    Async(AsyncFn<I, O>),
}

impl<I, O> Clone for Callable<I, O> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

impl<I, O> std::fmt::Debug for Callable<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Callable::Sync"),
            Self::Async(_) => f.write_str("Callable::Async"),
        }
    }
}

impl<I: 'static, O: 'static> Callable<I, O> {
    /// Wraps a synchronous function.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wraps an async function.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        Self::Async(Arc::new(move |input| f(input).boxed()))
    }

    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

/// Adapts callables to the execution mode the host supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionAdapter {
    async_capable: bool,
    host_version: FrameworkVersion,
}

impl ExecutionAdapter {
    #[must_use]
    pub fn new(capabilities: &Capabilities) -> Self {
        Self {
            async_capable: capabilities.async_capable(),
            host_version: capabilities.host().version(),
        }
    }

    #[must_use]
    pub fn async_capable(&self) -> bool {
        self.async_capable
    }

    /// Wraps `callable` for use from either kind of caller.
    pub fn adapt<I, O>(&self, callable: Callable<I, O>) -> Adapted<I, O> {
        match callable {
            Callable::Async(f) => Adapted::Native(f),
            Callable::Sync(f) if self.async_capable => Adapted::Offloaded(f),
            Callable::Sync(f) => Adapted::Unsupported {
                inner: f,
                error: self.missing_capability(),
            },
        }
    }

    fn missing_capability(&self) -> CapabilityError {
        if self.host_version < ASYNC_SINCE {
            CapabilityError::AsyncUnsupported {
                detected: self.host_version,
                minimum: ASYNC_SINCE,
            }
        } else {
            CapabilityError::RuntimeBridgeUnavailable {
                reason: "the host framework reports no async runtime bridge".to_string(),
            }
        }
    }
}

/// A callable prepared by [`ExecutionAdapter::adapt`].
pub enum Adapted<I, O> {
    /// Already async.
    Native(AsyncFn<I, O>),
    /// Sync logic run on the blocking pool when awaited.
    Offloaded(SyncFn<I, O>),
    /// Sync logic on a host without async support.
    Unsupported {
        inner: SyncFn<I, O>,
        error: CapabilityError,
    },
}

impl<I, O> Clone for Adapted<I, O> {
    fn clone(&self) -> Self {
        match self {
            Self::Native(f) => Self::Native(Arc::clone(f)),
            Self::Offloaded(f) => Self::Offloaded(Arc::clone(f)),
            Self::Unsupported { inner, error } => Self::Unsupported {
                inner: Arc::clone(inner),
                error: error.clone(),
            },
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> Adapted<I, O> {
    /// Invokes the callable from an async caller.
    ///
    /// # Errors
    ///
    /// Returns a `CapabilityError` if the host cannot run async code.
    pub async fn call(&self, input: I) -> Result<O, Report<CapabilityError>> {
        match self {
            Self::Native(f) => Ok(f(input).await),
            Self::Offloaded(f) => {
                let f = Arc::clone(f);
                match tokio::task::spawn_blocking(move || f(input)).await {
                    Ok(output) => Ok(output),
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(e) => Err(CapabilityError::RuntimeBridgeUnavailable {
                        reason: format!("blocking task did not complete: {e}"),
                    }
                    .into()),
                }
            }
            Self::Unsupported { error, .. } => Err(error.clone().into()),
        }
    }

    /// Invokes the callable from a synchronous caller.
    ///
    /// Async callables reuse the surrounding runtime when there is one.
    ///
    /// # Errors
    ///
    /// Fails when an async callable needs a runtime and none can be used:
    /// the caller sits on a current-thread runtime, or a new runtime cannot
    /// be created.
    pub fn call_blocking(&self, input: I) -> Result<O, Report<CapabilityError>> {
        match self {
            Self::Offloaded(f) | Self::Unsupported { inner: f, .. } => Ok(f(input)),
            Self::Native(f) => block_on(f(input)),
        }
    }
}

fn block_on<O>(future: BoxFuture<'static, O>) -> Result<O, Report<CapabilityError>> {
    if let Ok(handle) = Handle::try_current() {
        return match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(|| handle.block_on(future)))
            }
            flavor => Err(CapabilityError::RuntimeBridgeUnavailable {
                reason: format!("cannot block on a {flavor:?} runtime from a synchronous caller"),
            }
            .into()),
        };
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CapabilityError::RuntimeBridgeUnavailable {
            reason: format!("failed to start a runtime for a blocking caller: {e}"),
        })?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::HostFramework;
    use std::thread::{self, ThreadId};

    fn adapter(major: u16) -> ExecutionAdapter {
        let host = HostFramework::new(FrameworkVersion::new(major, 0, 0));
        ExecutionAdapter::new(&Capabilities::resolve(host).expect("resolve"))
    }

    fn double() -> Callable<u32, u32> {
        Callable::sync(|n| n * 2)
    }

    #[tokio::test]
    async fn async_callables_pass_through_unchanged() {
        let adapted = adapter(5).adapt(Callable::from_async(|n: u32| async move { n + 1 }));
        assert!(matches!(adapted, Adapted::Native(_)));
        assert_eq!(adapted.call(1).await.expect("call"), 2);
    }

    #[tokio::test]
    async fn async_callables_pass_through_even_without_capability() {
        let adapted = adapter(2).adapt(Callable::from_async(|n: u32| async move { n + 1 }));
        assert!(matches!(adapted, Adapted::Native(_)));
    }

    #[tokio::test]
    async fn sync_callables_run_on_the_blocking_pool() {
        let caller = thread::current().id();
        let adapted = adapter(5).adapt(Callable::sync(|_: ()| thread::current().id()));
        assert!(matches!(adapted, Adapted::Offloaded(_)));

        let ran_on: ThreadId = adapted.call(()).await.expect("call");
        assert_ne!(ran_on, caller);
    }

    #[tokio::test]
    async fn awaiting_without_capability_fails_loudly() {
        let adapted = adapter(2).adapt(double());
        let err = adapted.call(21).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            CapabilityError::AsyncUnsupported { .. }
        ));
        assert!(err.current_context().to_string().contains("3.0.0"));
    }

    #[tokio::test]
    async fn missing_bridge_is_reported() {
        let host = HostFramework::current().with_async_bridge(false);
        let adapter = ExecutionAdapter::new(&Capabilities::resolve(host).expect("resolve"));
        let err = adapter.adapt(double()).call(1).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            CapabilityError::RuntimeBridgeUnavailable { .. }
        ));
    }

    #[test]
    fn blocking_callers_can_use_every_variant() {
        assert_eq!(adapter(2).adapt(double()).call_blocking(4).expect("sync"), 8);
        assert_eq!(adapter(5).adapt(double()).call_blocking(4).expect("sync"), 8);

        let native = adapter(5).adapt(Callable::from_async(|n: u32| async move { n * 3 }));
        assert_eq!(native.call_blocking(4).expect("async from sync"), 12);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocking_callers_on_a_worker_thread_reuse_the_runtime() {
        let native = adapter(5).adapt(Callable::from_async(|n: u32| async move { n * 3 }));
        assert_eq!(native.call_blocking(2).expect("call"), 6);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocking_callers_on_a_current_thread_runtime_get_an_error() {
        let native = adapter(5).adapt(Callable::from_async(|n: u32| async move { n * 3 }));
        let err = native.call_blocking(2).unwrap_err();
        assert!(matches!(
            err.current_context(),
            CapabilityError::RuntimeBridgeUnavailable { .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocking_callers_inside_the_runtime_reuse_it() {
        let native = adapter(5).adapt(Callable::from_async(|n: u32| async move { n * 3 }));
        let result = tokio::task::spawn_blocking(move || native.call_blocking(5))
            .await
            .expect("join");
        assert_eq!(result.expect("call"), 15);
    }
}
