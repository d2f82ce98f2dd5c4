//! Handler seam between the registry and application code.

use crate::error::bridge::BridgeError;
use crate::marshal;

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Boxed future returned by handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Ways a handler invocation can fail.
#[derive(Debug, Clone)]
pub enum HandlerFailure {
    /// The handler's own typed error, as a native JSON value. It is encoded
    /// against the command's error shape and reaches the caller verbatim.
    Failed(Value),

    /// The handler could not accept its arguments or produce a serializable
    /// result.
    Rejected(BridgeError),
}

/// Object-safe handler over validated native values.
///
/// `args` has already been decoded against the command's argument record.
/// The returned value is encoded against the command's result shape.
pub trait CommandHandler: Send + Sync + 'static {
    fn call(&self, args: Value) -> BoxFuture<'static, Result<Value, HandlerFailure>>;
}

/// Adapts an `async fn(A) -> Result<R, E>` into a [`CommandHandler`].
pub struct TypedHandler<F, A, R, E, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Serialize + Send + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(A) -> Fut>,
}

impl<F, A, R, E, Fut> TypedHandler<F, A, R, E, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Serialize + Send + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, A, R, E, Fut> CommandHandler for TypedHandler<F, A, R, E, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Serialize + Send + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    fn call(&self, args: Value) -> BoxFuture<'static, Result<Value, HandlerFailure>> {
        let parsed: A = match marshal::into_typed(args) {
            Ok(parsed) => parsed,
            Err(e) => return Box::pin(async move { Err(HandlerFailure::Rejected(e)) }),
        };

        let fut = (self.handler)(parsed);
        Box::pin(async move {
            match fut.await {
                Ok(result) => serde_json::to_value(result).map_err(|e| {
                    HandlerFailure::Rejected(BridgeError::schema_mismatch(
                        "$",
                        format!("handler result is not serializable: {e}"),
                    ))
                }),
                Err(error) => match serde_json::to_value(error) {
                    Ok(error) => Err(HandlerFailure::Failed(error)),
                    Err(e) => Err(HandlerFailure::Rejected(BridgeError::schema_mismatch(
                        "$",
                        format!("handler error is not serializable: {e}"),
                    ))),
                },
            }
        })
    }
}
