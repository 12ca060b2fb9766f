//! Task callables and argument binding.
//!
//! A task is stored as a `TaskFn`: a closure that receives the request's
//! positional and keyword arguments, binds them eagerly, and hands back the
//! future that performs the work. Binding happens before anything is
//! scheduled, so argument mismatches surface in the acknowledgment while
//! failures inside the future never do.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dispatch_core::{Args, Kwargs};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The unit of work produced by a bound task.
pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Type-erased, shareable task callable.
pub type TaskFn = Arc<dyn Fn(TaskArgs) -> Result<TaskFuture, ArgumentError> + Send + Sync>;

/// Wraps a binding closure into a `TaskFn`, boxing the future it returns.
pub fn task_fn<F, Fut>(task: F) -> TaskFn
where
    F: Fn(TaskArgs) -> Result<Fut, ArgumentError> + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |args: TaskArgs| {
        let future = task(args)?;
        Ok(Box::pin(future) as TaskFuture)
    })
}

// ---------------------------------------------------------------------------
// ArgumentError
// ---------------------------------------------------------------------------

/// Raised while binding request arguments to a task's parameters.
#[derive(Debug, thiserror::Error)]
pub enum ArgumentError {
    #[error("takes {expected} positional arguments but {given} were given")]
    TooManyPositional { expected: usize, given: usize },
    #[error("got an unexpected keyword argument '{0}'")]
    UnexpectedKeyword(String),
    #[error("got multiple values for argument '{0}'")]
    MultipleValues(String),
    #[error("missing required argument '{0}'")]
    Missing(String),
    #[error("invalid value for argument '{name}': {source}")]
    InvalidValue {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// TaskArgs
// ---------------------------------------------------------------------------

/// Positional and keyword arguments as received on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskArgs {
    args: Args,
    kwargs: Kwargs,
}

impl TaskArgs {
    #[must_use]
    pub fn new(args: Args, kwargs: Kwargs) -> Self {
        Self { args, kwargs }
    }

    /// Matches the arguments against an ordered parameter list.
    ///
    /// Positional arguments fill parameters left to right; keyword arguments
    /// fill parameters by name. Surplus positionals, unknown keywords, and a
    /// parameter supplied both ways are rejected.
    ///
    /// # Errors
    ///
    /// Returns the first `ArgumentError` encountered.
    pub fn bind(self, params: &[&'static str]) -> Result<BoundArgs, ArgumentError> {
        if self.args.len() > params.len() {
            return Err(ArgumentError::TooManyPositional {
                expected: params.len(),
                given: self.args.len(),
            });
        }

        let mut slots: Vec<(&'static str, Option<Value>)> =
            params.iter().map(|name| (*name, None)).collect();

        for (slot, value) in slots.iter_mut().zip(self.args) {
            slot.1 = Some(value);
        }

        for (key, value) in self.kwargs {
            let Some(slot) = slots.iter_mut().find(|(name, _)| *name == key) else {
                return Err(ArgumentError::UnexpectedKeyword(key));
            };
            if slot.1.is_some() {
                return Err(ArgumentError::MultipleValues(key));
            }
            slot.1 = Some(value);
        }

        Ok(BoundArgs { slots })
    }
}

// ---------------------------------------------------------------------------
// BoundArgs
// ---------------------------------------------------------------------------

/// Arguments matched to parameter names, ready for typed extraction.
#[derive(Debug)]
pub struct BoundArgs {
    slots: Vec<(&'static str, Option<Value>)>,
}

impl BoundArgs {
    /// Takes a required parameter, deserializing it into `T`.
    ///
    /// # Errors
    ///
    /// Returns `Missing` when no value was supplied, or `InvalidValue` when
    /// the value does not deserialize into `T`.
    pub fn required<T: DeserializeOwned>(&mut self, name: &str) -> Result<T, ArgumentError> {
        match self.take(name) {
            Some(value) => convert(name, value),
            None => Err(ArgumentError::Missing(name.to_string())),
        }
    }

    /// Takes an optional parameter, falling back to `default` when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` when a supplied value does not deserialize into `T`.
    pub fn optional<T: DeserializeOwned>(
        &mut self,
        name: &str,
        default: T,
    ) -> Result<T, ArgumentError> {
        match self.take(name) {
            Some(value) => convert(name, value),
            None => Ok(default),
        }
    }

    fn take(&mut self, name: &str) -> Option<Value> {
        self.slots
            .iter_mut()
            .find(|(param, _)| *param == name)
            .and_then(|(_, value)| value.take())
    }
}

fn convert<T: DeserializeOwned>(name: &str, value: Value) -> Result<T, ArgumentError> {
    serde_json::from_value(value).map_err(|source| ArgumentError::InvalidValue {
        name: name.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
