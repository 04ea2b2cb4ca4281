//! Worker tasks and the registry the worker resolves them from.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::error::BootstrapError;
use super::launch::InnerConfiguration;
use crate::codec::TaskError;
use crate::logger::{LoggerResult, RemoteLogger, ScopedLoggerManager};
use crate::terminal::{SinkCapabilities, Terminal};

/// What a task gets from the worker it runs in.
#[derive(Clone)]
pub struct WorkerContext {
    terminal: Terminal,
    loggers: Arc<ScopedLoggerManager>,
    inner: InnerConfiguration,
}

impl WorkerContext {
    pub(crate) fn new(
        terminal: Terminal,
        loggers: Arc<ScopedLoggerManager>,
        inner: InnerConfiguration,
    ) -> Self {
        Self {
            terminal,
            loggers,
            inner,
        }
    }

    /// Terminal whose output lands in the supervisor's root sink.
    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn capabilities(&self) -> SinkCapabilities {
        self.inner.capabilities()
    }

    /// Ask the supervisor for the logger of the named plugin.
    pub async fn request_logger(&self, name: &str) -> LoggerResult<RemoteLogger> {
        self.loggers.request_logger(name).await
    }
}

/// A unit of work run inside a worker.
///
/// The worker deserializes the task configuration, constructs the task,
/// then invokes it once.
///
/// # Example
///
/// ```ignore
/// struct Greet { context: WorkerContext, config: GreetConfig }
///
/// #[async_trait]
/// impl WorkerTask for Greet {
///     type Config = GreetConfig;
///
///     fn create(context: WorkerContext, config: GreetConfig) -> Result<Self, TaskError> {
///         Ok(Self { context, config })
///     }
///
///     async fn invoke(&mut self) -> Result<(), TaskError> {
///         self.context.terminal().write_line(&format!("hello {}", self.config.name));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait WorkerTask: Send + Sized + 'static {
    type Config: DeserializeOwned + Send;

    fn create(context: WorkerContext, config: Self::Config) -> Result<Self, TaskError>;

    async fn invoke(&mut self) -> Result<(), TaskError>;
}

/// A constructed task with its configuration type erased.
#[async_trait]
pub trait RunnableTask: Send {
    async fn run(&mut self) -> Result<(), TaskError>;
}

#[async_trait]
impl<T: WorkerTask> RunnableTask for T {
    async fn run(&mut self) -> Result<(), TaskError> {
        self.invoke().await
    }
}

type TaskFactory = Box<
    dyn Fn(WorkerContext, serde_json::Value) -> Result<Box<dyn RunnableTask>, BootstrapError>
        + Send
        + Sync,
>;

/// Tasks a worker can run, keyed by the name used in launch arguments.
#[derive(Default)]
pub struct TaskRegistry {
    factories: BTreeMap<String, TaskFactory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`, replacing any previous registration.
    pub fn register<T: WorkerTask>(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        let task = name.clone();
        let factory: TaskFactory = Box::new(move |context, config| {
            let config: T::Config = serde_json::from_value(config).map_err(|source| {
                BootstrapError::InvalidTaskConfiguration {
                    task: task.clone(),
                    source,
                }
            })?;
            let instance = T::create(context, config).map_err(|error| {
                BootstrapError::Construction {
                    task: task.clone(),
                    error,
                }
            })?;
            Ok(Box::new(instance) as Box<dyn RunnableTask>)
        });
        self.factories.insert(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub(crate) fn instantiate(
        &self,
        name: &str,
        context: WorkerContext,
        config: serde_json::Value,
    ) -> Result<Box<dyn RunnableTask>, BootstrapError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| BootstrapError::UnknownTask(name.to_string()))?;
        factory(context, config)
    }
}
