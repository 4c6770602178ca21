//! Lazy dependency resolver.
//!
//! # Responsibilities
//! - Hold one provider per [`Component`], each with declared dependencies
//! - Build a component only when a verb asks for it (or for a dependent)
//! - Build each component at most once per resolver
//! - Report cycles and missing providers instead of recursing forever
//!
//! # Data Flow
//! ```text
//! verb → resolve([Project, Filters])
//!     → Project ← Config, Logger
//!         → Config ← ConfigLoader, UserConfigDir
//!         → Logger ← Config (already built)
//!     → Filters ← Config (already built)
//! ```
//!
//! # Design Decisions
//! - Values are `Arc<dyn Any>`; typed access happens through `get::<T>`
//! - A provider failure is wrapped with the component it was building;
//!   `Error::root_cause` strips the wrapping for reporting
//! - One resolver per verb invocation; nothing is shared across invocations

pub mod providers;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{Config, Loader};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::observability::Logger;
use crate::project::Project;
use crate::runtime::{CommandFactory, Runtime, Session};
use crate::server::Supervisor;

/// Derived values a verb may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    ConfigLoader,
    Config,
    Logger,
    Project,
    Filters,
    Runtime,
    Session,
    CommandFactory,
    UserConfigDir,
    Server,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Inputs of a verb invocation that providers read.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Working directory of the invocation.
    pub cwd: PathBuf,
    /// `--filename` override.
    pub filename: Option<String>,
    /// `--category` override.
    pub categories: Vec<String>,
    pub config_name: String,
    pub config_ext: String,
    /// Directories searched for the root config before the project directory.
    pub search_dirs: Vec<PathBuf>,
}

impl ResolverOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            filename: None,
            categories: Vec::new(),
            config_name: "runme".to_string(),
            config_ext: "yaml".to_string(),
            search_dirs: Vec::new(),
        }
    }
}

type Value = Arc<dyn Any + Send + Sync>;
type BuildFn = Box<dyn Fn(&Dependencies<'_>, &ResolverOptions) -> Result<Value> + Send + Sync>;

struct Provider {
    deps: Vec<Component>,
    build: BuildFn,
}

/// Already-built dependencies handed to a provider.
pub struct Dependencies<'a> {
    values: &'a HashMap<Component, Value>,
}

impl Dependencies<'_> {
    /// A declared dependency. Asking for an undeclared one is an error.
    pub fn get<T: Any + Send + Sync>(&self, component: Component) -> Result<Arc<T>> {
        let value = self
            .values
            .get(&component)
            .cloned()
            .ok_or(Error::MissingProvider(component))?;
        value
            .downcast::<T>()
            .map_err(|_| Error::TypeMismatch(component))
    }
}

/// Registry of providers and cache of built components.
pub struct Resolver {
    options: ResolverOptions,
    providers: HashMap<Component, Provider>,
    values: HashMap<Component, Value>,
    cancel: CancellationToken,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut built: Vec<_> = self.values.keys().copied().collect();
        built.sort_by_key(|c| c.to_string());
        f.debug_struct("Resolver")
            .field("options", &self.options)
            .field("built", &built)
            .finish()
    }
}

impl Resolver {
    /// A resolver with the default providers registered.
    pub fn new(options: ResolverOptions) -> Self {
        let mut resolver = Self::empty(options);
        providers::register_defaults(&mut resolver);
        resolver
    }

    /// A resolver without any providers.
    pub fn empty(options: ResolverOptions) -> Self {
        Self {
            options,
            providers: HashMap::new(),
            values: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort resolution once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Register (or replace) the provider of `component`.
    pub fn provide<T, F>(&mut self, component: Component, deps: &[Component], build: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies<'_>, &ResolverOptions) -> Result<T> + Send + Sync + 'static,
    {
        self.values.remove(&component);
        self.providers.insert(
            component,
            Provider {
                deps: deps.to_vec(),
                build: Box::new(move |deps, options| {
                    build(deps, options).map(|v| Arc::new(v) as Value)
                }),
            },
        );
    }

    /// Build `components` and their transitive dependencies.
    pub fn resolve(&mut self, components: &[Component]) -> Result<()> {
        let mut stack = Vec::new();
        for component in components {
            self.resolve_one(*component, &mut stack)?;
        }
        Ok(())
    }

    fn resolve_one(&mut self, component: Component, stack: &mut Vec<Component>) -> Result<()> {
        if self.values.contains_key(&component) {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(start) = stack.iter().position(|c| *c == component) {
            let path = stack[start..]
                .iter()
                .chain(std::iter::once(&component))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(Error::Cycle(path));
        }

        let deps = self
            .providers
            .get(&component)
            .ok_or(Error::MissingProvider(component))?
            .deps
            .clone();

        stack.push(component);
        for dep in deps {
            self.resolve_one(dep, stack).map_err(|e| wrap(component, e))?;
        }
        stack.pop();

        let provider = self
            .providers
            .get(&component)
            .ok_or(Error::MissingProvider(component))?;
        let value = (provider.build)(
            &Dependencies {
                values: &self.values,
            },
            &self.options,
        )
        .map_err(|e| wrap(component, e))?;

        tracing::debug!(component = %component, "Component resolved");
        self.values.insert(component, value);
        Ok(())
    }

    /// `component`, building it first if needed.
    pub fn get<T: Any + Send + Sync>(&mut self, component: Component) -> Result<Arc<T>> {
        self.resolve(&[component])?;
        Dependencies {
            values: &self.values,
        }
        .get(component)
    }

    /// Whether `component` has been built.
    pub fn is_resolved(&self, component: Component) -> bool {
        self.values.contains_key(&component)
    }

    pub fn config_loader(&mut self) -> Result<Arc<Loader>> {
        self.get(Component::ConfigLoader)
    }

    pub fn config(&mut self) -> Result<Arc<Config>> {
        self.get(Component::Config)
    }

    pub fn logger(&mut self) -> Result<Arc<Logger>> {
        self.get(Component::Logger)
    }

    pub fn project(&mut self) -> Result<Arc<Project>> {
        self.get(Component::Project)
    }

    pub fn filters(&mut self) -> Result<Arc<Vec<Arc<Filter>>>> {
        self.get(Component::Filters)
    }

    pub fn runtime(&mut self) -> Result<Arc<Runtime>> {
        self.get(Component::Runtime)
    }

    pub fn session(&mut self) -> Result<Arc<Session>> {
        self.get(Component::Session)
    }

    pub fn command_factory(&mut self) -> Result<Arc<CommandFactory>> {
        self.get(Component::CommandFactory)
    }

    pub fn user_config_dir(&mut self) -> Result<Arc<PathBuf>> {
        self.get(Component::UserConfigDir)
    }

    pub fn server(&mut self) -> Result<Arc<Supervisor>> {
        self.get(Component::Server)
    }
}

/// Attribute `error` to `component` unless it already is, or is a
/// structural error of the graph.
fn wrap(component: Component, error: Error) -> Error {
    match error {
        Error::Cycle(_) | Error::Cancelled => error,
        Error::Resolve { component: c, .. } if c == component => error,
        other => Error::Resolve {
            component,
            source: Box::new(other),
        },
    }
}
