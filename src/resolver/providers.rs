//! Default providers.
//!
//! ```text
//! UserConfigDir  ← (platform)
//! ConfigLoader   ← (cwd, nearest git repository)
//! Config         ← ConfigLoader, UserConfigDir
//! Logger         ← Config
//! Project        ← Config, Logger
//! Filters        ← Config
//! Runtime        ← Config, Logger
//! Session        ← Config, Project
//! CommandFactory ← Config, Runtime, Logger, Session, Project
//! Server         ← Config, Logger
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::validation::validate_filename;
use crate::config::{Config, ConfigError, Loader};
use crate::error::{Error, Result};
use crate::filter::{category_filter_config, Filter};
use crate::observability::Logger;
use crate::project::{find_repo_root, Project};
use crate::resolver::{Component, Resolver, ResolverOptions};
use crate::runtime::{CommandFactory, Runtime, Session};
use crate::server::Supervisor;

pub fn register_defaults(resolver: &mut Resolver) {
    resolver.provide(Component::UserConfigDir, &[], |_, _| user_config_dir());

    resolver.provide(Component::ConfigLoader, &[], |_, options| Ok(config_loader(options)));

    resolver.provide(
        Component::Config,
        &[Component::ConfigLoader, Component::UserConfigDir],
        |deps, options| {
            let loader = deps.get::<Loader>(Component::ConfigLoader)?;
            let user_dir = deps.get::<PathBuf>(Component::UserConfigDir)?;
            load_config(&loader, &user_dir, options)
        },
    );

    resolver.provide(Component::Logger, &[Component::Config], |deps, _| {
        let config = deps.get::<Config>(Component::Config)?;
        Logger::from_config(&config.log)
    });

    resolver.provide(
        Component::Project,
        &[Component::Config, Component::Logger],
        |deps, options| {
            let config = deps.get::<Config>(Component::Config)?;
            Ok(Project::from_config(&config.project, &options.cwd)?)
        },
    );

    resolver.provide(Component::Filters, &[Component::Config], |deps, _| {
        let config = deps.get::<Config>(Component::Config)?;
        let filters: Vec<Arc<Filter>> = config
            .project
            .filters
            .iter()
            .map(|f| Arc::new(Filter::from_config(f)))
            .collect();
        Ok(filters)
    });

    resolver.provide(
        Component::Runtime,
        &[Component::Config, Component::Logger],
        |deps, options| {
            let config = deps.get::<Config>(Component::Config)?;
            Ok(Runtime::from_config(&config.runtime, &options.cwd))
        },
    );

    resolver.provide(
        Component::Session,
        &[Component::Config, Component::Project],
        |deps, _| {
            let config = deps.get::<Config>(Component::Config)?;
            let project = deps.get::<Project>(Component::Project)?;
            Ok(Session::new(
                config.project.env.use_system_env,
                project.load_env()?,
            ))
        },
    );

    resolver.provide(
        Component::CommandFactory,
        &[
            Component::Config,
            Component::Runtime,
            Component::Logger,
            Component::Session,
            Component::Project,
        ],
        |deps, _| {
            let runtime = deps.get::<Runtime>(Component::Runtime)?;
            let session = deps.get::<Session>(Component::Session)?;
            let project = deps.get::<Project>(Component::Project)?;
            Ok(CommandFactory::new(
                (*runtime).clone(),
                session,
                project.root().to_path_buf(),
            ))
        },
    );

    resolver.provide(
        Component::Server,
        &[Component::Config, Component::Logger],
        |deps, _| {
            let config = deps.get::<Config>(Component::Config)?;
            Ok(Supervisor::new(config.server.clone()))
        },
    );
}

fn user_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .ok_or_else(|| Error::Usage("cannot determine the user configuration directory".into()))
}

/// Loader rooted at the enclosing git repository of the working directory.
pub fn config_loader(options: &ResolverOptions) -> Loader {
    let project_dir = find_repo_root(&options.cwd).unwrap_or_else(|| options.cwd.clone());
    Loader::new(
        &options.config_name,
        &options.config_ext,
        options.search_dirs.clone(),
        project_dir,
    )
    .with_working_dir(options.cwd.clone())
}

/// Load the chain for the working directory, then apply CLI overrides and
/// TLS path defaults.
fn load_config(loader: &Loader, user_dir: &Path, options: &ResolverOptions) -> Result<Config> {
    let relative = options
        .cwd
        .strip_prefix(loader.project_dir())
        .unwrap_or_else(|_| Path::new(""));

    let mut config = match loader.load(relative) {
        Ok(config) => config,
        Err(ConfigError::RootConfigNotFound { name }) => {
            tracing::debug!(name = %name, "No config file found, using defaults");
            Config::default()
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(filename) = &options.filename {
        validate_filename(filename, &options.cwd).map_err(|e| ConfigError::Validation(vec![e]))?;
        config.project.filename = Some(filename.clone());
    }
    if !options.categories.is_empty() {
        config
            .project
            .filters
            .push(category_filter_config(&options.categories));
    }

    config.apply_tls_defaults(user_dir);
    Ok(config)
}
