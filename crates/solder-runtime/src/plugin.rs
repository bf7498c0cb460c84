//! Plugin descriptors and dependency-ordered loading.
//!
//! A plugin is a named bundle of commands, middleware and hooks that installs
//! itself into a [`Bot`] through its `register` function.  Plugins can depend
//! on each other by name; the [`PluginManager`] loads them in topological
//! order so a plugin always finds what it depends on already installed, and
//! tears them down in the reverse order.
//!
//! # Example
//!
//! ```rust,ignore
//! use solder_runtime::plugin::{PluginDescriptor, PluginManager};
//!
//! let mut plugins = PluginManager::new();
//! plugins.add(PluginDescriptor::new("points", |bot| {
//!     Box::pin(async move {
//!         bot.add_command(points_command()).await;
//!         Ok(())
//!     })
//! }));
//! plugins.add(
//!     PluginDescriptor::new("duel", register_duel).depends_on(["points"]),
//! );
//! plugins.register_all(&bot).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use solder_core::{Bot, BoxError};
use tracing::{info, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Future returned by plugin lifecycle functions.
pub type PluginFuture = BoxFuture<'static, Result<(), BoxError>>;

/// A plugin lifecycle function; receives a handle to the bot it installs
/// into (or uninstalls from).
pub type PluginFn = Arc<dyn Fn(Bot) -> PluginFuture + Send + Sync>;

/// Identifies a plugin and how to load it.
#[derive(Clone)]
pub struct PluginDescriptor {
    name: String,
    depends_on: Vec<String>,
    register: PluginFn,
    teardown: Option<PluginFn>,
}

impl PluginDescriptor {
    /// Creates a descriptor for `name` with its register function.
    pub fn new<F>(name: impl Into<String>, register: F) -> Self
    where
        F: Fn(Bot) -> PluginFuture + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            register: Arc::new(register),
            teardown: None,
        }
    }

    /// Declares the plugins that must be loaded before this one.
    pub fn depends_on(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    /// Sets a teardown function, run at shutdown in reverse load order.
    pub fn teardown<F>(mut self, teardown: F) -> Self
    where
        F: Fn(Bot) -> PluginFuture + Send + Sync + 'static,
    {
        self.teardown = Some(Arc::new(teardown));
        self
    }

    /// The plugin's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

/// Computes a load order via Kahn's algorithm.
///
/// An edge **A → B** means "A must load before B".  Unresolved dependencies
/// are logged and skipped; registration order breaks ties.
///
/// # Errors
///
/// Returns the names of the offending plugins when the graph has a cycle.
fn topological_order(plugins: &[PluginDescriptor]) -> Result<Vec<usize>, String> {
    let n = plugins.len();

    let by_name: HashMap<&str, usize> = plugins
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.as_str(), i))
        .collect();

    let mut in_degree: Vec<usize> = vec![0; n];
    let mut dependents: Vec<Vec<usize>> = vec![vec![]; n];

    for (i, plugin) in plugins.iter().enumerate() {
        for dep in &plugin.depends_on {
            match by_name.get(dep.as_str()) {
                Some(&provider) if provider != i => {
                    dependents[provider].push(i);
                    in_degree[i] += 1;
                }
                Some(_) => {
                    warn!(plugin = %plugin.name, "Plugin depends on itself — ignored");
                }
                None => {
                    warn!(
                        plugin = %plugin.name,
                        dependency = %dep,
                        "Unresolved dependency — load order for it is not guaranteed"
                    );
                }
            }
        }
    }

    let mut order: Vec<usize> = Vec::with_capacity(n);
    let mut frontier: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    frontier.reverse();

    while let Some(i) = frontier.pop() {
        order.push(i);
        for &j in &dependents[i] {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                frontier.push(j);
            }
        }
        // Keep registration order among plugins that became ready together.
        frontier.sort_unstable_by(|a, b| b.cmp(a));
    }

    if order.len() != n {
        let cycle: Vec<&str> = (0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| plugins[i].name.as_str())
            .collect();
        return Err(cycle.join(", "));
    }

    Ok(order)
}

/// Loads and unloads plugins in dependency order.
#[derive(Default)]
pub struct PluginManager {
    descriptors: Vec<PluginDescriptor>,
    loaded: Vec<PluginDescriptor>,
}

impl PluginManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin.  Not loaded until [`register_all`](Self::register_all).
    pub fn add(&mut self, descriptor: PluginDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// `true` when no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Names of the loaded plugins, in load order.
    pub fn loaded(&self) -> Vec<&str> {
        self.loaded.iter().map(|p| p.name.as_str()).collect()
    }

    /// Loads every plugin in dependency order.
    ///
    /// Stops at the first failing register function; plugins loaded up to
    /// that point stay loaded and are torn down by
    /// [`teardown_all`](Self::teardown_all).
    pub async fn register_all(&mut self, bot: &Bot) -> RuntimeResult<()> {
        let order = topological_order(&self.descriptors).map_err(RuntimeError::PluginCycle)?;

        for i in order {
            let plugin = self.descriptors[i].clone();
            (plugin.register)(bot.clone())
                .await
                .map_err(|e| RuntimeError::plugin(&plugin.name, e.to_string()))?;
            info!(plugin = %plugin.name, "Plugin loaded");
            self.loaded.push(plugin);
        }

        Ok(())
    }

    /// Tears down loaded plugins in reverse load order.
    ///
    /// Teardown failures are logged, not propagated; one misbehaving plugin
    /// must not keep the rest installed.
    pub async fn teardown_all(&mut self, bot: &Bot) {
        for plugin in self.loaded.drain(..).rev() {
            let Some(teardown) = &plugin.teardown else {
                continue;
            };
            match teardown(bot.clone()).await {
                Ok(()) => info!(plugin = %plugin.name, "Plugin unloaded"),
                Err(e) => warn!(plugin = %plugin.name, error = %e, "Plugin teardown failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use solder_core::StaticPermissions;

    fn test_bot() -> Bot {
        Bot::builder()
            .permissions(Arc::new(StaticPermissions::new()))
            .build()
            .unwrap()
    }

    fn recording(
        name: &str,
        log: &Arc<Mutex<Vec<String>>>,
        deps: &[&str],
    ) -> PluginDescriptor {
        let entry = name.to_string();
        let log = Arc::clone(log);
        PluginDescriptor::new(name, move |_bot| {
            let log = Arc::clone(&log);
            let entry = entry.clone();
            Box::pin(async move {
                log.lock().push(entry);
                Ok(())
            })
        })
        .depends_on(deps.iter().copied())
    }

    #[tokio::test]
    async fn dependencies_load_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        manager.add(recording("duel", &log, &["points"]));
        manager.add(recording("points", &log, &[]));
        manager.add(recording("greeter", &log, &[]));

        let bot = test_bot();
        manager.register_all(&bot).await.unwrap();

        let order = log.lock().clone();
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("points") < pos("duel"));
        assert_eq!(order.len(), 3);
        bot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn cycles_are_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        manager.add(recording("a", &log, &["b"]));
        manager.add(recording("b", &log, &["a"]));

        let bot = test_bot();
        let result = manager.register_all(&bot).await;
        assert!(matches!(result, Err(RuntimeError::PluginCycle(_))));
        assert!(log.lock().is_empty());
        bot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unresolved_dependency_still_loads() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        manager.add(recording("solo", &log, &["missing"]));

        let bot = test_bot();
        manager.register_all(&bot).await.unwrap();
        assert_eq!(log.lock().as_slice(), ["solo"]);
        bot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn teardown_runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        for name in ["first", "second"] {
            let down = Arc::clone(&log);
            let entry = format!("down:{name}");
            manager.add(
                recording(name, &log, &[]).teardown(move |_bot| {
                    let down = Arc::clone(&down);
                    let entry = entry.clone();
                    Box::pin(async move {
                        down.lock().push(entry);
                        Ok(())
                    })
                }),
            );
        }

        let bot = test_bot();
        manager.register_all(&bot).await.unwrap();
        manager.teardown_all(&bot).await;

        let order = log.lock().clone();
        assert_eq!(order, ["first", "second", "down:second", "down:first"]);
        bot.stop().await.unwrap();
    }
}
