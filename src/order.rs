//! Build order handling for loading, saving, and validating package orders.
//!
//! A build order is the declarative record the driver executes: which
//! packages to hand to the bakery, where the output lands, and which
//! packages build from a local source tree instead of a fetched one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};
use crate::platform::PlatformTarget;

/// How a single package gets built, resolved from the order's overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildProcedure {
    /// The bakery fetches and builds its own copy of the package.
    Managed,
    /// The bakery builds from a local source tree, optionally with a
    /// recipe file that replaces the packaged one.
    LocalSource {
        source: PathBuf,
        recipe: Option<PathBuf>,
    },
}

/// Declarative build order that can be saved/loaded as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOrder {
    /// Where built artifacts land. Relative paths in an order file resolve
    /// against the file's parent directory.
    pub output_dir: PathBuf,
    /// Packages in build sequence; the driver stops at the first failure.
    pub packages: Vec<String>,
    /// Package name -> local source tree replacing the bakery's fetch.
    #[serde(default)]
    pub use_source: BTreeMap<String, PathBuf>,
    /// Package name -> recipe file replacing the packaged one.
    #[serde(default)]
    pub use_recipe: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub platform: PlatformTarget,
}

impl BuildOrder {
    /// Save the order to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(())
    }

    /// Load an order from a JSON file, resolve its relative paths against
    /// the file's parent directory, and validate it.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            BuildError::order(format!("cannot read order file {}: {e}", path.display()))
        })?;

        let mut order: Self = serde_json::from_str(&content)?;
        if let Some(parent) = path.parent() {
            order.anchor(parent);
        }
        order.validate()?;
        Ok(order)
    }

    /// Validate the order
    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(BuildError::order("output_dir must be specified"));
        }
        if self.packages.is_empty() {
            return Err(BuildError::order("order declares no packages"));
        }

        let mut seen = BTreeSet::new();
        for name in &self.packages {
            if name.trim().is_empty() {
                return Err(BuildError::order("package names must be non-empty"));
            }
            if !seen.insert(name.as_str()) {
                return Err(BuildError::order(format!(
                    "package '{name}' is declared more than once"
                )));
            }
        }

        for key in self.use_source.keys() {
            if !seen.contains(key.as_str()) {
                return Err(BuildError::order(format!(
                    "use_source override for '{key}' does not name a declared package"
                )));
            }
        }
        for key in self.use_recipe.keys() {
            if !seen.contains(key.as_str()) {
                return Err(BuildError::order(format!(
                    "use_recipe override for '{key}' does not name a declared package"
                )));
            }
            if !self.use_source.contains_key(key) {
                return Err(BuildError::order(format!(
                    "use_recipe override for '{key}' requires a use_source override"
                )));
            }
        }

        Ok(())
    }

    /// Resolve the procedure for one declared package.
    pub fn procedure(&self, package: &str) -> BuildProcedure {
        match self.use_source.get(package) {
            Some(source) => BuildProcedure::LocalSource {
                source: source.clone(),
                recipe: self.use_recipe.get(package).cloned(),
            },
            None => BuildProcedure::Managed,
        }
    }

    // Rebase relative paths so an order means the same thing no matter
    // where the driver was started from.
    fn anchor(&mut self, base: &Path) {
        if base.as_os_str().is_empty() {
            return;
        }
        rebase(&mut self.output_dir, base);
        for path in self.use_source.values_mut() {
            rebase(path, base);
        }
        for path in self.use_recipe.values_mut() {
            rebase(path, base);
        }
    }
}

fn rebase(path: &mut PathBuf, base: &Path) {
    if !path.is_absolute() {
        let joined = base.join(&*path);
        *path = joined;
    }
}

impl Default for BuildOrder {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("dist"),
            packages: vec![
                "easylzma".to_string(),
                "boost".to_string(),
                "bp-file".to_string(),
                "service_testing".to_string(),
            ],
            use_source: BTreeMap::from([("bp-file".to_string(), PathBuf::from("bp-file"))]),
            use_recipe: BTreeMap::from([(
                "bp-file".to_string(),
                PathBuf::from("bp-file/recipe.rb"),
            )]),
            verbose: true,
            platform: PlatformTarget::Default,
        }
    }
}
