//! Extension manager: loading by resource path, host-wide initialization
//! levels, reload, main-loop hooks and the persisted extension list.

use std::fs;

use dynext_core::{
    ExtensionError, ExtensionToken, InitializationLevel, LibraryError, StringName,
};
use tracing::{debug, info, warn};

use crate::abi::MainLoopCallbacks;
use crate::library::LibraryLoader;
use crate::runtime::Runtime;

/// Outcome of a manager operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Ok,
    AlreadyLoaded,
    NotLoaded,
    /// The change only takes effect after the host restarts.
    NeedsRestart,
}

impl Runtime {
    // ==========================================================================
    // Loading
    // ==========================================================================

    /// Load the extension at `path`, initializing it up to the host's level.
    pub fn load_extension(
        &mut self,
        path: &str,
        loader: Box<dyn LibraryLoader>,
    ) -> Result<LoadStatus, ExtensionError> {
        if self.extension_paths.contains_key(path) {
            return Ok(LoadStatus::AlreadyLoaded);
        }
        let token = self.open_library(path, loader)?;
        self.extension_paths.insert(path.to_owned(), token);
        let status = self.initialize_to_current_level(token)?;
        if status == LoadStatus::NeedsRestart {
            self.destroy_extension(token);
        } else {
            info!(library = path, "extension loaded");
        }
        Ok(status)
    }

    /// Token of the extension at `path`, loading it first if needed.
    /// Every caller asking for the same path gets the same token.
    pub fn load_extension_resource(
        &mut self,
        path: &str,
        make_loader: impl FnOnce() -> Box<dyn LibraryLoader>,
    ) -> Result<ExtensionToken, ExtensionError> {
        if let Some(token) = self.extension_paths.get(path) {
            return Ok(*token);
        }
        self.load_extension(path, make_loader())?;
        match self.extension_paths.get(path) {
            Some(token) => Ok(*token),
            None => Err(LibraryError::LevelOutOfOrder {
                requested: self.level.unwrap_or(InitializationLevel::Core),
                current: self.level,
            }
            .into()),
        }
    }

    /// Initialize a freshly opened library from its minimum level up to the
    /// host's current level.
    fn initialize_to_current_level(&mut self, token: ExtensionToken) -> Result<LoadStatus, ExtensionError> {
        let Some(current) = self.level else {
            return Ok(LoadStatus::Ok);
        };
        let minimum = self.minimum_initialization_level(token)?;
        if minimum < current.min(InitializationLevel::Scene) {
            self.report_warning(
                Some(token),
                format!("extension needs level '{minimum}' which already passed; restart required"),
            );
            return Ok(LoadStatus::NeedsRestart);
        }
        for level in InitializationLevel::range(minimum, current) {
            self.initialize_library(token, level)?;
        }
        Ok(LoadStatus::Ok)
    }

    /// Deinitialize every level the library reached, highest first.
    fn deinitialize_all_levels(&mut self, token: ExtensionToken) -> Result<(), ExtensionError> {
        let ext = self.extension_ref(token)?;
        let Some(reached) = ext.level_initialized else {
            return Ok(());
        };
        let minimum = ext.initialization.minimum_level;
        for level in InitializationLevel::range(minimum, reached).rev() {
            self.deinitialize_library(token, level)?;
        }
        Ok(())
    }

    /// Deinitialize, close and forget the extension at `path`.
    pub fn unload_extension(&mut self, path: &str) -> Result<LoadStatus, ExtensionError> {
        let Some(token) = self.extension_paths.get(path).copied() else {
            return Ok(LoadStatus::NotLoaded);
        };
        self.deinitialize_all_levels(token)?;
        self.destroy_extension(token);
        info!(library = path, "extension unloaded");
        Ok(LoadStatus::Ok)
    }

    pub fn is_extension_loaded(&self, path: &str) -> bool {
        self.extension_paths.contains_key(path)
    }

    pub fn get_extension(&self, path: &str) -> Option<ExtensionToken> {
        self.extension_paths.get(path).copied()
    }

    /// Resource paths of loaded extensions, sorted.
    pub fn loaded_extensions(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.extension_paths.keys().cloned().collect();
        paths.sort();
        paths
    }

    // ==========================================================================
    // Reload
    // ==========================================================================

    /// Reload the extension at `path` in place.
    ///
    /// Fails midway only when the library cannot be reopened or initialized
    /// again; the extension is then left in its reloading state.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn reload_extension(&mut self, path: &str) -> Result<LoadStatus, ExtensionError> {
        let Some(token) = self.extension_paths.get(path).copied() else {
            return Ok(LoadStatus::NotLoaded);
        };
        if !self.config.tools_enabled || !self.extension_ref(token)?.reloadable {
            return Ok(LoadStatus::NeedsRestart);
        }

        self.prepare_reload(token)?;
        self.deinitialize_all_levels(token)?;
        self.close_library(token)?;
        if let Err(err) = self.open_extension(token) {
            return self.report(Some(token), Err(err));
        }
        let status = self.initialize_to_current_level(token)?;
        if status == LoadStatus::NeedsRestart {
            return Ok(status);
        }
        self.finish_reload(token)?;
        info!(library = path, "extension reloaded");
        Ok(LoadStatus::Ok)
    }

    /// Reload every reloadable extension whose library changed.
    /// Returns the paths that were reloaded.
    pub fn reload_extensions(&mut self) -> Vec<String> {
        let changed: Vec<String> = self
            .loaded_extensions()
            .into_iter()
            .filter(|path| {
                self.get_extension(path)
                    .and_then(|token| self.extension(token))
                    .is_some_and(|ext| ext.is_reloadable() && ext.has_library_changed())
            })
            .collect();

        let mut reloaded = Vec::new();
        for path in changed {
            match self.reload_extension(&path) {
                Ok(LoadStatus::Ok) => reloaded.push(path),
                Ok(status) => debug!(library = %path, ?status, "reload skipped"),
                Err(err) => warn!(library = %path, "reload failed: {err}"),
            }
        }
        reloaded
    }

    // ==========================================================================
    // Host Levels
    // ==========================================================================

    /// Raise the host to `level`, initializing every loaded extension whose
    /// minimum level allows it. Levels must be entered in order.
    pub fn initialize_extensions(&mut self, level: InitializationLevel) -> Result<(), ExtensionError> {
        let expected = match self.level {
            None => Some(InitializationLevel::Core),
            Some(current) => current.next(),
        };
        if expected != Some(level) {
            let result = Err(LibraryError::LevelOutOfOrder {
                requested: level,
                current: self.level,
            }
            .into());
            return self.report(None, result);
        }
        for token in self.extension_tokens() {
            let Ok(minimum) = self.minimum_initialization_level(token) else {
                continue;
            };
            if minimum <= level {
                let _ = self.initialize_library(token, level);
            }
        }
        self.level = Some(level);
        debug!(level = %level, "extensions initialized");
        Ok(())
    }

    /// Lower the host from `level`, deinitializing every extension at it.
    pub fn deinitialize_extensions(&mut self, level: InitializationLevel) -> Result<(), ExtensionError> {
        if self.level != Some(level) {
            let result = Err(LibraryError::LevelOutOfOrder {
                requested: level,
                current: self.level,
            }
            .into());
            return self.report(None, result);
        }
        for token in self.extension_tokens().into_iter().rev() {
            let reached = self
                .extension(token)
                .and_then(|ext| ext.level_initialized);
            if reached.is_some_and(|reached| reached >= level) {
                let _ = self.deinitialize_library(token, level);
            }
        }
        self.level = level.previous();
        debug!(level = %level, "extensions deinitialized");
        Ok(())
    }

    // ==========================================================================
    // Main Loop
    // ==========================================================================

    fn main_loop_hooks(&self, select: impl Fn(&MainLoopCallbacks) -> Option<fn()>) -> Vec<fn()> {
        self.extension_tokens()
            .into_iter()
            .filter_map(|token| self.extension(token))
            .filter_map(|ext| select(&ext.main_loop))
            .collect()
    }

    pub fn startup_extensions(&mut self) {
        for hook in self.main_loop_hooks(|callbacks| callbacks.startup) {
            hook();
        }
    }

    pub fn shutdown_extensions(&mut self) {
        for hook in self.main_loop_hooks(|callbacks| callbacks.shutdown) {
            hook();
        }
    }

    pub fn frame_extensions(&mut self) {
        for hook in self.main_loop_hooks(|callbacks| callbacks.frame) {
            hook();
        }
    }

    // ==========================================================================
    // Editor Queries
    // ==========================================================================

    /// Classes a library reports as used, filtered to classes that exist.
    pub fn classes_used(&self, token: ExtensionToken) -> Vec<StringName> {
        let Some(callback) = self
            .extension(token)
            .and_then(|ext| ext.classes_used_callback)
        else {
            return Vec::new();
        };
        let mut names = Vec::new();
        callback(&mut names);
        names.retain(|name| self.class_db.class_exists(name));
        names.sort();
        names.dedup();
        names
    }

    // ==========================================================================
    // Extension List
    // ==========================================================================

    /// Write the loaded paths, one per line. No-op without a configured path.
    pub fn save_extension_list(&self) -> Result<(), ExtensionError> {
        let Some(path) = &self.config.extension_list_path else {
            return Ok(());
        };
        let mut contents = String::new();
        for extension in self.loaded_extensions() {
            contents.push_str(&extension);
            contents.push('\n');
        }
        fs::write(path, contents)?;
        debug!(path = %path.display(), "extension list saved");
        Ok(())
    }

    /// Read the persisted paths. A missing file means an empty list.
    pub fn read_extension_list(&self) -> Result<Vec<String>, ExtensionError> {
        let Some(path) = &self.config.extension_list_path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(path)?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .collect())
    }
}
