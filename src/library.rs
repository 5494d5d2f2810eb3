//! Library lifecycle: open, staged initialization, deinitialization, close.

use dynext_core::{
    ExtensionError, ExtensionToken, InitializationLevel, InstanceId, LibraryError,
    RegistrationError,
};
use tracing::{debug, info, trace};

use crate::abi::Initialization;
use crate::extension::{ClassLink, Extension};
use crate::interface::InterfaceRegistry;
use crate::runtime::Runtime;

/// Source of a library's code.
///
/// A loader opens the library, runs its entry handshake and closes it again.
/// One loader serves one extension across every reload.
pub trait LibraryLoader {
    /// Make the library's code available.
    fn open_library(&mut self, path: &str) -> Result<(), LibraryError>;

    /// Run the entry function against the host's interface table.
    fn initialize(
        &mut self,
        interface: &InterfaceRegistry,
        library: ExtensionToken,
        initialization: &mut Initialization,
    ) -> Result<(), LibraryError>;

    fn close_library(&mut self);

    fn is_library_open(&self) -> bool;

    /// Whether the library on disk differs from the one that is open.
    fn has_library_changed(&self) -> bool;

    /// Path of the code actually loaded, if it differs from the resource path.
    fn library_path(&self) -> Option<&str>;
}

impl Runtime {
    /// Open a library and run its entry handshake.
    pub fn open_library(
        &mut self,
        path: &str,
        loader: Box<dyn LibraryLoader>,
    ) -> Result<ExtensionToken, ExtensionError> {
        let token = self.create_extension(path);
        if let Some(ext) = self.extensions.get_mut(&token) {
            ext.loader = Some(loader);
        }
        match self.open_extension(token) {
            Ok(()) => Ok(token),
            Err(err) => {
                let result = self.report(Some(token), Err(err));
                self.extensions.remove(&token);
                result
            }
        }
    }

    /// Open (or reopen) the library behind an existing extension.
    pub(crate) fn open_extension(&mut self, token: ExtensionToken) -> Result<(), ExtensionError> {
        let tools = self.config.tools_enabled;
        let ext = self
            .extensions
            .get_mut(&token)
            .ok_or(RegistrationError::UnknownLibrary(token))?;
        let loader = ext.loader.as_mut().ok_or(LibraryError::NoLoader)?;
        if loader.is_library_open() {
            return Err(LibraryError::AlreadyOpen(ext.path.clone()).into());
        }
        loader.open_library(&ext.path)?;

        let mut initialization = Initialization::default();
        if let Err(err) = loader.initialize(&self.interface, token, &mut initialization) {
            loader.close_library();
            return Err(err.into());
        }
        ext.reloadable = initialization.reloadable && tools;
        ext.initialization = initialization;
        ext.level_initialized = None;
        info!(
            library = %ext.path,
            minimum_level = %ext.initialization.minimum_level,
            reloadable = ext.reloadable,
            "opened library"
        );
        Ok(())
    }

    /// Close a library, freeing every instance binding it attached first.
    pub fn close_library(&mut self, token: ExtensionToken) -> Result<(), ExtensionError> {
        let result = self.close_library_internal(token);
        self.report(Some(token), result)
    }

    fn close_library_internal(&mut self, token: ExtensionToken) -> Result<(), ExtensionError> {
        let ext = self.extension_mut(token)?;
        if !ext.is_library_open() {
            return Err(LibraryError::NotOpen.into());
        }
        let bound: Vec<InstanceId> = ext.instance_bindings.drain().collect();
        ext.class_icon_paths.clear();
        for id in &bound {
            if let Some(object) = self.objects.get_mut(*id) {
                object.free_instance_binding(token);
            }
        }
        let ext = self.extension_mut(token)?;
        if let Some(loader) = ext.loader.as_mut() {
            loader.close_library();
        }
        debug!(library = %ext.path, bindings = bound.len(), "closed library");
        Ok(())
    }

    /// Lowest level at which the library wants to be initialized.
    pub fn minimum_initialization_level(
        &self,
        token: ExtensionToken,
    ) -> Result<InitializationLevel, ExtensionError> {
        Ok(self.extension_ref(token)?.initialization.minimum_level)
    }

    /// Run the library's initialize callback for `level`. Levels must rise.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn initialize_library(
        &mut self,
        token: ExtensionToken,
        level: InitializationLevel,
    ) -> Result<(), ExtensionError> {
        let result = self.initialize_library_internal(token, level);
        self.report(Some(token), result)
    }

    fn initialize_library_internal(
        &mut self,
        token: ExtensionToken,
        level: InitializationLevel,
    ) -> Result<(), ExtensionError> {
        let ext = self.extension_mut(token)?;
        if !ext.is_library_open() {
            return Err(LibraryError::NotOpen.into());
        }
        if ext.level_initialized.is_some_and(|current| level <= current) {
            return Err(LibraryError::LevelOutOfOrder {
                requested: level,
                current: ext.level_initialized,
            }
            .into());
        }
        ext.level_initialized = Some(level);
        let initialize = ext.initialization.initialize;
        let userdata = ext.initialization.userdata.clone();
        trace!(library = %ext.path, level = %level, "initializing library");
        if let Some(initialize) = initialize {
            initialize(self, token, userdata.as_ref(), level);
        }
        Ok(())
    }

    /// Run the library's deinitialize callback for `level`, the highest level
    /// it reached.
    pub fn deinitialize_library(
        &mut self,
        token: ExtensionToken,
        level: InitializationLevel,
    ) -> Result<(), ExtensionError> {
        let result = self.deinitialize_library_internal(token, level);
        self.report(Some(token), result)
    }

    fn deinitialize_library_internal(
        &mut self,
        token: ExtensionToken,
        level: InitializationLevel,
    ) -> Result<(), ExtensionError> {
        let ext = self.extension_mut(token)?;
        if ext.level_initialized.is_none_or(|current| level > current) {
            return Err(LibraryError::LevelOutOfOrder {
                requested: level,
                current: ext.level_initialized,
            }
            .into());
        }
        let minimum = ext.initialization.minimum_level;
        ext.level_initialized = level.previous().filter(|previous| *previous >= minimum);
        let deinitialize = ext.initialization.deinitialize;
        let userdata = ext.initialization.userdata.clone();
        trace!(library = %ext.path, level = %level, "deinitializing library");
        if let Some(deinitialize) = deinitialize {
            deinitialize(self, token, userdata.as_ref(), level);
        }
        Ok(())
    }

    /// Path of the code actually loaded for a library.
    pub fn get_library_path(&self, token: ExtensionToken) -> Result<String, ExtensionError> {
        let ext = self.extension_ref(token)?;
        let path = ext
            .loader
            .as_ref()
            .and_then(|loader| loader.library_path())
            .unwrap_or(&ext.path);
        Ok(path.to_owned())
    }

    /// Tear an extension down: free the instances it still owns, drop its
    /// catalog rows and close it. Retired binds and the loader go last.
    pub(crate) fn destroy_extension(&mut self, token: ExtensionToken) -> Option<Extension> {
        let bound: Vec<(InstanceId, ClassLink)> = self
            .objects
            .ids()
            .filter_map(|id| {
                let binding = self.objects.get(id)?.extension()?;
                (binding.library == token).then(|| (id, ClassLink::new(token, binding.class.clone())))
            })
            .collect();
        for (id, link) in bound {
            let instance = self
                .objects
                .get_mut(id)
                .and_then(|object| object.clear_internal_extension());
            if let Some(instance) = instance {
                self.free_instance_data(&link, instance);
            }
        }
        for class in self.class_db.classes_of_library(token) {
            self.class_db.unregister_class(&class);
        }
        if self.extension(token).is_some_and(Extension::is_library_open) {
            let _ = self.close_library(token);
        }

        let mut ext = self.extensions.remove(&token)?;
        self.extension_paths.retain(|_, mapped| *mapped != token);
        for class in ext.classes.values() {
            for method in class.methods.values() {
                method.invalidate();
            }
        }
        let retired = ext.invalid_methods.len();
        ext.invalid_methods.clear();
        ext.classes.clear();
        debug!(library = %ext.path, retired_methods = retired, "extension destroyed");
        Some(ext)
    }
}
