//! The runtime context.
//!
//! A [`Runtime`] owns every table an extension touches: the interface
//! function registry, the class catalog, live objects and the per-library
//! bookkeeping. It is created at host startup and torn down at shutdown.

use dynext_core::{
    Diagnostic, Diagnostics, ExtensionError, ExtensionToken, InitializationLevel, ObjectDb,
    RegistrationError, StringName,
};
use dynext_registry::ClassDb;
use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use crate::config::RuntimeConfig;
use crate::extension::{ClassLink, Extension, ExtensionClass};
use crate::interface::InterfaceRegistry;

pub struct Runtime {
    pub(crate) config: RuntimeConfig,
    pub(crate) interface: InterfaceRegistry,
    pub(crate) class_db: ClassDb,
    pub(crate) objects: ObjectDb,
    pub(crate) extensions: FxHashMap<ExtensionToken, Extension>,
    /// Resource path to token, one entry per loaded extension.
    pub(crate) extension_paths: FxHashMap<String, ExtensionToken>,
    next_token: u64,
    /// Highest level the host has initialized.
    pub(crate) level: Option<InitializationLevel>,
    pub(crate) diagnostics: Diagnostics,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let class_db = if config.register_builtin_classes {
            ClassDb::with_builtin_classes()
        } else {
            ClassDb::new()
        };
        debug!(tools = config.tools_enabled, "runtime created");
        Self {
            config,
            interface: InterfaceRegistry::with_standard_functions(),
            class_db,
            objects: ObjectDb::new(),
            extensions: FxHashMap::default(),
            extension_paths: FxHashMap::default(),
            next_token: 1,
            level: None,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Unload every extension and clear the interface table.
    pub fn teardown(&mut self) {
        while let Some(level) = self.level {
            if self.deinitialize_extensions(level).is_err() {
                break;
            }
        }
        for token in self.extension_tokens() {
            self.destroy_extension(token);
        }
        self.interface.teardown();
        debug!("runtime torn down");
    }

    // ==========================================================================
    // Accessors
    // ==========================================================================

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn interface(&self) -> &InterfaceRegistry {
        &self.interface
    }

    /// Mutable table access for hosts adding their own functions.
    pub fn interface_mut(&mut self) -> &mut InterfaceRegistry {
        &mut self.interface
    }

    pub fn class_db(&self) -> &ClassDb {
        &self.class_db
    }

    pub fn objects(&self) -> &ObjectDb {
        &self.objects
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.drain()
    }

    pub fn current_level(&self) -> Option<InitializationLevel> {
        self.level
    }

    pub fn extension(&self, token: ExtensionToken) -> Option<&Extension> {
        self.extensions.get(&token)
    }

    pub fn extension_class(&self, link: &ClassLink) -> Option<&ExtensionClass> {
        self.extensions.get(&link.library)?.classes.get(&link.class)
    }

    /// Tokens of every known extension, in creation order.
    pub fn extension_tokens(&self) -> Vec<ExtensionToken> {
        let mut tokens: Vec<ExtensionToken> = self.extensions.keys().copied().collect();
        tokens.sort_by_key(|token| token.raw());
        tokens
    }

    // ==========================================================================
    // Internal Helpers
    // ==========================================================================

    pub(crate) fn create_extension(&mut self, path: &str) -> ExtensionToken {
        let token = ExtensionToken::new(self.next_token);
        self.next_token += 1;
        self.extensions.insert(token, Extension::new(token, path));
        token
    }

    pub(crate) fn extension_mut(
        &mut self,
        token: ExtensionToken,
    ) -> Result<&mut Extension, RegistrationError> {
        self.extensions
            .get_mut(&token)
            .ok_or(RegistrationError::UnknownLibrary(token))
    }

    pub(crate) fn extension_ref(&self, token: ExtensionToken) -> Result<&Extension, RegistrationError> {
        self.extensions
            .get(&token)
            .ok_or(RegistrationError::UnknownLibrary(token))
    }

    pub(crate) fn extension_class_mut(&mut self, link: &ClassLink) -> Option<&mut ExtensionClass> {
        self.extensions
            .get_mut(&link.library)?
            .classes
            .get_mut(&link.class)
    }

    pub(crate) fn library_label(&self, token: ExtensionToken) -> String {
        self.extensions
            .get(&token)
            .map_or_else(|| token.to_string(), |ext| ext.path.clone())
    }

    /// Log a failed operation and record it in the diagnostics channel.
    pub(crate) fn report<T>(
        &mut self,
        library: Option<ExtensionToken>,
        result: Result<T, ExtensionError>,
    ) -> Result<T, ExtensionError> {
        if let Err(err) = &result {
            let label = library.map(|token| self.library_label(token));
            error!(library = label.as_deref().unwrap_or("host"), "{err}");
            self.diagnostics
                .add_diagnostic(Diagnostic::error(err.to_string(), label));
        }
        result
    }

    pub(crate) fn report_warning(&mut self, library: Option<ExtensionToken>, message: String) {
        let label = library.map(|token| self.library_label(token));
        warn!(library = label.as_deref().unwrap_or("host"), "{message}");
        self.diagnostics
            .add_diagnostic(Diagnostic::warning(message, label));
    }

    pub(crate) fn report_error(&mut self, library: Option<ExtensionToken>, message: String) {
        let label = library.map(|token| self.library_label(token));
        error!(library = label.as_deref().unwrap_or("host"), "{message}");
        self.diagnostics
            .add_diagnostic(Diagnostic::error(message, label));
    }

    /// Library owning the catalog row of `class`, if it is an extension class.
    pub(crate) fn class_owner(&self, class: &StringName) -> Option<ExtensionToken> {
        self.class_db
            .get(class)
            .filter(|entry| entry.api.is_extension())
            .and_then(|entry| entry.library)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("level", &self.level)
            .field("classes", &self.class_db.class_count())
            .field("objects", &self.objects.len())
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}
