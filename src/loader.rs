//! Library loaders.
//!
//! [`DylibLoader`] loads a shared library from disk with `libloading`.
//! [`EmbeddedLoader`] wraps an entry function compiled into the host, which
//! is how statically linked extensions and tests plug in.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use dynext_core::{ExtensionToken, LibraryError};
use libloading::{Library, Symbol};
use tracing::{debug, warn};

use crate::abi::{EntryFn, Initialization};
use crate::interface::InterfaceRegistry;
use crate::library::LibraryLoader;

/// Entry symbol looked up when none is configured.
pub const DEFAULT_ENTRY_SYMBOL: &str = "dynext_library_init";

// ============================================================================
// Dynamic Library Loader
// ============================================================================

/// Loads a library from a shared object.
///
/// Closed images are kept mapped until the loader is dropped because
/// instances and binds created by them may still be released afterwards.
/// Reopening the same path would hand back that stale image, so every open
/// after the first loads a generation-suffixed copy of the file instead.
/// With copy-on-load enabled the first open copies too, which leaves the
/// original file free to be overwritten by a rebuild.
pub struct DylibLoader {
    entry_symbol: String,
    copy_on_load: bool,
    library: Option<Library>,
    retired: Vec<Library>,
    source: Option<PathBuf>,
    loaded_path: Option<String>,
    loaded_modified: Option<SystemTime>,
    copies: Vec<PathBuf>,
    generation: u32,
    /// Some image was mapped by this loader.
    opened: bool,
}

impl Default for DylibLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DylibLoader {
    pub fn new() -> Self {
        Self {
            entry_symbol: DEFAULT_ENTRY_SYMBOL.to_owned(),
            copy_on_load: false,
            library: None,
            retired: Vec::new(),
            source: None,
            loaded_path: None,
            loaded_modified: None,
            copies: Vec::new(),
            generation: 0,
            opened: false,
        }
    }

    pub fn with_entry_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.entry_symbol = symbol.into();
        self
    }

    /// Copy the library before the first open as well.
    pub fn with_copy_on_load(mut self, enabled: bool) -> Self {
        self.copy_on_load = enabled;
        self
    }

    pub fn entry_symbol(&self) -> &str {
        &self.entry_symbol
    }

    /// Closed images still mapped.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Whether the next open loads a copy rather than the file itself.
    pub fn copies_on_open(&self) -> bool {
        self.copy_on_load || self.opened
    }

    fn modified(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|meta| meta.modified()).ok()
    }

    fn copy_for_load(&mut self, source: &Path) -> Result<PathBuf, LibraryError> {
        self.generation += 1;
        let target = generation_path(source, self.generation);
        fs::copy(source, &target).map_err(|err| LibraryError::OpenError {
            path: target.display().to_string(),
            reason: err.to_string(),
        })?;
        self.copies.push(target.clone());
        Ok(target)
    }
}

/// `dir/libfoo.so` becomes `dir/libfoo.~3.so` for generation 3.
fn generation_path(source: &Path, generation: u32) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match source.extension() {
        Some(ext) => format!("{stem}.~{generation}.{}", ext.to_string_lossy()),
        None => format!("{stem}.~{generation}"),
    };
    source.with_file_name(name)
}

impl LibraryLoader for DylibLoader {
    fn open_library(&mut self, path: &str) -> Result<(), LibraryError> {
        let source = PathBuf::from(path);
        if !source.is_file() {
            return Err(LibraryError::NotFound(path.to_owned()));
        }
        let modified = Self::modified(&source);
        let load_path = if self.copies_on_open() {
            self.copy_for_load(&source)?
        } else {
            source.clone()
        };

        // SAFETY: running a library's initializers is inherent to loading
        // an extension; the host trusts the libraries it is told to load.
        let library = unsafe { Library::new(&load_path) }.map_err(|err| LibraryError::OpenError {
            path: load_path.display().to_string(),
            reason: err.to_string(),
        })?;
        debug!(path = %load_path.display(), "loaded shared library");
        self.library = Some(library);
        self.opened = true;
        self.source = Some(source);
        self.loaded_path = Some(load_path.display().to_string());
        self.loaded_modified = modified;
        Ok(())
    }

    fn initialize(
        &mut self,
        interface: &InterfaceRegistry,
        library: ExtensionToken,
        initialization: &mut Initialization,
    ) -> Result<(), LibraryError> {
        let handle = self.library.as_ref().ok_or(LibraryError::NotOpen)?;
        // SAFETY: the entry symbol is declared with the `EntryFn` signature
        // by every library built against this crate.
        let entry: EntryFn = unsafe {
            let symbol: Symbol<EntryFn> = handle
                .get(self.entry_symbol.as_bytes())
                .map_err(|_| LibraryError::EntryPointMissing(self.entry_symbol.clone()))?;
            *symbol
        };
        if entry(interface, library, initialization) {
            Ok(())
        } else {
            Err(LibraryError::InitializationFailed(self.entry_symbol.clone()))
        }
    }

    fn close_library(&mut self) {
        if let Some(library) = self.library.take() {
            self.retired.push(library);
        }
    }

    fn is_library_open(&self) -> bool {
        self.library.is_some()
    }

    fn has_library_changed(&self) -> bool {
        let Some(source) = &self.source else {
            return false;
        };
        match (Self::modified(source), self.loaded_modified) {
            (Some(current), Some(loaded)) => current != loaded,
            _ => false,
        }
    }

    fn library_path(&self) -> Option<&str> {
        self.loaded_path.as_deref()
    }
}

impl Drop for DylibLoader {
    fn drop(&mut self) {
        self.library = None;
        self.retired.clear();
        for copy in self.copies.drain(..) {
            if let Err(err) = fs::remove_file(&copy) {
                warn!(path = %copy.display(), "failed to remove library copy: {err}");
            }
        }
    }
}

// ============================================================================
// Embedded Loader
// ============================================================================

/// Entry closure of an embedded library.
pub type EmbeddedEntry = dyn Fn(&InterfaceRegistry, ExtensionToken, &mut Initialization) -> bool;

/// Loader for a library compiled into the host.
#[derive(Clone)]
pub struct EmbeddedLoader {
    entry: Arc<EmbeddedEntry>,
    open: bool,
    changed: Arc<AtomicBool>,
}

impl EmbeddedLoader {
    pub fn new(
        entry: impl Fn(&InterfaceRegistry, ExtensionToken, &mut Initialization) -> bool + 'static,
    ) -> Self {
        Self {
            entry: Arc::new(entry),
            open: false,
            changed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_entry(entry: EntryFn) -> Self {
        Self::new(entry)
    }

    /// Flag reported by `has_library_changed`; cleared on every open.
    pub fn change_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.changed)
    }
}

impl LibraryLoader for EmbeddedLoader {
    fn open_library(&mut self, _path: &str) -> Result<(), LibraryError> {
        self.open = true;
        self.changed.store(false, Ordering::Release);
        Ok(())
    }

    fn initialize(
        &mut self,
        interface: &InterfaceRegistry,
        library: ExtensionToken,
        initialization: &mut Initialization,
    ) -> Result<(), LibraryError> {
        if !self.open {
            return Err(LibraryError::NotOpen);
        }
        if (self.entry)(interface, library, initialization) {
            Ok(())
        } else {
            Err(LibraryError::InitializationFailed("embedded entry".to_owned()))
        }
    }

    fn close_library(&mut self) {
        self.open = false;
    }

    fn is_library_open(&self) -> bool {
        self.open
    }

    fn has_library_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }

    fn library_path(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(_: &InterfaceRegistry, _: ExtensionToken, init: &mut Initialization) -> bool {
        init.reloadable = true;
        true
    }

    #[test]
    fn generation_path_keeps_extension() {
        let path = generation_path(Path::new("/tmp/libfoo.so"), 3);
        assert_eq!(path, PathBuf::from("/tmp/libfoo.~3.so"));
        let path = generation_path(Path::new("bin/foo"), 1);
        assert_eq!(path, PathBuf::from("bin/foo.~1"));
    }

    #[test]
    fn dylib_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("libmissing.so");
        let mut loader = DylibLoader::new();
        let err = loader.open_library(&missing.display().to_string()).unwrap_err();
        assert!(matches!(err, LibraryError::NotFound(_)));
        assert!(!loader.is_library_open());
        assert!(!loader.has_library_changed());
    }

    #[test]
    fn dylib_rejects_non_library() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("libbogus.so");
        fs::write(&bogus, b"not a shared object").unwrap();
        let mut loader = DylibLoader::new().with_copy_on_load(true);
        let err = loader.open_library(&bogus.display().to_string()).unwrap_err();
        assert!(matches!(err, LibraryError::OpenError { .. }));
        drop(loader);
        assert!(!dir.path().join("libbogus.~1.so").exists());
    }

    #[test]
    fn reopen_loads_a_fresh_copy() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("libbogus.so");
        fs::write(&bogus, b"not a shared object").unwrap();
        let mut loader = DylibLoader::new();
        assert!(!loader.copies_on_open());
        assert!(loader.open_library(&bogus.display().to_string()).is_err());
        assert!(!dir.path().join("libbogus.~1.so").exists());

        // As if a previous image were still mapped.
        loader.opened = true;
        assert!(loader.copies_on_open());
        assert!(loader.open_library(&bogus.display().to_string()).is_err());
        assert!(dir.path().join("libbogus.~1.so").exists());
        drop(loader);
        assert!(!dir.path().join("libbogus.~1.so").exists());
    }

    #[test]
    fn dylib_initialize_requires_open() {
        let mut loader = DylibLoader::new().with_entry_symbol("custom_init");
        assert_eq!(loader.entry_symbol(), "custom_init");
        let interface = InterfaceRegistry::new();
        let mut init = Initialization::default();
        assert_eq!(
            loader
                .initialize(&interface, ExtensionToken::new(1), &mut init)
                .unwrap_err(),
            LibraryError::NotOpen
        );
    }

    #[test]
    fn embedded_lifecycle() {
        let mut loader = EmbeddedLoader::from_entry(entry);
        let interface = InterfaceRegistry::new();
        let mut init = Initialization::default();

        assert!(loader.initialize(&interface, ExtensionToken::new(1), &mut init).is_err());
        loader.open_library("embedded").unwrap();
        loader
            .initialize(&interface, ExtensionToken::new(1), &mut init)
            .unwrap();
        assert!(init.reloadable);

        let flag = loader.change_flag();
        flag.store(true, Ordering::Release);
        assert!(loader.has_library_changed());
        loader.close_library();
        assert!(!loader.is_library_open());
        loader.open_library("embedded").unwrap();
        assert!(!loader.has_library_changed());
    }
}
