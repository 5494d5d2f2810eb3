//! Runtime configuration.

use std::path::{Path, PathBuf};

/// Settings fixed when a [`Runtime`](crate::Runtime) is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Tools build: instance tracking and hot reload are available.
    pub tools_enabled: bool,
    /// Seed the class catalog with `Object`, `RefCounted`, `Resource` and `Node`.
    pub register_builtin_classes: bool,
    /// Where the loaded-extension list is persisted.
    pub extension_list_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tools_enabled: true,
            register_builtin_classes: true,
            extension_list_path: None,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration of an exported (non-tools) host: no tracking, no reload.
    pub fn release() -> Self {
        Self::default().with_tools_enabled(false)
    }

    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn with_builtin_classes(mut self, register: bool) -> Self {
        self.register_builtin_classes = register;
        self
    }

    pub fn with_extension_list_path(mut self, path: impl AsRef<Path>) -> Self {
        self.extension_list_path = Some(path.as_ref().to_path_buf());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_tools_build() {
        let config = RuntimeConfig::default();
        assert!(config.tools_enabled);
        assert!(config.register_builtin_classes);
        assert!(config.extension_list_path.is_none());
    }

    #[test]
    fn builders() {
        let config = RuntimeConfig::release()
            .with_builtin_classes(false)
            .with_extension_list_path("extension_list.cfg");
        assert!(!config.tools_enabled);
        assert!(!config.register_builtin_classes);
        assert_eq!(
            config.extension_list_path.as_deref(),
            Some(Path::new("extension_list.cfg"))
        );
    }
}
