//! Instance tracker.
//!
//! Live instances of reloadable classes are recorded per class so a reload
//! can find, snapshot and rebind them. Classes that are not reloadable get
//! no tracking hooks, and nothing is tracked outside the tools build.

use dynext_core::InstanceId;

use crate::extension::{ClassLink, ExtensionClass};
use crate::runtime::Runtime;

impl ExtensionClass {
    pub(crate) fn track(&mut self, id: InstanceId) -> bool {
        self.instances.insert(id)
    }

    pub(crate) fn untrack(&mut self, id: InstanceId) -> bool {
        self.instance_state.remove(&id);
        self.instances.remove(&id)
    }

    /// Tracked instances, sorted.
    pub fn tracked_instances(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self.instances.iter().copied().collect();
        ids.sort();
        ids
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

impl Runtime {
    /// Record a new instance of a reloadable class. Returns whether it was added.
    pub fn track_instance(&mut self, class: &ClassLink, id: InstanceId) -> bool {
        if !self.config.tools_enabled {
            return false;
        }
        match self.extension_class_mut(class) {
            Some(ext_class) if ext_class.reloadable => ext_class.track(id),
            _ => false,
        }
    }

    /// Forget an instance. Idempotent.
    pub fn untrack_instance(&mut self, class: &ClassLink, id: InstanceId) -> bool {
        self.extension_class_mut(class)
            .is_some_and(|ext_class| ext_class.untrack(id))
    }

    pub fn tracked_instances(&self, class: &ClassLink) -> Vec<InstanceId> {
        self.extension_class(class)
            .map(ExtensionClass::tracked_instances)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::extension::ExtensionClass;

    fn runtime_with_class(config: RuntimeConfig, reloadable: bool) -> (Runtime, ClassLink) {
        let mut runtime = Runtime::new(config);
        let token = runtime.create_extension("res://tracked.dylib");
        let mut class = ExtensionClass::new("Foo".into(), "Object".into());
        class.reloadable = reloadable;
        runtime
            .extension_mut(token)
            .unwrap()
            .classes
            .insert("Foo".into(), class);
        (runtime, ClassLink::new(token, "Foo"))
    }

    #[test]
    fn tracks_reloadable_instances() {
        let (mut runtime, link) = runtime_with_class(RuntimeConfig::default(), true);
        let a = InstanceId::from_parts(1, 1);
        let b = InstanceId::from_parts(2, 1);
        assert!(runtime.track_instance(&link, b));
        assert!(runtime.track_instance(&link, a));
        assert!(!runtime.track_instance(&link, a));
        assert_eq!(runtime.tracked_instances(&link), vec![a, b]);

        assert!(runtime.untrack_instance(&link, a));
        assert!(!runtime.untrack_instance(&link, a));
        assert_eq!(runtime.tracked_instances(&link), vec![b]);
    }

    #[test]
    fn ignores_non_reloadable_classes() {
        let (mut runtime, link) = runtime_with_class(RuntimeConfig::default(), false);
        assert!(!runtime.track_instance(&link, InstanceId::from_parts(1, 1)));
        assert!(runtime.tracked_instances(&link).is_empty());
    }

    #[test]
    fn release_build_never_tracks() {
        let (mut runtime, link) = runtime_with_class(RuntimeConfig::release(), true);
        assert!(!runtime.track_instance(&link, InstanceId::from_parts(1, 1)));
    }

    #[test]
    fn unknown_class_is_ignored() {
        let (mut runtime, link) = runtime_with_class(RuntimeConfig::default(), true);
        let ghost = ClassLink::new(link.library, "Ghost");
        assert!(!runtime.track_instance(&ghost, InstanceId::from_parts(1, 1)));
        assert!(!runtime.untrack_instance(&ghost, InstanceId::from_parts(1, 1)));
    }
}
