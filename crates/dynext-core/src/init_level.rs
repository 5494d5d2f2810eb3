//! Ordered initialization stages shared by the host and libraries.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Initialization stage. Stages are entered in ascending order and left in
/// descending order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive,
)]
#[repr(i32)]
pub enum InitializationLevel {
    Core = 0,
    Servers = 1,
    Scene = 2,
    Editor = 3,
}

impl InitializationLevel {
    pub const ALL: [InitializationLevel; 4] = [
        InitializationLevel::Core,
        InitializationLevel::Servers,
        InitializationLevel::Scene,
        InitializationLevel::Editor,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            InitializationLevel::Core => "core",
            InitializationLevel::Servers => "servers",
            InitializationLevel::Scene => "scene",
            InitializationLevel::Editor => "editor",
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::try_from(i32::from(self) + 1).ok()
    }

    pub fn previous(self) -> Option<Self> {
        Self::try_from(i32::from(self) - 1).ok()
    }

    /// Levels from `from` to `to`, both inclusive, in ascending order.
    pub fn range(from: Self, to: Self) -> impl DoubleEndedIterator<Item = Self> {
        Self::ALL
            .into_iter()
            .filter(move |level| *level >= from && *level <= to)
    }
}

impl fmt::Display for InitializationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Label for an optional current level, used in messages.
pub fn level_label(level: Option<InitializationLevel>) -> &'static str {
    level.map_or("none", InitializationLevel::name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(InitializationLevel::Core < InitializationLevel::Servers);
        assert!(InitializationLevel::Scene < InitializationLevel::Editor);
    }

    #[test]
    fn stepping() {
        assert_eq!(InitializationLevel::Core.next(), Some(InitializationLevel::Servers));
        assert_eq!(InitializationLevel::Editor.next(), None);
        assert_eq!(InitializationLevel::Core.previous(), None);
        assert_eq!(InitializationLevel::Editor.previous(), Some(InitializationLevel::Scene));
    }

    #[test]
    fn inclusive_range() {
        let levels: Vec<_> =
            InitializationLevel::range(InitializationLevel::Servers, InitializationLevel::Editor).collect();
        assert_eq!(
            levels,
            vec![InitializationLevel::Servers, InitializationLevel::Scene, InitializationLevel::Editor]
        );
        let down: Vec<_> =
            InitializationLevel::range(InitializationLevel::Core, InitializationLevel::Servers).rev().collect();
        assert_eq!(down, vec![InitializationLevel::Servers, InitializationLevel::Core]);
    }

    #[test]
    fn labels() {
        assert_eq!(level_label(None), "none");
        assert_eq!(level_label(Some(InitializationLevel::Scene)), "scene");
    }
}
