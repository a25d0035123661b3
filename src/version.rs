//! Version windows of schema elements.
//!
//! Every field, message, special value and valid range carries a
//! `sinceVersion`/`deprecated` pair. The element is introduced at `since` and, if
//! `removed` is set, disappears from the wire at `deprecated`.

/// `deprecated` value of an element that has not been deprecated.
pub const NOT_YET_DEPRECATED: u32 = u32::MAX;

/// Version stamps of a single element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionWindow {
    pub since: u32,
    pub deprecated: u32,
    pub removed: bool,
}

impl Default for VersionWindow {
    fn default() -> Self {
        VersionWindow {
            since: 0,
            deprecated: NOT_YET_DEPRECATED,
            removed: false,
        }
    }
}

impl VersionWindow {
    pub fn new(since: u32, deprecated: u32, removed: bool) -> Self {
        VersionWindow {
            since,
            deprecated,
            removed,
        }
    }

    pub fn exists_at(&self, version: u32) -> bool {
        does_element_exist(self.since, self.deprecated, self.removed, version)
    }

    pub fn is_deprecated(&self) -> bool {
        is_element_deprecated(self.deprecated)
    }

    /// Window of `self` interpreted inside its parent's window.
    pub fn covers(&self, other: &VersionWindow) -> bool {
        self.since <= other.since && other.deprecated <= self.deprecated
    }
}

/// True iff the element is present on the wire at `at`.
pub fn does_element_exist(since: u32, deprecated: u32, removed: bool, at: u32) -> bool {
    if at < since {
        return false;
    }
    !removed || at < deprecated
}

/// True when the element's window does not cover every version down to
/// `min_version`: it appears later, or it is removed at some deprecation point.
pub fn is_element_optional(since: u32, deprecated: u32, removed: bool, min_version: u32) -> bool {
    if min_version < since {
        return true;
    }
    removed && deprecated < NOT_YET_DEPRECATED
}

pub fn is_element_deprecated(deprecated: u32) -> bool {
    deprecated < NOT_YET_DEPRECATED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existence_window() {
        for v in [2, 3, 4] {
            assert!(does_element_exist(2, 5, true, v));
        }
        for v in [0, 1, 5, 6, 100] {
            assert!(!does_element_exist(2, 5, true, v));
        }
        for v in [2, 5, 6, 1000] {
            assert!(does_element_exist(2, 5, false, v));
        }
        assert!(!does_element_exist(2, 5, false, 1));
    }

    #[test]
    fn optional_elements() {
        assert!(!is_element_optional(0, NOT_YET_DEPRECATED, false, 0));
        assert!(is_element_optional(2, NOT_YET_DEPRECATED, false, 0));
        assert!(!is_element_optional(2, NOT_YET_DEPRECATED, false, 2));
        assert!(is_element_optional(0, 3, true, 5));
        assert!(!is_element_optional(0, 3, false, 5));
    }

    #[test]
    fn window_helpers() {
        let w = VersionWindow::new(1, 4, true);
        assert!(w.exists_at(3));
        assert!(!w.exists_at(4));
        assert!(w.is_deprecated());
        assert!(VersionWindow::default().covers(&w));
        assert!(!w.covers(&VersionWindow::default()));
    }
}
