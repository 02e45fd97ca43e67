//! Conversion and registration options.

use std::rc::Rc;

use crate::statistics::FunctionStatistics;

/// Options for a single conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeOptions {
    /// Validate the category of incoming values before reading them.
    ///
    /// Unchecked conversions skip validation entirely. Feeding them a value
    /// of the wrong category produces an unspecified (but memory-safe at the
    /// engine boundary) result.
    pub checked: bool,
}

impl TypeOptions {
    pub const CHECKED: TypeOptions = TypeOptions { checked: true };
    pub const UNCHECKED: TypeOptions = TypeOptions { checked: false };
}

impl Default for TypeOptions {
    fn default() -> Self {
        Self {
            checked: cfg!(debug_assertions),
        }
    }
}

/// Options for registering a native function.
///
/// ```ignore
/// let statistics = Rc::new(FunctionStatistics::new());
/// let options = FunctionOptions::new()
///     .checked()
///     .statistics(statistics.clone());
/// ```
#[derive(Debug, Clone)]
pub struct FunctionOptions {
    /// Validate argument categories before reading them.
    pub checked: bool,
    /// Open a handle scope around every call of a context-taking function.
    pub scoped: bool,
    /// Counters updated once per call.
    pub statistics: Option<Rc<FunctionStatistics>>,
}

impl FunctionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub fn unchecked(mut self) -> Self {
        self.checked = false;
        self
    }

    pub fn scoped(mut self, scoped: bool) -> Self {
        self.scoped = scoped;
        self
    }

    pub fn statistics(mut self, statistics: Rc<FunctionStatistics>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Conversion options for arguments and results.
    pub fn type_options(&self) -> TypeOptions {
        TypeOptions {
            checked: self.checked,
        }
    }
}

impl Default for FunctionOptions {
    fn default() -> Self {
        Self {
            checked: TypeOptions::default().checked,
            scoped: true,
            statistics: None,
        }
    }
}
