//! Class exclusion filters.

/// Decides which classes are copied through unchanged.
///
/// Packages match by prefix, classes by exact name; both are compared in
/// internal (slash) form, so callers may configure either `com.example` or
/// `com/example`.
#[derive(Debug, Default, Clone)]
pub struct ExcludeFilter {
    packages: Vec<String>,
    classes: Vec<String>,
}

impl ExcludeFilter {
    pub fn new<S: AsRef<str>>(packages: &[S], classes: &[S]) -> Self {
        Self {
            packages: packages
                .iter()
                .map(|p| p.as_ref().replace('.', "/"))
                .collect(),
            classes: classes
                .iter()
                .map(|c| c.as_ref().replace('.', "/"))
                .collect(),
        }
    }

    /// Whether the class with this internal name is excluded from rewriting.
    pub fn is_excluded(&self, internal_name: &str) -> bool {
        self.packages.iter().any(|p| internal_name.starts_with(p))
            || self.classes.iter().any(|c| c == internal_name)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.classes.is_empty()
    }
}
