//! Catalog of known categories, item names and cameras

use std::collections::{BTreeMap, BTreeSet};

use keytrack_core::{CameraId, CategoryId, KeytrackError, KeytrackResult};

/// Reference data the registry validates against
///
/// An empty catalog accepts every category and camera. A category listed
/// with no item names accepts any item name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    categories: BTreeMap<CategoryId, BTreeSet<String>>,
    cameras: BTreeSet<CameraId>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    /// Add a category with its allowed item names
    pub fn with_category<I, N>(mut self, category: impl Into<CategoryId>, items: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.categories
            .entry(category.into())
            .or_default()
            .extend(items.into_iter().map(Into::into));
        self
    }

    pub fn with_camera(mut self, camera: impl Into<CameraId>) -> Self {
        self.cameras.insert(camera.into());
        self
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryId> {
        self.categories.keys()
    }

    pub fn cameras(&self) -> impl Iterator<Item = &CameraId> {
        self.cameras.iter()
    }

    pub fn accepts_category(&self, category: &CategoryId) -> bool {
        self.categories.is_empty() || self.categories.contains_key(category)
    }

    pub fn accepts_item(&self, category: &CategoryId, name: &str) -> bool {
        match self.categories.get(category) {
            Some(names) => names.is_empty() || names.contains(name),
            None => self.categories.is_empty(),
        }
    }

    pub fn accepts_camera(&self, camera: &CameraId) -> bool {
        self.cameras.is_empty() || self.cameras.contains(camera)
    }

    pub fn check_category(&self, category: &CategoryId) -> KeytrackResult<()> {
        if self.accepts_category(category) {
            Ok(())
        } else {
            Err(KeytrackError::UnknownCategory(category.clone()))
        }
    }

    pub fn check_item(&self, category: &CategoryId, name: &str) -> KeytrackResult<()> {
        self.check_category(category)?;
        if self.accepts_item(category, name) {
            Ok(())
        } else {
            Err(KeytrackError::UnknownItemName {
                category: category.clone(),
                name: name.to_string(),
            })
        }
    }

    pub fn check_camera(&self, camera: &CameraId) -> KeytrackResult<()> {
        if self.accepts_camera(camera) {
            Ok(())
        } else {
            Err(KeytrackError::UnknownCamera(camera.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_catalog_accepts_everything() {
        let catalog = Catalog::new();
        assert!(catalog.accepts_category(&"anything".into()));
        assert!(catalog.accepts_item(&"anything".into(), "part"));
        assert!(catalog.accepts_camera(&"cam9".into()));
    }

    #[test]
    fn test_restricted_catalog() {
        let catalog = Catalog::new()
            .with_category("car", ["body", "wheel"])
            .with_category("sign", Vec::<String>::new())
            .with_camera("front");

        assert!(catalog.check_item(&"car".into(), "wheel").is_ok());
        assert!(matches!(
            catalog.check_item(&"car".into(), "wing"),
            Err(KeytrackError::UnknownItemName { .. })
        ));
        assert!(catalog.accepts_item(&"sign".into(), "plate"));
        assert!(matches!(
            catalog.check_category(&"bike".into()),
            Err(KeytrackError::UnknownCategory(_))
        ));
        assert!(matches!(catalog.check_camera(&"rear".into()), Err(KeytrackError::UnknownCamera(_))));
    }
}
