//! Selection cursor

use std::collections::BTreeMap;

use keytrack_core::{InstanceId, ItemId};

use crate::AnnotationInstance;

/// Currently selected instance and, optionally, one of its items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub instance: Option<InstanceId>,
    pub item: Option<ItemId>,
}

impl Selection {
    pub fn none() -> Self {
        Selection::default()
    }

    pub fn instance(instance: InstanceId) -> Self {
        Selection {
            instance: Some(instance),
            item: None,
        }
    }

    pub fn item(instance: InstanceId, item: ItemId) -> Self {
        Selection {
            instance: Some(instance),
            item: Some(item),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instance.is_none()
    }

    pub fn clear(&mut self) {
        self.instance = None;
        self.item = None;
    }

    /// Whether every target still exists
    pub fn is_valid(&self, instances: &BTreeMap<InstanceId, AnnotationInstance>) -> bool {
        match (&self.instance, &self.item) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(id), item) => instances
                .get(id)
                .is_some_and(|instance| item.as_ref().map_or(true, |item| instance.item(item).is_some())),
        }
    }

    /// Drop targets that no longer exist; returns true if anything changed
    pub(crate) fn repair(&mut self, instances: &BTreeMap<InstanceId, AnnotationInstance>) -> bool {
        let Some(id) = &self.instance else {
            let changed = self.item.is_some();
            self.item = None;
            return changed;
        };

        match instances.get(id) {
            None => {
                self.clear();
                true
            }
            Some(instance) => match &self.item {
                Some(item) if instance.item(item).is_none() => {
                    self.item = None;
                    true
                }
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnnotationItem;
    use keytrack_core::Attributes;
    use keytrack_track::InterpolationConfig;

    fn tree() -> BTreeMap<InstanceId, AnnotationInstance> {
        let mut instance = AnnotationInstance::new("i1".into(), "car".into(), 1, Attributes::new());
        instance.insert_item(AnnotationItem::new("it1".into(), "body", 1, InterpolationConfig::default()));
        BTreeMap::from([(InstanceId::from("i1"), instance)])
    }

    #[test]
    fn test_repair_drops_missing_item() {
        let instances = tree();
        let mut selection = Selection::item("i1".into(), "gone".into());
        assert!(!selection.is_valid(&instances));
        assert!(selection.repair(&instances));
        assert_eq!(selection, Selection::instance("i1".into()));
        assert!(!selection.repair(&instances));
    }

    #[test]
    fn test_repair_clears_missing_instance() {
        let instances = tree();
        let mut selection = Selection::item("i2".into(), "it1".into());
        assert!(selection.repair(&instances));
        assert!(selection.is_empty());
        assert!(Selection::item("i1".into(), "it1".into()).is_valid(&instances));
    }
}
