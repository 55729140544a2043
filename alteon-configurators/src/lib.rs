//! Object configurators for the Alteon object types this workspace manages.

pub mod content_class;
pub mod table;

#[cfg(test)]
mod testing;

use alteon_reconcile::ObjectCatalog;

pub use table::{Put, Row, TableConfigurator, TableLayout, TableStore};

/// Every supported object type.
pub static LAYOUTS: &[&TableLayout] = &[
    &content_class::CONTENT_CLASS_LAYOUT,
    &content_class::HOST_NAME_LAYOUT,
];

pub fn object_types() -> impl Iterator<Item = &'static str> {
    LAYOUTS.iter().map(|l| l.catalog.object_type)
}

pub fn catalog(object_type: &str) -> Option<&'static ObjectCatalog> {
    layout(object_type).map(|l| l.catalog)
}

fn layout(object_type: &str) -> Option<&'static TableLayout> {
    LAYOUTS
        .iter()
        .copied()
        .find(|l| l.catalog.object_type == object_type)
}

/// The configurator for `object_type`, working on `store`.
pub fn configurator_for<S: TableStore>(
    object_type: &str,
    store: S,
) -> Option<TableConfigurator<S>> {
    layout(object_type).map(|l| TableConfigurator::new(l, store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_types() {
        assert_eq!(
            object_types().collect::<Vec<_>>(),
            vec!["l7_content_class", "l7_content_class_hostname"]
        );
        assert!(catalog("l7_content_class").is_some());
        assert!(catalog("virt").is_none());
    }

    #[test]
    fn test_layouts_match_catalogs() {
        for layout in LAYOUTS {
            let catalog = layout.catalog;
            for column in layout.columns {
                let spec = catalog.field(column.field).unwrap();
                assert!(spec.is_mutable(), "{} is stored", column.field);
            }
            for spec in catalog.fields.iter().filter(|f| f.is_mutable()) {
                assert!(
                    layout.columns.iter().any(|c| c.field == spec.name),
                    "{} has no column",
                    spec.name
                );
            }
            for spec in catalog.fields.iter().filter(|f| !f.is_mutable()) {
                assert!(
                    layout.indicators.iter().any(|i| i.field == spec.name),
                    "{} is not computed",
                    spec.name
                );
            }
            for collection in catalog.collections {
                let child = layout
                    .children
                    .iter()
                    .find(|c| c.collection == collection.name)
                    .unwrap();
                for column in child.columns {
                    assert!(collection.field(column.field).is_some());
                }
            }
        }
    }
}
