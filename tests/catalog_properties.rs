//! Property tests for derivation resolution
//!
//! Random derivation forests always resolve, with each effective schema equal
//! to the parent's effective schema overridden by the type's own entries.
//! Random rings always fail with a cycle naming exactly the ring members.

use proptest::prelude::*;
use tosca_core::{CatalogError, ProfileDocument, SchemaEntry, TypeCatalog, TypeDefinition};

const FIELD_NAMES: [&str; 5] = ["a", "b", "c", "d", "e"];
const FIELD_TYPES: [&str; 3] = ["string", "integer", "boolean"];

/// One generated type: optional parent index (always lower) and own fields
#[derive(Debug, Clone)]
struct GenType {
    parent: Option<usize>,
    fields: Vec<(usize, usize)>,
}

fn forest() -> impl Strategy<Value = (Vec<GenType>, bool)> {
    (1usize..16)
        .prop_flat_map(|n| {
            let types: Vec<_> = (0..n)
                .map(|i| {
                    let parent = if i == 0 {
                        Just(None).boxed()
                    } else {
                        proptest::option::of(0..i).boxed()
                    };
                    let fields = proptest::collection::btree_map(0..FIELD_NAMES.len(), 0..FIELD_TYPES.len(), 0..4)
                        .prop_map(|m| m.into_iter().collect::<Vec<_>>());
                    (parent, fields).prop_map(|(parent, fields)| GenType { parent, fields })
                })
                .collect();
            (types, any::<bool>())
        })
}

fn type_name(i: usize) -> String {
    format!("T{i}")
}

fn definition(i: usize, gen: &GenType) -> TypeDefinition {
    let mut def = TypeDefinition::new(type_name(i));
    if let Some(parent) = gen.parent {
        def = def.derived_from(type_name(parent));
    }
    for &(name, ty) in &gen.fields {
        def = def.with_property(SchemaEntry::property(FIELD_NAMES[name], FIELD_TYPES[ty]).optional());
    }
    def
}

proptest! {
    #[test]
    fn acyclic_forests_resolve((types, reversed) in forest()) {
        let mut order: Vec<usize> = (0..types.len()).collect();
        if reversed {
            // Children before parents
            order.reverse();
        }
        let document = order.iter().fold(ProfileDocument::new("forest.yaml"), |doc, &i| {
            doc.with_type("node", definition(i, &types[i]))
        });

        let catalog = TypeCatalog::load([document]).unwrap();
        prop_assert_eq!(catalog.len(), types.len());

        for (i, gen) in types.iter().enumerate() {
            let resolved = catalog.resolve("node", &type_name(i)).unwrap();
            let own = &resolved.own().properties;
            let inherited: &[SchemaEntry] = match gen.parent {
                Some(p) => &catalog.resolve("node", &type_name(p)).unwrap().properties,
                None => &[],
            };

            // Every own entry wins
            for entry in own {
                prop_assert_eq!(resolved.property(&entry.name), Some(entry));
            }
            // Every inherited entry not overridden survives unchanged
            for entry in inherited {
                if own.iter().all(|o| o.name != entry.name) {
                    prop_assert_eq!(resolved.property(&entry.name), Some(entry));
                }
            }
            // Nothing else
            let added = own
                .iter()
                .filter(|o| inherited.iter().all(|e| e.name != o.name))
                .count();
            prop_assert_eq!(resolved.properties.len(), inherited.len() + added);
        }
    }

    #[test]
    fn rings_report_exactly_their_members(size in 2usize..8, roots in 0usize..4) {
        let mut document = ProfileDocument::new("ring.yaml");
        for i in 0..roots {
            document = document.with_type("node", TypeDefinition::new(format!("Root{i}")));
        }
        for i in 0..size {
            document = document.with_type(
                "node",
                TypeDefinition::new(type_name(i)).derived_from(type_name((i + 1) % size)),
            );
        }

        let err = TypeCatalog::load([document]).unwrap_err();
        prop_assert_eq!(err.errors.len(), 1);
        match &err.errors[0] {
            CatalogError::CyclicDerivation { members, .. } => {
                let expected: Vec<String> = (0..size).map(type_name).collect();
                prop_assert_eq!(members, &expected);
            }
            other => prop_assert!(false, "unexpected error {}", other),
        }
    }
}
