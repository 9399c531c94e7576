//! Derivation resolution for one category
//!
//! Types are resolved in repeated sweeps over declaration order: a type is
//! resolved as soon as its parent is. A sweep that makes no progress leaves
//! only cycles and their descendants behind.

use std::collections::{HashMap, HashSet};

use profile_types::{SchemaEntry, TypeCategory};
use tracing::debug;

use super::{CategoryDeclarations, ResolvedType};
use crate::error::CatalogError;

/// Outcome of resolving one category
pub(crate) struct CategoryResolution {
    pub types: HashMap<String, ResolvedType>,
    /// Errors keyed by declaration position of the type they concern
    pub errors: Vec<(usize, CatalogError)>,
}

enum State {
    Pending,
    Resolved,
    Failed,
}

pub(crate) fn resolve_category(
    category: &TypeCategory,
    declarations: &CategoryDeclarations,
) -> CategoryResolution {
    let mut types: HashMap<String, ResolvedType> = HashMap::with_capacity(declarations.len());
    let mut errors = Vec::new();
    let mut state: HashMap<&str, State> = HashMap::with_capacity(declarations.len());

    for (position, declaration) in declarations.iter().enumerate() {
        let definition = &declaration.definition;
        let known_parent = definition
            .derived_from
            .as_deref()
            .map_or(true, |parent| declarations.contains(parent));
        if known_parent {
            state.insert(&definition.name, State::Pending);
        } else {
            errors.push((
                position,
                CatalogError::UnknownParent {
                    category: category.clone(),
                    type_name: definition.name.clone(),
                    parent: definition.derived_from.clone().unwrap_or_default(),
                },
            ));
            state.insert(&definition.name, State::Failed);
        }
    }

    loop {
        let mut progress = false;
        let mut pending = false;

        for declaration in declarations.iter() {
            let definition = &declaration.definition;
            if !matches!(state.get(definition.name.as_str()), Some(State::Pending)) {
                continue;
            }

            let resolved = match definition.derived_from.as_deref() {
                None => ResolvedType::root(category.clone(), declaration),
                Some(parent) => match state.get(parent) {
                    Some(State::Resolved) => match types.get(parent) {
                        Some(parent) => ResolvedType::child(parent, declaration),
                        None => continue,
                    },
                    // Descendants of a failed type are skipped without an error
                    // of their own.
                    Some(State::Failed) | None => {
                        state.insert(&definition.name, State::Failed);
                        progress = true;
                        continue;
                    }
                    Some(State::Pending) => {
                        pending = true;
                        continue;
                    }
                },
            };

            debug!(
                category = %category,
                type_name = %definition.name,
                depth = resolved.ancestry.len(),
                "Resolved type"
            );
            types.insert(definition.name.clone(), resolved);
            state.insert(&definition.name, State::Resolved);
            progress = true;
        }

        if !pending {
            break;
        }
        if !progress {
            for (position, members) in find_cycles(declarations, &state) {
                errors.push((
                    position,
                    CatalogError::CyclicDerivation {
                        category: category.clone(),
                        members,
                    },
                ));
            }
            break;
        }
    }

    CategoryResolution { types, errors }
}

/// Extract the cycles among the still-pending types.
///
/// Each cycle is reported once, starting at its earliest-declared member and
/// following `derived_from`. Pending types that merely descend from a cycle
/// are not members. Returns the position of the first member with each cycle.
fn find_cycles(
    declarations: &CategoryDeclarations,
    state: &HashMap<&str, State>,
) -> Vec<(usize, Vec<String>)> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut cycles = Vec::new();

    for declaration in declarations.iter() {
        let start = declaration.definition.name.as_str();
        if !matches!(state.get(start), Some(State::Pending)) || visited.contains(start) {
            continue;
        }

        let mut path: Vec<&str> = Vec::new();
        let mut current = Some(start);
        while let Some(name) = current {
            if let Some(index) = path.iter().position(|n| *n == name) {
                let members = &path[index..];
                let first = members
                    .iter()
                    .copied()
                    .min_by_key(|n| declarations.position(n).unwrap_or(usize::MAX))
                    .unwrap_or(name);
                let rotate = members.iter().position(|n| *n == first).unwrap_or(0);
                let ordered: Vec<String> = members[rotate..]
                    .iter()
                    .chain(&members[..rotate])
                    .map(|n| n.to_string())
                    .collect();
                cycles.push((declarations.position(first).unwrap_or(usize::MAX), ordered));
                break;
            }
            if visited.contains(name) {
                break;
            }
            path.push(name);
            current = declarations
                .get(name)
                .and_then(|d| d.definition.derived_from.as_deref());
        }
        visited.extend(path);
    }

    cycles.sort_by_key(|(position, _)| *position);
    cycles
}

/// Inherited entries overridden by own entries of the same name.
///
/// An override replaces the whole inherited entry in its inherited position;
/// new names are appended in declaration order.
pub(crate) fn merge_entries(inherited: &[SchemaEntry], own: &[SchemaEntry]) -> Vec<SchemaEntry> {
    let mut merged = inherited.to_vec();
    for entry in own {
        match merged.iter_mut().find(|e| e.name == entry.name) {
            Some(slot) => *slot = entry.clone(),
            None => merged.push(entry.clone()),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Declaration;
    use pretty_assertions::assert_eq;
    use profile_types::TypeDefinition;

    fn declarations(defs: Vec<TypeDefinition>) -> CategoryDeclarations {
        let mut decls = CategoryDeclarations::default();
        for def in defs {
            decls.declare(Declaration {
                document: "test.yaml".into(),
                definition: def,
            });
        }
        decls
    }

    fn node() -> TypeCategory {
        TypeCategory::node()
    }

    #[test]
    fn test_child_declared_before_parent() {
        let decls = declarations(vec![
            TypeDefinition::new("Leaf").derived_from("Middle"),
            TypeDefinition::new("Middle").derived_from("Root"),
            TypeDefinition::new("Root"),
        ]);
        let result = resolve_category(&node(), &decls);
        assert!(result.errors.is_empty());
        assert_eq!(result.types["Leaf"].ancestry, vec!["Middle", "Root"]);
    }

    #[test]
    fn test_two_member_cycle() {
        let decls = declarations(vec![
            TypeDefinition::new("A").derived_from("B"),
            TypeDefinition::new("B").derived_from("A"),
        ]);
        let result = resolve_category(&node(), &decls);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0].1,
            CatalogError::CyclicDerivation {
                category: node(),
                members: vec!["A".into(), "B".into()],
            }
        );
    }

    #[test]
    fn test_cycle_excludes_descendants() {
        let decls = declarations(vec![
            TypeDefinition::new("Hanger").derived_from("Y"),
            TypeDefinition::new("Root"),
            TypeDefinition::new("X").derived_from("Z"),
            TypeDefinition::new("Y").derived_from("X"),
            TypeDefinition::new("Z").derived_from("Y"),
        ]);
        let result = resolve_category(&node(), &decls);
        assert!(result.types.contains_key("Root"));
        assert_eq!(result.types.len(), 1);
        assert_eq!(result.errors.len(), 1);
        let (position, err) = &result.errors[0];
        assert_eq!(*position, 2);
        assert_eq!(
            err,
            &CatalogError::CyclicDerivation {
                category: node(),
                members: vec!["X".into(), "Z".into(), "Y".into()],
            }
        );
    }

    #[test]
    fn test_self_derivation_is_a_cycle() {
        let decls = declarations(vec![TypeDefinition::new("Ouroboros").derived_from("Ouroboros")]);
        let result = resolve_category(&node(), &decls);
        assert_eq!(result.errors[0].1.code(), crate::error::S_REF_CYCLIC_DERIVATION);
    }

    #[test]
    fn test_unknown_parent_skips_descendants() {
        let decls = declarations(vec![
            TypeDefinition::new("Orphan").derived_from("Missing"),
            TypeDefinition::new("Grandchild").derived_from("Orphan"),
        ]);
        let result = resolve_category(&node(), &decls);
        assert!(result.types.is_empty());
        assert_eq!(
            result.errors,
            vec![(
                0,
                CatalogError::UnknownParent {
                    category: node(),
                    type_name: "Orphan".into(),
                    parent: "Missing".into(),
                }
            )]
        );
    }

    #[test]
    fn test_merge_replaces_in_place() {
        let inherited = vec![
            SchemaEntry::property("a", "string"),
            SchemaEntry::property("b", "string").with_default("x"),
        ];
        let own = vec![
            SchemaEntry::property("c", "integer"),
            SchemaEntry::property("b", "integer"),
        ];
        let merged = merge_entries(&inherited, &own);
        let names: Vec<_> = merged.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(merged[1], SchemaEntry::property("b", "integer"));
    }
}
