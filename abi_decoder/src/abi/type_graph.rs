//! Dependency order of named type definitions.

use crate::abi::types::{TypeDef, TypeKind};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeGraphError {
    /// `cycle` is a closed path: its first name is repeated at the end.
    #[error("circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

/// Named definitions and the names each one references.
#[derive(Debug, Default)]
pub struct TypeGraph {
    edges: IndexMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Open,
    Done,
}

impl TypeGraph {
    pub fn build<'a>(typedefs: impl IntoIterator<Item = &'a TypeDef>) -> Self {
        let edges = typedefs
            .into_iter()
            .map(|typedef| {
                let mut referenced = BTreeSet::new();
                referenced_names(&typedef.kind, &mut referenced);
                (typedef.name.clone(), referenced)
            })
            .collect();
        Self { edges }
    }

    /// Every definition comes after the definitions it references and
    /// otherwise keeps declaration order. Names without a definition are
    /// left for the resolver to report.
    pub fn dependency_order(&self) -> Result<Vec<String>, TypeGraphError> {
        let mut marks = HashMap::new();
        let mut path = Vec::new();
        let mut order = Vec::with_capacity(self.edges.len());
        for name in self.edges.keys() {
            self.visit(name, &mut marks, &mut path, &mut order)?;
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), TypeGraphError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Open) => {
                let start = path.iter().position(|entry| *entry == name).unwrap_or(0);
                let cycle = path[start..]
                    .iter()
                    .chain(std::iter::once(&name))
                    .map(|entry| entry.to_string())
                    .collect();
                return Err(TypeGraphError::CircularDependency { cycle });
            }
            None => {}
        }
        let Some((name, referenced)) = self.edges.get_key_value(name) else {
            return Ok(());
        };

        marks.insert(name, Mark::Open);
        path.push(name);
        for dependency in referenced {
            self.visit(dependency, marks, path, order)?;
        }
        path.pop();
        marks.insert(name, Mark::Done);

        trace!(target: "type_graph", name = name.as_str(), position = order.len(), "ordered definition");
        order.push(name.clone());
        Ok(())
    }
}

fn referenced_names(kind: &TypeKind, out: &mut BTreeSet<String>) {
    match kind {
        TypeKind::TypeRef(type_ref) => {
            out.insert(type_ref.name.clone());
        }
        TypeKind::Struct(struct_type) => {
            for field in &struct_type.fields {
                referenced_names(&field.field_type, out);
            }
        }
        TypeKind::Array(array_type) => referenced_names(&array_type.element_type, out),
        TypeKind::Elementary(_) | TypeKind::Enum(_) | TypeKind::Function(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, kind: TypeKind) -> TypeDef {
        TypeDef {
            name: name.to_string(),
            kind,
        }
    }

    fn order(typedefs: &[TypeDef]) -> Result<Vec<String>, TypeGraphError> {
        TypeGraph::build(typedefs).dependency_order()
    }

    #[test]
    fn references_come_first() {
        let typedefs = [
            def("Outer", TypeKind::structure(vec![("inner", TypeKind::type_ref("Inner"))])),
            def("Inner", TypeKind::uint(32)),
        ];
        assert_eq!(order(&typedefs).unwrap(), vec!["Inner", "Outer"]);
    }

    #[test]
    fn unrelated_definitions_keep_declaration_order() {
        let typedefs = [
            def("C", TypeKind::uint(8)),
            def("A", TypeKind::uint(8)),
            def("B", TypeKind::uint(8)),
        ];
        assert_eq!(order(&typedefs).unwrap(), vec!["C", "A", "B"]);
    }

    #[test]
    fn references_inside_arrays_count() {
        let typedefs = [
            def(
                "Grid",
                TypeKind::array(TypeKind::array(TypeKind::type_ref("Cell"), Some(2)), None),
            ),
            def("Cell", TypeKind::bytes()),
        ];
        assert_eq!(order(&typedefs).unwrap(), vec!["Cell", "Grid"]);
    }

    #[test]
    fn cycles_report_the_closed_path() {
        let typedefs = [
            def("Head", TypeKind::structure(vec![("x", TypeKind::type_ref("X"))])),
            def("X", TypeKind::structure(vec![("y", TypeKind::array(TypeKind::type_ref("Y"), None))])),
            def("Y", TypeKind::structure(vec![("x", TypeKind::type_ref("X"))])),
        ];
        assert_eq!(
            order(&typedefs),
            Err(TypeGraphError::CircularDependency {
                cycle: vec!["X".into(), "Y".into(), "X".into()]
            })
        );
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let typedefs = [def(
            "Tree",
            TypeKind::structure(vec![
                ("value", TypeKind::uint(256)),
                ("children", TypeKind::array(TypeKind::type_ref("Tree"), None)),
            ]),
        )];
        assert_eq!(
            order(&typedefs),
            Err(TypeGraphError::CircularDependency {
                cycle: vec!["Tree".into(), "Tree".into()]
            })
        );
    }

    #[test]
    fn undefined_names_are_skipped() {
        let typedefs = [def(
            "Holder",
            TypeKind::structure(vec![("x", TypeKind::type_ref("Elsewhere"))]),
        )];
        assert_eq!(order(&typedefs).unwrap(), vec!["Holder"]);
    }
}
