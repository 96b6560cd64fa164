use crate::abi::type_graph::{TypeGraph, TypeGraphError};
use crate::abi::types::{ElementaryKind, ElementaryType, StructField, TypeDef, TypeKind};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Index of a node inside a [`TypeArena`].
///
/// Children are always interned before their parents, so ascending ids are
/// a valid post-order of every tree stored in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub usize);

impl TypeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    /// Display name: canonical elementary name, definition name, `T[3]`, `tuple`.
    pub name: String,
    pub kind: ResolvedTypeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedTypeKind {
    Elementary(ElementaryType),
    Enum { variants: Vec<String>, bits: u16 },
    Array { element: TypeId, length: Option<u64> },
    Struct { fields: Vec<ResolvedField> },
    Function,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub name: String,
    pub type_id: TypeId,
}

/// Owns every resolved node. Nodes are created per use site and never shared.
#[derive(Debug, Default, Clone)]
pub struct TypeArena {
    nodes: Vec<ResolvedType>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: ResolvedType) -> TypeId {
        let id = TypeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: TypeId) -> Option<&ResolvedType> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &ResolvedType)> {
        self.nodes.iter().enumerate().map(|(idx, node)| (TypeId(idx), node))
    }

    /// Direct children in declaration order.
    pub fn children(&self, id: TypeId) -> Vec<TypeId> {
        match self.get(id).map(|node| &node.kind) {
            Some(ResolvedTypeKind::Array { element, .. }) => vec![*element],
            Some(ResolvedTypeKind::Struct { fields }) => {
                fields.iter().map(|field| field.type_id).collect()
            }
            _ => Vec::new(),
        }
    }

    /// All nodes reachable from `root`, root included, in ascending id order.
    pub fn subtree(&self, root: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id));
        }
        out.sort();
        out
    }
}

impl std::ops::Index<TypeId> for TypeArena {
    type Output = ResolvedType;

    fn index(&self, id: TypeId) -> &ResolvedType {
        &self.nodes[id.0]
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("type '{type_name}' references unknown type '{referenced}'")]
    UnknownType { type_name: String, referenced: String },
    #[error("circular dependency detected: {cycle:?}")]
    CircularDependency { cycle: Vec<String> },
    #[error("type '{type_name}' declares field '{field}' more than once")]
    DuplicateField { type_name: String, field: String },
    #[error("type '{type_name}' is defined more than once")]
    DuplicateType { type_name: String },
    #[error("type '{type_name}' is invalid: {reason}")]
    InvalidTypeDefinition { type_name: String, reason: String },
}

impl From<TypeGraphError> for ResolutionError {
    fn from(err: TypeGraphError) -> Self {
        match err {
            TypeGraphError::CircularDependency { cycle } => ResolutionError::CircularDependency { cycle },
        }
    }
}

/// Interns named type definitions and function parameter lists into a
/// [`TypeArena`], expanding references by name.
#[derive(Debug, Default)]
pub struct TypeResolver {
    pub typedefs: IndexMap<String, TypeDef>,
    pub arena: TypeArena,
    roots: IndexMap<String, TypeId>,
    pub resolution_order: Vec<String>,
}

impl TypeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_typedef(&mut self, typedef: TypeDef) -> Result<(), ResolutionError> {
        if self.typedefs.contains_key(&typedef.name) {
            return Err(ResolutionError::DuplicateType {
                type_name: typedef.name,
            });
        }
        self.typedefs.insert(typedef.name.clone(), typedef);
        Ok(())
    }

    /// Validates and interns every named definition in dependency order.
    pub fn resolve_all(&mut self) -> Result<(), ResolutionError> {
        let order = TypeGraph::build(self.typedefs.values()).dependency_order()?;
        debug!(types = order.len(), "resolving named types");

        for name in order {
            if self.roots.contains_key(&name) {
                continue;
            }
            let Some(typedef) = self.typedefs.get(&name) else {
                continue;
            };
            let kind = typedef.kind.clone();
            let mut visiting = vec![name.clone()];
            let id = self.intern(&kind, &name, Some(&name), &mut visiting)?;
            self.roots.insert(name.clone(), id);
            self.resolution_order.push(name);
        }
        Ok(())
    }

    /// Interns a function parameter list as an implicit struct named `name`.
    pub fn resolve_params(&mut self, name: &str, params: &[StructField]) -> Result<TypeId, ResolutionError> {
        let kind = TypeKind::Struct(crate::abi::types::StructType {
            fields: params.to_vec(),
        });
        let mut visiting = Vec::new();
        let id = self.intern(&kind, name, Some(name), &mut visiting)?;
        debug!(function = name, params = params.len(), root = %id, "resolved parameter list");
        Ok(id)
    }

    pub fn root(&self, name: &str) -> Option<TypeId> {
        self.roots.get(name).copied()
    }

    /// Named roots in declaration order.
    pub fn roots(&self) -> impl Iterator<Item = (&str, TypeId)> {
        self.typedefs
            .keys()
            .filter_map(|name| self.roots.get(name).map(|id| (name.as_str(), *id)))
    }

    fn intern(
        &mut self,
        kind: &TypeKind,
        owner: &str,
        display_name: Option<&str>,
        visiting: &mut Vec<String>,
    ) -> Result<TypeId, ResolutionError> {
        match kind {
            TypeKind::Elementary(elementary) => {
                validate_elementary(elementary, owner)?;
                Ok(self.arena.push(ResolvedType {
                    name: elementary.canonical_name(),
                    kind: ResolvedTypeKind::Elementary(elementary.clone()),
                }))
            }
            TypeKind::Enum(enum_type) => {
                let count = enum_type.variants.len();
                if count == 0 || count > 256 {
                    return Err(invalid(owner, format!("enum must have 1..=256 variants, found {count}")));
                }
                let mut seen = HashSet::new();
                if let Some(dup) = enum_type.variants.iter().find(|v| !seen.insert(v.as_str())) {
                    return Err(invalid(owner, format!("enum variant '{dup}' is declared more than once")));
                }
                Ok(self.arena.push(ResolvedType {
                    name: display_name.unwrap_or("enum").to_string(),
                    kind: ResolvedTypeKind::Enum {
                        variants: enum_type.variants.clone(),
                        bits: enum_type.bits(),
                    },
                }))
            }
            TypeKind::Array(array_type) => {
                if array_type.length == Some(0) {
                    return Err(invalid(owner, "fixed-length arrays must have at least one element".into()));
                }
                let element = self.intern(&array_type.element_type, owner, None, visiting)?;
                let suffix = match array_type.length {
                    Some(len) => format!("[{len}]"),
                    None => "[]".to_string(),
                };
                let name = format!("{}{}", self.arena[element].name, suffix);
                Ok(self.arena.push(ResolvedType {
                    name: display_name.map(str::to_string).unwrap_or(name),
                    kind: ResolvedTypeKind::Array {
                        element,
                        length: array_type.length,
                    },
                }))
            }
            TypeKind::Struct(struct_type) => {
                let mut seen = HashSet::new();
                let mut fields = Vec::with_capacity(struct_type.fields.len());
                for field in &struct_type.fields {
                    if !seen.insert(field.name.as_str()) {
                        return Err(ResolutionError::DuplicateField {
                            type_name: owner.to_string(),
                            field: field.name.clone(),
                        });
                    }
                    let type_id = self.intern(&field.field_type, owner, None, visiting)?;
                    fields.push(ResolvedField {
                        name: field.name.clone(),
                        type_id,
                    });
                }
                Ok(self.arena.push(ResolvedType {
                    name: display_name.unwrap_or("tuple").to_string(),
                    kind: ResolvedTypeKind::Struct { fields },
                }))
            }
            TypeKind::Function(_) => Ok(self.arena.push(ResolvedType {
                name: display_name.unwrap_or("function").to_string(),
                kind: ResolvedTypeKind::Function,
            })),
            TypeKind::TypeRef(type_ref) => {
                let target = &type_ref.name;
                if visiting.iter().any(|name| name == target) {
                    let mut cycle = visiting.clone();
                    cycle.push(target.clone());
                    return Err(ResolutionError::CircularDependency { cycle });
                }
                let typedef = self.typedefs.get(target).ok_or_else(|| ResolutionError::UnknownType {
                    type_name: owner.to_string(),
                    referenced: target.clone(),
                })?;
                let target_kind = typedef.kind.clone();
                visiting.push(target.clone());
                let id = self.intern(&target_kind, target, Some(target), visiting);
                visiting.pop();
                id
            }
        }
    }
}

fn invalid(type_name: &str, reason: String) -> ResolutionError {
    ResolutionError::InvalidTypeDefinition {
        type_name: type_name.to_string(),
        reason,
    }
}

fn validate_elementary(elementary: &ElementaryType, owner: &str) -> Result<(), ResolutionError> {
    let bits = elementary.bits();
    let ok = match elementary.kind {
        ElementaryKind::Uint | ElementaryKind::Int | ElementaryKind::Byte => {
            (8..=256).contains(&bits) && bits % 8 == 0
        }
        ElementaryKind::Bool => bits == 8,
        ElementaryKind::Address => bits == 160,
        ElementaryKind::Bytes | ElementaryKind::String => bits == 0,
    };
    if ok {
        Ok(())
    } else {
        Err(invalid(
            owner,
            format!("elementary {:?} cannot be {bits} bits wide", elementary.kind),
        ))
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

    fn resolver(typedefs: Vec<TypeDef>) -> TypeResolver {
        let mut resolver = TypeResolver::new();
        for typedef in typedefs {
            resolver.add_typedef(typedef).unwrap();
        }
        resolver
    }

    #[test]
    fn references_are_expanded_per_use_site() {
        let mut resolver = resolver(vec![
            def("Pair", TypeKind::structure(vec![("a", TypeKind::uint(256)), ("b", TypeKind::bool())])),
            def(
                "Holder",
                TypeKind::structure(vec![
                    ("left", TypeKind::type_ref("Pair")),
                    ("right", TypeKind::type_ref("Pair")),
                ]),
            ),
        ]);
        resolver.resolve_all().unwrap();
        assert_eq!(resolver.resolution_order, vec!["Pair".to_string(), "Holder".to_string()]);

        let holder = resolver.root("Holder").unwrap();
        let ResolvedTypeKind::Struct { fields } = &resolver.arena[holder].kind else {
            panic!("expected struct");
        };
        assert_ne!(fields[0].type_id, fields[1].type_id);
        assert_eq!(resolver.arena[fields[0].type_id].name, "Pair");
        assert!(fields.iter().all(|field| field.type_id < holder));
    }

    #[test]
    fn array_names_follow_abi_spelling() {
        let mut resolver = TypeResolver::new();
        let kind = TypeKind::array(TypeKind::array(TypeKind::uint(64), Some(3)), None);
        let id = resolver
            .resolve_params(
                "f",
                &[StructField {
                    name: "grid".into(),
                    field_type: kind,
                }],
            )
            .unwrap();
        let child = resolver.arena.children(id)[0];
        assert_eq!(resolver.arena[child].name, "uint64[3][]");
        assert_eq!(resolver.arena[id].name, "f");
        assert_eq!(resolver.arena.subtree(id).len(), 4);
    }

    #[test]
    fn unknown_reference_is_reported() {
        let mut resolver = resolver(vec![def("A", TypeKind::structure(vec![("x", TypeKind::type_ref("Missing"))]))]);
        let err = resolver.resolve_all().unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnknownType {
                type_name: "A".into(),
                referenced: "Missing".into()
            }
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let mut resolver = resolver(vec![
            def("A", TypeKind::structure(vec![("b", TypeKind::array(TypeKind::type_ref("B"), None))])),
            def("B", TypeKind::structure(vec![("a", TypeKind::type_ref("A"))])),
        ]);
        assert!(matches!(
            resolver.resolve_all(),
            Err(ResolutionError::CircularDependency { .. })
        ));
    }

    #[test]
    fn cycles_through_parameters_are_rejected() {
        let mut resolver = resolver(vec![def(
            "Node",
            TypeKind::structure(vec![("next", TypeKind::array(TypeKind::type_ref("Node"), None))]),
        )]);
        let params = [StructField {
            name: "n".into(),
            field_type: TypeKind::type_ref("Node"),
        }];
        let err = resolver.resolve_params("f", &params).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::CircularDependency {
                cycle: vec!["Node".into(), "Node".into()]
            }
        );
    }

    #[test]
    fn invalid_definitions_are_rejected() {
        let cases = vec![
            TypeKind::uint(7),
            TypeKind::uint(264),
            TypeKind::fixed_bytes(33),
            TypeKind::array(TypeKind::uint(8), Some(0)),
            TypeKind::Enum(crate::abi::types::EnumType { variants: vec![] }),
            TypeKind::Enum(crate::abi::types::EnumType {
                variants: vec!["A".into(), "A".into()],
            }),
        ];
        for kind in cases {
            let mut resolver = resolver(vec![def("Bad", kind.clone())]);
            assert!(
                matches!(resolver.resolve_all(), Err(ResolutionError::InvalidTypeDefinition { .. })),
                "{kind:?} should be rejected"
            );
        }
    }

    #[test]
    fn duplicate_fields_and_types_are_rejected() {
        let mut resolver = resolver(vec![def(
            "S",
            TypeKind::structure(vec![("a", TypeKind::uint(8)), ("a", TypeKind::uint(16))]),
        )]);
        assert_eq!(
            resolver.resolve_all().unwrap_err(),
            ResolutionError::DuplicateField {
                type_name: "S".into(),
                field: "a".into()
            }
        );

        let mut resolver = TypeResolver::new();
        resolver.add_typedef(def("T", TypeKind::bool())).unwrap();
        assert!(matches!(
            resolver.add_typedef(def("T", TypeKind::bool())),
            Err(ResolutionError::DuplicateType { .. })
        ));
    }
}
