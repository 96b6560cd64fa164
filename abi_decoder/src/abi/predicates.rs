use crate::abi::layout::LayoutTable;
use crate::abi::resolved::{ResolvedTypeKind, TypeArena, TypeId};

/// Derived queries over a laid-out type tree, shared by the synthesizer and
/// emitters deciding between unrolled and counted loops.
#[derive(Debug, Clone, Copy)]
pub struct TypeQuery<'a> {
    pub arena: &'a TypeArena,
    pub layouts: &'a LayoutTable,
}

impl<'a> TypeQuery<'a> {
    pub fn new(arena: &'a TypeArena, layouts: &'a LayoutTable) -> Self {
        Self { arena, layouts }
    }

    /// Statically-sized scalars embedded directly in their head slot.
    pub fn is_value_type(&self, id: TypeId) -> bool {
        match &self.arena[id].kind {
            ResolvedTypeKind::Elementary(elementary) => !elementary.is_dynamic(),
            ResolvedTypeKind::Enum { .. } => true,
            _ => false,
        }
    }

    /// Types represented in memory by a pointer to their body.
    pub fn is_reference_type(&self, id: TypeId) -> bool {
        match &self.arena[id].kind {
            ResolvedTypeKind::Elementary(elementary) => elementary.is_dynamic(),
            ResolvedTypeKind::Array { .. } | ResolvedTypeKind::Struct { .. } => true,
            ResolvedTypeKind::Enum { .. } | ResolvedTypeKind::Function => false,
        }
    }

    pub fn is_dynamic(&self, id: TypeId) -> bool {
        self.layouts.get(id).is_some_and(|layout| layout.dynamic)
    }

    /// Number of pointer hops from this node to its deepest value.
    pub fn max_reference_type_depth(&self, id: TypeId) -> u32 {
        if !self.is_reference_type(id) {
            return 0;
        }
        1 + self
            .arena
            .children(id)
            .into_iter()
            .map(|child| self.max_reference_type_depth(child))
            .max()
            .unwrap_or(0)
    }

    /// True when the memory body is a flat copy of the calldata body, with
    /// no pointer inside it to rewrite.
    pub fn can_be_sequentially_copied(&self, id: TypeId) -> bool {
        self.max_reference_type_depth(id) <= 1
    }

    pub fn max_dynamic_children_depth(&self, id: TypeId) -> u32 {
        self.layouts
            .get(id)
            .map_or(0, |layout| layout.dynamic_children_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::layout::compute_layouts;
    use crate::abi::resolved::TypeResolver;
    use crate::abi::types::{StructField, TypeDef, TypeKind};

    #[test]
    fn classification_and_depths() {
        let mut resolver = TypeResolver::new();
        resolver
            .add_typedef(TypeDef {
                name: "Point".into(),
                kind: TypeKind::structure(vec![("x", TypeKind::int(64)), ("y", TypeKind::int(64))]),
            })
            .unwrap();
        resolver.resolve_all().unwrap();
        let params: Vec<StructField> = [
            ("flag", TypeKind::bool()),
            ("point", TypeKind::type_ref("Point")),
            ("points", TypeKind::array(TypeKind::type_ref("Point"), Some(3))),
            ("names", TypeKind::array(TypeKind::string(), None)),
        ]
        .into_iter()
        .map(|(name, field_type)| StructField {
            name: name.into(),
            field_type,
        })
        .collect();
        let root = resolver.resolve_params("f", &params).unwrap();
        let layouts = compute_layouts(&resolver.arena).unwrap();
        let query = TypeQuery::new(&resolver.arena, &layouts);
        let fields = resolver.arena.children(root);

        assert!(query.is_value_type(fields[0]));
        assert!(!query.is_reference_type(fields[0]));
        assert_eq!(query.max_reference_type_depth(fields[0]), 0);

        assert!(query.is_reference_type(fields[1]));
        assert_eq!(query.max_reference_type_depth(fields[1]), 1);
        assert!(query.can_be_sequentially_copied(fields[1]));

        assert_eq!(query.max_reference_type_depth(fields[2]), 2);
        assert!(!query.can_be_sequentially_copied(fields[2]));
        assert!(!query.is_dynamic(fields[2]));

        assert!(query.is_dynamic(fields[3]));
        assert_eq!(query.max_reference_type_depth(fields[3]), 2);
        assert_eq!(query.max_dynamic_children_depth(fields[3]), 2);
        assert_eq!(query.max_dynamic_children_depth(root), 3);
    }
}
