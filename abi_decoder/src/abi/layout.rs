//! Head/tail sizing of every arena node in both the calldata encoding and
//! the memory representation.
//!
//! Calldata inlines any statically-sized value; memory always stores one
//! word per member, a pointer for every reference type. The two member head
//! sizes are therefore tracked separately and only coincide when every
//! member is a value type or dynamic.

use crate::abi::resolved::{ResolvedTypeKind, TypeArena, TypeId};
use serde_derive::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

pub const WORD_SIZE: u64 = 32;

/// Structural class of a node, as far as body sizing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutShape {
    Value,
    Bytes,
    FixedArray,
    DynamicArray,
    Struct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub shape: LayoutShape,
    pub dynamic: bool,
    pub calldata_head_size: u64,
    /// Lower bound for dynamic types: the length word alone.
    pub calldata_tail_size: u64,
    pub memory_head_size: u64,
    pub memory_tail_size: u64,
    /// Position within the immediate parent.
    pub calldata_head_offset: u64,
    pub memory_head_offset: u64,
    pub member_head_size_calldata: u64,
    pub member_head_size_memory: u64,
    pub can_copy_head: bool,
    pub can_copy_tail: bool,
    pub minimum_bytes: u64,
    pub is_first_dynamic_type: bool,
    pub dynamic_children_depth: u32,
}

impl Layout {
    /// Bytes addressed by a memory pointer to this node.
    pub fn memory_body_size(&self) -> u64 {
        match self.shape {
            LayoutShape::Struct | LayoutShape::FixedArray => self.memory_head_size + self.memory_tail_size,
            LayoutShape::Value | LayoutShape::Bytes | LayoutShape::DynamicArray => self.memory_tail_size,
        }
    }

    /// Bytes of the node's own calldata region (its tuple or tail).
    pub fn calldata_body_size(&self) -> u64 {
        if self.dynamic {
            self.calldata_tail_size
        } else {
            self.calldata_head_size
        }
    }

    fn scalar(shape: LayoutShape, dynamic: bool) -> Self {
        let tail = if dynamic { WORD_SIZE } else { 0 };
        Layout {
            shape,
            dynamic,
            calldata_head_size: WORD_SIZE,
            calldata_tail_size: tail,
            memory_head_size: WORD_SIZE,
            memory_tail_size: tail,
            calldata_head_offset: 0,
            memory_head_offset: 0,
            member_head_size_calldata: 0,
            member_head_size_memory: 0,
            can_copy_head: true,
            can_copy_tail: true,
            minimum_bytes: WORD_SIZE + tail,
            is_first_dynamic_type: false,
            dynamic_children_depth: u32::from(dynamic),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("type '{type_name}' is not supported: {reason}")]
    UnsupportedType { type_name: String, reason: String },
}

/// Immutable per-node layout records, indexed by [`TypeId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutTable {
    layouts: Vec<Option<Layout>>,
}

impl LayoutTable {
    pub fn get(&self, id: TypeId) -> Option<&Layout> {
        self.layouts.get(id.index()).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.layouts.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Layout)> {
        self.layouts
            .iter()
            .enumerate()
            .filter_map(|(idx, layout)| layout.as_ref().map(|layout| (TypeId(idx), layout)))
    }
}

impl std::ops::Index<TypeId> for LayoutTable {
    type Output = Layout;

    fn index(&self, id: TypeId) -> &Layout {
        match self.get(id) {
            Some(layout) => layout,
            None => panic!("no layout computed for type {id}"),
        }
    }
}

/// Lays out every node of the arena. Sizes saturate rather than wrap.
pub fn compute_layouts(arena: &TypeArena) -> Result<LayoutTable, LayoutError> {
    let ids: Vec<TypeId> = arena.iter().map(|(id, _)| id).collect();
    build_table(arena, &ids)
}

/// Lays out only the tree rooted at `root`.
pub fn compute_layouts_for(arena: &TypeArena, root: TypeId) -> Result<LayoutTable, LayoutError> {
    build_table(arena, &arena.subtree(root))
}

fn build_table(arena: &TypeArena, ids: &[TypeId]) -> Result<LayoutTable, LayoutError> {
    let mut layouts: Vec<Option<Layout>> = vec![None; arena.len()];

    // Post-order: every child id is smaller than its parent's.
    for &id in ids {
        let layout = compute_layout(arena, &layouts, id)?;
        trace!(type_id = %id, name = %arena[id].name, ?layout, "computed layout");
        layouts[id.index()] = Some(layout);
    }

    // A node's position is owned by its parent; fill it in before freezing.
    for &id in ids {
        for (child, calldata_offset, memory_offset, first_dynamic) in placements(arena, &layouts, id) {
            if let Some(layout) = layouts[child.index()].as_mut() {
                layout.calldata_head_offset = calldata_offset;
                layout.memory_head_offset = memory_offset;
                layout.is_first_dynamic_type = first_dynamic;
            }
        }
    }

    debug!(nodes = ids.len(), "layout table complete");
    Ok(LayoutTable { layouts })
}

/// Computes the intrinsic layout of `id` from the already-computed layouts of
/// its children. Offsets are left at zero; the parent assigns them.
pub fn compute_layout(arena: &TypeArena, layouts: &[Option<Layout>], id: TypeId) -> Result<Layout, LayoutError> {
    let node = &arena[id];
    let child = |child: TypeId| child_layout(layouts, &node.name, child);

    match &node.kind {
        ResolvedTypeKind::Elementary(elementary) => {
            if elementary.is_dynamic() {
                Ok(Layout::scalar(LayoutShape::Bytes, true))
            } else {
                Ok(Layout::scalar(LayoutShape::Value, false))
            }
        }
        ResolvedTypeKind::Enum { .. } => Ok(Layout::scalar(LayoutShape::Value, false)),
        ResolvedTypeKind::Function => Err(LayoutError::UnsupportedType {
            type_name: node.name.clone(),
            reason: "function types have no calldata representation".to_string(),
        }),
        ResolvedTypeKind::Array {
            element,
            length: Some(length),
        } => {
            let base = child(*element)?;
            let base_is_reference = base.shape != LayoutShape::Value;
            let dynamic = base.dynamic;
            let member_head_size_calldata = length.saturating_mul(base.calldata_head_size);
            let memory_head_size = length.saturating_mul(WORD_SIZE);
            let memory_tail_size = if base_is_reference {
                length.saturating_mul(base.memory_body_size())
            } else {
                0
            };
            let calldata_head_size = if dynamic { WORD_SIZE } else { member_head_size_calldata };
            let calldata_tail_size = if dynamic {
                member_head_size_calldata.saturating_add(length.saturating_mul(base.calldata_tail_size))
            } else {
                0
            };
            Ok(Layout {
                shape: LayoutShape::FixedArray,
                dynamic,
                calldata_head_size,
                calldata_tail_size,
                memory_head_size,
                memory_tail_size,
                calldata_head_offset: 0,
                memory_head_offset: 0,
                member_head_size_calldata,
                member_head_size_memory: memory_head_size,
                can_copy_head: base.dynamic,
                can_copy_tail: base.dynamic && base.can_copy_head && base.can_copy_tail,
                minimum_bytes: calldata_head_size.saturating_add(calldata_tail_size),
                is_first_dynamic_type: false,
                dynamic_children_depth: u32::from(dynamic) + base.dynamic_children_depth,
            })
        }
        ResolvedTypeKind::Array { element, length: None } => {
            let base = child(*element)?;
            let base_is_value = base.shape == LayoutShape::Value;
            Ok(Layout {
                shape: LayoutShape::DynamicArray,
                dynamic: true,
                calldata_head_size: WORD_SIZE,
                calldata_tail_size: WORD_SIZE,
                memory_head_size: WORD_SIZE,
                memory_tail_size: WORD_SIZE,
                calldata_head_offset: 0,
                memory_head_offset: 0,
                member_head_size_calldata: 0,
                member_head_size_memory: 0,
                can_copy_head: base_is_value || base.dynamic,
                can_copy_tail: base.can_copy_tail && (base_is_value || base.dynamic),
                minimum_bytes: 2 * WORD_SIZE,
                is_first_dynamic_type: false,
                dynamic_children_depth: 1 + base.dynamic_children_depth,
            })
        }
        ResolvedTypeKind::Struct { fields } => {
            let mut dynamic = false;
            let mut member_head_size_calldata: u64 = 0;
            let mut member_head_size_memory = 0;
            let mut memory_tail_size: u64 = 0;
            let mut member_tails: u64 = 0;
            let mut can_copy_tail = true;
            let mut depth: u32 = 0;
            for field in fields {
                let layout = child(field.type_id)?;
                dynamic |= layout.dynamic;
                member_head_size_calldata = member_head_size_calldata.saturating_add(layout.calldata_head_size);
                member_head_size_memory += WORD_SIZE;
                if layout.shape != LayoutShape::Value {
                    memory_tail_size = memory_tail_size.saturating_add(layout.memory_body_size());
                }
                member_tails = member_tails.saturating_add(layout.calldata_tail_size);
                can_copy_tail &= layout.can_copy_head && layout.can_copy_tail;
                depth = depth.max(layout.dynamic_children_depth);
            }
            let calldata_head_size = if dynamic { WORD_SIZE } else { member_head_size_calldata };
            let calldata_tail_size = if dynamic {
                member_head_size_calldata.saturating_add(member_tails)
            } else {
                0
            };
            Ok(Layout {
                shape: LayoutShape::Struct,
                dynamic,
                calldata_head_size,
                calldata_tail_size,
                memory_head_size: member_head_size_memory,
                memory_tail_size,
                calldata_head_offset: 0,
                memory_head_offset: 0,
                member_head_size_calldata,
                member_head_size_memory,
                can_copy_head: member_head_size_calldata == member_head_size_memory,
                can_copy_tail,
                minimum_bytes: calldata_head_size.saturating_add(calldata_tail_size),
                is_first_dynamic_type: false,
                dynamic_children_depth: u32::from(dynamic) + depth,
            })
        }
    }
}

fn child_layout<'a>(layouts: &'a [Option<Layout>], parent: &str, child: TypeId) -> Result<&'a Layout, LayoutError> {
    layouts
        .get(child.index())
        .and_then(Option::as_ref)
        .ok_or_else(|| LayoutError::UnsupportedType {
            type_name: parent.to_string(),
            reason: format!("member {child} has no layout"),
        })
}

/// `(child, calldata offset, memory offset, is first dynamic)` for each child.
fn placements(arena: &TypeArena, layouts: &[Option<Layout>], id: TypeId) -> Vec<(TypeId, u64, u64, bool)> {
    let dynamic = |child: TypeId| {
        layouts
            .get(child.index())
            .and_then(Option::as_ref)
            .is_some_and(|layout| layout.dynamic)
    };
    match &arena[id].kind {
        ResolvedTypeKind::Struct { fields } => {
            let mut out = Vec::with_capacity(fields.len());
            let mut calldata_offset = 0;
            let mut seen_dynamic = false;
            for (idx, field) in fields.iter().enumerate() {
                let is_dynamic = dynamic(field.type_id);
                out.push((
                    field.type_id,
                    calldata_offset,
                    idx as u64 * WORD_SIZE,
                    is_dynamic && !seen_dynamic,
                ));
                seen_dynamic |= is_dynamic;
                calldata_offset += layouts
                    .get(field.type_id.index())
                    .and_then(Option::as_ref)
                    .map_or(0, |layout| layout.calldata_head_size);
            }
            out
        }
        ResolvedTypeKind::Array { element, .. } => vec![(*element, 0, 0, dynamic(*element))],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::resolved::TypeResolver;
    use crate::abi::types::{StructField, TypeKind};

    fn lay_out(kind: TypeKind) -> (TypeArena, LayoutTable, TypeId) {
        let mut resolver = TypeResolver::new();
        let id = resolver
            .resolve_params(
                "root",
                &[StructField {
                    name: "value".into(),
                    field_type: kind,
                }],
            )
            .unwrap();
        let table = compute_layouts(&resolver.arena).unwrap();
        let child = resolver.arena.children(id)[0];
        (resolver.arena, table, child)
    }

    #[test]
    fn scalars() {
        let (_, table, id) = lay_out(TypeKind::uint(256));
        let layout = &table[id];
        assert!(!layout.dynamic);
        assert_eq!(layout.calldata_head_size, 32);
        assert_eq!(layout.calldata_tail_size, 0);
        assert_eq!(layout.memory_body_size(), 0);
        assert!(layout.can_copy_head && layout.can_copy_tail);

        let (_, table, id) = lay_out(TypeKind::string());
        let layout = &table[id];
        assert!(layout.dynamic);
        assert_eq!(layout.calldata_tail_size, 32);
        assert_eq!(layout.memory_tail_size, 32);
        assert_eq!(layout.minimum_bytes, 64);
        assert_eq!(layout.dynamic_children_depth, 1);
    }

    #[test]
    fn fixed_array_of_static_values() {
        let (_, table, id) = lay_out(TypeKind::array(TypeKind::uint(64), Some(4)));
        let layout = &table[id];
        assert!(!layout.dynamic);
        assert_eq!(layout.calldata_head_size, 128);
        assert_eq!(layout.member_head_size_calldata, 128);
        assert_eq!(layout.member_head_size_memory, 128);
        assert_eq!(layout.memory_tail_size, 0);
        assert!(!layout.can_copy_head);
        assert!(!layout.can_copy_tail);
    }

    #[test]
    fn dynamic_array_layout() {
        let (arena, table, id) = lay_out(TypeKind::array(TypeKind::bytes(), None));
        let layout = &table[id];
        assert!(layout.dynamic);
        assert_eq!(layout.calldata_head_size, 32);
        assert_eq!(layout.memory_head_size, 32);
        assert_eq!(layout.calldata_tail_size, 32);
        assert_eq!(layout.member_head_size_calldata, 0);
        assert!(layout.can_copy_head && layout.can_copy_tail);
        assert_eq!(layout.dynamic_children_depth, 2);

        let element = arena.children(id)[0];
        assert!(table[element].is_first_dynamic_type);
    }

    #[test]
    fn function_types_are_unsupported() {
        let mut resolver = TypeResolver::new();
        resolver
            .resolve_params(
                "callback",
                &[StructField {
                    name: "f".into(),
                    field_type: TypeKind::Function(Default::default()),
                }],
            )
            .unwrap();
        let err = compute_layouts(&resolver.arena).unwrap_err();
        assert_eq!(
            err,
            LayoutError::UnsupportedType {
                type_name: "function".into(),
                reason: "function types have no calldata representation".into()
            }
        );
    }

    #[test]
    fn struct_offsets_and_first_dynamic_field() {
        let mut resolver = TypeResolver::new();
        let root = resolver
            .resolve_params(
                "f",
                &[
                    StructField {
                        name: "a".into(),
                        field_type: TypeKind::array(TypeKind::uint(8), Some(2)),
                    },
                    StructField {
                        name: "b".into(),
                        field_type: TypeKind::bytes(),
                    },
                    StructField {
                        name: "c".into(),
                        field_type: TypeKind::string(),
                    },
                ],
            )
            .unwrap();
        let table = compute_layouts_for(&resolver.arena, root).unwrap();
        let fields = resolver.arena.children(root);
        let offsets: Vec<(u64, u64, bool)> = fields
            .iter()
            .map(|id| {
                let layout = &table[*id];
                (layout.calldata_head_offset, layout.memory_head_offset, layout.is_first_dynamic_type)
            })
            .collect();
        assert_eq!(offsets, vec![(0, 0, false), (64, 32, true), (96, 64, false)]);

        let layout = &table[root];
        assert!(layout.dynamic);
        assert_eq!(layout.member_head_size_calldata, 128);
        assert_eq!(layout.member_head_size_memory, 96);
        assert_eq!(layout.calldata_head_size, 32);
        assert_eq!(layout.calldata_tail_size, 128 + 64);
        assert_eq!(layout.memory_tail_size, 64 + 32 + 32);
        assert!(!layout.can_copy_head);
    }
}
