use super::ir::*;
use super::merge::optimize_plan;
use crate::abi::expr::Expr;
use crate::abi::layout::{Layout, LayoutTable, WORD_SIZE};
use crate::abi::predicates::TypeQuery;
use crate::abi::resolved::{ResolvedField, ResolvedTypeKind, TypeArena, TypeId};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Validate every dynamic offset against its canonical value.
    pub strict: bool,
    /// Run the copy optimizer over the synthesized plan.
    pub merge_copies: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            strict: false,
            merge_copies: true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("type '{type_name}' cannot be decoded: {reason}")]
    UnsupportedType { type_name: String, reason: String },
}

fn word(count: u64) -> Expr {
    Expr::from(count.saturating_mul(WORD_SIZE))
}

/// Walks a laid-out type tree and produces its decoder plan.
pub struct DecoderBuilder<'a> {
    arena: &'a TypeArena,
    layouts: &'a LayoutTable,
    query: TypeQuery<'a>,
    options: DecoderOptions,
}

impl<'a> DecoderBuilder<'a> {
    pub fn new(arena: &'a TypeArena, layouts: &'a LayoutTable, options: DecoderOptions) -> Self {
        Self {
            arena,
            layouts,
            query: TypeQuery::new(arena, layouts),
            options,
        }
    }

    pub fn options(&self) -> DecoderOptions {
        self.options
    }

    /// Synthesizes and, unless disabled, merges copies.
    pub fn build(&self, id: TypeId, scope: &str) -> Result<DecoderPlan, SynthesisError> {
        let plan = self.synthesize(id, scope)?;
        let plan = if self.options.merge_copies {
            optimize_plan(plan)
        } else {
            plan
        };
        debug!(
            scope,
            copies = plan.copy_count(),
            pointers = plan.pointers.len(),
            loops = plan.loops.len(),
            checks = plan.checks.len(),
            "built decoder plan"
        );
        Ok(plan)
    }

    pub fn build_decoder(&self, id: TypeId, type_name: &str) -> Result<TypeDecoder, SynthesisError> {
        Ok(TypeDecoder {
            type_name: type_name.to_string(),
            strict: self.options.strict,
            plan: self.build(id, type_name)?,
        })
    }

    /// Plan relative to the start of the type's calldata body and memory body.
    pub fn synthesize(&self, id: TypeId, scope: &str) -> Result<DecoderPlan, SynthesisError> {
        let layout = self.layout(id)?;
        match &self.arena[id].kind {
            ResolvedTypeKind::Elementary(elementary) if elementary.is_dynamic() => Ok(self.byte_string(scope)),
            ResolvedTypeKind::Elementary(_) | ResolvedTypeKind::Enum { .. } => Ok(DecoderPlan {
                copies: vec![PendingCopy::new(Expr::lit(0), Expr::lit(0), word(1), scope)],
                memory_tail_offset: word(1),
                calldata_tail_offset: Some(word(1)),
                ..DecoderPlan::default()
            }),
            ResolvedTypeKind::Function => Err(self.unsupported(id, "function types have no calldata representation")),
            ResolvedTypeKind::Struct { fields } => self.structure(id, layout, fields, scope),
            ResolvedTypeKind::Array {
                element,
                length: Some(length),
            } => self.fixed_array(layout, *element, *length, scope),
            ResolvedTypeKind::Array { element, length: None } => self.dynamic_array(*element, scope),
        }
    }

    fn layout(&self, id: TypeId) -> Result<&'a Layout, SynthesisError> {
        self.layouts
            .get(id)
            .ok_or_else(|| self.unsupported(id, "type has no computed layout"))
    }

    fn unsupported(&self, id: TypeId, reason: &str) -> SynthesisError {
        SynthesisError::UnsupportedType {
            type_name: self.arena[id].name.clone(),
            reason: reason.to_string(),
        }
    }

    fn require_decodable(&self, id: TypeId) -> Result<(), SynthesisError> {
        if self.query.is_value_type(id) || self.query.is_reference_type(id) {
            Ok(())
        } else {
            Err(self.unsupported(id, "member is neither a value nor a reference type"))
        }
    }

    /// Length word plus the zero-padded payload.
    fn byte_string(&self, scope: &str) -> DecoderPlan {
        let size = Expr::load(Expr::lit(0)).round_up_to_word() + word(1);
        DecoderPlan {
            copies: vec![PendingCopy::new(Expr::lit(0), Expr::lit(0), size.clone(), scope)],
            memory_tail_offset: size.clone(),
            calldata_tail_offset: Some(size),
            ..DecoderPlan::default()
        }
    }

    /// Calldata start of a member whose head slot is at `head`. Dynamic members
    /// are reached through an offset relative to `tuple_start`; in strict mode
    /// the canonical offset is used and checked against the wire.
    fn member_start(
        &self,
        dynamic: bool,
        head: Expr,
        tuple_start: &Expr,
        expected: &Option<Expr>,
        checks: &mut Vec<OffsetCheck>,
        name: &str,
    ) -> Expr {
        if !dynamic {
            return head;
        }
        let actual = Expr::load(head);
        match (self.options.strict, expected) {
            (true, Some(expected)) => {
                checks.push(OffsetCheck {
                    name: format!("{name}.offset"),
                    actual,
                    expected: expected.clone(),
                });
                tuple_start.clone() + expected.clone()
            }
            _ => tuple_start.clone() + actual,
        }
    }

    fn structure(
        &self,
        id: TypeId,
        layout: &Layout,
        fields: &[ResolvedField],
        scope: &str,
    ) -> Result<DecoderPlan, SynthesisError> {
        let memory_head = Expr::from(layout.member_head_size_memory);
        let calldata_head = Expr::from(layout.member_head_size_calldata);

        if !layout.dynamic && self.query.can_be_sequentially_copied(id) {
            return Ok(DecoderPlan {
                copies: vec![PendingCopy::new(Expr::lit(0), Expr::lit(0), memory_head.clone(), scope)],
                memory_tail_offset: memory_head,
                calldata_tail_offset: Some(calldata_head),
                ..DecoderPlan::default()
            });
        }

        let mut plan = DecoderPlan::default();
        let mut cursor = memory_head;
        let mut expected = Some(calldata_head.clone());
        let tuple_start = Expr::lit(0);

        for field in fields {
            self.require_decodable(field.type_id)?;
            let child = self.layout(field.type_id)?;
            let name = format!("{scope}.{}", field.name);
            let dst = Expr::from(child.memory_head_offset);
            let head = Expr::from(child.calldata_head_offset);

            if self.query.is_value_type(field.type_id) {
                plan.copies.push(PendingCopy::new(dst, head, word(1), name));
                continue;
            }

            plan.pointers.push(PendingPointer {
                dst,
                value: cursor.clone(),
                name: Some(name.clone()),
            });
            let start = self.member_start(child.dynamic, head, &tuple_start, &expected, &mut plan.checks, &name);
            let child_plan = self.synthesize(field.type_id, &name)?.rebased(&start, &cursor);
            cursor = cursor + child_plan.memory_tail_offset.clone();
            if child.dynamic {
                expected = expected
                    .zip(child_plan.calldata_tail_offset.clone())
                    .map(|(offset, size)| offset + size);
            }
            plan.absorb(child_plan);
        }

        plan.memory_tail_offset = cursor;
        plan.calldata_tail_offset = if !layout.dynamic {
            Some(calldata_head)
        } else if self.options.strict {
            expected
        } else {
            None
        };
        Ok(plan)
    }

    fn fixed_array(
        &self,
        layout: &Layout,
        element: TypeId,
        length: u64,
        scope: &str,
    ) -> Result<DecoderPlan, SynthesisError> {
        self.require_decodable(element)?;
        let base = self.layout(element)?;
        let memory_head = word(length);

        if self.query.is_value_type(element) {
            return Ok(DecoderPlan {
                copies: vec![PendingCopy::new(Expr::lit(0), Expr::lit(0), memory_head.clone(), scope)],
                memory_tail_offset: memory_head.clone(),
                calldata_tail_offset: Some(memory_head),
                ..DecoderPlan::default()
            });
        }

        if !base.dynamic && self.query.max_reference_type_depth(element) == 1 {
            // Element bodies are laid out identically in both encodings.
            let stride = base.calldata_head_size;
            let bodies = Expr::from(length.saturating_mul(stride));
            let mut plan = DecoderPlan {
                copies: vec![PendingCopy::new(
                    memory_head.clone(),
                    Expr::lit(0),
                    bodies.clone(),
                    format!("{scope}[*]"),
                )],
                memory_tail_offset: memory_head.clone() + bodies.clone(),
                calldata_tail_offset: Some(bodies),
                ..DecoderPlan::default()
            };
            for idx in 0..length {
                plan.pointers.push(PendingPointer {
                    dst: word(idx),
                    value: memory_head.clone() + Expr::from(idx.saturating_mul(stride)),
                    name: Some(format!("{scope}[{idx}]")),
                });
            }
            return Ok(plan);
        }

        let mut plan = DecoderPlan::default();
        let mut cursor = memory_head;
        let calldata_head = Expr::from(layout.member_head_size_calldata);
        let mut expected = Some(calldata_head.clone());
        let tuple_start = Expr::lit(0);

        for idx in 0..length {
            let name = format!("{scope}[{idx}]");
            plan.pointers.push(PendingPointer {
                dst: word(idx),
                value: cursor.clone(),
                name: Some(name.clone()),
            });
            let head = Expr::from(idx.saturating_mul(base.calldata_head_size));
            let start = self.member_start(base.dynamic, head, &tuple_start, &expected, &mut plan.checks, &name);
            let child_plan = self.synthesize(element, &name)?.rebased(&start, &cursor);
            cursor = cursor + child_plan.memory_tail_offset.clone();
            if base.dynamic {
                expected = expected
                    .zip(child_plan.calldata_tail_offset.clone())
                    .map(|(offset, size)| offset + size);
            }
            plan.absorb(child_plan);
        }

        plan.memory_tail_offset = cursor;
        plan.calldata_tail_offset = if !layout.dynamic {
            Some(calldata_head)
        } else if self.options.strict {
            expected
        } else {
            None
        };
        Ok(plan)
    }

    fn dynamic_array(&self, element: TypeId, scope: &str) -> Result<DecoderPlan, SynthesisError> {
        self.require_decodable(element)?;
        let base = self.layout(element)?;
        let count = Expr::load(Expr::lit(0));
        let heads_end = count.clone() * 32 + word(1);

        if self.query.is_value_type(element) {
            return Ok(DecoderPlan {
                copies: vec![PendingCopy::new(Expr::lit(0), Expr::lit(0), heads_end.clone(), scope)],
                memory_tail_offset: heads_end.clone(),
                calldata_tail_offset: Some(heads_end),
                ..DecoderPlan::default()
            });
        }

        let index_name = format!("{scope}.index");
        let index = Expr::var(index_name.clone());
        let element_name = format!("{scope}[]");
        let length_copy = PendingCopy::new(Expr::lit(0), Expr::lit(0), word(1), format!("{scope}.length"));
        let element_head = index.clone() * 32 + word(1);

        if !base.dynamic && self.query.max_reference_type_depth(element) == 1 {
            let stride = Expr::from(base.calldata_head_size);
            let bodies = count.clone() * stride.clone();
            let body = DecoderPlan {
                pointers: vec![PendingPointer {
                    dst: element_head,
                    value: heads_end.clone() + index * stride,
                    name: Some(element_name),
                }],
                ..DecoderPlan::default()
            };
            return Ok(DecoderPlan {
                copies: vec![
                    length_copy,
                    PendingCopy::new(heads_end.clone(), word(1), bodies.clone(), format!("{scope}[*]")),
                ],
                loops: vec![PendingLoop {
                    name: scope.to_string(),
                    index: index_name,
                    count,
                    cursors: Vec::new(),
                    body,
                }],
                memory_tail_offset: heads_end + bodies.clone(),
                calldata_tail_offset: Some(bodies + word(1)),
                ..DecoderPlan::default()
            });
        }

        let memory_cursor_name = format!("{scope}.cursor");
        let memory_cursor = Expr::var(memory_cursor_name.clone());
        let calldata_cursor_name = format!("{scope}.offset");
        let calldata_cursor = Expr::var(calldata_cursor_name.clone());
        let track_offsets = base.dynamic && self.options.strict;

        let mut body = DecoderPlan::default();
        body.pointers.push(PendingPointer {
            dst: element_head.clone(),
            value: memory_cursor.clone(),
            name: Some(element_name.clone()),
        });
        let start = if !base.dynamic {
            index.clone() * Expr::from(base.calldata_head_size) + word(1)
        } else {
            self.member_start(
                true,
                element_head,
                &word(1),
                &Some(calldata_cursor.clone()).filter(|_| track_offsets),
                &mut body.checks,
                &element_name,
            )
        };
        let child_plan = self.synthesize(element, &element_name)?.rebased(&start, &memory_cursor);

        let mut cursors = vec![LoopCursor {
            name: memory_cursor_name,
            init: heads_end.clone(),
            step: child_plan.memory_tail_offset.clone(),
        }];
        if track_offsets {
            let step = child_plan
                .calldata_tail_offset
                .clone()
                .ok_or_else(|| self.unsupported(element, "calldata size of element is unknown"))?;
            cursors.push(LoopCursor {
                name: calldata_cursor_name,
                init: count.clone() * 32,
                step,
            });
        }
        body.absorb(child_plan);

        let calldata_tail_offset = if !base.dynamic {
            Some(count.clone() * Expr::from(base.calldata_head_size) + word(1))
        } else if track_offsets {
            Some(calldata_cursor + word(1))
        } else {
            None
        };

        Ok(DecoderPlan {
            copies: vec![length_copy],
            loops: vec![PendingLoop {
                name: scope.to_string(),
                index: index_name,
                count,
                cursors,
                body,
            }],
            memory_tail_offset: memory_cursor,
            calldata_tail_offset,
            ..DecoderPlan::default()
        })
    }
}
