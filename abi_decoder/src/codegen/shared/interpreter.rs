//! Reference executor for decoder plans.
//!
//! Runs a [`DecoderPlan`] against a calldata buffer and produces the memory
//! image a generated decoder would leave behind. Wire reads are 32-byte
//! big-endian words; reading past the end of calldata yields zero bytes.

use super::ir::{DecoderPlan, OffsetCheck, PendingLoop};
use crate::abi::expr::{BinaryExpr, Expr};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::trace;

/// Upper bound on the memory a single run may touch.
pub const DEFAULT_MEMORY_LIMIT: u64 = 1 << 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpretError {
    #[error("calldata is not canonically encoded (failed checks: {})", failed_checks.join(", "))]
    InvalidEncoding { failed_checks: Vec<String> },
    #[error("variable '{name}' is not bound")]
    UnboundVariable { name: String },
    #[error("calldata word at {address} does not fit in 63 bits")]
    WordOverflow { address: i64 },
    #[error("arithmetic overflow evaluating {expr}")]
    ArithmeticOverflow { expr: String },
    #[error("negative address {address}")]
    NegativeAddress { address: i64 },
    #[error("run needs {requested} bytes of memory, limit is {limit}")]
    MemoryLimitExceeded { requested: u64, limit: u64 },
}

/// Memory left behind by a plan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryImage {
    pub bytes: Vec<u8>,
    /// Evaluated memory tail offset of the plan, relative to its memory base.
    pub size: u64,
    /// Evaluated calldata tail offset, when the plan knows it.
    pub calldata_size: Option<u64>,
}

impl MemoryImage {
    pub fn word(&self, offset: u64) -> [u8; 32] {
        let mut out = [0u8; 32];
        let bytes = self.slice(offset, 32);
        out.copy_from_slice(&bytes);
        out
    }

    /// The word at `offset` as an integer, if it fits in 64 bits.
    pub fn word_value(&self, offset: u64) -> Option<u64> {
        let word = self.word(offset);
        if word[..24].iter().any(|b| *b != 0) {
            return None;
        }
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&word[24..]);
        Some(u64::from_be_bytes(tail))
    }

    /// `len` bytes starting at `offset`, zero-filled past the written region.
    pub fn slice(&self, offset: u64, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start < self.bytes.len() {
            let available = (self.bytes.len() - start).min(len);
            out[..available].copy_from_slice(&self.bytes[start..start + available]);
        }
        out
    }
}

pub struct PlanInterpreter<'a> {
    calldata: &'a [u8],
    memory_limit: u64,
    vars: HashMap<String, i64>,
    memory: Vec<u8>,
}

impl<'a> PlanInterpreter<'a> {
    pub fn new(calldata: &'a [u8]) -> Self {
        Self {
            calldata,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            vars: HashMap::new(),
            memory: Vec::new(),
        }
    }

    pub fn with_memory_limit(mut self, limit: u64) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Executes `plan` with its calldata starting at `calldata_base` and its
    /// memory at `memory_base`.
    pub fn run(mut self, plan: &DecoderPlan, calldata_base: i64, memory_base: i64) -> Result<MemoryImage, InterpretError> {
        let plan = if calldata_base == 0 && memory_base == 0 {
            plan.clone()
        } else {
            plan.rebased(&Expr::lit(calldata_base), &Expr::lit(memory_base))
        };
        self.execute(&plan)?;

        let size = self.address(&plan.memory_tail_offset)?;
        let calldata_size = match &plan.calldata_tail_offset {
            Some(expr) => Some(self.address(expr)?),
            None => None,
        };
        Ok(MemoryImage {
            bytes: self.memory,
            size,
            calldata_size,
        })
    }

    /// Checks run before anything at their level reads a size or count.
    /// Checks that need the final cursor of a sibling loop run as soon as
    /// the loops finish, still ahead of the copies.
    fn execute(&mut self, plan: &DecoderPlan) -> Result<(), InterpretError> {
        let mut cursors = HashSet::new();
        collect_cursors(plan, &mut cursors);
        let (after_loops, before_loops): (Vec<&OffsetCheck>, Vec<&OffsetCheck>) = plan.checks.iter().partition(|check| {
            check
                .actual
                .vars()
                .into_iter()
                .chain(check.expected.vars())
                .any(|name| cursors.contains(name))
        });

        self.run_checks(&before_loops)?;
        for pending_loop in &plan.loops {
            self.execute_loop(pending_loop)?;
        }
        self.run_checks(&after_loops)?;

        for copy in &plan.copies {
            let dst = self.address(&copy.dst)?;
            let src = self.address(&copy.src)?;
            let size = self.address(&copy.size)?;
            trace!(dst, src, size, names = ?copy.names, "copy");
            let end = self.reserve(dst, size)?;
            for (offset, slot) in self.memory[dst as usize..end].iter_mut().enumerate() {
                *slot = calldata_byte(self.calldata, src.saturating_add(offset as u64));
            }
        }

        for pointer in &plan.pointers {
            let dst = self.address(&pointer.dst)?;
            let value = self.address(&pointer.value)?;
            let end = self.reserve(dst, 32)?;
            let slot = &mut self.memory[dst as usize..end];
            slot.fill(0);
            slot[24..].copy_from_slice(&value.to_be_bytes());
        }
        Ok(())
    }

    /// Fails with every mismatching check of the batch. An offset word too
    /// large to be a position never matches its canonical value.
    fn run_checks(&self, checks: &[&OffsetCheck]) -> Result<(), InterpretError> {
        let mut failed_checks = Vec::new();
        for check in checks {
            let actual = match self.eval(&check.actual) {
                Ok(actual) => Some(actual),
                Err(InterpretError::WordOverflow { .. }) => None,
                Err(err) => return Err(err),
            };
            let expected = self.eval(&check.expected)?;
            if actual != Some(expected) {
                trace!(name = %check.name, ?actual, expected, "offset check failed");
                failed_checks.push(check.name.clone());
            }
        }
        if failed_checks.is_empty() {
            Ok(())
        } else {
            Err(InterpretError::InvalidEncoding { failed_checks })
        }
    }

    fn execute_loop(&mut self, pending_loop: &PendingLoop) -> Result<(), InterpretError> {
        let count = self.address(&pending_loop.count)?;
        // Every iteration writes at least one word.
        self.reserve_check(count.saturating_mul(32))?;

        for cursor in &pending_loop.cursors {
            let init = self.eval(&cursor.init)?;
            self.vars.insert(cursor.name.clone(), init);
        }
        for index in 0..count {
            self.vars.insert(pending_loop.index.clone(), index as i64);
            self.execute(&pending_loop.body)?;

            let steps = pending_loop
                .cursors
                .iter()
                .map(|cursor| self.eval(&cursor.step))
                .collect::<Result<Vec<_>, _>>()?;
            for (cursor, step) in pending_loop.cursors.iter().zip(steps) {
                let current = self.var(&cursor.name)?;
                let next = current.checked_add(step).ok_or_else(|| InterpretError::ArithmeticOverflow {
                    expr: format!("{} + {step}", cursor.name),
                })?;
                self.vars.insert(cursor.name.clone(), next);
            }
        }
        Ok(())
    }

    fn reserve_check(&self, requested: u64) -> Result<(), InterpretError> {
        if requested > self.memory_limit {
            return Err(InterpretError::MemoryLimitExceeded {
                requested,
                limit: self.memory_limit,
            });
        }
        Ok(())
    }

    /// Grows memory to cover `[dst, dst + size)` and returns the end.
    fn reserve(&mut self, dst: u64, size: u64) -> Result<usize, InterpretError> {
        let end = dst.saturating_add(size);
        self.reserve_check(end)?;
        let end = end as usize;
        if self.memory.len() < end {
            self.memory.resize(end, 0);
        }
        Ok(end)
    }

    fn var(&self, name: &str) -> Result<i64, InterpretError> {
        self.vars
            .get(name)
            .copied()
            .ok_or_else(|| InterpretError::UnboundVariable { name: name.to_string() })
    }

    fn address(&self, expr: &Expr) -> Result<u64, InterpretError> {
        let value = self.eval(expr)?;
        u64::try_from(value).map_err(|_| InterpretError::NegativeAddress { address: value })
    }

    fn eval(&self, expr: &Expr) -> Result<i64, InterpretError> {
        match expr {
            Expr::Literal(value) => Ok(*value),
            Expr::Var(name) => self.var(name),
            Expr::Load(address) => {
                let address = self.eval(address)?;
                let start = u64::try_from(address).map_err(|_| InterpretError::NegativeAddress { address })?;
                load_word(self.calldata, start).ok_or(InterpretError::WordOverflow { address })
            }
            Expr::Binary(BinaryExpr { op, left, right }) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                op.apply(l, r)
                    .ok_or_else(|| InterpretError::ArithmeticOverflow { expr: expr.to_string() })
            }
        }
    }
}

fn collect_cursors<'p>(plan: &'p DecoderPlan, cursors: &mut HashSet<&'p str>) {
    for pending_loop in &plan.loops {
        cursors.extend(pending_loop.cursors.iter().map(|cursor| cursor.name.as_str()));
        collect_cursors(&pending_loop.body, cursors);
    }
}

fn calldata_byte(calldata: &[u8], offset: u64) -> u8 {
    usize::try_from(offset)
        .ok()
        .and_then(|offset| calldata.get(offset))
        .copied()
        .unwrap_or(0)
}

fn load_word(calldata: &[u8], start: u64) -> Option<i64> {
    let mut value: i64 = 0;
    for offset in 0..32u64 {
        let byte = calldata_byte(calldata, start.saturating_add(offset));
        value = value.checked_mul(256)?.checked_add(i64::from(byte))?;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::shared::ir::{LoopCursor, OffsetCheck, PendingCopy, PendingPointer};

    fn word(value: u64) -> Vec<u8> {
        let mut out = vec![0u8; 32];
        out[24..].copy_from_slice(&value.to_be_bytes());
        out
    }

    #[test]
    fn copies_then_pointers() {
        let calldata = [word(7), word(9)].concat();
        let plan = DecoderPlan {
            copies: vec![PendingCopy::new(Expr::lit(0), Expr::lit(0), Expr::lit(64), "pair")],
            pointers: vec![PendingPointer {
                dst: Expr::lit(32),
                value: Expr::lit(64),
                name: None,
            }],
            memory_tail_offset: Expr::lit(64),
            ..DecoderPlan::default()
        };
        let image = PlanInterpreter::new(&calldata).run(&plan, 0, 0).unwrap();
        assert_eq!(image.word_value(0), Some(7));
        assert_eq!(image.word_value(32), Some(64));
        assert_eq!(image.size, 64);
    }

    #[test]
    fn reads_past_calldata_are_zero() {
        let calldata = word(5);
        let plan = DecoderPlan {
            copies: vec![PendingCopy::new(Expr::lit(0), Expr::lit(16), Expr::lit(32), "tail")],
            ..DecoderPlan::default()
        };
        let image = PlanInterpreter::new(&calldata).run(&plan, 0, 0).unwrap();
        assert_eq!(image.word(0)[8..16], [0, 0, 0, 0, 0, 0, 0, 5]);
        assert_eq!(image.word(0)[16..], [0u8; 16]);
    }

    #[test]
    fn loops_advance_cursors() {
        let calldata = word(3);
        let plan = DecoderPlan {
            loops: vec![PendingLoop {
                name: "xs".into(),
                index: "i".into(),
                count: Expr::load(Expr::lit(0)),
                cursors: vec![LoopCursor {
                    name: "m".into(),
                    init: Expr::lit(128),
                    step: Expr::lit(64),
                }],
                body: DecoderPlan {
                    pointers: vec![PendingPointer {
                        dst: Expr::var("i") * 32,
                        value: Expr::var("m"),
                        name: None,
                    }],
                    ..DecoderPlan::default()
                },
            }],
            memory_tail_offset: Expr::var("m"),
            ..DecoderPlan::default()
        };
        let image = PlanInterpreter::new(&calldata).run(&plan, 0, 0).unwrap();
        assert_eq!(image.word_value(64), Some(256));
        assert_eq!(image.size, 320);
    }

    #[test]
    fn failed_checks_are_reported_together() {
        let calldata = word(96);
        let plan = DecoderPlan {
            checks: vec![
                OffsetCheck {
                    name: "a".into(),
                    actual: Expr::load(Expr::lit(0)),
                    expected: Expr::lit(64),
                },
                OffsetCheck {
                    name: "b".into(),
                    actual: Expr::lit(1),
                    expected: Expr::lit(1),
                },
            ],
            ..DecoderPlan::default()
        };
        assert_eq!(
            PlanInterpreter::new(&calldata).run(&plan, 0, 0),
            Err(InterpretError::InvalidEncoding {
                failed_checks: vec!["a".into()]
            })
        );
    }

    #[test]
    fn checks_run_before_sizes_are_read() {
        // The offset says 64 where 32 is canonical; the slot at 32 is junk.
        let calldata = [word(64), vec![0xff; 32]].concat();
        let plan = DecoderPlan {
            copies: vec![PendingCopy::new(Expr::lit(0), Expr::lit(32), Expr::load(Expr::lit(32)), "values")],
            checks: vec![OffsetCheck {
                name: "values.offset".into(),
                actual: Expr::load(Expr::lit(0)),
                expected: Expr::lit(32),
            }],
            memory_tail_offset: Expr::load(Expr::lit(32)),
            ..DecoderPlan::default()
        };
        assert_eq!(
            PlanInterpreter::new(&calldata).run(&plan, 0, 0),
            Err(InterpretError::InvalidEncoding {
                failed_checks: vec!["values.offset".into()]
            })
        );

        let junk_offset = vec![0xff; 32];
        assert_eq!(
            PlanInterpreter::new(&junk_offset).run(&plan, 0, 0),
            Err(InterpretError::InvalidEncoding {
                failed_checks: vec!["values.offset".into()]
            })
        );
    }

    #[test]
    fn checks_on_loop_cursors_wait_for_the_loop() {
        // Two elements of 32 bytes each, so the next member starts at 96.
        let calldata = [word(2), word(96)].concat();
        let plan = DecoderPlan {
            loops: vec![PendingLoop {
                name: "xs".into(),
                index: "i".into(),
                count: Expr::load(Expr::lit(0)),
                cursors: vec![LoopCursor {
                    name: "cd".into(),
                    init: Expr::lit(32),
                    step: Expr::lit(32),
                }],
                body: DecoderPlan::default(),
            }],
            checks: vec![OffsetCheck {
                name: "next.offset".into(),
                actual: Expr::load(Expr::lit(32)),
                expected: Expr::var("cd"),
            }],
            memory_tail_offset: Expr::var("cd"),
            ..DecoderPlan::default()
        };
        let image = PlanInterpreter::new(&calldata).run(&plan, 0, 0).unwrap();
        assert_eq!(image.size, 96);
    }

    #[test]
    fn huge_lengths_hit_the_memory_limit() {
        let calldata = word(u32::MAX as u64);
        let plan = DecoderPlan {
            copies: vec![PendingCopy::new(Expr::lit(0), Expr::lit(0), Expr::load(Expr::lit(0)), "blob")],
            ..DecoderPlan::default()
        };
        assert!(matches!(
            PlanInterpreter::new(&calldata).with_memory_limit(4096).run(&plan, 0, 0),
            Err(InterpretError::MemoryLimitExceeded { .. })
        ));
    }

    #[test]
    fn oversized_words_are_rejected() {
        let calldata = vec![0xff; 32];
        let plan = DecoderPlan {
            memory_tail_offset: Expr::load(Expr::lit(0)),
            ..DecoderPlan::default()
        };
        assert_eq!(
            PlanInterpreter::new(&calldata).run(&plan, 0, 0),
            Err(InterpretError::WordOverflow { address: 0 })
        );
    }

    #[test]
    fn unbound_variables_are_errors() {
        let plan = DecoderPlan {
            memory_tail_offset: Expr::var("nowhere"),
            ..DecoderPlan::default()
        };
        assert_eq!(
            PlanInterpreter::new(&[]).run(&plan, 0, 0),
            Err(InterpretError::UnboundVariable {
                name: "nowhere".into()
            })
        );
    }

    #[test]
    fn bases_shift_addresses() {
        let calldata = [vec![0u8; 4], word(42)].concat();
        let plan = DecoderPlan {
            copies: vec![PendingCopy::new(Expr::lit(0), Expr::lit(0), Expr::lit(32), "v")],
            memory_tail_offset: Expr::lit(32),
            ..DecoderPlan::default()
        };
        let image = PlanInterpreter::new(&calldata).run(&plan, 4, 64).unwrap();
        assert_eq!(image.word_value(64), Some(42));
        assert_eq!(image.size, 32);
    }
}
