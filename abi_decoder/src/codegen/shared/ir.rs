//! Decoder plans handed to emitters.
//!
//! A plan is a bag of deferred operations that together move one value from
//! its calldata encoding into the memory representation. Every expression in
//! a plan is relative to the plan's own calldata start and memory start;
//! [`DecoderPlan::rebased`] moves a child plan into its parent's frame.
//!
//! Execution order within one plan level is fixed: loops, then copies, then
//! pointers. Offset checks are folded into a single invalid flag
//! (`flag |= actual ^ expected`) and only acted upon once, at the end.
//!
//! # Example
//! ```
//! use abi_decoder::abi::expr::Expr;
//! use abi_decoder::codegen::shared::ir::*;
//!
//! let plan = DecoderPlan {
//!     copies: vec![PendingCopy::new(Expr::lit(0), Expr::lit(0), Expr::lit(64), "pair")],
//!     memory_tail_offset: Expr::lit(64),
//!     calldata_tail_offset: Some(Expr::lit(64)),
//!     ..DecoderPlan::default()
//! };
//! let ir = DecoderIr::new(vec![TypeDecoder {
//!     type_name: "Pair".into(),
//!     strict: false,
//!     plan,
//! }]);
//!
//! assert_eq!(ir.version, IR_SCHEMA_VERSION);
//! assert_eq!(ir.decoders[0].plan.copies.len(), 1);
//! ```

use crate::abi::expr::Expr;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// Schema version used for every serialized IR export.
pub const IR_SCHEMA_VERSION: u32 = 1;

/// Container for the decoders generated in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderIr {
    /// IR schema version (mirrors `IR_SCHEMA_VERSION`).
    pub version: u32,
    pub decoders: Vec<TypeDecoder>,
}

impl DecoderIr {
    /// Creates a new IR container, automatically wiring the schema version.
    pub fn new(decoders: Vec<TypeDecoder>) -> Self {
        Self {
            version: IR_SCHEMA_VERSION,
            decoders,
        }
    }
}

/// Post-merge plan for one top-level type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecoder {
    pub type_name: String,
    /// True when the plan validates every dynamic offset.
    pub strict: bool,
    pub plan: DecoderPlan,
}

/// Write the memory address `value` into the memory word at `dst`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPointer {
    pub dst: Expr,
    pub value: Expr,
    #[serde(default)]
    pub name: Option<String>,
}

/// Copy `size` bytes from calldata `src` to memory `dst`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCopy {
    pub dst: Expr,
    pub src: Expr,
    pub size: Expr,
    /// Every value the copy covers; merged copies concatenate.
    #[serde(default)]
    pub names: Vec<String>,
}

impl PendingCopy {
    pub fn new(dst: Expr, src: Expr, size: Expr, name: impl Into<String>) -> Self {
        Self {
            dst,
            src,
            size,
            names: vec![name.into()],
        }
    }
}

/// Loop-carried offset: `init` before the first iteration, advanced by
/// `step` after each one. The final value stays visible after the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopCursor {
    pub name: String,
    pub init: Expr,
    pub step: Expr,
}

/// Runs `body` for `index` in `0..count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLoop {
    pub name: String,
    pub index: String,
    pub count: Expr,
    #[serde(default)]
    pub cursors: Vec<LoopCursor>,
    pub body: DecoderPlan,
}

/// Strict-mode canonicality condition: `actual == expected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetCheck {
    pub name: String,
    pub actual: Expr,
    pub expected: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderPlan {
    #[serde(default)]
    pub pointers: Vec<PendingPointer>,
    #[serde(default)]
    pub copies: Vec<PendingCopy>,
    #[serde(default)]
    pub loops: Vec<PendingLoop>,
    #[serde(default)]
    pub checks: Vec<OffsetCheck>,
    /// Memory bytes consumed from the plan's memory start.
    pub memory_tail_offset: Expr,
    /// Calldata bytes spanned from the plan's calldata start, when known.
    #[serde(default)]
    pub calldata_tail_offset: Option<Expr>,
}

impl Default for DecoderPlan {
    fn default() -> Self {
        Self {
            pointers: Vec::new(),
            copies: Vec::new(),
            loops: Vec::new(),
            checks: Vec::new(),
            memory_tail_offset: Expr::lit(0),
            calldata_tail_offset: None,
        }
    }
}

impl DecoderPlan {
    /// Moves this plan into a frame where its calldata starts at
    /// `calldata_base` and its memory at `memory_base`.
    ///
    /// Addresses gain the base; sizes and offset values only have the wire
    /// reads inside them re-based.
    pub fn rebased(&self, calldata_base: &Expr, memory_base: &Expr) -> DecoderPlan {
        let rebase = Rebase {
            calldata_base,
            memory_base,
        };
        rebase.plan(self)
    }

    /// Appends every operation of `other`; its offsets are left untouched.
    pub fn absorb(&mut self, other: DecoderPlan) {
        self.pointers.extend(other.pointers);
        self.copies.extend(other.copies);
        self.loops.extend(other.loops);
        self.checks.extend(other.checks);
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty() && self.copies.is_empty() && self.loops.is_empty() && self.checks.is_empty()
    }

    /// Total copies, including those inside loop bodies.
    pub fn copy_count(&self) -> usize {
        self.copies.len() + self.loops.iter().map(|l| l.body.copy_count()).sum::<usize>()
    }

    fn write_listing(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "    ".repeat(depth);
        for pending_loop in &self.loops {
            writeln!(
                f,
                "{pad}loop {} in 0..{}  # {}",
                pending_loop.index, pending_loop.count, pending_loop.name
            )?;
            for cursor in &pending_loop.cursors {
                writeln!(f, "{pad}    cursor {} = {} step {}", cursor.name, cursor.init, cursor.step)?;
            }
            pending_loop.body.write_listing(f, depth + 1)?;
            writeln!(f, "{pad}end")?;
        }
        for copy in &self.copies {
            writeln!(
                f,
                "{pad}copy mem[{}] <- cd[{}] size {}  # {}",
                copy.dst,
                copy.src,
                copy.size,
                copy.names.join(", ")
            )?;
        }
        for pointer in &self.pointers {
            write!(f, "{pad}ptr  mem[{}] = {}", pointer.dst, pointer.value)?;
            match &pointer.name {
                Some(name) => writeln!(f, "  # {name}")?,
                None => writeln!(f)?,
            }
        }
        for check in &self.checks {
            writeln!(f, "{pad}check {} == {}  # {}", check.actual, check.expected, check.name)?;
        }
        Ok(())
    }
}

impl fmt::Display for DecoderPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_listing(f, 0)?;
        writeln!(f, "memory {}", self.memory_tail_offset)?;
        match &self.calldata_tail_offset {
            Some(size) => writeln!(f, "calldata {size}"),
            None => writeln!(f, "calldata ?"),
        }
    }
}

struct Rebase<'a> {
    calldata_base: &'a Expr,
    memory_base: &'a Expr,
}

impl Rebase<'_> {
    fn loads(&self, expr: &Expr) -> Expr {
        expr.map_loads(&|address| address + self.calldata_base.clone())
    }

    fn memory(&self, expr: &Expr) -> Expr {
        self.loads(expr) + self.memory_base.clone()
    }

    fn calldata(&self, expr: &Expr) -> Expr {
        self.loads(expr) + self.calldata_base.clone()
    }

    fn plan(&self, plan: &DecoderPlan) -> DecoderPlan {
        DecoderPlan {
            pointers: plan
                .pointers
                .iter()
                .map(|pointer| PendingPointer {
                    dst: self.memory(&pointer.dst),
                    value: self.memory(&pointer.value),
                    name: pointer.name.clone(),
                })
                .collect(),
            copies: plan
                .copies
                .iter()
                .map(|copy| PendingCopy {
                    dst: self.memory(&copy.dst),
                    src: self.calldata(&copy.src),
                    size: self.loads(&copy.size),
                    names: copy.names.clone(),
                })
                .collect(),
            loops: plan
                .loops
                .iter()
                .map(|pending_loop| PendingLoop {
                    name: pending_loop.name.clone(),
                    index: pending_loop.index.clone(),
                    count: self.loads(&pending_loop.count),
                    cursors: pending_loop
                        .cursors
                        .iter()
                        .map(|cursor| LoopCursor {
                            name: cursor.name.clone(),
                            init: self.loads(&cursor.init),
                            step: self.loads(&cursor.step),
                        })
                        .collect(),
                    body: self.plan(&pending_loop.body),
                })
                .collect(),
            checks: plan
                .checks
                .iter()
                .map(|check| OffsetCheck {
                    name: check.name.clone(),
                    actual: self.loads(&check.actual),
                    expected: self.loads(&check.expected),
                })
                .collect(),
            memory_tail_offset: self.loads(&plan.memory_tail_offset),
            calldata_tail_offset: plan.calldata_tail_offset.as_ref().map(|size| self.loads(size)),
        }
    }
}
