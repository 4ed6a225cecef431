// This module is the hub of the Rogue backend's core infrastructure: the building blocks shared
// by instruction selection, the pass pipeline and the validator. It exports the register model
// (register classes, registers, register arrays and their deduplicating caches), operand value
// references, the static op and modifier tables, the instruction record, the shader object that
// owns blocks, instructions and registers and keeps use-lists consistent, the instruction
// builder, the build context with configuration and driver build data, the liveness analyzer
// used by register allocation, the textual shader printer and the error types.

//! Core Rogue infrastructure
//!
//! # Key Components
//!
//! ## Register model (`register_file`)
//! - Register classes with hardware capacities
//! - Deduplicating register and register array caches
//! - Per-class usage bitsets
//!
//! ## Operands (`value_ref`, `op_info`)
//! - Tagged operand references and 64-bit word pairs
//! - Static per-opcode operand, modifier and phase tables
//!
//! ## Shader (`shader`, `instr`, `builder`)
//! - Arena-owned blocks and instructions with typed IDs
//! - Use-lists updated on every operand change
//!
//! ## Session (`session`)
//! - Build context with the analysis arena (`bumpalo`)
//! - Debug flags, device info and pipeline layout
//! - Driver build data

pub mod analyzer;
pub mod builder;
pub mod error;
pub mod instr;
pub mod op_info;
pub mod print;
pub mod register_file;
pub mod session;
pub mod shader;
pub mod value_ref;

pub use analyzer::{AllocUnit, Analyzer, LiveInterval};
pub use builder::{Builder, Cursor};
pub use error::{abort, CompileError, CompileResult};
pub use instr::{ExecCond, GroupHeader, Instr, InstrGroup, InstrId, Operand};
pub use op_info::{
    AluOp, AluOpMod, AluType, BackendOp, BackendOpMod, BitwiseOp, BitwiseOpMod, CtrlOp, CtrlOpMod,
    DstMod, Op, OpInfo, OpModifier, Phase, SrcMod,
};
pub use register_file::{RegBitSet, RegClass, RegId, RegarrayId, RegisterFile};
pub use session::{BuildContext, BuildData, CompilerOptions, DebugFlags, DeviceInfo, PipelineLayout};
pub use shader::{BlockId, Shader, Stage};
pub use value_ref::{Io, Ref, Ref64, RefTypes};
