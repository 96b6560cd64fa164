pub mod builder;
pub mod interpreter;
pub mod ir;
pub mod ir_proto;
pub mod merge;
pub mod serialization;
