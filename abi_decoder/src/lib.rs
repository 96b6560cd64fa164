pub mod abi;
pub mod cmds;
pub mod codegen;
