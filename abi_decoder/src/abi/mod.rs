pub mod algebra;
pub mod expr;
pub mod file;
pub mod json_abi;
pub mod layout;
pub mod predicates;
pub mod resolved;
pub mod type_graph;
pub mod types;
