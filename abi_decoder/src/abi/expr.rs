// Re-export from abi_types so engine modules import terms from one place
pub use abi_types::{BinaryExpr, BinaryOp, ConstantExpression, Expr, ExprEnv};
