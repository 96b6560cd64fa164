// Re-export from abi_types so engine modules import the model from one place
pub use abi_types::{
    AbiFile, ArrayType, ElementaryKind, ElementaryType, EnumType, FunctionDef, FunctionType,
    StructField, StructType, TypeDef, TypeKind, TypeRefType,
};
