use serde_derive::{Deserialize, Serialize};

/// Scalar families of the contract ABI.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ElementaryKind {
    Bool,
    Address,
    /// Fixed-size byte string (`bytes1`..`bytes32`).
    Byte,
    /// Dynamic byte string.
    Bytes,
    String,
    Uint,
    Int,
}

impl ElementaryKind {
    /// `bytes` and `string` are the only dynamic elementary kinds.
    pub fn is_dynamic(self) -> bool {
        matches!(self, ElementaryKind::Bytes | ElementaryKind::String)
    }

    fn default_bits(self) -> u16 {
        match self {
            ElementaryKind::Bool => 8,
            ElementaryKind::Address => 160,
            ElementaryKind::Byte => 256,
            ElementaryKind::Bytes | ElementaryKind::String => 0,
            ElementaryKind::Uint | ElementaryKind::Int => 256,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ElementaryType {
    pub kind: ElementaryKind,
    /// Bit width. Omitted widths take the kind's default (`uint` -> 256).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<u16>,
}

impl ElementaryType {
    pub fn bits(&self) -> u16 {
        self.bits.unwrap_or_else(|| self.kind.default_bits())
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind.is_dynamic()
    }

    /// Canonical ABI spelling, e.g. `uint64`, `bytes32`, `string`.
    pub fn canonical_name(&self) -> String {
        match self.kind {
            ElementaryKind::Bool => "bool".to_string(),
            ElementaryKind::Address => "address".to_string(),
            ElementaryKind::Byte => format!("bytes{}", self.bits() / 8),
            ElementaryKind::Bytes => "bytes".to_string(),
            ElementaryKind::String => "string".to_string(),
            ElementaryKind::Uint => format!("uint{}", self.bits()),
            ElementaryKind::Int => format!("int{}", self.bits()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct EnumType {
    pub variants: Vec<String>,
}

impl EnumType {
    /// Number of bits needed to hold every variant index: `ceil(log2(count))`.
    pub fn bits(&self) -> u16 {
        let count = self.variants.len() as u64;
        if count <= 1 {
            0
        } else {
            (u64::BITS - (count - 1).leading_zeros()) as u16
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ArrayType {
    pub element_type: Box<TypeKind>,
    /// `None` for dynamic-length arrays (`T[]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct StructField {
    pub name: String,
    pub field_type: TypeKind,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct StructType {
    pub fields: Vec<StructField>,
}

/// Function-typed values have no calldata representation the decoder
/// understands; the model keeps them so they can be reported precisely.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct FunctionType {}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct TypeRefType {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum TypeKind {
    Elementary(ElementaryType),
    Enum(EnumType),
    Array(ArrayType),
    Struct(StructType),
    Function(FunctionType),
    TypeRef(TypeRefType),
}

impl TypeKind {
    pub fn elementary(kind: ElementaryKind, bits: u16) -> Self {
        TypeKind::Elementary(ElementaryType {
            kind,
            bits: Some(bits),
        })
    }

    pub fn uint(bits: u16) -> Self {
        Self::elementary(ElementaryKind::Uint, bits)
    }

    pub fn int(bits: u16) -> Self {
        Self::elementary(ElementaryKind::Int, bits)
    }

    pub fn bool() -> Self {
        Self::elementary(ElementaryKind::Bool, 8)
    }

    pub fn address() -> Self {
        Self::elementary(ElementaryKind::Address, 160)
    }

    pub fn fixed_bytes(size: u16) -> Self {
        Self::elementary(ElementaryKind::Byte, size * 8)
    }

    pub fn bytes() -> Self {
        Self::elementary(ElementaryKind::Bytes, 0)
    }

    pub fn string() -> Self {
        Self::elementary(ElementaryKind::String, 0)
    }

    pub fn array(element: TypeKind, length: Option<u64>) -> Self {
        TypeKind::Array(ArrayType {
            element_type: Box::new(element),
            length,
        })
    }

    pub fn structure(fields: Vec<(&str, TypeKind)>) -> Self {
        TypeKind::Struct(StructType {
            fields: fields
                .into_iter()
                .map(|(name, field_type)| StructField {
                    name: name.to_string(),
                    field_type,
                })
                .collect(),
        })
    }

    pub fn type_ref(name: &str) -> Self {
        TypeKind::TypeRef(TypeRefType {
            name: name.to_string(),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct TypeDef {
    pub name: String,
    #[serde(with = "serde_yml::with::singleton_map_recursive")]
    pub kind: TypeKind,
}

/// A function signature whose parameter list is decoded as one implicit struct.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FunctionDef {
    pub name: String,
    #[serde(default, with = "serde_yml::with::singleton_map_recursive")]
    pub params: Vec<StructField>,
}

/// Top-level layout of a type definition file.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct AbiFile {
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
}
