use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct DecoderIr {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(message, repeated, tag = "2")]
    pub decoders: Vec<TypeDecoder>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TypeDecoder {
    #[prost(string, tag = "1")]
    pub type_name: String,
    #[prost(bool, tag = "2")]
    pub strict: bool,
    #[prost(message, optional, tag = "3")]
    pub plan: Option<DecoderPlan>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DecoderPlan {
    #[prost(message, repeated, tag = "1")]
    pub pointers: Vec<PendingPointer>,
    #[prost(message, repeated, tag = "2")]
    pub copies: Vec<PendingCopy>,
    #[prost(message, repeated, tag = "3")]
    pub loops: Vec<PendingLoop>,
    #[prost(message, repeated, tag = "4")]
    pub checks: Vec<OffsetCheck>,
    #[prost(message, optional, tag = "5")]
    pub memory_tail_offset: Option<Expr>,
    /// Absent when the calldata extent is only known at run time.
    #[prost(message, optional, tag = "6")]
    pub calldata_tail_offset: Option<Expr>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PendingPointer {
    #[prost(message, optional, tag = "1")]
    pub dst: Option<Expr>,
    #[prost(message, optional, tag = "2")]
    pub value: Option<Expr>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PendingCopy {
    #[prost(message, optional, tag = "1")]
    pub dst: Option<Expr>,
    #[prost(message, optional, tag = "2")]
    pub src: Option<Expr>,
    #[prost(message, optional, tag = "3")]
    pub size: Option<Expr>,
    #[prost(string, repeated, tag = "4")]
    pub names: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PendingLoop {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub index: String,
    #[prost(message, optional, tag = "3")]
    pub count: Option<Expr>,
    #[prost(message, repeated, tag = "4")]
    pub cursors: Vec<LoopCursor>,
    #[prost(message, optional, tag = "5")]
    pub body: Option<DecoderPlan>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LoopCursor {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub init: Option<Expr>,
    #[prost(message, optional, tag = "3")]
    pub step: Option<Expr>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OffsetCheck {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub actual: Option<Expr>,
    #[prost(message, optional, tag = "3")]
    pub expected: Option<Expr>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Expr {
    #[prost(oneof = "expr::Kind", tags = "1, 2, 3, 4")]
    pub kind: Option<expr::Kind>,
}

pub mod expr {
    use prost::Oneof;

    #[derive(Clone, PartialEq, Oneof)]
    pub enum Kind {
        #[prost(int64, tag = "1")]
        Literal(i64),
        #[prost(string, tag = "2")]
        Var(String),
        #[prost(message, tag = "3")]
        Load(super::LoadExpr),
        #[prost(message, tag = "4")]
        Binary(super::BinaryExpr),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct LoadExpr {
    #[prost(message, optional, tag = "1")]
    pub address: Option<Box<Expr>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BinaryExpr {
    #[prost(enumeration = "BinaryOpKind", tag = "1")]
    pub op: i32,
    #[prost(message, optional, tag = "2")]
    pub left: Option<Box<Expr>>,
    #[prost(message, optional, tag = "3")]
    pub right: Option<Box<Expr>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum BinaryOpKind {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Shl = 4,
    Shr = 5,
    And = 6,
    Or = 7,
    Xor = 8,
}
