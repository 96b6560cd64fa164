use super::ir::{DecoderIr, DecoderPlan, LoopCursor, OffsetCheck, PendingCopy, PendingLoop, PendingPointer, TypeDecoder};
use super::ir_proto;
use crate::abi::expr::{BinaryExpr, BinaryOp, Expr};
use prost::Message;
use thiserror::Error;

/// Serialize the decoder IR into pretty JSON.
pub fn decoder_ir_to_json(decoder_ir: &DecoderIr) -> serde_json::Result<String> {
    serde_json::to_string_pretty(decoder_ir)
}

/// Serialize the decoder IR into a protobuf byte vector.
pub fn decoder_ir_to_protobuf(decoder_ir: &DecoderIr) -> Result<Vec<u8>, IrSerializationError> {
    let proto: ir_proto::DecoderIr = decoder_ir.into();
    let mut buf = Vec::with_capacity(proto.encoded_len());
    proto.encode(&mut buf).map_err(IrSerializationError::from)?;
    Ok(buf)
}

#[derive(Debug, Error)]
pub enum IrSerializationError {
    #[error("failed to encode protobuf: {0}")]
    ProtobufEncode(#[from] prost::EncodeError),
}

impl From<&DecoderIr> for ir_proto::DecoderIr {
    fn from(value: &DecoderIr) -> Self {
        Self {
            version: value.version,
            decoders: value.decoders.iter().map(ir_proto::TypeDecoder::from).collect(),
        }
    }
}

impl From<&TypeDecoder> for ir_proto::TypeDecoder {
    fn from(value: &TypeDecoder) -> Self {
        Self {
            type_name: value.type_name.clone(),
            strict: value.strict,
            plan: Some((&value.plan).into()),
        }
    }
}

impl From<&DecoderPlan> for ir_proto::DecoderPlan {
    fn from(value: &DecoderPlan) -> Self {
        Self {
            pointers: value.pointers.iter().map(ir_proto::PendingPointer::from).collect(),
            copies: value.copies.iter().map(ir_proto::PendingCopy::from).collect(),
            loops: value.loops.iter().map(ir_proto::PendingLoop::from).collect(),
            checks: value.checks.iter().map(ir_proto::OffsetCheck::from).collect(),
            memory_tail_offset: Some((&value.memory_tail_offset).into()),
            calldata_tail_offset: value.calldata_tail_offset.as_ref().map(ir_proto::Expr::from),
        }
    }
}

impl From<&PendingPointer> for ir_proto::PendingPointer {
    fn from(value: &PendingPointer) -> Self {
        Self {
            dst: Some((&value.dst).into()),
            value: Some((&value.value).into()),
            name: value.name.clone(),
        }
    }
}

impl From<&PendingCopy> for ir_proto::PendingCopy {
    fn from(value: &PendingCopy) -> Self {
        Self {
            dst: Some((&value.dst).into()),
            src: Some((&value.src).into()),
            size: Some((&value.size).into()),
            names: value.names.clone(),
        }
    }
}

impl From<&PendingLoop> for ir_proto::PendingLoop {
    fn from(value: &PendingLoop) -> Self {
        Self {
            name: value.name.clone(),
            index: value.index.clone(),
            count: Some((&value.count).into()),
            cursors: value.cursors.iter().map(ir_proto::LoopCursor::from).collect(),
            body: Some((&value.body).into()),
        }
    }
}

impl From<&LoopCursor> for ir_proto::LoopCursor {
    fn from(value: &LoopCursor) -> Self {
        Self {
            name: value.name.clone(),
            init: Some((&value.init).into()),
            step: Some((&value.step).into()),
        }
    }
}

impl From<&OffsetCheck> for ir_proto::OffsetCheck {
    fn from(value: &OffsetCheck) -> Self {
        Self {
            name: value.name.clone(),
            actual: Some((&value.actual).into()),
            expected: Some((&value.expected).into()),
        }
    }
}

impl From<&Expr> for ir_proto::Expr {
    fn from(value: &Expr) -> Self {
        use ir_proto::expr::Kind;
        let kind = match value {
            Expr::Literal(literal) => Kind::Literal(*literal),
            Expr::Var(name) => Kind::Var(name.clone()),
            Expr::Load(address) => Kind::Load(ir_proto::LoadExpr {
                address: Some(Box::new(ir_proto::Expr::from(address.as_ref()))),
            }),
            Expr::Binary(node) => Kind::Binary(convert_binary(node)),
        };

        ir_proto::Expr { kind: Some(kind) }
    }
}

fn convert_binary(node: &BinaryExpr) -> ir_proto::BinaryExpr {
    let op = match node.op {
        BinaryOp::Add => ir_proto::BinaryOpKind::Add,
        BinaryOp::Sub => ir_proto::BinaryOpKind::Sub,
        BinaryOp::Mul => ir_proto::BinaryOpKind::Mul,
        BinaryOp::Div => ir_proto::BinaryOpKind::Div,
        BinaryOp::Shl => ir_proto::BinaryOpKind::Shl,
        BinaryOp::Shr => ir_proto::BinaryOpKind::Shr,
        BinaryOp::And => ir_proto::BinaryOpKind::And,
        BinaryOp::Or => ir_proto::BinaryOpKind::Or,
        BinaryOp::Xor => ir_proto::BinaryOpKind::Xor,
    };
    ir_proto::BinaryExpr {
        op: op as i32,
        left: Some(Box::new(ir_proto::Expr::from(node.left.as_ref()))),
        right: Some(Box::new(ir_proto::Expr::from(node.right.as_ref()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::shared::ir::IR_SCHEMA_VERSION;

    fn sample() -> DecoderIr {
        let len = Expr::load(Expr::lit(0));
        DecoderIr::new(vec![TypeDecoder {
            type_name: "Blob".into(),
            strict: true,
            plan: DecoderPlan {
                copies: vec![PendingCopy::new(
                    Expr::lit(0),
                    Expr::lit(0),
                    len.clone().round_up_to_word() + 32,
                    "blob",
                )],
                memory_tail_offset: len.round_up_to_word() + 32,
                ..DecoderPlan::default()
            },
        }])
    }

    #[test]
    fn protobuf_roundtrip_matches_proto_struct() {
        let ir = sample();
        let proto_expected: ir_proto::DecoderIr = (&ir).into();
        assert_eq!(proto_expected.version, IR_SCHEMA_VERSION);

        let bytes = decoder_ir_to_protobuf(&ir).expect("encode");
        let decoded = ir_proto::DecoderIr::decode(bytes.as_slice()).expect("decode");

        assert_eq!(decoded, proto_expected);
        let plan = decoded.decoders[0].plan.as_ref().expect("plan");
        assert_eq!(plan.copies[0].names, vec!["blob".to_string()]);
        assert!(plan.calldata_tail_offset.is_none());
    }

    #[test]
    fn json_roundtrips_through_serde() {
        let ir = sample();
        let json = decoder_ir_to_json(&ir).expect("json");
        assert!(json.contains("\"version\": 1"));
        let back: DecoderIr = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, ir);
    }
}
