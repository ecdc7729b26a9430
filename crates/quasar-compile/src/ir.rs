use serde::{Deserialize, Serialize};

/// A native, typed argument or return value.
///
/// Every value carries a `type` discriminator so it can be converted to the
/// correct `ScVal` without guessing. Wide integers travel as decimal strings,
/// bytes as hex and addresses as strkeys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
#[serde(rename_all = "lowercase")]
pub enum IrValue {
    Void,
    Bool(bool),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    U128(String),
    I128(String),
    U256(String),
    I256(String),
    String(String),
    Symbol(String),
    Bytes(String),
    Address(String),
    Vec(Vec<IrValue>),
    Map(Vec<IrMapEntry>),
}

/// A key-value entry in a map value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrMapEntry {
    pub key: IrValue,
    pub value: IrValue,
}

impl IrValue {
    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            IrValue::Void => "void",
            IrValue::Bool(_) => "bool",
            IrValue::U32(_) => "u32",
            IrValue::I32(_) => "i32",
            IrValue::U64(_) => "u64",
            IrValue::I64(_) => "i64",
            IrValue::U128(_) => "u128",
            IrValue::I128(_) => "i128",
            IrValue::U256(_) => "u256",
            IrValue::I256(_) => "i256",
            IrValue::String(_) => "string",
            IrValue::Symbol(_) => "symbol",
            IrValue::Bytes(_) => "bytes",
            IrValue::Address(_) => "address",
            IrValue::Vec(_) => "vec",
            IrValue::Map(_) => "map",
        }
    }

    pub fn address(addr: impl Into<String>) -> Self {
        IrValue::Address(addr.into())
    }

    pub fn i128(v: i128) -> Self {
        IrValue::I128(v.to_string())
    }

    pub fn u128(v: u128) -> Self {
        IrValue::U128(v.to_string())
    }

    pub fn string(s: impl Into<String>) -> Self {
        IrValue::String(s.into())
    }

    pub fn symbol(s: impl Into<String>) -> Self {
        IrValue::Symbol(s.into())
    }
}
