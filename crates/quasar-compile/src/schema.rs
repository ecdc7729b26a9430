//! Parameter schemas and local argument validation.
//!
//! Arguments are checked against a declared schema (name, type, required)
//! before any network call so type mismatches fail fast.

use std::collections::HashSet;
use std::fmt;
use std::io::Cursor;

use stellar_xdr::curr::{Limited, Limits, ReadXdr, ScSpecEntry, ScSpecTypeDef, ScVal};
use thiserror::Error;

use crate::ir::IrValue;
use crate::xdr::{to_scval, XdrError};

/// Name of the constructor function in a contract spec.
pub const CONSTRUCTOR_FN: &str = "__constructor";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("missing required argument '{0}'")]
    MissingArgument(String),
    #[error("unknown argument '{0}'")]
    UnknownArgument(String),
    #[error("argument '{0}' supplied more than once")]
    DuplicateArgument(String),
    #[error("argument '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: &'static str,
    },
    #[error("argument '{name}': {source}")]
    Marshal {
        name: String,
        #[source]
        source: XdrError,
    },
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("WASM parse error: {0}")]
    WasmParse(String),
    #[error("contract spec decode error: {0}")]
    SpecDecode(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgType {
    Bool,
    U32,
    I32,
    U64,
    I64,
    U128,
    I128,
    U256,
    I256,
    String,
    Symbol,
    Bytes,
    BytesN(u32),
    Address,
    Vec(Box<ArgType>),
    Map(Box<ArgType>, Box<ArgType>),
    Option(Box<ArgType>),
    /// Any value; used for `val` and user-defined types the client does not model.
    Any,
}

impl ArgType {
    /// Parse a type string such as `u32`, `vec<address>` or `map<symbol, i128>`.
    pub fn parse(s: &str) -> Result<ArgType, SchemaError> {
        let s = s.trim();
        if let Some(inner) = generic_args(s, "vec") {
            return Ok(ArgType::Vec(Box::new(ArgType::parse(inner)?)));
        }
        if let Some(inner) = generic_args(s, "option") {
            return Ok(ArgType::Option(Box::new(ArgType::parse(inner)?)));
        }
        if let Some(inner) = generic_args(s, "map") {
            let (k, v) = split_top_level(inner).ok_or_else(|| SchemaError::UnknownType(s.into()))?;
            return Ok(ArgType::Map(
                Box::new(ArgType::parse(k)?),
                Box::new(ArgType::parse(v)?),
            ));
        }
        if let Some(n) = generic_args(s, "bytes") {
            let n = n.trim().parse().map_err(|_| SchemaError::UnknownType(s.into()))?;
            return Ok(ArgType::BytesN(n));
        }
        Ok(match s {
            "bool" => ArgType::Bool,
            "u32" => ArgType::U32,
            "i32" => ArgType::I32,
            "u64" | "timepoint" | "duration" => ArgType::U64,
            "i64" => ArgType::I64,
            "u128" => ArgType::U128,
            "i128" => ArgType::I128,
            "u256" => ArgType::U256,
            "i256" => ArgType::I256,
            "string" => ArgType::String,
            "symbol" => ArgType::Symbol,
            "bytes" => ArgType::Bytes,
            "address" => ArgType::Address,
            "val" => ArgType::Any,
            other => return Err(SchemaError::UnknownType(other.to_string())),
        })
    }

    /// Map a contract-spec type definition onto an `ArgType`.
    pub fn from_spec(ty: &ScSpecTypeDef) -> ArgType {
        match ty {
            ScSpecTypeDef::Bool => ArgType::Bool,
            ScSpecTypeDef::U32 => ArgType::U32,
            ScSpecTypeDef::I32 => ArgType::I32,
            ScSpecTypeDef::U64 | ScSpecTypeDef::Timepoint | ScSpecTypeDef::Duration => {
                ArgType::U64
            }
            ScSpecTypeDef::I64 => ArgType::I64,
            ScSpecTypeDef::U128 => ArgType::U128,
            ScSpecTypeDef::I128 => ArgType::I128,
            ScSpecTypeDef::U256 => ArgType::U256,
            ScSpecTypeDef::I256 => ArgType::I256,
            ScSpecTypeDef::String => ArgType::String,
            ScSpecTypeDef::Symbol => ArgType::Symbol,
            ScSpecTypeDef::Bytes => ArgType::Bytes,
            ScSpecTypeDef::BytesN(inner) => ArgType::BytesN(inner.n),
            ScSpecTypeDef::Address | ScSpecTypeDef::MuxedAddress => ArgType::Address,
            ScSpecTypeDef::Vec(inner) => {
                ArgType::Vec(Box::new(ArgType::from_spec(&inner.element_type)))
            }
            ScSpecTypeDef::Map(inner) => ArgType::Map(
                Box::new(ArgType::from_spec(&inner.key_type)),
                Box::new(ArgType::from_spec(&inner.value_type)),
            ),
            ScSpecTypeDef::Option(inner) => {
                ArgType::Option(Box::new(ArgType::from_spec(&inner.value_type)))
            }
            _ => ArgType::Any,
        }
    }

    /// Whether `value` is acceptable for this type.
    pub fn accepts(&self, value: &IrValue) -> bool {
        match (self, value) {
            (ArgType::Any, _) => true,
            (ArgType::Option(_), IrValue::Void) => true,
            (ArgType::Option(inner), v) => inner.accepts(v),
            (ArgType::Bool, IrValue::Bool(_))
            | (ArgType::U32, IrValue::U32(_))
            | (ArgType::I32, IrValue::I32(_))
            | (ArgType::U64, IrValue::U64(_))
            | (ArgType::I64, IrValue::I64(_))
            | (ArgType::U128, IrValue::U128(_))
            | (ArgType::I128, IrValue::I128(_))
            | (ArgType::U256, IrValue::U256(_))
            | (ArgType::I256, IrValue::I256(_))
            | (ArgType::String, IrValue::String(_))
            | (ArgType::Symbol, IrValue::Symbol(_))
            | (ArgType::Bytes, IrValue::Bytes(_))
            | (ArgType::Address, IrValue::Address(_)) => true,
            (ArgType::BytesN(n), IrValue::Bytes(hex)) => {
                hex.strip_prefix("0x").unwrap_or(hex).len() == (*n as usize) * 2
            }
            (ArgType::Vec(elem), IrValue::Vec(items)) => items.iter().all(|i| elem.accepts(i)),
            (ArgType::Map(k, v), IrValue::Map(entries)) => entries
                .iter()
                .all(|e| k.accepts(&e.key) && v.accepts(&e.value)),
            _ => false,
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgType::Bool => write!(f, "bool"),
            ArgType::U32 => write!(f, "u32"),
            ArgType::I32 => write!(f, "i32"),
            ArgType::U64 => write!(f, "u64"),
            ArgType::I64 => write!(f, "i64"),
            ArgType::U128 => write!(f, "u128"),
            ArgType::I128 => write!(f, "i128"),
            ArgType::U256 => write!(f, "u256"),
            ArgType::I256 => write!(f, "i256"),
            ArgType::String => write!(f, "string"),
            ArgType::Symbol => write!(f, "symbol"),
            ArgType::Bytes => write!(f, "bytes"),
            ArgType::BytesN(n) => write!(f, "bytes<{}>", n),
            ArgType::Address => write!(f, "address"),
            ArgType::Vec(inner) => write!(f, "vec<{}>", inner),
            ArgType::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            ArgType::Option(inner) => write!(f, "option<{}>", inner),
            ArgType::Any => write!(f, "val"),
        }
    }
}

fn generic_args<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    s.strip_prefix(name)?.strip_prefix('<')?.strip_suffix('>')
}

/// Split `a, b` at the first comma not nested inside `<...>`.
fn split_top_level(s: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some((&s[..i], &s[i + 1..])),
            _ => {}
        }
    }
    None
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub type_ref: ArgType,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, type_ref: ArgType) -> Self {
        Self {
            name: name.into(),
            type_ref,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, type_ref: ArgType) -> Self {
        Self {
            name: name.into(),
            type_ref,
            required: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate named arguments against `params` and marshal them in schema order.
///
/// Missing optional parameters become `ScVal::Void`.
pub fn validate_args(
    params: &[ParamSpec],
    args: &[(String, IrValue)],
) -> Result<Vec<ScVal>, SchemaError> {
    let mut seen = HashSet::new();
    for (name, _) in args {
        if !seen.insert(name.as_str()) {
            return Err(SchemaError::DuplicateArgument(name.clone()));
        }
        if !params.iter().any(|p| &p.name == name) {
            return Err(SchemaError::UnknownArgument(name.clone()));
        }
    }

    let mut out = Vec::with_capacity(params.len());
    for param in params {
        let supplied = args.iter().find(|(name, _)| name == &param.name);
        match supplied {
            Some((_, value)) => {
                if !param.type_ref.accepts(value) {
                    return Err(SchemaError::TypeMismatch {
                        name: param.name.clone(),
                        expected: param.type_ref.to_string(),
                        found: value.type_name(),
                    });
                }
                let val = to_scval(value).map_err(|source| SchemaError::Marshal {
                    name: param.name.clone(),
                    source,
                })?;
                out.push(val);
            }
            None if param.required => {
                return Err(SchemaError::MissingArgument(param.name.clone()));
            }
            None => out.push(ScVal::Void),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Constructor schema from WASM
// ---------------------------------------------------------------------------

/// Declared constructor parameters of a contract WASM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstructorSchema {
    pub params: Vec<ParamSpec>,
}

impl ConstructorSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    /// Read the `__constructor` inputs from the `contractspecv0` section.
    ///
    /// A WASM without a spec section or without a constructor yields an
    /// empty schema.
    pub fn from_wasm(wasm: &[u8]) -> Result<Self, SchemaError> {
        let Some(section) = contract_spec_section(wasm)? else {
            return Ok(Self::default());
        };
        let entries = parse_spec_entries(&section)?;
        let params = entries
            .iter()
            .find_map(|entry| match entry {
                ScSpecEntry::FunctionV0(f) if f.name.to_string() == CONSTRUCTOR_FN => Some(
                    f.inputs
                        .iter()
                        .map(|input| ParamSpec::required(
                            input.name.to_string(),
                            ArgType::from_spec(&input.type_),
                        ))
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();
        Ok(Self { params })
    }

    /// Validate and marshal constructor arguments.
    pub fn validate(&self, args: &[(String, IrValue)]) -> Result<Vec<ScVal>, SchemaError> {
        validate_args(&self.params, args)
    }
}

fn contract_spec_section(wasm: &[u8]) -> Result<Option<Vec<u8>>, SchemaError> {
    use wasmparser::{Parser, Payload};

    for payload in Parser::new(0).parse_all(wasm) {
        let payload = payload.map_err(|e| SchemaError::WasmParse(e.to_string()))?;
        if let Payload::CustomSection(reader) = payload {
            if reader.name() == "contractspecv0" {
                return Ok(Some(reader.data().to_vec()));
            }
        }
    }
    Ok(None)
}

/// Decode a sequence of concatenated `ScSpecEntry` values.
fn parse_spec_entries(bytes: &[u8]) -> Result<Vec<ScSpecEntry>, SchemaError> {
    let mut limited = Limited::new(Cursor::new(bytes), Limits::none());
    let mut entries = Vec::new();
    while (limited.inner.position() as usize) < bytes.len() {
        let entry = ScSpecEntry::read_xdr(&mut limited)
            .map_err(|e| SchemaError::SpecDecode(e.to_string()))?;
        entries.push(entry);
    }
    Ok(entries)
}
