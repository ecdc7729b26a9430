//! Conversion between native `IrValue`s and Stellar `ScVal`s.
//!
//! `to_scval` marshals caller-supplied arguments; `from_scval` unwraps values
//! returned by simulation or by a confirmed transaction.

use stellar_strkey::Strkey;
use stellar_xdr::curr::{
    AccountId, ContractId, Hash, Int128Parts, Int256Parts, PublicKey, ScAddress, ScBytes, ScMap,
    ScMapEntry, ScString, ScSymbol, ScVal, ScVec, StringM, UInt128Parts, UInt256Parts, Uint256,
};
use thiserror::Error;

use crate::ir::{IrMapEntry, IrValue};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors that can occur while marshalling values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XdrError {
    #[error("invalid {kind} value '{value}': {reason}")]
    InvalidNumber {
        kind: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("invalid hex bytes '{value}': {reason}")]
    InvalidHex { value: String, reason: String },
    #[error("{what} exceeds the XDR length limit")]
    TooLong { what: &'static str },
    #[error("cannot convert {0} to a native value")]
    Unsupported(String),
}

// ---------------------------------------------------------------------------
// Native -> wire
// ---------------------------------------------------------------------------

/// Convert a native value into its `ScVal` representation.
pub fn to_scval(value: &IrValue) -> Result<ScVal, XdrError> {
    match value {
        IrValue::Void => Ok(ScVal::Void),
        IrValue::Bool(v) => Ok(ScVal::Bool(*v)),
        IrValue::U32(v) => Ok(ScVal::U32(*v)),
        IrValue::I32(v) => Ok(ScVal::I32(*v)),
        IrValue::U64(v) => Ok(ScVal::U64(*v)),
        IrValue::I64(v) => Ok(ScVal::I64(*v)),
        IrValue::U128(s) => {
            let v: u128 = s.parse().map_err(|e| invalid_number("u128", s, e))?;
            Ok(ScVal::U128(UInt128Parts {
                hi: (v >> 64) as u64,
                lo: v as u64,
            }))
        }
        IrValue::I128(s) => {
            let v: i128 = s.parse().map_err(|e| invalid_number("i128", s, e))?;
            Ok(ScVal::I128(Int128Parts {
                hi: (v >> 64) as i64,
                lo: v as u64,
            }))
        }
        IrValue::U256(s) => {
            let [hi_hi, hi_lo, lo_hi, lo_lo] =
                parse_u256_limbs(s).map_err(|reason| XdrError::InvalidNumber {
                    kind: "u256",
                    value: s.clone(),
                    reason,
                })?;
            Ok(ScVal::U256(UInt256Parts {
                hi_hi,
                hi_lo,
                lo_hi,
                lo_lo,
            }))
        }
        IrValue::I256(s) => Ok(ScVal::I256(parse_i256(s)?)),
        IrValue::String(s) => {
            let sm: StringM = s
                .clone()
                .try_into()
                .map_err(|_| XdrError::TooLong { what: "string" })?;
            Ok(ScVal::String(ScString(sm)))
        }
        IrValue::Symbol(s) => Ok(ScVal::Symbol(to_symbol(s)?)),
        IrValue::Bytes(hex_str) => {
            let raw = hex_str.strip_prefix("0x").unwrap_or(hex_str);
            let bytes = hex::decode(raw).map_err(|e| XdrError::InvalidHex {
                value: hex_str.clone(),
                reason: e.to_string(),
            })?;
            let sc: ScBytes = bytes
                .try_into()
                .map_err(|_| XdrError::TooLong { what: "bytes" })?;
            Ok(ScVal::Bytes(sc))
        }
        IrValue::Address(addr) => Ok(ScVal::Address(decode_address(addr)?)),
        IrValue::Vec(items) => {
            let vals = items.iter().map(to_scval).collect::<Result<Vec<_>, _>>()?;
            let sc_vec: ScVec = vals
                .try_into()
                .map_err(|_| XdrError::TooLong { what: "vec" })?;
            Ok(ScVal::Vec(Some(sc_vec)))
        }
        IrValue::Map(entries) => {
            let sc_entries = entries
                .iter()
                .map(|entry| {
                    Ok(ScMapEntry {
                        key: to_scval(&entry.key)?,
                        val: to_scval(&entry.value)?,
                    })
                })
                .collect::<Result<Vec<_>, XdrError>>()?;
            let sc_map: ScMap = sc_entries
                .try_into()
                .map_err(|_| XdrError::TooLong { what: "map" })?;
            Ok(ScVal::Map(Some(sc_map)))
        }
    }
}

/// Convert a list of native values, preserving order.
pub fn to_scvals(values: &[IrValue]) -> Result<Vec<ScVal>, XdrError> {
    values.iter().map(to_scval).collect()
}

/// Build an `ScSymbol`, e.g. for a function name.
pub fn to_symbol(s: &str) -> Result<ScSymbol, XdrError> {
    s.to_string()
        .try_into()
        .map_err(|_| XdrError::TooLong { what: "symbol" })
}

fn invalid_number(kind: &'static str, value: &str, err: impl std::fmt::Display) -> XdrError {
    XdrError::InvalidNumber {
        kind,
        value: value.to_string(),
        reason: err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Wire -> native
// ---------------------------------------------------------------------------

/// Convert a returned `ScVal` back into a native value.
pub fn from_scval(value: &ScVal) -> Result<IrValue, XdrError> {
    match value {
        ScVal::Void => Ok(IrValue::Void),
        ScVal::Bool(v) => Ok(IrValue::Bool(*v)),
        ScVal::U32(v) => Ok(IrValue::U32(*v)),
        ScVal::I32(v) => Ok(IrValue::I32(*v)),
        ScVal::U64(v) => Ok(IrValue::U64(*v)),
        ScVal::I64(v) => Ok(IrValue::I64(*v)),
        ScVal::U128(parts) => {
            let v = ((parts.hi as u128) << 64) | parts.lo as u128;
            Ok(IrValue::U128(v.to_string()))
        }
        ScVal::I128(parts) => {
            let v = ((parts.hi as i128) << 64) | parts.lo as i128;
            Ok(IrValue::I128(v.to_string()))
        }
        ScVal::U256(parts) => Ok(IrValue::U256(limbs_to_decimal([
            parts.hi_hi,
            parts.hi_lo,
            parts.lo_hi,
            parts.lo_lo,
        ]))),
        ScVal::I256(parts) => {
            let limbs = [parts.hi_hi as u64, parts.hi_lo, parts.lo_hi, parts.lo_lo];
            if parts.hi_hi < 0 {
                Ok(IrValue::I256(format!(
                    "-{}",
                    limbs_to_decimal(negate_limbs(limbs))
                )))
            } else {
                Ok(IrValue::I256(limbs_to_decimal(limbs)))
            }
        }
        ScVal::String(s) => String::from_utf8(s.0.to_vec())
            .map(IrValue::String)
            .map_err(|_| XdrError::Unsupported("non-UTF-8 string".to_string())),
        ScVal::Symbol(s) => Ok(IrValue::Symbol(s.to_string())),
        ScVal::Bytes(b) => Ok(IrValue::Bytes(hex::encode(b.0.to_vec()))),
        ScVal::Address(addr) => Ok(IrValue::Address(encode_address(addr)?)),
        ScVal::Vec(None) => Ok(IrValue::Vec(Vec::new())),
        ScVal::Vec(Some(items)) => Ok(IrValue::Vec(
            items.iter().map(from_scval).collect::<Result<_, _>>()?,
        )),
        ScVal::Map(None) => Ok(IrValue::Map(Vec::new())),
        ScVal::Map(Some(entries)) => Ok(IrValue::Map(
            entries
                .iter()
                .map(|entry| {
                    Ok(IrMapEntry {
                        key: from_scval(&entry.key)?,
                        value: from_scval(&entry.val)?,
                    })
                })
                .collect::<Result<_, XdrError>>()?,
        )),
        other => Err(XdrError::Unsupported(format!("{:?}", other.discriminant()))),
    }
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Decode a G... account or C... contract strkey into an `ScAddress`.
pub fn decode_address(addr: &str) -> Result<ScAddress, XdrError> {
    let strkey = Strkey::from_string(addr).map_err(|e| XdrError::InvalidAddress {
        address: addr.to_string(),
        reason: e.to_string(),
    })?;

    match strkey {
        Strkey::PublicKeyEd25519(pk) => Ok(ScAddress::Account(AccountId(
            PublicKey::PublicKeyTypeEd25519(Uint256(pk.0)),
        ))),
        Strkey::Contract(c) => Ok(ScAddress::Contract(ContractId(Hash(c.0)))),
        _ => Err(XdrError::InvalidAddress {
            address: addr.to_string(),
            reason: "expected G... (account) or C... (contract) address".to_string(),
        }),
    }
}

/// Decode a G... strkey into an `AccountId`.
pub fn decode_account_id(addr: &str) -> Result<AccountId, XdrError> {
    match Strkey::from_string(addr) {
        Ok(Strkey::PublicKeyEd25519(pk)) => {
            Ok(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(pk.0))))
        }
        Ok(_) => Err(XdrError::InvalidAddress {
            address: addr.to_string(),
            reason: "expected a G... account address".to_string(),
        }),
        Err(e) => Err(XdrError::InvalidAddress {
            address: addr.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Decode a C... strkey into its 32-byte contract hash.
pub fn decode_contract_id(addr: &str) -> Result<[u8; 32], XdrError> {
    match Strkey::from_string(addr) {
        Ok(Strkey::Contract(c)) => Ok(c.0),
        Ok(_) => Err(XdrError::InvalidAddress {
            address: addr.to_string(),
            reason: "expected a C... contract address".to_string(),
        }),
        Err(e) => Err(XdrError::InvalidAddress {
            address: addr.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Encode an `ScAddress` back into its strkey form.
pub fn encode_address(addr: &ScAddress) -> Result<String, XdrError> {
    match addr {
        ScAddress::Account(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(bytes)))) => {
            Ok(account_strkey(bytes))
        }
        ScAddress::Contract(ContractId(Hash(bytes))) => Ok(contract_strkey(bytes)),
        other => Err(XdrError::Unsupported(format!("address {:?}", other))),
    }
}

/// G... strkey for a raw ed25519 public key.
pub fn account_strkey(public_key: &[u8; 32]) -> String {
    let strkey = Strkey::PublicKeyEd25519(stellar_strkey::ed25519::PublicKey(*public_key));
    String::from(strkey.to_string().as_str())
}

/// C... strkey for a raw contract hash.
pub fn contract_strkey(hash: &[u8; 32]) -> String {
    let strkey = Strkey::Contract(stellar_strkey::Contract(*hash));
    String::from(strkey.to_string().as_str())
}

// ---------------------------------------------------------------------------
// 256-bit helpers over big-endian u64 limbs
// ---------------------------------------------------------------------------

fn parse_u256_limbs(s: &str) -> Result<[u64; 4], String> {
    if s.is_empty() {
        return Err("empty string".to_string());
    }
    let mut limbs = [0u64; 4];
    for ch in s.bytes() {
        if !ch.is_ascii_digit() {
            return Err(format!("invalid digit '{}'", ch as char));
        }
        let mut carry = (ch - b'0') as u128;
        for limb in limbs.iter_mut().rev() {
            let wide = (*limb as u128) * 10 + carry;
            *limb = wide as u64;
            carry = wide >> 64;
        }
        if carry != 0 {
            return Err("value out of u256 range".to_string());
        }
    }
    Ok(limbs)
}

fn parse_i256(s: &str) -> Result<Int256Parts, XdrError> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let invalid = |reason: String| XdrError::InvalidNumber {
        kind: "i256",
        value: s.to_string(),
        reason,
    };
    let magnitude = parse_u256_limbs(digits).map_err(invalid)?;

    // Magnitude must fit in 255 bits, except for exactly -2^255.
    let min_magnitude = [1u64 << 63, 0, 0, 0];
    if magnitude[0] >> 63 == 1 && !(negative && magnitude == min_magnitude) {
        return Err(invalid("value out of i256 range".to_string()));
    }

    let limbs = if negative {
        negate_limbs(magnitude)
    } else {
        magnitude
    };
    Ok(Int256Parts {
        hi_hi: limbs[0] as i64,
        hi_lo: limbs[1],
        lo_hi: limbs[2],
        lo_lo: limbs[3],
    })
}

/// Two's complement negation: NOT + 1.
fn negate_limbs(limbs: [u64; 4]) -> [u64; 4] {
    let mut out = limbs.map(|l| !l);
    for limb in out.iter_mut().rev() {
        let (sum, overflow) = limb.overflowing_add(1);
        *limb = sum;
        if !overflow {
            break;
        }
    }
    out
}

fn limbs_to_decimal(mut limbs: [u64; 4]) -> String {
    if limbs == [0; 4] {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while limbs != [0; 4] {
        let mut rem: u128 = 0;
        for limb in limbs.iter_mut() {
            let cur = (rem << 64) | *limb as u128;
            *limb = (cur / 10) as u64;
            rem = cur % 10;
        }
        digits.push(char::from(b'0' + rem as u8));
    }
    digits.iter().rev().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
