//! Argument marshalling for Soroban contract invocations.
//!
//! Converts native [`IrValue`]s into `ScVal`s (and back), and validates
//! named arguments against a declared [`ParamSpec`] schema before anything
//! touches the network.

pub mod ir;
pub mod schema;
pub mod xdr;

pub use ir::{IrMapEntry, IrValue};
pub use schema::{validate_args, ArgType, ConstructorSchema, ParamSpec, SchemaError};
pub use xdr::{
    account_strkey, contract_strkey, decode_account_id, decode_address, decode_contract_id,
    encode_address, from_scval, to_scval, to_scvals, to_symbol, XdrError,
};
