//! RESP3 wire protocol: framing, typed decoding, and command encoding.

mod decode;
mod encode;
mod error;
mod token;
mod value;

pub use decode::{as_bool, as_bytes, as_dict, as_error, as_f64, as_i64, as_optional, as_string, as_vec, FromValue};
pub use encode::{encode_command, CommandEncoder};
pub use error::{DecodeError, ParseError};
pub use token::{parse, parse_all, Token, TokenKind, MAX_NESTING_DEPTH};
pub use value::{ArrayView, MapView, Value};
