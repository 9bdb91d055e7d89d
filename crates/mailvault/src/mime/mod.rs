//! MIME parsing and serialization
//!
//! [`parse_raw`] turns wire bytes into a [`ParsedMessage`](crate::models::ParsedMessage);
//! [`serialize`] is its inverse up to semantic equality.

mod encoding;
mod parse;
mod serialize;

pub use encoding::encode_header_value;
pub use parse::{decode_encoded_words, parse_date, parse_raw, raw_header};
pub use serialize::serialize;
