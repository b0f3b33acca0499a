//! Identity card decoder
//!
//! The identity engine emits one marker byte followed by tag/value groups:
//! `<tag><value bytes...><0x20>`. Values are GB18030 text.

use encoding_rs::GB18030;
use serde::Serialize;
use tracing::{debug, trace};

use super::cursor::ByteCursor;
use super::until_nul;
use crate::error::DecodeError;

const FIELD_TERMINATOR: u8 = 0x20;

/// Fields printed on the front of the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityFront {
    /// Citizen identity number
    pub number: String,
    pub name: String,
    pub gender: String,
    pub nation: String,
    pub address: String,
}

/// Fields printed on the back of the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityBack {
    /// Issuing authority
    pub issue: String,
    /// Validity period
    pub valid: String,
}

/// Decoded identity card; at least one side is always present
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub front: Option<IdentityFront>,
    pub back: Option<IdentityBack>,
}

/// Fields collected while walking the tag stream
#[derive(Debug, Default)]
struct IdentityFields {
    number: Option<String>,
    name: Option<String>,
    gender: Option<String>,
    nation: Option<String>,
    address: Option<String>,
    issue: Option<String>,
    valid: Option<String>,
}

impl IdentityFields {
    fn slot(&mut self, tag: u8) -> Option<(&'static str, &mut Option<String>)> {
        let slot = match tag {
            0x21 => ("number", &mut self.number),
            0x22 => ("name", &mut self.name),
            0x23 => ("gender", &mut self.gender),
            0x24 => ("nation", &mut self.nation),
            0x25 => ("address", &mut self.address),
            0x26 => ("issue", &mut self.issue),
            0x27 => ("valid", &mut self.valid),
            _ => return None,
        };
        Some(slot)
    }

    fn is_empty(&self) -> bool {
        [
            &self.number,
            &self.name,
            &self.gender,
            &self.nation,
            &self.address,
            &self.issue,
            &self.valid,
        ]
        .iter()
        .all(|f| f.is_none())
    }

    fn into_record(self) -> Option<IdentityRecord> {
        let front = match (self.number, self.name, self.gender, self.nation, self.address) {
            (Some(number), Some(name), Some(gender), Some(nation), Some(address)) => {
                Some(IdentityFront {
                    number,
                    name,
                    gender,
                    nation,
                    address,
                })
            }
            _ => None,
        };
        let back = match (self.issue, self.valid) {
            (Some(issue), Some(valid)) => Some(IdentityBack { issue, valid }),
            _ => None,
        };

        if front.is_none() && back.is_none() {
            return None;
        }
        Some(IdentityRecord { front, back })
    }
}

/// Decode a GB18030 field value; text ends at the first NUL
fn decode_text(field: &'static str, bytes: &[u8]) -> Result<String, DecodeError> {
    GB18030
        .decode_without_bom_handling_and_without_replacement(until_nul(bytes))
        .map(|text| text.into_owned())
        .ok_or(DecodeError::Encoding { field })
}

/// Parse the identity engine output, reporting why nothing usable was found
pub fn parse_identity(data: &[u8]) -> Result<IdentityRecord, DecodeError> {
    let mut cursor = ByteCursor::new(data);
    // Leading marker byte carries nothing we use.
    cursor.read_u8().ok_or(DecodeError::Empty)?;

    let mut fields = IdentityFields::default();
    while let Some(tag) = cursor.read_u8() {
        let value = cursor.take_until(FIELD_TERMINATOR);
        if value.is_empty() {
            continue;
        }
        let Some((name, slot)) = fields.slot(tag) else {
            trace!("Skipping unknown identity tag {:#04x}", tag);
            continue;
        };
        match decode_text(name, value) {
            Ok(text) => *slot = Some(text),
            Err(e) => debug!("Dropping identity field: {}", e),
        }
    }

    if fields.is_empty() {
        return Err(DecodeError::malformed("no identity fields recognized"));
    }
    fields
        .into_record()
        .ok_or_else(|| DecodeError::malformed("neither card side is complete"))
}

/// Decode the identity engine output, or `None` if it holds no usable record
pub fn decode_identity(data: &[u8]) -> Option<IdentityRecord> {
    match parse_identity(data) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("Identity decode produced no record: {}", e);
            None
        }
    }
}
