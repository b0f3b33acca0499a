//! Bank card decoder
//!
//! Layout of the bank engine output (all multi-byte values big-endian):
//!
//! | offset   | size | content                              |
//! |----------|------|--------------------------------------|
//! | 0        | 4    | reserved                             |
//! | 4        | 64   | bank name, NUL padded GB18030        |
//! | 68       | 2    | character count `N`                  |
//! | 70       | 10*N | code, left, top, width, height (u16) |

use encoding_rs::GB18030;
use serde::Serialize;
use tracing::debug;

use super::cursor::ByteCursor;
use super::until_nul;
use crate::error::DecodeError;
use crate::geometry::{final_crop_rect, CharacterBox, CropRect, Rect, Size};

const RESERVED_LEN: usize = 4;
const BANK_NAME_LEN: usize = 64;
const CHARACTER_RECORD_LEN: usize = 10;

/// Accepted range for the number of recognized characters
pub const CHARACTER_COUNT_RANGE: std::ops::RangeInclusive<usize> = 10..=24;

/// Decoded bank card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankRecord {
    /// Card number as recognized, spaces included
    pub number: String,
    /// Issuing bank, when the engine filled it in
    pub bank_name: Option<String>,
}

/// A bank record and the crop rect around its digits
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankScan {
    pub record: BankRecord,
    pub crop: CropRect,
}

/// NUL-terminated GB18030 bank name; blank or undecodable names are dropped
fn decode_bank_name(blob: &[u8]) -> Option<String> {
    let text = GB18030.decode_without_bom_handling_and_without_replacement(until_nul(blob))?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn read_character(cursor: &mut ByteCursor<'_>) -> Option<CharacterBox> {
    let code = cursor.read_u16_be()?;
    let left = cursor.read_u16_be()?;
    let top = cursor.read_u16_be()?;
    let width = cursor.read_u16_be()?;
    let height = cursor.read_u16_be()?;
    Some(CharacterBox {
        code,
        rect: Rect::new(
            f64::from(left),
            f64::from(top),
            f64::from(width),
            f64::from(height),
        ),
    })
}

/// Card number from character codes; digits and spaces only
fn card_number(boxes: &[CharacterBox]) -> Result<String, DecodeError> {
    let number: String = boxes
        .iter()
        .map(|b| {
            u8::try_from(b.code)
                .ok()
                .filter(|c| c.is_ascii_digit() || *c == b' ')
                .map(char::from)
                .ok_or(DecodeError::Encoding { field: "number" })
        })
        .collect::<Result<_, _>>()?;

    if !number.bytes().any(|c| c.is_ascii_digit()) {
        return Err(DecodeError::malformed("card number has no digits"));
    }
    Ok(number)
}

/// Parse the bank engine output, reporting why nothing usable was found
///
/// `image` is the full frame size and `guide` the guide frame the engine
/// was asked to search; character boxes are relative to the guide origin.
pub fn parse_bank(data: &[u8], image: Size, guide: Rect) -> Result<BankScan, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut cursor = ByteCursor::new(data);
    let header = cursor
        .take(RESERVED_LEN + BANK_NAME_LEN)
        .ok_or_else(|| DecodeError::malformed("truncated header"))?;
    let bank_name = decode_bank_name(&header[RESERVED_LEN..]);
    let expected = usize::from(
        cursor
            .read_u16_be()
            .ok_or_else(|| DecodeError::malformed("missing character count"))?,
    );

    let mut boxes = Vec::with_capacity(expected.min(*CHARACTER_COUNT_RANGE.end()));
    while cursor.remaining() >= CHARACTER_RECORD_LEN {
        match read_character(&mut cursor) {
            Some(b) => boxes.push(b),
            None => break,
        }
    }

    if !CHARACTER_COUNT_RANGE.contains(&boxes.len()) || boxes.len() != expected {
        return Err(DecodeError::malformed(format!(
            "expected {} characters, parsed {}",
            expected,
            boxes.len()
        )));
    }

    let number = card_number(&boxes)?;
    let crop = final_crop_rect(image, guide, &boxes)
        .ok_or_else(|| DecodeError::malformed("empty image"))?;

    Ok(BankScan {
        record: BankRecord { number, bank_name },
        crop,
    })
}

/// Decode the bank engine output, or `None` if it holds no usable record
pub fn decode_bank(data: &[u8], image: Size, guide: Rect) -> Option<BankScan> {
    match parse_bank(data, image, guide) {
        Ok(scan) => Some(scan),
        Err(e) => {
            debug!("Bank decode produced no record: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::bank_buffer;

    fn image() -> Size {
        Size::new(1280.0, 720.0)
    }

    fn guide() -> Rect {
        Rect::new(240.0, 108.0, 800.0, 504.0)
    }

    #[test]
    fn test_sixteen_digit_card() {
        let data = bank_buffer(b"", 16, "4000000000000000");
        let scan = decode_bank(&data, image(), guide()).unwrap();

        assert_eq!(scan.record.number, "4000000000000000");
        assert_eq!(scan.record.bank_name, None);
        let r = scan.crop.rect();
        assert!(r.x >= 0.0 && r.y >= 0.0);
        assert!(r.max_x() < 1280.0 && r.max_y() < 720.0);
    }

    #[test]
    fn test_crop_follows_character_geometry() {
        let data = bank_buffer(b"", 10, "1234567890");
        let scan = decode_bank(&data, image(), guide()).unwrap();

        // union (20,200)-(314,236), avg glyph 24x36, offset by the guide origin
        assert_eq!(scan.crop.rect(), Rect::new(236.0, 272.0, 342.0, 108.0));
    }

    #[test]
    fn test_character_count_out_of_range() {
        let nine = bank_buffer(b"", 9, "123456789");
        assert!(decode_bank(&nine, image(), guide()).is_none());

        let digits: String = std::iter::repeat('1').take(25).collect();
        let twenty_five = bank_buffer(b"", 25, &digits);
        assert!(decode_bank(&twenty_five, image(), guide()).is_none());
    }

    #[test]
    fn test_count_mismatch_is_void() {
        let data = bank_buffer(b"", 17, "4000000000000000");
        assert!(matches!(
            parse_bank(&data, image(), guide()),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_partial_trailing_record_is_ignored() {
        let mut data = bank_buffer(b"", 12, "123456789012");
        data.extend([0u8; 9]);
        assert_eq!(
            decode_bank(&data, image(), guide()).unwrap().record.number,
            "123456789012"
        );
    }

    #[test]
    fn test_spaces_are_kept_in_number() {
        let data = bank_buffer(b"", 19, "4000 0000 0000 0000");
        let scan = decode_bank(&data, image(), guide()).unwrap();
        assert_eq!(scan.record.number, "4000 0000 0000 0000");
    }

    #[test]
    fn test_non_digit_code_rejected() {
        let data = bank_buffer(b"", 10, "12345x7890");
        assert_eq!(
            parse_bank(&data, image(), guide()),
            Err(DecodeError::Encoding { field: "number" })
        );
    }

    #[test]
    fn test_bank_name_is_decoded() {
        let (name, _, _) = GB18030.encode("招商银行");
        let data = bank_buffer(&name, 16, "6225880000000000");
        let scan = decode_bank(&data, image(), guide()).unwrap();
        assert_eq!(scan.record.bank_name.as_deref(), Some("招商银行"));
    }

    #[test]
    fn test_truncated_buffers() {
        assert_eq!(parse_bank(&[], image(), guide()), Err(DecodeError::Empty));
        assert!(decode_bank(&[0u8; 40], image(), guide()).is_none());
        assert!(decode_bank(&[0u8; 69], image(), guide()).is_none());
    }
}
