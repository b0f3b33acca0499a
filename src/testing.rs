//! Builders for engine output buffers used across unit tests

/// Identity stream: marker byte then `<tag><value><0x20>` groups
pub fn identity_output(groups: &[(u8, &[u8])]) -> Vec<u8> {
    let mut bytes = vec![0x01];
    for (tag, value) in groups {
        bytes.push(*tag);
        bytes.extend_from_slice(value);
        bytes.push(0x20);
    }
    bytes
}

/// Complete back side: issuing authority and validity period
pub fn identity_back_output() -> Vec<u8> {
    identity_output(&[(0x26, b"Police"), (0x27, b"2020.01.01-2040.01.01")])
}

/// Bank buffer with a NUL padded name, `count` declared and one 24x36 box
/// per digit laid out on a single row
pub fn bank_buffer(bank_name: &[u8], count: u16, digits: &str) -> Vec<u8> {
    let mut bytes = vec![0u8; 4];
    let mut name = bank_name.to_vec();
    name.resize(64, 0);
    bytes.extend(name);
    bytes.extend(count.to_be_bytes());
    for (i, c) in digits.bytes().enumerate() {
        let left = 20 + i as u16 * 30;
        for v in [u16::from(c), left, 200, 24, 36] {
            bytes.extend(v.to_be_bytes());
        }
    }
    bytes
}

/// Unnamed bank buffer declaring `digits.len()` characters
pub fn bank_output(digits: &str) -> Vec<u8> {
    bank_buffer(b"", digits.len() as u16, digits)
}
