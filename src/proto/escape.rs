//! Percent escaping of Assuan field values.
//!
//! Assuan lines cannot carry `%`, CR or LF verbatim, so those bytes are
//! sent as `%XX`. Some fields additionally use `+` for spaces, which
//! pushes a literal `+` into `%2B`.
//!
//! Decoding is lenient: a `%` that is not followed by two hex digits is
//! kept as is.

/// Percent-decode `source`.
///
/// The result is raw bytes, it does not need to be valid UTF-8.
pub fn decode(source: impl AsRef<[u8]>) -> Vec<u8> {
    let source = source.as_ref();
    let mut result = Vec::with_capacity(source.len());
    let mut i = 0;

    while i < source.len() {
        let b = source[i];
        if b == b'%' {
            if let Some(decoded) = source.get(i + 1..i + 3).and_then(hex_byte) {
                result.push(decoded);
                i += 3;
                continue;
            }
        }
        result.push(b);
        i += 1;
    }

    result
}

/// Escape `%`, CR and LF.
pub fn encode(source: &str) -> String {
    let mut result = String::with_capacity(source.len());
    for c in source.chars() {
        match c {
            '%' => result.push_str("%25"),
            '\r' => result.push_str("%0D"),
            '\n' => result.push_str("%0A"),
            c => result.push(c),
        }
    }
    result
}

/// Turn `+` into spaces, then percent-decode.
pub fn decode_with_plus(source: impl AsRef<[u8]>) -> Vec<u8> {
    let spaced: Vec<u8> = source
        .as_ref()
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    decode(spaced)
}

/// Percent-encode, then send spaces as `+` and literal `+` as `%2B`.
pub fn encode_with_plus(source: &str) -> String {
    let encoded = encode(source);
    let mut result = String::with_capacity(encoded.len());
    for c in encoded.chars() {
        match c {
            ' ' => result.push('+'),
            '+' => result.push_str("%2B"),
            c => result.push(c),
        }
    }
    result
}

fn hex_byte(pair: &[u8]) -> Option<u8> {
    let hi = char::from(pair[0]).to_digit(16)?;
    let lo = char::from(pair[1]).to_digit(16)?;
    Some((hi << 4 | lo) as u8)
}
