//! Reader for the one-byte-tag, one-byte-length records found in card
//! data objects.

use std::collections::BTreeMap;

/// Read `tag length value` records from `data`, starting at `offset`.
///
/// Reading stops at the first record that does not fit into the
/// remaining bytes; a truncated tail is treated as the end of the data.
/// If a tag appears more than once the last value wins.
pub fn read_tags(data: &[u8], offset: usize) -> BTreeMap<u8, Vec<u8>> {
    let mut tags = BTreeMap::new();
    let mut rest = data.get(offset..).unwrap_or_default();

    while let [tag, length, tail @ ..] = rest {
        let length = usize::from(*length);
        let Some(value) = tail.get(..length) else {
            break;
        };
        tags.insert(*tag, value.to_vec());
        rest = &tail[length..];
    }

    tags
}
