#![no_main]

use assuan_card::proto::{escape, tlv, KdfCollection};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let tags = tlv::read_tags(&escape::decode_with_plus(data), 0);
    let _ = KdfCollection::from_tags(&tags);
});
