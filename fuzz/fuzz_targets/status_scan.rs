#![no_main]

use assuan_card::proto::{Card, Response};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut card = Card::default();
    for line in data.split(|&b| b == b'\n') {
        if let Ok(Response::Status(status)) = Response::parse(line) {
            let _ = card.scan(status);
        }
    }
});
