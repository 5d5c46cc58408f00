//! Fuzz target for the wire codec parser.
//!
//! `parse` must never panic on arbitrary bytes: malformed input should come
//! back as a `ParseError`, never an invariant violation inside the envelope
//! or the pool it borrows from.

#![no_main]

use fix_core::codec;
use fix_core::pool::MessagePool;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let pool = MessagePool::new(16, 4096);
    if let Ok((env, consumed)) = codec::parse(data, &pool, 0) {
        assert!(consumed <= data.len(), "parse reported consuming more bytes than it was given");
        assert!(env.field(8).is_some(), "a successfully parsed message must carry BeginString");
    }
});
