#![no_main]
use libfuzzer_sys::fuzz_target;
use postcode_pack::codec::frame;
use postcode_pack::{ColumnarCodec, DecodeLimits, PartitionCodec};

// Decoding untrusted bytes must fail cleanly, never panic or over-allocate
fuzz_target!(|data: &[u8]| {
    let limits = DecodeLimits {
        max_decoded_bytes: 16 * 1024 * 1024,
        ..DecodeLimits::default()
    };
    if let Ok(records) = ColumnarCodec::default().decode(data, &limits) {
        // Anything that decodes must re-encode and decode to the same records
        let bytes = ColumnarCodec::default().encode(&records).unwrap();
        let again = ColumnarCodec::default()
            .decode(&bytes, &DecodeLimits::default())
            .unwrap();
        assert_eq!(records, again);
    }

    let _ = frame::read_frame(data);
});
