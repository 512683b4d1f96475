#![no_main]
use databundle::sniff::{sniff_bytes, Sniffed, SNIFF_WINDOW};
use libfuzzer_sys::fuzz_target;

// The sniffer sees untrusted file prefixes and must never panic
fuzz_target!(|data: &[u8]| {
    let sniffed = sniff_bytes(data);

    if let Sniffed::MediaType(media_type) = &sniffed {
        assert!(!media_type.is_empty());
        assert!(media_type.len() <= SNIFF_WINDOW);
        assert!(media_type.bytes().all(|b| (0x20..0x7f).contains(&b)));
    }

    // Bytes past the window never change the answer
    if data.len() > SNIFF_WINDOW {
        assert_eq!(sniff_bytes(&data[..SNIFF_WINDOW]), sniffed);
    }
});
