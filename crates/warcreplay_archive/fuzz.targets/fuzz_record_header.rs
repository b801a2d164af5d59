#![no_main]
use libfuzzer_sys::fuzz_target;
use warcreplay_archive::RecordHeader;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    if let Ok(header) = RecordHeader::parse(&text) {
        let _ = header.record_type();
        let _ = header.target_uri();
        let _ = header.content_length();
        // Display output must parse back to the same header
        let reparsed = RecordHeader::parse(&header.to_string());
        assert_eq!(reparsed.as_ref(), Ok(&header));
    }
});
