#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use warcreplay_archive::WarcReader;

fuzz_target!(|data: &[u8]| {
    let mut reader = WarcReader::new(Cursor::new(data));

    // Errors are expected; panics and runaway allocation are not
    for _ in 0..256 {
        match reader.read_record() {
            Ok(Some(mut record)) => {
                let _ = record.read_content();
            }
            _ => break,
        }
    }
});
