#![no_main]

use std::io::Read;

use libfuzzer_sys::fuzz_target;
use multiread::{Constraints, Multipart, MultipartReader};

fuzz_target!(|data: &[u8]| {
    let constraints = Constraints::new().buffer_size(MultipartReader::<&[u8]>::min_buffer_size(10));
    let mut multipart = match Multipart::with_constraints(data, "X-BOUNDARY", constraints) {
        Ok(multipart) => multipart,
        Err(_) => return,
    };

    let mut breaks = 0;
    while breaks < 3 {
        match multipart.next_field() {
            Err(_) | Ok(None) => breaks += 1,
            Ok(Some(mut field)) => {
                let mut body = Vec::new();
                let _ = field.read_to_end(&mut body);
            }
        }
    }
});
