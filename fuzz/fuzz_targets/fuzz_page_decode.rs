#![no_main]

use libfuzzer_sys::fuzz_target;
use mailview_core::{Email, SyncState, SyncToken, Thread};
use mailview_runtime::{Decoder, JsonDecoder};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Decoding never panics, and the validator sees every accepted page.
    let threads = JsonDecoder::<Vec<Thread>>::new().with_validator(|page| {
        if page.len() <= 50 {
            Ok(())
        } else {
            Err("over limit".into())
        }
    });
    if let Ok(page) = threads.decode(text) {
        assert!(page.len() <= 50);
    }
    let _ = JsonDecoder::<Vec<Email>>::new().decode(text);

    if let Ok(token) = JsonDecoder::<SyncToken>::new().decode(text) {
        let _ = SyncState::from_token(&token);
    }
});
