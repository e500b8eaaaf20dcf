#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mailview_core::{ItemExtent, WatchSet, detect_extents};

#[derive(Debug, Arbitrary)]
struct Input {
    heights: Vec<u16>,
    scroll: u32,
    visible: u16,
    page_size: u8,
    terminal: Option<u8>,
}

fuzz_target!(|input: Input| {
    let mut top = 0.0;
    let extents: Vec<ItemExtent> = input
        .heights
        .iter()
        .take(4096)
        .map(|&h| {
            let e = ItemExtent::new(top, top + f64::from(h.max(1)));
            top = e.bottom;
            e
        })
        .collect();

    let Some(range) = detect_extents(f64::from(input.scroll), f64::from(input.visible), &extents)
    else {
        assert!(extents.is_empty(), "absent range for non-empty container");
        return;
    };
    assert!(range.first <= range.last, "first after last");
    assert!(range.last < extents.len(), "last past the end");

    let page_size = usize::from(input.page_size.max(1));
    let watch = WatchSet::for_visible(range, page_size);
    assert!(watch.contains(range.first / page_size));
    assert!(watch.contains(range.last / page_size));

    if let Some(terminal) = input.terminal {
        let clamped = watch.clamped_to(usize::from(terminal));
        assert!(!clamped.is_empty(), "clamp emptied the watch set");
        assert!(clamped.iter().all(|p| p <= usize::from(terminal)));
    }
});
