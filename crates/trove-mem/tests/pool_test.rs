use trove_core::{BlockFooter, Geometry, SENTINEL};
use trove_mem::{Page, PagePair};

#[test]
fn test_page_seal_and_reset() {
    let geometry = Geometry::new(5, 4).unwrap();
    let mut page = Page::new(geometry);

    // 1. Fresh page is sentinel-filled with an erased footer
    assert_eq!(page.as_bytes().len(), 12);
    assert!(page.as_bytes().iter().all(|&b| b == SENTINEL));
    assert_eq!(page.footer().unwrap(), BlockFooter::ERASED);

    // 2. Stage and seal
    assert!(page.push(7));
    assert!(page.push(-2));
    let footer = page.seal().unwrap();
    assert_eq!(footer, BlockFooter::used(2));
    assert_eq!(page.staged(), &[7u8, 0xFE]);
    assert_eq!(&page.as_bytes()[8..12], &[0xFE, 2, 0xFF, 0xFF]);

    // 3. Reset leaves no stale tail data
    page.reset();
    assert_eq!(page.fill(), 0);
    assert!(page.as_bytes().iter().all(|&b| b == SENTINEL));
}

#[test]
fn test_page_rejects_overflow() {
    let geometry = Geometry::new(2, 1).unwrap();
    let mut page = Page::new(geometry);
    assert!(page.push(1));
    assert!(page.push(2));
    assert!(page.is_full());
    assert!(!page.push(3), "Wrote past the data region!");
    assert_eq!(page.staged(), &[1, 2]);
}

#[test]
fn test_pair_swap_clears_new_active() {
    let geometry = Geometry::new(4, 2).unwrap();
    let mut pair = PagePair::new(geometry);

    pair.active_mut().push(9);
    pair.active_mut().push(9);
    assert_eq!(pair.active_index(), 0);

    // Swap: old active becomes idle and keeps its bytes until reused
    pair.swap();
    assert_eq!(pair.active_index(), 1);
    assert_eq!(pair.idle().staged(), &[9, 9]);
    assert!(pair.active().is_empty());

    // Swap back: the reused page is clean
    pair.swap();
    assert!(pair.active().as_bytes()[..4].iter().all(|&b| b == SENTINEL));
}
