use trove_core::{
    sample_from_byte, sample_to_byte, BlockFooter, Command, Geometry, Mode, TroveError,
    DEFAULT_BLOCK_COUNT, DEFAULT_SAMPLES_PER_BLOCK, ERASED_BYTE,
};

#[test]
fn test_geometry_bounds() {
    assert_eq!(Geometry::new(0, 4), Err(TroveError::Geometry));
    assert_eq!(Geometry::new(256, 4), Err(TroveError::Geometry));
    assert_eq!(Geometry::new(8, 0), Err(TroveError::Geometry));
    assert!(Geometry::new(255, 1).is_ok());
}

#[test]
fn test_block_size_is_word_aligned() {
    // (N, align4(N) + 4)
    for (n, size) in [(1, 8), (4, 8), (5, 12), (6, 12), (8, 12), (252, 256), (255, 260)] {
        let g = Geometry::new(n, 3).unwrap();
        assert_eq!(g.block_size(), size, "N={}", n);
        assert_eq!(g.footer_offset() % 4, 0);
        assert_eq!(g.image_size(), 3 * size);
        assert_eq!(g.capacity(), 3 * n);
    }

    let d = Geometry::default();
    assert_eq!(d.samples_per_block(), DEFAULT_SAMPLES_PER_BLOCK);
    assert_eq!(d.block_count(), DEFAULT_BLOCK_COUNT);
}

#[test]
fn test_footer_bytes() {
    let mut buf = [ERASED_BYTE; 4];
    BlockFooter::used(17).to_bytes(&mut buf).unwrap();
    assert_eq!(buf, [0xFE, 17, 0xFF, 0xFF]);
    assert_eq!(BlockFooter::from_bytes(&buf).unwrap(), BlockFooter::used(17));

    // Erased medium reads unused
    let erased = BlockFooter::from_bytes(&[0xFF; 4]).unwrap();
    assert!(!erased.used);
    assert_eq!(erased, BlockFooter::ERASED);

    // Only bit 0 decides
    assert!(BlockFooter::from_bytes(&[0x00, 1, 0xFF, 0xFF]).unwrap().used);
    assert!(BlockFooter::from_bytes(&[0x3]).is_err());
}

#[test]
fn test_footer_validity() {
    let g = Geometry::new(10, 2).unwrap();
    assert!(BlockFooter::used(10).is_valid(&g));
    assert!(!BlockFooter::used(11).is_valid(&g));
    assert!(!BlockFooter::used(0).is_valid(&g));
    assert!(!BlockFooter::ERASED.is_valid(&g));
}

#[test]
fn test_samples_are_raw_bytes() {
    for s in [i8::MIN, -1, 0, 1, i8::MAX] {
        assert_eq!(sample_from_byte(sample_to_byte(s)), s);
    }
    assert_eq!(sample_to_byte(-1), 0xFF);
}

#[test]
fn test_commands() {
    assert_eq!(Command::from_byte(b'I'), Some(Command::Live));
    assert_eq!(Command::from_byte(b'T').and_then(Command::target_mode), Some(Mode::Transfer));
    assert_eq!(Command::Record.target_mode(), Some(Mode::Recording));
    assert_eq!(Command::Erase.target_mode(), None);
    assert_eq!(Command::Erase.as_byte(), b'E');
    assert_eq!(Command::from_byte(b'i'), None);
    assert_eq!(Mode::default(), Mode::Recording);
}
