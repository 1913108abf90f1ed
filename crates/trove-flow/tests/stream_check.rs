use std::sync::atomic::{AtomicU64, Ordering};

use trove_core::{sample_to_byte, BlockFooter, Geometry};
use trove_flow::{CreditWindow, SessionState, Streamer};
use trove_hal::PlatformClock;
use trove_store::{BlockStore, MemFlash, PowerRecovery, RingWriter};

struct MockClock { t: AtomicU64 }
impl PlatformClock for MockClock {
    fn now_us(&self) -> u64 { self.t.fetch_add(1_000, Ordering::SeqCst) }
}

fn boot(flash: &MemFlash, geometry: Geometry) -> RingWriter {
    let store = BlockStore::register(Box::new(flash.clone()), geometry).unwrap();
    PowerRecovery::restore(store).unwrap().0
}

fn settle(writer: &mut RingWriter) {
    let clock = MockClock { t: AtomicU64::new(0) };
    writer.store_mut().drain(&clock, 1_000_000).unwrap();
}

/// Record `len` samples 0,1,2.. and commit everything.
fn record(writer: &mut RingWriter, len: usize) -> Vec<u8> {
    let mut expected = Vec::new();
    for i in 0..len {
        let s = i as i8;
        writer.append(s);
        expected.push(sample_to_byte(s));
    }
    writer.flush();
    settle(writer);
    expected
}

#[test]
fn test_chunking_property() {
    let geometry = Geometry::new(5, 4).unwrap();
    const C: usize = 7;

    for len in [0usize, 6, 7, 8, 20] {
        let flash = MemFlash::new();
        let mut writer = boot(&flash, geometry);
        let expected = record(&mut writer, len);

        let mut streamer = Streamer::new();
        streamer.begin_session();

        let mut out = Vec::new();
        let mut sizes = Vec::new();
        loop {
            let mut chunk = [0u8; C];
            let n = streamer.fill(&mut writer, &mut chunk).unwrap();
            sizes.push(n);
            if n == 0 { break; }
            out.extend_from_slice(&chunk[..n]);
        }

        // Full chunks, one short tail (if any), then zero.
        let full = len / C;
        let tail = len % C;
        let mut want = vec![C; full];
        if tail > 0 { want.push(tail); }
        want.push(0);
        assert_eq!(sizes, want, "L={}", len);
        assert_eq!(out, expected, "L={}", len);
        assert_eq!(streamer.state(), SessionState::Complete);

        // Same bytes as a full-session dump
        let mut dumped: Vec<u8> = Vec::new();
        Streamer::new().dump(&mut writer, &mut dumped).unwrap();
        assert_eq!(out, dumped, "L={}", len);

        // Later calls keep returning 0
        assert_eq!(streamer.fill(&mut writer, &mut [0u8; C]).unwrap(), 0);
    }
}

#[test]
fn test_resumes_across_uneven_chunks() {
    let flash = MemFlash::new();
    let geometry = Geometry::new(5, 6).unwrap();
    let mut writer = boot(&flash, geometry);
    let expected = record(&mut writer, 23);

    let mut streamer = Streamer::new();
    streamer.begin_session();
    let mut out = Vec::new();
    for size in [1usize, 4, 5, 2, 9, 3, 100] {
        let mut buf = vec![0u8; size];
        let n = streamer.fill(&mut writer, &mut buf).unwrap();
        out.extend_from_slice(&buf[..n]);
    }

    assert_eq!(out, expected);
    assert_eq!(streamer.bytes_delivered(), 23);

    // Blocking dump agrees with the chunked path
    let mut dumped: Vec<u8> = Vec::new();
    let summary = Streamer::new().dump(&mut writer, &mut dumped).unwrap();
    assert_eq!(dumped, expected);
    assert_eq!(summary.blocks, 5);
    assert_eq!(summary.samples, 23);
}

#[test]
fn test_new_session_rewinds() {
    let flash = MemFlash::new();
    let mut writer = boot(&flash, Geometry::new(4, 4).unwrap());
    let expected = record(&mut writer, 6);

    let mut streamer = Streamer::new();
    streamer.begin_session();
    let mut buf = [0u8; 3];
    streamer.fill(&mut writer, &mut buf).unwrap();

    // Abandon midway, start over
    streamer.begin_session();
    let mut all = [0u8; 16];
    let n = streamer.fill(&mut writer, &mut all).unwrap();
    assert_eq!(&all[..n], &expected[..]);
}

#[test]
fn test_cleared_log_streams_nothing() {
    let flash = MemFlash::new();
    let mut writer = boot(&flash, Geometry::new(4, 4).unwrap());
    record(&mut writer, 9);
    writer.clear_all().unwrap();
    settle(&mut writer);

    let mut streamer = Streamer::new();
    streamer.begin_session();
    assert_eq!(streamer.fill(&mut writer, &mut [0u8; 8]).unwrap(), 0);
    assert_eq!(streamer.state(), SessionState::Complete);
}

#[test]
fn test_bad_blocks_are_skipped() {
    let flash = MemFlash::new();
    let geometry = Geometry::new(2, 4).unwrap();
    let mut writer = boot(&flash, geometry);

    // 1. Block 0 never reaches the medium
    flash.fail_next_writes(1);
    for s in [1i8, 2, 3, 4, 5, 6] { writer.append(s); }
    settle(&mut writer);

    // 2. Block 2 gets a zero count burned into its footer
    let footer = 2 * geometry.block_size() + geometry.footer_offset();
    flash.poke(footer + 1, &[0x00]);
    assert_eq!(BlockFooter::from_bytes(&flash.block(2)[geometry.footer_offset()..]).unwrap().count, 0);

    let mut streamer = Streamer::new();
    streamer.begin_session();
    let mut out = [0u8; 16];
    let n = streamer.fill(&mut writer, &mut out).unwrap();
    assert_eq!(&out[..n], &[3, 4]);
    assert_eq!(streamer.blocks_skipped(), 2);
}

#[test]
fn test_lost_record_skipped_after_reboot() {
    let flash = MemFlash::new();
    let geometry = Geometry::new(2, 4).unwrap();
    {
        let mut writer = boot(&flash, geometry);
        flash.fail_next_writes(1);
        for s in [1i8, 2, 3, 4, 5, 6] { writer.append(s); }
        settle(&mut writer);
    }

    let mut writer = boot(&flash, geometry);
    assert_eq!(writer.committed_blocks(), 3);

    let mut dumped: Vec<u8> = Vec::new();
    let summary = Streamer::new().dump(&mut writer, &mut dumped).unwrap();
    assert_eq!(dumped, vec![3, 4, 5, 6]);
    assert_eq!(summary.skipped, 1);
}

#[test]
fn test_scratch_reuse_reloads_block() {
    let flash = MemFlash::new();
    let mut writer = boot(&flash, Geometry::new(5, 4).unwrap());
    let mut expected = record(&mut writer, 7);

    let mut streamer = Streamer::new();
    streamer.begin_session();
    let mut out = vec![0u8; 3];
    assert_eq!(streamer.fill(&mut writer, &mut out).unwrap(), 3);

    // A flush swaps pages under the reader
    let before = writer.generation();
    writer.append(-1);
    writer.flush();
    settle(&mut writer);
    assert_ne!(writer.generation(), before);
    expected.push(sample_to_byte(-1));

    let mut rest = [0u8; 32];
    let n = streamer.fill(&mut writer, &mut rest).unwrap();
    out.extend_from_slice(&rest[..n]);
    assert_eq!(out, expected);
}

#[test]
fn test_dump_stops_at_write_cursor() {
    let flash = MemFlash::new();
    let mut writer = boot(&flash, Geometry::new(5, 4).unwrap());

    // Five committed by the eager flush, two still staged
    for s in 0..7i8 { writer.append(s); }
    settle(&mut writer);

    let mut dumped: Vec<u8> = Vec::new();
    let summary = Streamer::new().dump(&mut writer, &mut dumped).unwrap();
    assert_eq!(summary.blocks, 1);
    assert_eq!(dumped, vec![0, 1, 2, 3, 4]);
    assert_eq!(writer.cursor().fill, 2);
}

#[test]
fn test_credit_window() {
    let mut window = CreditWindow::new(2);
    assert!(window.consume());
    assert!(window.consume());
    assert!(!window.consume(), "Window should be closed");
    assert_eq!(window.available(), 0);

    window.on_delivered();
    assert_eq!(window.available(), 1);

    window.reset();
    assert_eq!(window.in_flight(), 0);
    window.on_delivered();
    assert_eq!(window.in_flight(), 0);
}
