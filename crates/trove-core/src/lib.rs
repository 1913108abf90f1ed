#![no_std]
#[cfg(feature = "std")]
extern crate std;

/// One sensor reading (integer part of a DS1621-class temperature).
pub type Sample = i8;

/// Erased state of the medium. Also the fill value for unused sample slots.
pub const ERASED_BYTE: u8 = 0xFF;
pub const SENTINEL: u8 = ERASED_BYTE;

// Footer byte 1 holds the count, so a block never carries more than 255 samples.
pub const MAX_SAMPLES_PER_BLOCK: usize = u8::MAX as usize;

// Defaults sized for a 256-byte flash block and a 20-byte link payload.
pub const DEFAULT_SAMPLES_PER_BLOCK: usize = 252;
pub const DEFAULT_BLOCK_COUNT: usize = 64;
pub const DEFAULT_CHUNK_SIZE: usize = 20;
pub const DEFAULT_TICK_US: u64 = 1_000_000;
pub const DEFAULT_COMPLETION_TIMEOUT_US: u64 = 2_000_000;

/// Transfer framing.
pub const START_MARKER: &[u8] = b"**START**";
pub const END_MARKER: &[u8] = b"**END**";
/// Live report prefix, followed by the decimal sample value.
pub const LIVE_PREFIX: &[u8] = b"DATA=";

#[inline]
pub fn sample_to_byte(sample: Sample) -> u8 {
    sample as u8
}

#[inline]
pub fn sample_from_byte(byte: u8) -> Sample {
    byte as Sample
}

const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Block layout: `[sample x N][pad to word][footer]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    samples_per_block: usize,
    block_count: usize,
}

impl Geometry {
    pub fn new(samples_per_block: usize, block_count: usize) -> TroveResult<Self> {
        if samples_per_block == 0 || samples_per_block > MAX_SAMPLES_PER_BLOCK {
            return Err(TroveError::Geometry);
        }
        if block_count == 0 { return Err(TroveError::Geometry); }
        Ok(Self { samples_per_block, block_count })
    }

    pub const fn samples_per_block(&self) -> usize { self.samples_per_block }
    pub const fn block_count(&self) -> usize { self.block_count }

    /// Word-aligned offset of the footer inside a block.
    pub const fn footer_offset(&self) -> usize {
        align4(self.samples_per_block)
    }

    pub const fn block_size(&self) -> usize {
        self.footer_offset() + BlockFooter::SIZE
    }

    /// Total samples the log can retain.
    pub const fn capacity(&self) -> usize {
        self.samples_per_block * self.block_count
    }

    pub const fn image_size(&self) -> usize {
        self.block_size() * self.block_count
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self { samples_per_block: DEFAULT_SAMPLES_PER_BLOCK, block_count: DEFAULT_BLOCK_COUNT }
    }
}

/// Per-block metadata stored right after the data region.
///
/// Byte 0 carries the used flag inverted (bit 0 cleared = used) because an
/// erased block reads all-ones. Byte 1 is the number of valid samples.
/// Bytes 2..4 are reserved and stay erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFooter {
    pub used: bool,
    pub count: u8,
}

impl BlockFooter {
    pub const SIZE: usize = 4;
    pub const USED_MARK: u8 = 0xFE;
    const USED_BIT: u8 = 0x01;

    pub const ERASED: Self = Self { used: false, count: ERASED_BYTE };

    pub fn used(count: u8) -> Self {
        Self { used: true, count }
    }

    pub fn to_bytes(&self, buf: &mut [u8]) -> TroveResult<()> {
        if buf.len() < Self::SIZE { return Err(TroveError::OutOfRange); }
        buf[0] = if self.used { Self::USED_MARK } else { ERASED_BYTE };
        buf[1] = self.count;
        buf[2] = ERASED_BYTE;
        buf[3] = ERASED_BYTE;
        Ok(())
    }

    pub fn from_bytes(buf: &[u8]) -> TroveResult<Self> {
        if buf.len() < Self::SIZE { return Err(TroveError::OutOfRange); }
        Ok(Self {
            used: buf[0] & Self::USED_BIT == 0,
            count: buf[1],
        })
    }

    /// A used footer whose count fits the geometry.
    pub fn is_valid(&self, geometry: &Geometry) -> bool {
        self.used && self.count > 0 && (self.count as usize) <= geometry.samples_per_block()
    }
}

/// Operating mode of the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Recording,
    LiveReport,
    Transfer,
}

/// Single-byte requests accepted over the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Live = b'I',
    Transfer = b'T',
    Record = b'R',
    Erase = b'E',
}

impl Command {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'I' => Some(Command::Live),
            b'T' => Some(Command::Transfer),
            b'R' => Some(Command::Record),
            b'E' => Some(Command::Erase),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Mode this command asks for. `Erase` is not a mode change.
    pub fn target_mode(self) -> Option<Mode> {
        match self {
            Command::Live => Some(Mode::LiveReport),
            Command::Transfer => Some(Mode::Transfer),
            Command::Record => Some(Mode::Recording),
            Command::Erase => None,
        }
    }
}

pub type TroveResult<T> = Result<T, TroveError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TroveError {
    Generic,
    InvalidState,
    Geometry,
    OutOfRange,
    HalError,
    StorageFailure,
    Timeout,
    LinkDown,
}

impl core::fmt::Display for TroveError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TroveError {}
