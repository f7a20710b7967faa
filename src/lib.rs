//! A structural parser for the JPEG/JFIF container format.
//!
//! The parser walks the marker-delimited segments of a baseline JPEG stream
//! and decodes the fixed-layout metadata segments (APP0/JFIF, DQT, SOF0, DHT)
//! into structured records, in encounter order. Unrecognized segments are
//! skipped by their declared length, and the entropy-coded scan data behind
//! the SOS header is located and stepped over, never decoded.
//!
//! The companion [`bmp`] module reads and writes the minimal uncompressed
//! 24-bit BMP raster layout.

mod error;
mod file;

pub mod bmp;

pub use error::{Error, ErrorKind, Result};
pub use file::{
    parse, ApplicationInfo, DensityUnit, FrameComponent, FrameHeaderInfo, HuffmanTableInfo,
    JpegParser, Marker, ParseResult, ParsedSegment, QuantizationTableInfo, SegmentInfo, TableClass,
    TableDestination, TablePrecision, Termination,
};
