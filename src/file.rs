//! JPEG/JFIF container parser.

#[cfg(test)]
mod tests;

use std::{fmt, mem};

use bytemuck::AnyBitPattern;

use crate::error::{Error, Result};

/// Marker codes recognized by the walker.
///
/// Every segment begins with a 2-byte `0xFF 0xXX` marker; this classifies the
/// `0xXX` byte. Markers outside the closed set land in [`Marker::Other`] and
/// their segments are skipped by declared length instead of decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Start of image.
    Soi,
    /// APP0 application segment, carrying the JFIF header.
    App0,
    /// Define quantization table.
    Dqt,
    /// Baseline frame header.
    Sof0,
    /// Define Huffman table.
    Dht,
    /// Start of scan.
    Sos,
    /// End of image.
    Eoi,
    /// Any other marker.
    Other(u8),
}

impl Marker {
    fn from_code(code: u8) -> Self {
        match code {
            0xD8 => Self::Soi,
            0xE0 => Self::App0,
            0xDB => Self::Dqt,
            0xC0 => Self::Sof0,
            0xC4 => Self::Dht,
            0xDA => Self::Sos,
            0xD9 => Self::Eoi,
            code => Self::Other(code),
        }
    }

    /// Returns the marker's code byte (the `0xXX` in `0xFF 0xXX`).
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            Self::Soi => 0xD8,
            Self::App0 => 0xE0,
            Self::Dqt => 0xDB,
            Self::Sof0 => 0xC0,
            Self::Dht => 0xC4,
            Self::Sos => 0xDA,
            Self::Eoi => 0xD9,
            Self::Other(code) => code,
        }
    }
}

/// How a walk over the segment stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The EOI marker was reached.
    EndOfImage,
    /// The SOS header was read and the entropy-coded scan data skipped.
    ///
    /// The walker assumes a single-scan baseline stream whose compressed data
    /// runs to the EOI marker at the very end; multi-scan streams and streams
    /// with trailers after the scan data are not handled.
    ScanData,
}

/// Walks `buf` to completion and collects every decoded segment record.
pub fn parse(buf: &[u8]) -> Result<ParseResult<'_>> {
    let mut parser = JpegParser::new(buf)?;
    let mut segments = Vec::new();
    loop {
        match parser.walk_step()? {
            Step::Segment(segment) => segments.push(segment),
            Step::Done(termination) => {
                return Ok(ParseResult {
                    segments,
                    termination,
                })
            }
        }
    }
}

/// A pull parser over the segment structure of a JPEG stream.
pub struct JpegParser<'a> {
    reader: Reader<'a>,
    termination: Option<Termination>,
}

enum Step<'a> {
    Segment(ParsedSegment<'a>),
    Done(Termination),
}

impl<'a> JpegParser<'a> {
    /// Opens a JPEG stream, validating the SOI signature.
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        let mut reader = Reader::new(buf);
        if reader.read_u8("SOI marker")? != 0xFF || reader.read_u8("SOI marker")? != 0xD8 {
            return Err(Error::not_a_jpeg());
        }
        Ok(Self {
            reader,
            termination: None,
        })
    }

    /// Advances to the next recognized segment and decodes it.
    ///
    /// Unrecognized markers are skipped by their declared length and do not
    /// show up here. Returns `Ok(None)` once the walk has ended, either at the
    /// EOI marker or after the SOS header; [`JpegParser::termination`] then
    /// tells the two apart.
    pub fn next_segment(&mut self) -> Result<Option<ParsedSegment<'a>>> {
        if self.termination.is_some() {
            return Ok(None);
        }
        match self.walk_step()? {
            Step::Segment(segment) => Ok(Some(segment)),
            Step::Done(termination) => {
                self.termination = Some(termination);
                Ok(None)
            }
        }
    }

    /// Returns how the walk ended, or `None` while segments remain.
    #[inline]
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Returns the bytes following the current position.
    ///
    /// After the walk has ended this is the unparsed tail of the stream: the
    /// trailing bytes after EOI, or the final 2 bytes when the walk stopped at
    /// the entropy-coded scan data.
    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        self.reader.remaining()
    }

    fn walk_step(&mut self) -> Result<Step<'a>> {
        loop {
            let offset = self.reader.position();
            let (marker, length) = self.next_marker_and_length()?;

            let Some(length) = length else {
                // EOI carries no length field. Consume it and stop.
                self.reader.seek_relative(2)?;
                if !self.reader.remaining().is_empty() {
                    log::warn!(
                        "ignoring {} trailing bytes after EOI",
                        self.reader.remaining().len()
                    );
                }
                return Ok(Step::Done(Termination::EndOfImage));
            };

            // The whole segment, marker and length field included.
            let segment_len = usize::from(length) + 2;
            let info = match marker {
                Marker::App0 => {
                    SegmentInfo::App0(decode_app0(self.reader.read_slice(segment_len, "APP0 segment")?)?)
                }
                Marker::Dqt => {
                    SegmentInfo::Dqt(decode_dqt(self.reader.read_slice(segment_len, "DQT segment")?)?)
                }
                Marker::Sof0 => {
                    SegmentInfo::Sof0(decode_sof0(self.reader.read_slice(segment_len, "SOF0 segment")?)?)
                }
                Marker::Dht => {
                    SegmentInfo::Dht(decode_dht(self.reader.read_slice(segment_len, "DHT segment")?)?)
                }
                Marker::Sos => {
                    // Only the scan header is read. The entropy-coded data that
                    // follows is not marker-delimited (stuffed `FF 00` bytes
                    // would be misread as markers), so jump to the end of the
                    // stream instead of walking it.
                    self.reader.read_slice(segment_len, "SOS segment")?;
                    self.reader.seek_from_end(-2)?;
                    return Ok(Step::Done(Termination::ScanData));
                }
                Marker::Soi => {
                    // A redundant SOI is tolerated and carries no payload.
                    log::debug!("redundant SOI marker at offset {offset:#x}");
                    self.reader.seek_relative(2)?;
                    continue;
                }
                // The scanner reports EOI with a null length, handled above.
                Marker::Eoi => unreachable!(),
                Marker::Other(code) => {
                    log::debug!("skipping unrecognized marker ff {code:02x} ({segment_len} bytes)");
                    self.reader.seek_relative(segment_len as i64)?;
                    continue;
                }
            };

            return Ok(Step::Segment(ParsedSegment {
                marker,
                offset,
                info,
            }));
        }
    }

    /// Reads the next marker and, for length-bearing markers, the declared
    /// segment length.
    ///
    /// EOI is reported with a null length, since it has no length field. In
    /// every case the cursor is rewound to the start of the marker, so that a
    /// segment decoder can consume the marker and length again as part of its
    /// own self-contained input.
    fn next_marker_and_length(&mut self) -> Result<(Marker, Option<u16>)> {
        let prefix = self.reader.read_u8("marker prefix")?;
        if prefix != 0xFF {
            return Err(Error::invalid_marker(prefix));
        }
        let marker = Marker::from_code(self.reader.read_u8("marker code")?);

        if marker == Marker::Eoi {
            self.reader.seek_relative(-2)?;
            return Ok((marker, None));
        }

        let length = self.reader.read_u16("segment length")?;
        if length < 2 {
            return Err(Error::malformed(format!(
                "segment declares length {length}, minimum is 2"
            )));
        }
        self.reader.seek_relative(-4)?;
        Ok((marker, Some(length)))
    }
}

/// Decodes a full APP0 segment, marker and length field included.
fn decode_app0(segment: &[u8]) -> Result<ApplicationInfo> {
    let mut reader = Reader::new(segment);
    reader.read_u16("APP0 marker")?;
    reader.read_u16("APP0 length")?;

    let mut identifier = [0; 5];
    identifier.copy_from_slice(reader.read_slice(5, "JFIF identifier")?);
    let version_major = reader.read_u8("JFIF version")?;
    let version_minor = reader.read_u8("JFIF version")?;
    let density_unit = reader.read_u8("density unit")?;
    let x_density = reader.read_u16("horizontal density")?;
    let y_density = reader.read_u16("vertical density")?;
    let x_thumbnail = reader.read_u8("thumbnail width")?;
    let y_thumbnail = reader.read_u8("thumbnail height")?;

    Ok(ApplicationInfo {
        identifier,
        version_major,
        version_minor,
        density_unit,
        x_density,
        y_density,
        x_thumbnail,
        y_thumbnail,
    })
}

/// Decodes a full DQT segment, marker and length field included.
fn decode_dqt(segment: &[u8]) -> Result<&QuantizationTableInfo> {
    let mut reader = Reader::new(segment);
    reader.read_u16("DQT marker")?;
    reader.read_u16("DQT length")?;
    reader.read_obj("quantization table")
}

/// Decodes a full SOF0 segment, marker and length field included.
fn decode_sof0(segment: &[u8]) -> Result<FrameHeaderInfo<'_>> {
    let mut reader = Reader::new(segment);
    reader.read_u16("SOF0 marker")?;
    reader.read_u16("SOF0 length")?;

    let precision = reader.read_u8("sample precision")?;
    let height = reader.read_u16("image height")?;
    let width = reader.read_u16("image width")?;
    // The component count bounds the descriptor list; the declared segment
    // length is redundant with it and is not consulted.
    let component_count = reader.read_u8("component count")?;
    let components = reader.read_objs(component_count.into(), "frame components")?;

    Ok(FrameHeaderInfo {
        precision,
        height,
        width,
        components,
    })
}

/// Decodes a full DHT segment, marker and length field included.
fn decode_dht(segment: &[u8]) -> Result<HuffmanTableInfo<'_>> {
    let mut reader = Reader::new(segment);
    reader.read_u16("DHT marker")?;
    reader.read_u16("DHT length")?;

    let header: &HuffmanTableHeader = reader.read_obj("Huffman table header")?;
    // The symbol count is derived from the counts on every decode, never
    // stored or taken from the declared length.
    let symbol_count = header.symbol_count();
    if symbol_count > 256 {
        return Err(Error::malformed(format!(
            "Huffman table declares {symbol_count} symbols, limit is 256"
        )));
    }
    if symbol_count > reader.remaining().len() {
        return Err(Error::malformed(format!(
            "Huffman table declares {symbol_count} symbols, but only {} bytes remain in the segment",
            reader.remaining().len()
        )));
    }
    let symbols = reader.read_slice(symbol_count, "Huffman symbols")?;

    Ok(HuffmanTableInfo { header, symbols })
}

#[derive(Debug)]
struct Reader<'a> {
    buf: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, position: 0 }
    }

    fn position(&self) -> usize {
        self.position
    }

    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.position..]
    }

    fn read_u8(&mut self, what: &'static str) -> Result<u8> {
        match self.remaining().first() {
            Some(&byte) => {
                self.position += 1;
                Ok(byte)
            }
            None => Err(Error::truncated(what)),
        }
    }

    fn read_u16(&mut self, what: &'static str) -> Result<u16> {
        let b = [self.read_u8(what)?, self.read_u8(what)?];
        Ok(u16::from_be_bytes(b))
    }

    fn read_slice(&mut self, count: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.remaining().len() < count {
            return Err(Error::truncated(what));
        }
        let slice = &self.remaining()[..count];
        self.position += count;
        Ok(slice)
    }

    fn read_obj<T: AnyBitPattern>(&mut self, what: &'static str) -> Result<&'a T> {
        assert_eq!(mem::align_of::<T>(), 1);

        let bytes = self.read_slice(mem::size_of::<T>(), what)?;
        Ok(bytemuck::from_bytes(bytes))
    }

    fn read_objs<T: AnyBitPattern>(&mut self, count: usize, what: &'static str) -> Result<&'a [T]> {
        assert_eq!(mem::align_of::<T>(), 1);

        let bytes = self.read_slice(count * mem::size_of::<T>(), what)?;
        Ok(bytemuck::cast_slice(bytes))
    }

    /// Moves the position by `delta` bytes relative to the current position.
    fn seek_relative(&mut self, delta: i64) -> Result<()> {
        self.seek_to(self.position as i64 + delta)
    }

    /// Moves the position to `delta` bytes relative to the end of the stream.
    fn seek_from_end(&mut self, delta: i64) -> Result<()> {
        self.seek_to(self.buf.len() as i64 + delta)
    }

    fn seek_to(&mut self, target: i64) -> Result<()> {
        if target < 0 || target > self.buf.len() as i64 {
            return Err(Error::truncated("seek target"));
        }
        self.position = target as usize;
        Ok(())
    }
}

/// Every record decoded from a single walk, in encounter order.
#[derive(Debug)]
pub struct ParseResult<'a> {
    segments: Vec<ParsedSegment<'a>>,
    termination: Termination,
}

impl<'a> ParseResult<'a> {
    /// The decoded segment records, in on-disk encounter order.
    #[inline]
    pub fn segments(&self) -> &[ParsedSegment<'a>] {
        &self.segments
    }

    /// How the walk ended.
    #[inline]
    pub fn termination(&self) -> Termination {
        self.termination
    }
}

/// A decoded segment, tagged with the marker that produced it.
#[derive(Debug)]
pub struct ParsedSegment<'a> {
    marker: Marker,
    offset: usize,
    info: SegmentInfo<'a>,
}

impl<'a> ParsedSegment<'a> {
    /// Returns the marker that introduced this segment.
    #[inline]
    pub fn marker(&self) -> Marker {
        self.marker
    }

    /// Returns the offset of the segment's `0xFF 0xXX` marker in the input
    /// buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn info(&self) -> &SegmentInfo<'a> {
        &self.info
    }
}

/// Enumeration of the segment records produced by the walker.
#[derive(Debug)]
#[non_exhaustive]
pub enum SegmentInfo<'a> {
    App0(ApplicationInfo),
    Dqt(&'a QuantizationTableInfo),
    Sof0(FrameHeaderInfo<'a>),
    Dht(HuffmanTableInfo<'a>),
}

/// The JFIF application header carried in an APP0 segment.
#[derive(Debug)]
pub struct ApplicationInfo {
    identifier: [u8; 5],
    version_major: u8,
    version_minor: u8,
    density_unit: u8,
    x_density: u16,
    y_density: u16,
    x_thumbnail: u8,
    y_thumbnail: u8,
}

impl ApplicationInfo {
    /// The 5-byte identifier, `b"JFIF\0"` for JFIF streams.
    #[inline]
    pub fn identifier(&self) -> &[u8; 5] {
        &self.identifier
    }

    /// The (major, minor) version pair.
    #[inline]
    pub fn version(&self) -> (u8, u8) {
        (self.version_major, self.version_minor)
    }

    /// The raw density-unit code.
    #[inline]
    pub fn density_unit(&self) -> u8 {
        self.density_unit
    }

    /// The density unit the code maps to, or `None` for unmapped codes.
    #[inline]
    pub fn unit(&self) -> Option<DensityUnit> {
        match self.density_unit {
            0 => Some(DensityUnit::AspectRatio),
            1 => Some(DensityUnit::DotsPerInch),
            2 => Some(DensityUnit::DotsPerCm),
            _ => None,
        }
    }

    #[inline]
    pub fn density_x(&self) -> u16 {
        self.x_density
    }

    #[inline]
    pub fn density_y(&self) -> u16 {
        self.y_density
    }

    #[inline]
    pub fn thumbnail_width(&self) -> u8 {
        self.x_thumbnail
    }

    #[inline]
    pub fn thumbnail_height(&self) -> u8 {
        self.y_thumbnail
    }
}

/// Interpretation of the APP0 density fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DensityUnit {
    /// No absolute unit; the densities only specify an aspect ratio.
    AspectRatio,
    DotsPerInch,
    DotsPerCm,
}

/// A quantization table definition.
///
/// The 64 entries are kept in their raw zig-zag storage order; no reordering
/// is performed. 16-bit tables are not supported, entries are always read as
/// single bytes.
#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
pub struct QuantizationTableInfo {
    info: u8,
    entries: [u8; 64],
}

impl QuantizationTableInfo {
    /// The destination selected by the low nibble of the info byte, or `None`
    /// for unmapped ids.
    #[inline]
    pub fn destination(&self) -> Option<TableDestination> {
        match self.info & 0xF {
            0 => Some(TableDestination::Luminance),
            1 => Some(TableDestination::Chrominance),
            _ => None,
        }
    }

    /// The entry precision selected by the high nibble of the info byte, or
    /// `None` for unmapped values.
    #[inline]
    pub fn precision(&self) -> Option<TablePrecision> {
        match self.info >> 4 {
            0 => Some(TablePrecision::EightBit),
            1 => Some(TablePrecision::SixteenBit),
            _ => None,
        }
    }

    /// The 64 table entries in zig-zag storage order.
    #[inline]
    pub fn entries(&self) -> &[u8; 64] {
        &self.entries
    }
}

impl fmt::Debug for QuantizationTableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantizationTableInfo")
            .field("destination", &self.destination())
            .field("precision", &self.precision())
            .field("entries", &self.entries)
            .finish()
    }
}

/// Destination of a quantization table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableDestination {
    Luminance,
    Chrominance,
}

/// Entry precision of a quantization table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePrecision {
    EightBit,
    SixteenBit,
}

/// The SOF0 baseline frame header.
#[derive(Debug)]
pub struct FrameHeaderInfo<'a> {
    precision: u8,
    height: u16,
    width: u16,
    components: &'a [FrameComponent],
}

impl<'a> FrameHeaderInfo<'a> {
    /// Sample precision in bits per component.
    #[inline]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Image height in lines. Zero is passed through, not rejected.
    #[inline]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Image width in samples per line. Zero is passed through, not rejected.
    #[inline]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[inline]
    pub fn components(&self) -> &'a [FrameComponent] {
        self.components
    }
}

/// A per-component descriptor in the frame header.
#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
pub struct FrameComponent {
    id: u8,
    sampling: u8,
    quantization_table: u8,
}

impl FrameComponent {
    /// Component identifier (1 = Y, 2 = Cb, 3 = Cr in JFIF streams).
    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Horizontal sampling factor, from the high nibble of the packed
    /// sampling byte.
    #[inline]
    pub fn horizontal_sampling(&self) -> u8 {
        self.sampling >> 4
    }

    /// Vertical sampling factor, from the low nibble of the packed sampling
    /// byte.
    #[inline]
    pub fn vertical_sampling(&self) -> u8 {
        self.sampling & 0xF
    }

    /// Quantization-table selector for this component.
    #[inline]
    pub fn quantization_table(&self) -> u8 {
        self.quantization_table
    }
}

impl fmt::Debug for FrameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameComponent")
            .field("id", &self.id)
            .field("horizontal_sampling", &self.horizontal_sampling())
            .field("vertical_sampling", &self.vertical_sampling())
            .field("quantization_table", &self.quantization_table)
            .finish()
    }
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
struct HuffmanTableHeader {
    info: u8,
    counts: [u8; 16],
}

impl HuffmanTableHeader {
    fn symbol_count(&self) -> usize {
        self.counts.iter().map(|&c| usize::from(c)).sum()
    }
}

/// A Huffman table definition.
pub struct HuffmanTableInfo<'a> {
    header: &'a HuffmanTableHeader,
    symbols: &'a [u8],
}

impl<'a> HuffmanTableInfo<'a> {
    /// The table class, from bit 4 of the info byte.
    #[inline]
    pub fn class(&self) -> TableClass {
        if self.header.info & 0x10 != 0 {
            TableClass::Ac
        } else {
            TableClass::Dc
        }
    }

    /// The destination id (0-3), from the low nibble of the info byte.
    #[inline]
    pub fn table_id(&self) -> u8 {
        self.header.info & 0xF
    }

    /// The number of codes of each bit length 1..=16.
    #[inline]
    pub fn counts(&self) -> &[u8; 16] {
        &self.header.counts
    }

    /// The symbol values, ordered by increasing code length. Always exactly
    /// as many as the counts sum to.
    #[inline]
    pub fn symbols(&self) -> &'a [u8] {
        self.symbols
    }
}

impl<'a> fmt::Debug for HuffmanTableInfo<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuffmanTableInfo")
            .field("class", &self.class())
            .field("table_id", &self.table_id())
            .field("counts", &self.counts())
            .field("symbols", &self.symbols)
            .finish()
    }
}

/// Whether a Huffman table codes DC or AC coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableClass {
    Dc,
    Ac,
}
