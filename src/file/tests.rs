use std::fmt::Write;

use expect_test::{expect, Expect};

use crate::error::{ErrorKind, Result};

use super::*;

fn dump(jpeg: &[u8]) -> String {
    fn dump_impl(jpeg: &[u8], out: &mut String) -> Result<()> {
        let result = parse(jpeg)?;

        for segment in result.segments() {
            write!(
                out,
                "{:04X} [FF {:02X}] ",
                segment.offset(),
                segment.marker().code(),
            )
            .unwrap();

            match segment.info() {
                SegmentInfo::App0(app) => {
                    let (major, minor) = app.version();
                    writeln!(
                        out,
                        "APP0 {{ identifier: \"{}\", version: {major}.{minor}, unit: {:?}, density: {}x{}, thumbnail: {}x{} }}",
                        app.identifier().escape_ascii(),
                        app.unit(),
                        app.density_x(),
                        app.density_y(),
                        app.thumbnail_width(),
                        app.thumbnail_height(),
                    )
                    .unwrap();
                }
                SegmentInfo::Dqt(dqt) => {
                    let entries = dqt.entries();
                    writeln!(
                        out,
                        "DQT {{ destination: {:?}, precision: {:?}, entries: [{} .. {}; 64] }}",
                        dqt.destination(),
                        dqt.precision(),
                        entries[0],
                        entries[63],
                    )
                    .unwrap();
                }
                SegmentInfo::Sof0(sof) => {
                    write!(
                        out,
                        "SOF0 {{ precision: {}, size: {}x{}, components: [",
                        sof.precision(),
                        sof.width(),
                        sof.height(),
                    )
                    .unwrap();
                    for (i, component) in sof.components().iter().enumerate() {
                        if i != 0 {
                            write!(out, ", ").unwrap();
                        }
                        write!(
                            out,
                            "{} {}x{} q{}",
                            component.id(),
                            component.horizontal_sampling(),
                            component.vertical_sampling(),
                            component.quantization_table(),
                        )
                        .unwrap();
                    }
                    writeln!(out, "] }}").unwrap();
                }
                SegmentInfo::Dht(dht) => {
                    writeln!(
                        out,
                        "DHT {{ class: {:?}, id: {}, counts: {:?}, symbols: {:?} }}",
                        dht.class(),
                        dht.table_id(),
                        dht.counts(),
                        dht.symbols(),
                    )
                    .unwrap();
                }
            }
        }

        writeln!(out, "=> {:?}", result.termination()).unwrap();
        Ok(())
    }

    let mut out = String::new();
    if let Err(e) = dump_impl(jpeg, &mut out) {
        writeln!(out, "error: {e}").unwrap();
    }

    out
}

fn check(jpeg: &[u8], expect: Expect) {
    expect.assert_eq(&dump(jpeg));
}

fn jfif_app0() -> Vec<u8> {
    vec![
        0xFF, 0xE0, // APP0
        0x00, 0x10, // length 16
        b'J', b'F', b'I', b'F', 0x00, // identifier
        0x01, 0x01, // version 1.1
        0x00, // density unit: aspect ratio only
        0x00, 0x01, 0x00, 0x01, // 1x1 density
        0x00, 0x00, // no thumbnail
    ]
}

fn dqt_segment(info: u8) -> Vec<u8> {
    let mut seg = vec![
        0xFF, 0xDB, // DQT
        0x00, 0x43, // length 67
        info,
    ];
    seg.extend(1..=64u8);
    seg
}

fn baseline_stream() -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend(jfif_app0());
    jpeg.extend(dqt_segment(0x00));
    jpeg.extend_from_slice(&[
        0xFF, 0xC0, // SOF0
        0x00, 0x11, // length 17
        0x08, // sample precision
        0x00, 0x10, 0x00, 0x10, // 16x16
        0x03, // three components
        0x01, 0x22, 0x00, // Y, 2x2 sampling, qtable 0
        0x02, 0x11, 0x01, // Cb, 1x1 sampling, qtable 1
        0x03, 0x11, 0x01, // Cr, 1x1 sampling, qtable 1
    ]);
    jpeg.extend_from_slice(&[
        0xFF, 0xC4, // DHT
        0x00, 0x15, // length 21
        0x00, // DC table 0
        0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // counts, lengths 1-8
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // counts, lengths 9-16
        0x00, 0x01, // symbols
    ]);
    jpeg.extend_from_slice(&[
        0xFF, 0xDA, // SOS
        0x00, 0x0C, // length 12
        0x03, // three components
        0x01, 0x00, 0x02, 0x11, 0x03, 0x11, // table selectors
        0x00, 0x3F, 0x00, // spectral selection and approximation
        0x12, 0x34, 0xFF, 0x00, 0x56, 0x78, // entropy-coded data, stuffed FF 00 included
    ]);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

#[test]
fn empty() {
    check(
        &[0xFF],
        expect![[r#"
            error: reached end of data while reading SOI marker
        "#]],
    );
    check(
        &[0xFF, 0xD8 /* SOI */],
        expect![[r#"
            error: reached end of data while reading marker prefix
        "#]],
    );
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            => EndOfImage
        "#]],
    );
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xD9, // EOI
            0xFF, // trailing
        ],
        expect![[r#"
            => EndOfImage
        "#]],
    );
}

#[test]
fn not_a_jpeg() {
    check(
        b"PNG\r\n",
        expect![[r#"
            error: JPEG image does not start with SOI marker
        "#]],
    );
}

#[test]
fn minimal_jfif() {
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend(jfif_app0());
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    check(
        &jpeg,
        expect![[r#"
            0002 [FF E0] APP0 { identifier: "JFIF\x00", version: 1.1, unit: Some(AspectRatio), density: 1x1, thumbnail: 0x0 }
            => EndOfImage
        "#]],
    );
}

#[test]
fn truncated_app0() {
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend(jfif_app0());
    jpeg.truncate(9); // cut mid-identifier
    check(
        &jpeg,
        expect![[r#"
            error: reached end of data while reading APP0 segment
        "#]],
    );
}

#[test]
fn unknown_marker_skipped() {
    let mut jpeg = vec![0xFF, 0xD8];
    jpeg.extend(jfif_app0());
    jpeg.extend_from_slice(&[
        0xFF, 0xEC, // APP12, not recognized
        0x00, 0x04, // length 4
        0xAA, 0xBB, // payload
    ]);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    check(
        &jpeg,
        expect![[r#"
            0002 [FF E0] APP0 { identifier: "JFIF\x00", version: 1.1, unit: Some(AspectRatio), density: 1x1, thumbnail: 0x0 }
            => EndOfImage
        "#]],
    );
}

#[test]
fn full_baseline() {
    check(
        &baseline_stream(),
        expect![[r#"
            0002 [FF E0] APP0 { identifier: "JFIF\x00", version: 1.1, unit: Some(AspectRatio), density: 1x1, thumbnail: 0x0 }
            0014 [FF DB] DQT { destination: Some(Luminance), precision: Some(EightBit), entries: [1 .. 64; 64] }
            0059 [FF C0] SOF0 { precision: 8, size: 16x16, components: [1 2x2 q0, 2 1x1 q1, 3 1x1 q1] }
            006C [FF C4] DHT { class: Dc, id: 0, counts: [1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], symbols: [0, 1] }
            => ScanData
        "#]],
    );
}

#[test]
fn dht_sum_over_256() {
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xC4, // DHT
            0x00, 0x13, // length 19
            0x00, // DC table 0
            0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // counts summing to 510
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            error: Huffman table declares 510 symbols, limit is 256
        "#]],
    );
}

#[test]
fn dht_declares_more_symbols_than_remain() {
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xC4, // DHT
            0x00, 0x15, // length 21, room for 2 symbol bytes
            0x00, // DC table 0
            0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // counts summing to 4
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0xAA, 0xBB, // 2 symbol bytes
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            error: Huffman table declares 4 symbols, but only 2 bytes remain in the segment
        "#]],
    );
}

#[test]
fn invalid_marker_prefix() {
    check(
        &[
            0xFF, 0xD8, // SOI
            0x12, 0x34, // garbage
        ],
        expect![[r#"
            error: expected ff marker prefix, found 12
        "#]],
    );
}

#[test]
fn undersized_length() {
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xE0, // APP0
            0x00, 0x01, // length below the minimum of 2
        ],
        expect![[r#"
            error: segment declares length 1, minimum is 2
        "#]],
    );
}

#[test]
fn redundant_soi_is_tolerated() {
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xD8, // redundant SOI
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            => EndOfImage
        "#]],
    );
}

#[test]
fn skip_is_exact() {
    // A correct skip of the 6-byte unknown segment lands exactly on the EOI
    // marker.
    let ok = [
        0xFF, 0xD8, // SOI
        0xFF, 0xEC, 0x00, 0x04, 0xAA, 0xBB, // unknown segment
        0xFF, 0xD9, // EOI
    ];
    let result = parse(&ok).unwrap();
    assert!(result.segments().is_empty());
    assert_eq!(result.termination(), Termination::EndOfImage);

    // Overstating the length by one makes the scanner land mid-marker.
    let overshoot = [
        0xFF, 0xD8, // SOI
        0xFF, 0xEC, 0x00, 0x05, 0xAA, 0xBB, // unknown segment, length off by one
        0xFF, 0xD9, // EOI
    ];
    assert_eq!(
        parse(&overshoot).unwrap_err().kind(),
        ErrorKind::InvalidMarker
    );
}

#[test]
fn sos_jumps_to_end_of_stream() {
    let bytes = [
        0xFF, 0xD8, // SOI
        0xFF, 0xDA, 0x00, 0x08, // SOS, length 8
        0x01, 0x01, 0x00, // one component
        0x00, 0x3F, 0x00, // spectral selection and approximation
        0x12, 0xFF, 0x00, 0x34, // entropy-coded data with a stuffed FF 00
        0xFF, 0xD9, // EOI
    ];
    let mut parser = JpegParser::new(&bytes).unwrap();
    assert!(parser.next_segment().unwrap().is_none());
    assert_eq!(parser.termination(), Some(Termination::ScanData));
    assert_eq!(parser.remaining(), &[0xFF, 0xD9]);
}

#[test]
fn trailing_bytes_after_eoi() {
    let mut parser = JpegParser::new(&[0xFF, 0xD8, 0xFF, 0xD9, 0xAB]).unwrap();
    assert!(parser.next_segment().unwrap().is_none());
    assert_eq!(parser.termination(), Some(Termination::EndOfImage));
    assert_eq!(parser.remaining(), &[0xAB]);
}

#[test]
fn error_kinds() {
    assert_eq!(parse(b"BM\x00\x00").unwrap_err().kind(), ErrorKind::NotAJpeg);
    assert_eq!(
        parse(&[0xFF, 0xD8, 0x12, 0x34]).unwrap_err().kind(),
        ErrorKind::InvalidMarker
    );
    assert_eq!(
        parse(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J']).unwrap_err().kind(),
        ErrorKind::TruncatedInput
    );
    assert_eq!(
        parse(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x01]).unwrap_err().kind(),
        ErrorKind::MalformedSegment
    );
}

#[test]
fn app0_truncated_identifier() {
    let seg = [0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I'];
    assert_eq!(
        decode_app0(&seg).unwrap_err().kind(),
        ErrorKind::TruncatedInput
    );
}

#[test]
fn dqt_nibbles() {
    let seg = dqt_segment(0x11);
    let dqt = decode_dqt(&seg).unwrap();
    assert_eq!(dqt.destination(), Some(TableDestination::Chrominance));
    assert_eq!(dqt.precision(), Some(TablePrecision::SixteenBit));

    let mut entries = [0; 64];
    for (i, entry) in entries.iter_mut().enumerate() {
        *entry = i as u8 + 1;
    }
    assert_eq!(dqt.entries(), &entries);

    // Unmapped nibbles decode to nothing rather than failing.
    let seg = dqt_segment(0x2F);
    let dqt = decode_dqt(&seg).unwrap();
    assert_eq!(dqt.destination(), None);
    assert_eq!(dqt.precision(), None);
}

#[test]
fn sof0_component_count_is_authoritative() {
    // The declared length overshoots by 3 junk bytes; the component count
    // still bounds the descriptor list.
    let seg = [
        0xFF, 0xC0, 0x00, 0x14, // SOF0, length 20
        0x08, // sample precision
        0x00, 0x20, 0x00, 0x40, // 64x32
        0x02, // two components
        0x01, 0x21, 0x00, // Y, 2x1 sampling, qtable 0
        0x02, 0x11, 0x01, // Cb, 1x1 sampling, qtable 1
        0xAA, 0xBB, 0xCC, // junk padding inside the declared length
    ];
    let sof = decode_sof0(&seg).unwrap();
    assert_eq!(sof.height(), 32);
    assert_eq!(sof.width(), 64);
    assert_eq!(sof.components().len(), 2);
    assert_eq!(sof.components()[0].id(), 1);
    assert_eq!(sof.components()[0].horizontal_sampling(), 2);
    assert_eq!(sof.components()[0].vertical_sampling(), 1);
    assert_eq!(sof.components()[1].quantization_table(), 1);
}

#[test]
fn sof0_accepts_zero_dimensions() {
    let seg = [
        0xFF, 0xC0, 0x00, 0x0B, // SOF0, length 11
        0x08, // sample precision
        0x00, 0x00, 0x00, 0x00, // 0x0
        0x01, // one component
        0x01, 0x11, 0x00,
    ];
    let sof = decode_sof0(&seg).unwrap();
    assert_eq!(sof.height(), 0);
    assert_eq!(sof.width(), 0);
    assert_eq!(sof.components().len(), 1);
}

#[test]
fn huffman_symbol_count_is_derived() {
    let mut seg = vec![
        0xFF, 0xC4, 0x00, 0x18, // DHT, length 24
        0x00, // DC table 0
    ];
    seg.extend([0, 2, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    seg.extend([1, 2, 3, 4, 5]);
    let dht = decode_dht(&seg).unwrap();
    assert_eq!(
        dht.counts().iter().map(|&c| usize::from(c)).sum::<usize>(),
        dht.symbols().len()
    );
    assert_eq!(dht.symbols(), &[1, 2, 3, 4, 5][..]);
}

#[test]
fn dht_class_and_id() {
    let mut seg = vec![
        0xFF, 0xC4, 0x00, 0x13, // DHT, length 19
        0x12, // AC table 2
    ];
    seg.extend([0u8; 16]);
    let dht = decode_dht(&seg).unwrap();
    assert_eq!(dht.class(), TableClass::Ac);
    assert_eq!(dht.table_id(), 2);
    assert!(dht.symbols().is_empty());
}
