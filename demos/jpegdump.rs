use std::{env, fs};

use anyhow::bail;
use jfif_probe::{SegmentInfo, Termination};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = env::args().skip(1).collect::<Vec<_>>();
    let [path] = &*args else {
        bail!("usage: jpegdump <file.jpg>");
    };

    let bytes = fs::read(path)?;
    let result = jfif_probe::parse(&bytes)?;

    for segment in result.segments() {
        print!(
            "{:06x}  ff {:02x}  ",
            segment.offset(),
            segment.marker().code()
        );
        match segment.info() {
            SegmentInfo::App0(app) => {
                let (major, minor) = app.version();
                println!(
                    "APP0  identifier \"{}\", version {major}.{minor}, unit {:?}, density {}x{}, thumbnail {}x{}",
                    app.identifier().escape_ascii(),
                    app.unit(),
                    app.density_x(),
                    app.density_y(),
                    app.thumbnail_width(),
                    app.thumbnail_height(),
                );
            }
            SegmentInfo::Dqt(dqt) => {
                println!(
                    "DQT   destination {:?}, precision {:?}",
                    dqt.destination(),
                    dqt.precision()
                );
                for row in dqt.entries().chunks_exact(8) {
                    let row = row
                        .iter()
                        .map(|v| format!("{v:3}"))
                        .collect::<Vec<_>>()
                        .join(" ");
                    println!("              {row}");
                }
            }
            SegmentInfo::Sof0(sof) => {
                println!(
                    "SOF0  {}x{}, {} bits per sample",
                    sof.width(),
                    sof.height(),
                    sof.precision()
                );
                for component in sof.components() {
                    println!(
                        "              component {}, sampling {}x{}, qtable {}",
                        component.id(),
                        component.horizontal_sampling(),
                        component.vertical_sampling(),
                        component.quantization_table(),
                    );
                }
            }
            SegmentInfo::Dht(dht) => {
                println!(
                    "DHT   class {:?}, id {}, {} symbols",
                    dht.class(),
                    dht.table_id(),
                    dht.symbols().len()
                );
            }
            other => println!("{other:?}"),
        }
    }

    match result.termination() {
        Termination::EndOfImage => println!("end of image"),
        Termination::ScanData => println!("entropy-coded scan data follows, not parsed"),
    }

    Ok(())
}
