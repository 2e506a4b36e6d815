//! Crop every JPEG, PNG and WebP file in a directory to a 500x500 PNG.
//!
//! Usage:
//!   cargo run --example crop_directory -- <input-dir> <output-dir>
//!   FACECROP_MODEL=seeta_fd_frontal_v1.0.bin \
//!     cargo run --example crop_directory --features rustface -- <input-dir> <output-dir>
//!
//! Without the `rustface` feature every image gets a centered crop.
//! Set `RUST_LOG=facecrop=debug` for per-image logs.

use std::path::{Path, PathBuf};

use facecrop::{records_from, CropPipeline, FaceDetector, Progress, ProgressBar, SourceImage};
use tracing_subscriber::EnvFilter;

struct ConsoleProgress {
    max: usize,
}

impl ProgressBar for ConsoleProgress {
    fn set_max(&mut self, max: usize) {
        self.max = max;
    }

    fn set_value(&mut self, value: usize) {
        println!("  {value}/{}", self.max);
    }
}

fn read_sources(dir: &Path) -> std::io::Result<Vec<SourceImage>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let media_type = mime_guess::from_path(&path).first_or_octet_stream();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(SourceImage::new(name, media_type.essence_str(), std::fs::read(&path)?))
        })
        .collect()
}

#[cfg(feature = "rustface")]
fn detector() -> Box<dyn FaceDetector> {
    let model = std::env::var("FACECROP_MODEL").unwrap_or_else(|_| "seeta_fd_frontal_v1.0.bin".into());
    Box::new(facecrop::RustfaceDetector::from_model_path(&model).expect("failed to load model"))
}

#[cfg(not(feature = "rustface"))]
fn detector() -> Box<dyn FaceDetector> {
    use async_trait::async_trait;
    use facecrop::{DetectionOptions, FaceBounds, FaceCropError};

    struct NoDetector;

    #[async_trait(?Send)]
    impl FaceDetector for NoDetector {
        async fn detect(
            &self,
            _surface: &image::RgbaImage,
            _options: &DetectionOptions,
        ) -> Result<Vec<FaceBounds>, FaceCropError> {
            Ok(Vec::new())
        }
    }

    Box::new(NoDetector)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        eprintln!("usage: crop_directory <input-dir> <output-dir>");
        std::process::exit(2);
    };
    let output = PathBuf::from(output);
    std::fs::create_dir_all(&output).unwrap();

    let mut records = records_from(read_sources(Path::new(&input)).unwrap());
    println!("=== {} image(s) in {input} ===", records.len());

    let mut bar = ConsoleProgress { max: 0 };
    let report = CropPipeline::new(detector())
        .run(&mut records, &mut Progress::none().bar(&mut bar), |record| {
            let Some(crop) = record.crop.as_ref() else {
                return;
            };
            let path = output.join(&crop.name);
            match std::fs::write(&path, &crop.data) {
                Ok(()) => println!("  → {}", path.display()),
                Err(e) => eprintln!("  ✗ {}: {e}", path.display()),
            }
        })
        .await
        .unwrap();

    println!(
        "cropped {} of {} ({} on a face, {} centered, {} failed)",
        report.cropped, report.total, report.face_crops, report.fallback_crops, report.failed
    );
}
