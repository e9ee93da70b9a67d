//! Headless render of a scene through the vector path, with optional
//! comparison against a golden image.

use anyhow::{anyhow, Context};
use clap::Parser;
use image::{ImageReader, RgbaImage};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tiny_skia::Pixmap;
use veneer_engine::fetch::{HttpFetcher, TextureFetcher};
use veneer_engine::overlay::load_textures;
use veneer_engine::transform::{PhotoSpace, TransformTarget};
use veneer_engine::utils::Size;
use veneer_engine::{
    init_logger, RenderConfig, RenderMode, Scene, TextureCache, TransformBridge, VectorOverlay,
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    scene: String,
    /// Output PNG.
    #[arg(short, long, default_value = "snapshots/actual/scene.png")]
    out: PathBuf,
    #[arg(long)]
    config: Option<String>,
    /// Canvas size; defaults to the photo's natural size.
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Golden image to compare against; written from the output when missing.
    #[arg(long)]
    golden: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    tolerance: u8,
}

fn to_image(canvas: &Pixmap) -> anyhow::Result<RgbaImage> {
    let rgba: Vec<u8> = canvas
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    RgbaImage::from_raw(canvas.width(), canvas.height(), rgba)
        .ok_or_else(|| anyhow!("canvas buffer has the wrong length"))
}

fn compare_with_tolerance(a_path: &Path, b_path: &Path, tolerance: u8) -> anyhow::Result<bool> {
    let a = ImageReader::open(a_path)?.decode()?.to_rgba8();
    let b = ImageReader::open(b_path)?.decode()?.to_rgba8();

    if a.dimensions() != b.dimensions() {
        return Ok(false);
    }
    Ok(a.pixels().zip(b.pixels()).all(|(pa, pb)| {
        let da = pa.0;
        let db = pb.0;
        (0..4).all(|i| da[i].abs_diff(db[i]) <= tolerance)
    }))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => RenderConfig::load(path)?,
        None => RenderConfig::default(),
    };
    init_logger(config.log_filter.as_deref());
    if config.mode != RenderMode::Vector {
        log::info!("headless render uses the vector path; ignoring mode {:?}", config.mode);
        config.mode = RenderMode::Vector;
    }

    let scene = Scene::load(&args.scene)?;
    let materials = scene.material_library();
    let fetcher: Rc<dyn TextureFetcher> = Rc::new(HttpFetcher::new());
    let cache = TextureCache::new(fetcher, &config.texture);

    let photo = cache
        .load(&scene.photo.url)
        .await
        .with_context(|| format!("loading photo {}", scene.photo.url))?;
    for err in load_textures(&scene.masks, &materials, &cache).await {
        log::warn!("{err}");
    }

    let width = args.width.unwrap_or(photo.width());
    let height = args.height.unwrap_or(photo.height());
    let mut canvas =
        Pixmap::new(width, height).ok_or_else(|| anyhow!("invalid canvas {width}x{height}"))?;
    let photo_pixmap = photo
        .to_pixmap()
        .ok_or_else(|| anyhow!("photo {} has no pixels", scene.photo.url))?;

    let mut bridge = TransformBridge::new(
        PhotoSpace::new(
            Size::new(photo.width() as f32, photo.height() as f32),
            Size::new(width as f32, height as f32),
        ),
        config.fit,
    );
    let mut overlay = VectorOverlay::new(config.clone());
    if let Some(update) = bridge.flush() {
        overlay.apply_transform(update.transform);
    }

    let report = overlay.render_frame(
        &mut canvas,
        Some(&photo_pixmap),
        &scene.masks,
        &materials,
        &cache,
        scene.usable_calibration(),
    );
    log::info!(
        "filled {}, diagnostic {}, outlined {}",
        report.filled.len(),
        report.diagnostic.len(),
        report.outlined.len()
    );

    if let Some(dir) = args.out.parent() {
        std::fs::create_dir_all(dir)?;
    }
    to_image(&canvas)?.save(&args.out)?;
    println!("wrote {}", args.out.display());

    let Some(golden) = &args.golden else {
        return Ok(());
    };
    if !golden.exists() {
        std::fs::copy(&args.out, golden)?;
        println!("golden created at {}", golden.display());
        return Ok(());
    }
    if compare_with_tolerance(&args.out, golden, args.tolerance)? {
        println!("snapshot OK for {}", golden.display());
        Ok(())
    } else {
        Err(anyhow!("snapshot mismatch for {}", golden.display()))
    }
}
