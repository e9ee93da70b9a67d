use clap::Parser;
use veneer_engine::app::{run_viewer, WindowConfig};
use veneer_engine::{init_logger, RenderConfig, RenderMode, Scene};

/// Interactive viewport for a scene file.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Scene JSON (photo, calibration, materials, masks).
    scene: String,
    /// Render configuration (TOML).
    #[arg(long)]
    config: Option<String>,
    #[arg(long, value_enum)]
    mode: Option<RenderMode>,
    #[arg(long)]
    debug_overlay: bool,
    #[arg(long, default_value_t = 1280)]
    width: u32,
    #[arg(long, default_value_t = 800)]
    height: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RenderConfig::load(path)?,
        None => RenderConfig::default(),
    };
    init_logger(config.log_filter.as_deref());
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    config.debug_overlay |= args.debug_overlay;

    let scene = Scene::load(&args.scene)?;
    log::info!(
        "{}: {} masks, {} materials, mode {:?}",
        args.scene,
        scene.masks.len(),
        scene.materials.len(),
        config.mode
    );

    let window = WindowConfig {
        title: format!("Veneer - {}", args.scene),
        width: args.width,
        height: args.height,
    };
    run_viewer(window, config, scene)
}
