//! vbxr - stereo VR host for Virtual Boy emulator cores.
//!
//! Runs the host tick loop against the headless session backend. Platform
//! builds swap in the real XR session, draw surface, audio device, and
//! emulator core behind the same seams.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use vbxr::app::{App, CountingPicker, NullRenderTarget, SettingsStore};
use vbxr::audio::NullAudioOutput;
use vbxr::clock::SystemClock;
use vbxr::emulator::{EmulatorCore, NullCore, ScriptedCore};
use vbxr::vr::depth::{DepthMeshData, DepthReconstructor};
use vbxr::vr::mapping::MappingEvaluator;
use vbxr::vr::session::{HeadlessSession, RecordingSurface};
use vbxr::vr::world_mesh::WorldMeshBuilder;

#[derive(Parser, Debug)]
#[command(name = "vbxr", about = "Stereo VR host for Virtual Boy emulator cores")]
struct Cli {
    /// ROM file to load at startup
    #[arg(long)]
    rom: Option<String>,

    /// Drive the pipeline with the built-in synthetic test core
    #[arg(long)]
    demo: bool,

    /// Exit after N ticks (headless testing)
    #[arg(long)]
    exit_after: Option<u64>,

    /// Presentation settings file
    #[arg(long, default_value = "presentation_settings.cfg")]
    settings_file: PathBuf,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

/// Settings persisted as a small text file next to the binary.
struct FileSettingsStore {
    path: PathBuf,
}

impl SettingsStore for FileSettingsStore {
    fn load(&mut self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }

    fn save(&mut self, text: &str) {
        if let Err(e) = std::fs::write(&self.path, text) {
            warn!("failed to save presentation settings to {:?}: {e}", self.path);
        }
    }
}

fn run_app<C: EmulatorCore>(core: C, cli: &Cli, candidates: Vec<String>) {
    let settings = FileSettingsStore {
        path: cli.settings_file.clone(),
    };
    let mut app = App::new(
        core,
        Box::new(HeadlessSession::new()),
        Box::new(RecordingSurface::new()),
        Box::new(NullRenderTarget::new()),
        Box::new(NullAudioOutput::new()),
        Box::new(CountingPicker::new()),
        Box::new(settings),
        Arc::new(SystemClock),
    )
    .with_rom_candidates(candidates);

    app.run(cli.exit_after);

    let debug = app.renderer().debug_state();
    let used_layer_rendering = debug.used_layer_rendering;
    let used_depth_fallback = debug.used_depth_fallback;
    let used_classic = debug.used_classic;
    let head_origin_set = debug.head_origin_set;
    info!(
        "final frame state: layered={} fallback={} classic={} anchored_origin={}",
        used_layer_rendering, used_depth_fallback, used_classic, head_origin_set
    );
    app.shutdown();
}

/// One-shot reconstruction diagnostics over the synthetic core's metadata:
/// runs both reconstruction paths and logs the resulting mesh shapes.
fn demo_reconstruction_report() {
    let mut core = ScriptedCore::new();
    core.initialize();
    if !core.load_rom_from_bytes(&[0u8; 16], "demo.vb") {
        return;
    }
    core.run_frame();

    let Some(meta) = core.metadata() else {
        return;
    };

    let reconstructor = DepthReconstructor::new();
    let eye_width = meta.width / 2;

    let mut direct = DepthMeshData::default();
    let ok = reconstructor.build_mesh(
        meta.disparity,
        meta.width,
        meta.height,
        0,
        eye_width,
        meta.height,
        0.0,
        0.5,
        &mut direct,
    );
    info!(
        "direct depth mesh: ok={} grid={}x{} vertices={} indices={}",
        ok,
        direct.grid_columns,
        direct.grid_rows,
        direct.vertices.len() / 5,
        direct.indices.len()
    );

    let mapping = MappingEvaluator::bind(
        meta.source_x,
        meta.source_y,
        meta.width,
        meta.height,
        eye_width,
        meta.height,
    );
    let mut stereo = [DepthMeshData::default(), DepthMeshData::default()];
    let ok = WorldMeshBuilder::build_stereo_meshes(&mapping, &reconstructor, &mut stereo);
    info!(
        "correspondence mesh: ok={} grid={}x{} vertices={}",
        ok,
        stereo[0].grid_columns,
        stereo[0].grid_rows,
        stereo[0].vertices.len() / 5
    );
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("vbxr {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vbxr=info".into()),
        )
        .init();

    info!("vbxr v{} starting", env!("CARGO_PKG_VERSION"));

    let mut candidates: Vec<String> = Vec::new();
    if let Some(rom) = &cli.rom {
        candidates.push(rom.clone());
    }

    if cli.demo {
        demo_reconstruction_report();
        if candidates.is_empty() {
            candidates.push("demo.vb".to_string());
        }
        let mut core = ScriptedCore::new();
        core.initialize();
        run_app(core, &cli, candidates);
    } else {
        candidates.push("rom.vb".to_string());
        candidates.push("test.vb".to_string());
        run_app(NullCore::new(), &cli, candidates);
    }

    Ok(())
}
