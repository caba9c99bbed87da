use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tileworld::{
    load_world_config, resolve_app_paths, AppPaths, ConfigError, DrawParams, Drawable,
    FsTileStore, JsonSaveFile, MaterialId, MeshId, ModelData, ModelLibrary, Position,
    RenderBackend, SaveError, SaveRecord, SaveStore, SharedTileMap, Slot, StartupError, TileMap,
    TileMapError, TileName, TileStore, Vector,
};
use tracing::{debug, error, info, warn};

use super::bootstrap::{AppWiring, RunConfig};
use super::metrics::{MetricsHandle, RateAccumulator};
use super::walk::Walker;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to load world config: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to open tile map: {0}")]
    Map(#[from] TileMapError),
    #[error("save game failed: {0}")]
    Save(#[from] SaveError),
    #[error("failed to spawn {name} thread: {source}")]
    SpawnThread {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunSummary {
    pub(crate) ticks: u64,
    pub(crate) frames: u64,
    pub(crate) draw_calls: u64,
    pub(crate) tiles_created: u32,
    pub(crate) final_tile: String,
    pub(crate) final_position: Position,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let metrics = MetricsHandle::default();
    let result = resolve_app_paths()
        .map_err(AppError::from)
        .and_then(|paths| {
            info!(
                root = %paths.root.display(),
                tiles_dir = %paths.tiles_dir.display(),
                saves_dir = %paths.saves_dir.display(),
                config_path = %paths.config_path.display(),
                "startup"
            );
            run_world(&paths, &app.config, &metrics)
        });

    match result {
        Ok(summary) => {
            let rates = metrics.snapshot();
            info!(
                ticks = summary.ticks,
                frames = summary.frames,
                draw_calls = summary.draw_calls,
                tiles_created = summary.tiles_created,
                tile = summary.final_tile.as_str(),
                tps = rates.tps,
                tick_time_ms = rates.tick_time_ms,
                fps = rates.fps,
                frame_time_ms = rates.frame_time_ms,
                "shutdown"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "run_failed");
            ExitCode::FAILURE
        }
    }
}

/// Opens the world under `paths`, walks the scripted route on an update
/// thread while a render thread draws the window, then saves.
pub(crate) fn run_world(
    paths: &AppPaths,
    config: &RunConfig,
    metrics: &MetricsHandle,
) -> Result<RunSummary, AppError> {
    let world_config = load_world_config(&paths.config_path)?;
    let store: Arc<dyn TileStore> = Arc::new(FsTileStore::new(paths.tiles_dir.clone()));
    let save_file = JsonSaveFile::new(paths.save_path());

    let resume = save_file.load()?.and_then(|record| {
        TileName::parse(&record.current_tile).map(|name| (name, record.player_offset()))
    });
    let (center, mut position) = match resume {
        Some((name, offset)) => {
            info!(tile = %name, x = offset.x, z = offset.z, "save_loaded");
            (name, offset)
        }
        None => {
            let start = world_config.start_tile_name();
            info!(tile = %start, "save_missing_starting_fresh");
            (start, Position::ORIGIN)
        }
    };

    let map = TileMap::open(&world_config, store, center)?;
    if map.slot_at(position) != Some(Slot::CENTER) {
        warn!(
            x = position.x,
            z = position.z,
            "saved_position_outside_center_tile; resetting to tile center"
        );
        position = Position::ORIGIN;
    }
    let shared = SharedTileMap::new(map);
    let running = Arc::new(AtomicBool::new(true));

    let render_handle = spawn_named("render", {
        let shared = shared.clone();
        let running = Arc::clone(&running);
        let metrics = metrics.clone();
        let render_fps = config.render_fps;
        let interval = config.metrics_log_interval;
        move || render_loop(&shared, &running, &metrics, render_fps, interval)
    })?;
    let update_handle = spawn_named("update", {
        let shared = shared.clone();
        let metrics = metrics.clone();
        let config = config.clone();
        move || update_loop(&shared, &config, position, &metrics)
    });

    let update_result = update_handle.and_then(|handle| join_named("update", handle));
    running.store(false, Ordering::Release);
    let render_stats = join_named("render", render_handle)?;
    let update_stats = update_result?;

    let record = shared.update(|map| {
        if map.has_pending_writes() {
            warn!("tile writes still pending at shutdown");
        }
        SaveRecord::new(map.center_name().to_string(), update_stats.position)
    });
    save_file.store(&record)?;
    info!(
        path = %save_file.path().display(),
        tile = record.current_tile.as_str(),
        "save_written"
    );

    Ok(RunSummary {
        ticks: update_stats.ticks,
        frames: render_stats.frames,
        draw_calls: render_stats.draw_calls,
        tiles_created: update_stats.tiles_created,
        final_tile: record.current_tile,
        final_position: update_stats.position,
    })
}

fn spawn_named<T, F>(name: &'static str, body: F) -> Result<JoinHandle<T>, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| AppError::SpawnThread { name, source })
}

fn join_named<T>(name: &'static str, handle: JoinHandle<T>) -> Result<T, AppError> {
    handle.join().map_err(|_| AppError::ThreadPanicked(name))
}

#[derive(Debug, Clone, Copy)]
struct UpdateStats {
    ticks: u64,
    tiles_created: u32,
    position: Position,
}

fn update_loop(
    shared: &SharedTileMap,
    config: &RunConfig,
    start: Position,
    metrics: &MetricsHandle,
) -> UpdateStats {
    let fixed_dt = Duration::from_secs_f64(1.0 / config.target_tps.max(1) as f64);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let step_distance = config.speed * fixed_dt.as_secs_f32();

    let mut walker = Walker::new(config.walk.clone());
    let mut explorer = Explorer::new(start);
    let mut ticks = 0u64;
    let mut accumulator = Duration::ZERO;
    let mut last_instant = Instant::now();
    let mut rates = RateAccumulator::new(config.metrics_log_interval);
    let reached_tick_limit = |ticks: u64| config.max_ticks.is_some_and(|max| ticks >= max);

    info!(
        target_tps = config.target_tps,
        step_distance,
        max_ticks_per_frame,
        "update_loop_started"
    );
    'run: loop {
        let now = Instant::now();
        let frame_dt = clamp_frame_delta(now.saturating_duration_since(last_instant), max_frame_delta);
        last_instant = now;
        accumulator = accumulator.saturating_add(frame_dt);

        let plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        accumulator = plan.remaining_accumulator;
        if plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }

        for _ in 0..plan.ticks_to_run {
            if walker.is_finished() || reached_tick_limit(ticks) {
                break 'run;
            }
            let tick_start = Instant::now();
            shared.update(|map| explorer.tick(map, &mut walker, step_distance));
            ticks += 1;
            rates.record(tick_start.elapsed());
        }

        if let Some(sample) = rates.maybe_sample(Instant::now()) {
            metrics.publish_ticks(sample);
            info!(
                tps = sample.per_second,
                tick_time_ms = sample.mean_busy_ms,
                x = explorer.position.x,
                z = explorer.position.z,
                "update_metrics"
            );
        }
        if walker.is_finished() || reached_tick_limit(ticks) {
            break;
        }
        thread::sleep(fixed_dt.saturating_sub(now.elapsed()));
    }

    info!(ticks, tiles_created = explorer.tiles_created, "update_loop_finished");
    UpdateStats {
        ticks,
        tiles_created: explorer.tiles_created,
        position: explorer.position,
    }
}

/// The scripted player: moves one step per tick and opens the cell ahead
/// when the way is blocked by a cell that has not been brought to life.
#[derive(Debug)]
struct Explorer {
    position: Position,
    tiles_created: u32,
}

impl Explorer {
    fn new(position: Position) -> Self {
        Self {
            position,
            tiles_created: 0,
        }
    }

    fn tick(&mut self, map: &mut TileMap, walker: &mut Walker, step_distance: f32) {
        let Some((heading, distance)) = walker.next_step(step_distance) else {
            return;
        };
        let direction = heading.vector();
        let outcome = map.move_player(self.position, direction, distance);
        self.position = outcome.local;
        if outcome.slot != Slot::CENTER {
            debug!(tile = %map.center_name(), "explorer_entered_tile");
        }
        if outcome.blocked {
            self.open_cell_ahead(map, walker, direction);
        }
    }

    fn open_cell_ahead(&mut self, map: &mut TileMap, walker: &mut Walker, direction: Vector) {
        let ahead = self.position + direction.normalized() * (map.tile_size() * 0.25);
        match map.bring_to_life(ahead) {
            Ok(Some(slot)) => {
                self.tiles_created += 1;
                info!(tile = %map.cell_name(slot), "explorer_opened_tile");
            }
            Ok(None) => {
                warn!(
                    x = self.position.x,
                    z = self.position.z,
                    "explorer_blocked; skipping rest of leg"
                );
                walker.abandon_leg();
            }
            Err(error) => {
                warn!(error = %error, "explorer_open_tile_failed; skipping rest of leg");
                walker.abandon_leg();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RenderStats {
    frames: u64,
    draw_calls: u64,
}

fn render_loop(
    shared: &SharedTileMap,
    running: &AtomicBool,
    metrics: &MetricsHandle,
    render_fps: u32,
    metrics_interval: Duration,
) -> RenderStats {
    let frame_target = Duration::from_secs_f64(1.0 / render_fps.max(1) as f64);
    let models = PlaceholderModels::default();
    let mut backend = CountingBackend::default();
    let params = DrawParams {
        light_position: Position::new(0.0, 50.0, 0.0),
        ..DrawParams::default()
    };
    let mut stats = RenderStats::default();
    let mut rates = RateAccumulator::new(metrics_interval);

    while running.load(Ordering::Acquire) {
        let frame_start = Instant::now();
        shared.render(|map| map.draw(&params, &models, &mut backend));
        stats.frames += 1;
        let busy = frame_start.elapsed();
        rates.record(busy);

        if let Some(sample) = rates.maybe_sample(Instant::now()) {
            metrics.publish_frames(sample);
            info!(
                fps = sample.per_second,
                frame_time_ms = sample.mean_busy_ms,
                draw_calls = backend.draw_calls,
                models = models.len(),
                "render_metrics"
            );
        }

        let cap_sleep = compute_cap_sleep(busy, frame_target);
        if cap_sleep > Duration::ZERO {
            thread::sleep(cap_sleep);
        }
    }

    stats.draw_calls = backend.draw_calls;
    stats
}

/// Hands out a stand-in model for every reference; real mesh loading lives
/// with the graphics collaborator.
#[derive(Debug, Default)]
struct PlaceholderModels {
    cache: RefCell<HashMap<String, Arc<ModelData>>>,
}

impl PlaceholderModels {
    fn len(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl ModelLibrary for PlaceholderModels {
    fn model_data(&self, name: &str) -> Option<Arc<ModelData>> {
        let mut cache = self.cache.borrow_mut();
        let next_mesh = MeshId(cache.len() as u32);
        let model = cache.entry(name.to_string()).or_insert_with(|| {
            Arc::new(ModelData {
                name: name.to_string(),
                mesh: next_mesh,
                material: MaterialId(0),
            })
        });
        Some(Arc::clone(model))
    }
}

#[derive(Debug, Default)]
struct CountingBackend {
    draw_calls: u64,
}

impl RenderBackend for CountingBackend {
    fn draw_model(
        &mut self,
        _model: &ModelData,
        _world_position: Position,
        _y_rotation_degrees: f32,
        _params: &DrawParams,
    ) {
        self.draw_calls += 1;
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_cap_sleep(elapsed: Duration, target: Duration) -> Duration {
    target.saturating_sub(elapsed)
}
