//! Sector Sim entry point
//!
//! Headless demo: loads a level, joins one client and drives a scripted walk
//! through the server history with a fixed-timestep loop.

#[cfg(not(target_arch = "wasm32"))]
mod demo {
    use std::path::PathBuf;
    use std::process::ExitCode;

    use argh::FromArgs;

    use sector_sim::consts::*;
    use sector_sim::level::REFERENCE_LEVEL_JSON;
    use sector_sim::sim::{Buttons, ClientId, Command, InputPayload};
    use sector_sim::sync::History;
    use sector_sim::{Level, Snapshot, Tuning};

    /// Frame length the demo pretends the host renders at (ms)
    const FRAME_MS: f32 = 1000.0 / 30.0;

    const CLIENT: ClientId = ClientId(1);

    /// Run a scripted sector-sim session
    #[derive(Debug, FromArgs)]
    struct Args {
        /// level JSON to load (the bundled reference map by default)
        #[argh(option)]
        level: Option<PathBuf>,
        /// tuning JSON overriding the default constants
        #[argh(option)]
        tuning: Option<PathBuf>,
        /// number of ticks to simulate
        #[argh(option, default = "600")]
        ticks: u64,
        /// tick period in milliseconds
        #[argh(option, default = "TICK_PERIOD_MS")]
        period_ms: f32,
    }

    /// Input the scripted client sends for a tick
    fn scripted_input(clock: u64) -> InputPayload {
        let phase = clock % 240;
        let buttons = match phase {
            0..120 => Buttons::FORWARD,
            120..180 => Buttons::FORWARD | Buttons::RIGHT,
            180 => Buttons::USE,
            _ => Buttons::NONE,
        };
        InputPayload {
            yaw: if phase >= 200 { 0.05 } else { 0.0 },
            buttons,
            ..Default::default()
        }
    }

    fn load(args: &Args) -> Result<(Level, Tuning), Box<dyn std::error::Error>> {
        let level = match &args.level {
            Some(path) => Level::from_json(&std::fs::read_to_string(path)?)?,
            None => Level::from_json(REFERENCE_LEVEL_JSON)?,
        };
        let tuning = match &args.tuning {
            Some(path) => Tuning::load(path)?,
            None => Tuning::default(),
        };
        Ok((level, tuning))
    }

    pub fn run() -> ExitCode {
        let args: Args = argh::from_env();
        if args.period_ms.is_nan() || args.period_ms <= 0.0 {
            log::error!("tick period must be positive, got {}", args.period_ms);
            return ExitCode::FAILURE;
        }
        let (level, tuning) = match load(&args) {
            Ok(loaded) => loaded,
            Err(err) => {
                log::error!("failed to load: {}", err);
                return ExitCode::FAILURE;
            }
        };

        let mut history = History::new(Snapshot::initial(&level), HISTORY_CAPACITY).with_tuning(tuning);
        history.push_command(Command::join(CLIENT));

        let mut accumulator = 0.0;
        while history.latest().clock() < args.ticks {
            accumulator += FRAME_MS;

            let mut substeps = 0;
            while accumulator >= args.period_ms && substeps < MAX_SUBSTEPS && history.latest().clock() < args.ticks {
                let clock = history.next_clock();
                history.push_command(Command::input(CLIENT, clock, scripted_input(clock)));
                let snapshot = match history.advance(&level, args.period_ms) {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        log::error!("simulation stopped: {}", err);
                        return ExitCode::FAILURE;
                    }
                };
                if clock % 30 == 0 {
                    if let Some(player) = snapshot.player_entity(CLIENT) {
                        log::info!(
                            "tick {:>5} {} pos=({:.1}, {:.1}, {:.1}) state={:?} mutators={}",
                            clock,
                            player.polygon,
                            player.position.x,
                            player.position.y,
                            player.position.z,
                            player.state,
                            snapshot.mutators().len()
                        );
                    }
                }
                accumulator -= args.period_ms;
                substeps += 1;
            }
            // Drop time the substep cap could not absorb
            if substeps >= MAX_SUBSTEPS {
                accumulator = 0.0;
            }
        }

        let health = history.client_health(CLIENT);
        log::info!(
            "done at tick {}: {} commands received, {} late",
            history.latest().clock(),
            health.received,
            health.late
        );
        ExitCode::SUCCESS
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Sector Sim (native) starting...");
    demo::run()
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The library is the wasm surface; there is no wasm demo
}
