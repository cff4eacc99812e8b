use std::{
    io::{self, BufRead, Write},
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use gesture_os::{
    ActionIntent, Controller, HandSkeleton, InputSink, Landmark, LandmarkFrame,
    config::AgentConfig,
    pipeline::{FramePolicy, Inbound, commands::Command, start_pipeline},
};
use serde::Deserialize;

/// One stdin line: a timestamped frame or a command.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayLine {
    Frame {
        /// Seconds since the start of the replay.
        t: f64,
        hands: Vec<Vec<Landmark>>,
    },
    Command(Command),
}

/// Writes each intent to stdout as one JSON line for the injector process.
struct StdoutSink {
    out: io::Stdout,
}

impl InputSink for StdoutSink {
    fn emit(&mut self, intent: &ActionIntent) -> anyhow::Result<()> {
        log::debug!("inject {intent:?}");
        let mut out = self.out.lock();
        serde_json::to_writer(&mut out, intent)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

fn to_frame(origin: Instant, t: f64, hands: Vec<Vec<Landmark>>) -> LandmarkFrame {
    let offset = Duration::try_from_secs_f64(t.max(0.0)).unwrap_or_default();
    let hands = hands
        .iter()
        .filter_map(|points| {
            let skeleton = HandSkeleton::from_points(points);
            if skeleton.is_none() {
                log::warn!("dropping hand with {} landmarks", points.len());
            }
            skeleton
        })
        .collect();
    LandmarkFrame::new(hands, origin + offset)
}

fn main() -> Result<()> {
    env_logger::init();

    let config = AgentConfig::from_env();
    let controller = Controller::new(config, StdoutSink { out: io::stdout() });
    let status = controller.status_handle();
    let (inbound_tx, worker) = start_pipeline(controller, FramePolicy::Every);

    let origin = Instant::now();
    for (idx, line) in io::stdin().lock().lines().enumerate() {
        let line = line.context("failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let inbound = match serde_json::from_str::<ReplayLine>(line) {
            Ok(ReplayLine::Frame { t, hands }) => Inbound::Frame(to_frame(origin, t, hands)),
            Ok(ReplayLine::Command(command)) => Inbound::Command(command),
            Err(err) => {
                log::warn!("skipping line {}: {err}", idx + 1);
                continue;
            }
        };
        if inbound_tx.send(inbound).is_err() {
            break;
        }
    }
    drop(inbound_tx);

    worker.join().map_err(|_| anyhow!("frame worker panicked"))?;
    let status = status.lock().map_err(|_| anyhow!("status lock poisoned"))?.clone();
    log::info!("final status: {}", serde_json::to_string(&status)?);
    Ok(())
}
