use std::{
    fs::File,
    io::{BufRead, BufReader},
    panic::{catch_unwind, AssertUnwindSafe},
    process::{Command, Stdio},
    thread,
    time::Duration,
};

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::{
    cmd::Cmd,
    config,
    gesture::{Hand, LANDMARK_COUNT},
    math::vec2,
};

pub fn spawn(detector: config::Detector, send_cmd: impl Fn(Cmd) + Send + Sync + 'static) {
    thread::spawn(move || {
        let res = catch_unwind(AssertUnwindSafe(|| detector_main(&detector, &send_cmd)));
        let reason = match res {
            Ok(Ok(())) => "landmark stream ended".to_string(),
            Ok(Err(e)) => format!("{e:#}"),
            // Panic message and backtrace are printed by the default panic hook.
            Err(_panic) => "landmark thread panicked".to_string(),
        };
        send_cmd(Cmd::DetectorFailed { reason });
    });
}

fn detector_main(detector: &config::Detector, send_cmd: &dyn Fn(Cmd)) -> anyhow::Result<()> {
    match (&detector.command, &detector.replay) {
        (Some(command), _) => {
            let [program, args @ ..] = &command[..] else {
                bail!("hand tracker command is empty");
            };
            log::info!("starting hand tracker `{}`", command.join(" "));
            let mut child = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .spawn()
                .with_context(|| format!("failed to start hand tracker `{program}`"))?;
            let stdout = child
                .stdout
                .take()
                .context("hand tracker stdout is not captured")?;

            read_frames(BufReader::new(stdout), None, send_cmd)?;

            let status = child.wait()?;
            if !status.success() {
                bail!("hand tracker exited with {status}");
            }
            Ok(())
        }
        (None, Some(path)) => {
            log::info!(
                "replaying landmark frames from `{}` at {} fps",
                path.display(),
                detector.fps
            );
            let file = File::open(path)
                .with_context(|| format!("failed to open `{}`", path.display()))?;
            let interval = Duration::from_secs_f32(1.0 / detector.fps);
            read_frames(BufReader::new(file), Some(interval), send_cmd)
        }
        (None, None) => bail!("no landmark source configured"),
    }
}

/// Forwards every frame in `reader`, optionally waiting `interval` between frames.
///
/// Frames that fail to parse, including lines that are not valid UTF-8, are reported as "no hand".
/// Only I/O errors end the stream.
fn read_frames(
    mut reader: impl BufRead,
    interval: Option<Duration>,
    send_cmd: &dyn Fn(Cmd),
) -> anyhow::Result<()> {
    let mut buf = Vec::new();
    let mut line_no = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        line_no += 1;

        let hand = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => parse_frame(line).unwrap_or_else(|e| {
                log::warn!("malformed landmark frame on line {line_no}: {e}");
                None
            }),
            Err(e) => {
                log::warn!("landmark frame on line {line_no} is not UTF-8: {e}");
                None
            }
        };
        send_cmd(Cmd::Frame(hand));

        if let Some(interval) = interval {
            thread::sleep(interval);
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Landmark {
    Array(Vec<f32>),
    Object { x: f32, y: f32 },
}

/// Parses one line written by the hand tracker.
///
/// `null` or `[]` means no hand is visible. Otherwise the line is an array of 21 landmarks, each
/// `[x, y]`, `[x, y, z]` or `{"x": .., "y": .., "z": ..}` in normalized camera coordinates.
pub fn parse_frame(line: &str) -> anyhow::Result<Option<Hand>> {
    let landmarks: Option<Vec<Landmark>> = serde_json::from_str(line)?;
    let landmarks = match landmarks {
        Some(landmarks) if !landmarks.is_empty() => landmarks,
        _ => return Ok(None),
    };

    let points = landmarks
        .into_iter()
        .map(|landmark| match landmark {
            Landmark::Array(coords) => match coords[..] {
                [x, y] | [x, y, _] => Ok(vec2(x, y)),
                _ => bail!("landmark has {} coordinates", coords.len()),
            },
            Landmark::Object { x, y } => Ok(vec2(x, y)),
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    match Hand::from_slice(&points) {
        Some(hand) => Ok(Some(hand)),
        None => bail!("expected {LANDMARK_COUNT} landmarks, got {}", points.len()),
    }
}
