use std::{env, mem};

use anyhow::bail;
use app::App;
use config::{Config, Mode};

mod app;
mod board;
mod cmd;
mod config;
mod detector;
mod export;
mod gesture;
mod math;
mod pointer;
mod raster;
mod render;
mod smooth;
mod stroke;
mod toolbar;

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_module(env!("CARGO_CRATE_NAME"), log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    let mut config = match &*env::args_os().skip(1).collect::<Vec<_>>() {
        [] => Config::default(),
        [path] => Config::load(path)?,
        _ => {
            bail!("usage: {} [config.toml]", env!("CARGO_PKG_NAME"));
        }
    };

    let event_loop = winit::event_loop::EventLoop::with_user_event().build()?;
    match mem::take(&mut config.detector) {
        Some(detector) => {
            let proxy = event_loop.create_proxy();
            detector::spawn(detector, move |cmd| drop(proxy.send_event(cmd)));
        }
        None if config.mode == Mode::Camera => {
            log::warn!("no [detector] configured, camera mode will not see any hands");
        }
        None => {}
    }

    let mut app = App::new(config)?;
    Ok(event_loop.run_app(&mut app)?)
}
