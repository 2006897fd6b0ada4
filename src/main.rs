mod distributions;
mod geometry;
mod rendering;
mod scene;
mod settings;

use std::fs;
use std::io::{self, BufRead};

use anyhow::Context;

use crate::rendering::Renderer;
use crate::scene::{parse_file_content, Scene, SceneDescription};
use crate::settings::{Command, Controller, RenderSettings};

fn load_scene(path: Option<&String>) -> anyhow::Result<SceneDescription> {
    match path {
        Some(path) => {
            let file_string =
                fs::read_to_string(path).with_context(|| format!("Failed opening {}", path))?;
            let file_lines = file_string.lines().map(|x| x.trim()).collect::<Vec<&str>>();
            parse_file_content(file_lines).with_context(|| format!("Failed parsing {}", path))
        }
        None => Ok(SceneDescription {
            scene: Scene::default_scene(),
            width: 800,
            height: 600,
            settings: RenderSettings::default(),
            seed: None,
        }),
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => {
            let parsed = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}={:?}", name, value))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let description = load_scene(args.get(1))?;
    let seed = env_override::<u64>("PATHTRACER_SEED")?.or(description.seed);

    let mut renderer = Renderer::new(description.width, description.height)
        .with_seed(seed)
        .with_progress_bar(true);
    if let Some(threads) = env_override::<u32>("PATHTRACER_THREADS")? {
        renderer = renderer.with_threads(threads);
    }
    let scene = description.scene;
    let mut controller = Controller::new(description.settings);

    log::info!(
        "{} primitives, {} lights, {} render threads",
        scene.primitives.len(),
        scene.lights.len(),
        renderer.threads
    );
    log::info!("Commands: up/down - recursion depth, right/left - samples");
    log::info!("          a/z - antialiasing, p - preview mode, esc - quit");

    let mut lines = io::stdin().lock().lines();
    loop {
        if controller.is_dirty() {
            let frame = renderer.render(&scene, &controller.snapshot())?;
            controller.mark_rendered();
            let [r, g, b] = frame.mean_rgb();
            log::info!(
                "Pass {}% done, mean pixel value: ({:.1}, {:.1}, {:.1}), preview {}",
                renderer.progress().percent(),
                r,
                g,
                b,
                controller.settings().preview_mode
            );
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed reading command")?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => controller.apply(command),
            Err(err) => log::warn!("{}", err),
        }
    }
    Ok(())
}
