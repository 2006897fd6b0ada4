use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use thiserror::Error;

use crate::geometry::{Fp, Ray, Vec3f};
use crate::scene::Scene;
use crate::settings::RenderSettings;

const GAMMA: Fp = 2.2;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to start render workers: {0}")]
    Workers(#[from] rayon::ThreadPoolBuildError),
}

/// Row-major RGB pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[u8; 3]>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> FrameBuffer {
        FrameBuffer {
            width,
            height,
            pixels: vec![[0; 3]; width as usize * height as usize],
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[cfg(test)]
    pub fn get(&self, x: u32, y: u32) -> [u8; 3] {
        self.pixels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let index = self.index(x, y);
        self.pixels[index] = rgb;
    }

    pub fn mean_rgb(&self) -> [Fp; 3] {
        let mut sum = [0.0; 3];
        for pixel in &self.pixels {
            for (total, channel) in sum.iter_mut().zip(pixel) {
                *total += *channel as Fp;
            }
        }
        let count = self.pixels.len().max(1) as Fp;
        sum.map(|channel| channel / count)
    }
}

/// Clamp to 1, gamma-compress, then truncate to 8 bits.
pub fn tone_map(radiance: &Vec3f) -> [u8; 3] {
    let channel = |value: Fp| (Fp::min(1.0, value).max(0.0).powf(1.0 / GAMMA) * 255.0) as u8;
    [channel(radiance.x), channel(radiance.y), channel(radiance.z)]
}

/// Pinhole camera on the +Z axis looking down -Z.
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3f,
}

impl Default for Camera {
    fn default() -> Self {
        Camera {
            position: Vec3f::new(0.0, 0.0, 1.0),
        }
    }
}

impl Camera {
    /// `x` and `y` are continuous pixel coordinates, row 0 at the top.
    pub fn primary_ray(&self, x: Fp, y: Fp, width: u32, height: u32) -> Ray {
        let (w, h) = (width as Fp, height as Fp);
        let fx = (2.0 * x - w) / h;
        let fy = (2.0 * y - h) / h;
        Ray::new(self.position, Vec3f::new(fx, -fy, -1.0))
    }
}

/// Splits `height` rows into `count` contiguous bands, the last one takes the remainder.
pub fn split_bands(height: u32, count: u32) -> Vec<Range<u32>> {
    let count = count.max(1);
    let rows_per_band = height / count;
    (0..count)
        .map(|i| {
            let start = i * rows_per_band;
            let end = if i == count - 1 {
                height
            } else {
                (i + 1) * rows_per_band
            };
            start..end
        })
        .collect()
}

/// Pixel counter shared by all workers of a pass.
pub struct Progress {
    done: AtomicUsize,
    total: AtomicUsize,
    percent: AtomicUsize,
    bar: ProgressBar,
}

impl Progress {
    fn new(visible: bool) -> Progress {
        let bar = if visible {
            let bar = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos:>3}% [{elapsed}]") {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };
        Progress {
            done: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            percent: AtomicUsize::new(0),
            bar,
        }
    }

    fn reset(&self, total: usize) {
        self.done.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.percent.store(0, Ordering::SeqCst);
        self.bar.reset();
        self.bar.set_position(0);
    }

    fn pixel_done(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total.load(Ordering::Relaxed).max(1);
        let granularity = (total / 100).max(1);
        if done % granularity == 0 || done == total {
            let percent = usize::min(100, done * 100 / total);
            self.percent.fetch_max(percent, Ordering::Relaxed);
            self.bar.set_position(self.percent() as u64);
        }
    }

    fn finish(&self) {
        self.percent.store(100, Ordering::SeqCst);
        self.bar.set_position(100);
        self.bar.finish_and_clear();
    }

    /// Completion of the current (or last) pass, 0 to 100.
    pub fn percent(&self) -> usize {
        self.percent.load(Ordering::Relaxed)
    }
}

pub struct Renderer {
    pub width: u32,
    pub height: u32,
    pub threads: u32,
    /// Fixed seed for reproducible frames, `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub camera: Camera,
    progress: Progress,
}

impl Renderer {
    pub fn new(width: u32, height: u32) -> Renderer {
        let threads = std::thread::available_parallelism().map_or(1, |n| n.get() as u32);
        Renderer {
            width,
            height,
            threads,
            seed: None,
            camera: Camera::default(),
            progress: Progress::new(false),
        }
    }

    pub fn with_threads(mut self, threads: u32) -> Renderer {
        self.threads = threads.max(1);
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Renderer {
        self.seed = seed;
        self
    }

    pub fn with_progress_bar(mut self, visible: bool) -> Renderer {
        self.progress = Progress::new(visible);
        self
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    fn band_rng(&self, band: usize) -> Xoshiro256PlusPlus {
        match self.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(band as u64)),
            None => Xoshiro256PlusPlus::from_entropy(),
        }
    }

    fn render_pixel(
        &self,
        scene: &Scene,
        settings: &RenderSettings,
        x: u32,
        y: u32,
        rng: &mut impl Rng,
    ) -> [u8; 3] {
        let grid = settings.antialiasing.max(1);
        let cell = 1.0 / grid as Fp;
        let mut color = Vec3f::zeros();
        for aa in 0..grid {
            for ab in 0..grid {
                let sx = x as Fp + (aa as Fp + rng.gen::<Fp>()) * cell;
                let sy = y as Fp + (ab as Fp + rng.gen::<Fp>()) * cell;
                let ray = self.camera.primary_ray(sx, sy, self.width, self.height);
                color += scene.trace(&ray, 0, settings, rng);
            }
        }
        tone_map(&(color / (grid * grid) as Fp))
    }

    fn render_band(
        &self,
        scene: &Scene,
        settings: &RenderSettings,
        rows: Range<u32>,
        rng: &mut impl Rng,
        frame: &Mutex<FrameBuffer>,
    ) {
        for y in rows {
            for x in 0..self.width {
                let rgb = self.render_pixel(scene, settings, x, y, rng);
                frame
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .set(x, y, rgb);
                self.progress.pixel_done();
            }
        }
    }

    /// Renders a full frame, blocking until every band has finished.
    pub fn render(
        &self,
        scene: &Scene,
        settings: &RenderSettings,
    ) -> Result<FrameBuffer, RenderError> {
        let start = Instant::now();
        self.progress.reset(self.width as usize * self.height as usize);
        let frame = Mutex::new(FrameBuffer::new(self.width, self.height));
        let bands = split_bands(self.height, self.threads);

        // fresh workers per pass, joined when the scope returns
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(bands.len())
            .thread_name(|i| format!("band-{}", i))
            .build()?;
        pool.scope(|s| {
            for (index, rows) in bands.into_iter().enumerate() {
                let mut rng = self.band_rng(index);
                let frame = &frame;
                s.spawn(move |_| {
                    log::debug!("band {} rows {:?} started", index, rows);
                    self.render_band(scene, settings, rows, &mut rng, frame);
                    log::debug!("band {} finished", index);
                });
            }
        });

        self.progress.finish();
        log::info!(
            "Rendered {}x{} (depth {}, samples {}, antialiasing {}x) in {:.2?}",
            self.width,
            self.height,
            settings.max_depth,
            settings.samples,
            settings.antialiasing,
            start.elapsed()
        );
        Ok(frame.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tone_map_clamps_and_truncates() {
        assert_eq!(tone_map(&Vec3f::zeros()), [0, 0, 0]);
        assert_eq!(tone_map(&Vec3f::new(1.0, 3.5, 1e9)), [255, 255, 255]);
        // 0.5^(1/2.2) * 255 = 186.0..., truncated
        assert_eq!(tone_map(&Vec3f::new(0.5, 0.5, 0.5)), [186, 186, 186]);
    }

    #[test]
    fn tone_map_is_monotonic() {
        let mut previous = 0;
        for step in 0..=200 {
            let value = step as Fp / 100.0;
            let [mapped, _, _] = tone_map(&Vec3f::new(value, 0.0, 0.0));
            assert!(mapped >= previous);
            previous = mapped;
        }
        assert_eq!(previous, 255);
    }

    #[test]
    fn frame_buffer_is_row_major() {
        let mut frame = FrameBuffer::new(4, 2);
        frame.set(3, 1, [10, 20, 30]);
        assert_eq!(frame.pixels[7], [10, 20, 30]);
        assert_eq!(frame.get(3, 1), [10, 20, 30]);
        assert_eq!(frame.mean_rgb(), [1.25, 2.5, 3.75]);
    }

    #[test]
    fn indexing_does_not_overflow_u32() {
        // 70_000 * 70_000 exceeds u32::MAX
        let frame = FrameBuffer {
            width: 70_000,
            height: 70_000,
            pixels: Vec::new(),
        };
        assert_eq!(frame.index(69_999, 69_999), 70_000 * 70_000 - 1);
    }

    #[test]
    fn bands_cover_all_rows_once() {
        let bands = split_bands(601, 8);
        assert_eq!(bands.len(), 8);
        assert_eq!(bands[0], 0..75);
        assert_eq!(bands[7], 525..601);
        for pair in bands.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn more_threads_than_rows() {
        let bands = split_bands(3, 8);
        assert_eq!(bands.len(), 8);
        assert!(bands[..7].iter().all(|band| band.is_empty()));
        assert_eq!(bands[7], 0..3);
    }

    #[test]
    fn camera_center_looks_down_negative_z() {
        let camera = Camera::default();
        let ray = camera.primary_ray(400.0, 300.0, 800, 600);
        assert_relative_eq!(ray.origin, Vec3f::new(0.0, 0.0, 1.0));
        assert_relative_eq!(ray.direction, -Vec3f::z());
        // top-left corner points up and to the left
        let corner = camera.primary_ray(0.0, 0.0, 800, 600);
        assert!(corner.direction.x < 0.0 && corner.direction.y > 0.0);
    }

    #[test]
    fn progress_reaches_one_hundred() {
        let renderer = Renderer::new(16, 8).with_threads(3).with_seed(Some(1));
        renderer
            .render(&Scene::default(), &RenderSettings::default())
            .unwrap();
        assert_eq!(renderer.progress().percent(), 100);
    }

    #[test]
    fn progress_is_monotonic_and_resets() {
        let progress = Progress::new(false);
        progress.reset(250);
        let mut previous = 0;
        for _ in 0..250 {
            progress.pixel_done();
            assert!(progress.percent() >= previous);
            previous = progress.percent();
        }
        assert_eq!(previous, 100);
        progress.reset(250);
        assert_eq!(progress.percent(), 0);
    }
}
