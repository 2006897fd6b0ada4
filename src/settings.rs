use std::str::FromStr;

use thiserror::Error;

pub const MAX_DEPTH_RANGE: (u32, u32) = (1, 10);
pub const SAMPLES_RANGE: (u32, u32) = (1, 16);
pub const ANTIALIASING_RANGE: (u32, u32) = (1, 8);

const PREVIEW_SAMPLES: u32 = 2;
const PREVIEW_ANTIALIASING: u32 = 1;

/// Quality knobs read by the renderer for the duration of one pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderSettings {
    pub max_depth: u32,
    pub samples: u32,
    pub antialiasing: u32,
    pub preview_mode: bool,
    pub saved_samples: u32,
    pub saved_antialiasing: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            max_depth: 3,
            samples: 4,
            antialiasing: 2,
            preview_mode: false,
            saved_samples: 4,
            saved_antialiasing: 2,
        }
    }
}

fn step(value: u32, up: bool, (low, high): (u32, u32)) -> u32 {
    if up {
        u32::min(high, value.saturating_add(1))
    } else {
        u32::max(low, value.saturating_sub(1))
    }
}

impl RenderSettings {
    pub fn change_depth(&mut self, up: bool) {
        self.max_depth = step(self.max_depth, up, MAX_DEPTH_RANGE);
    }

    pub fn change_samples(&mut self, up: bool) {
        self.samples = step(self.samples, up, SAMPLES_RANGE);
    }

    pub fn change_antialiasing(&mut self, up: bool) {
        self.antialiasing = step(self.antialiasing, up, ANTIALIASING_RANGE);
    }

    /// Entering preview caches the live sample/antialiasing values, leaving restores them.
    pub fn toggle_preview(&mut self) {
        self.preview_mode = !self.preview_mode;
        if self.preview_mode {
            self.saved_samples = self.samples;
            self.saved_antialiasing = self.antialiasing;
            self.samples = PREVIEW_SAMPLES;
            self.antialiasing = PREVIEW_ANTIALIASING;
        } else {
            self.samples = self.saved_samples;
            self.antialiasing = self.saved_antialiasing;
        }
    }

    /// Settings loaded from a scene file, forced into the interactive ranges.
    pub fn clamped(max_depth: u32, samples: u32, antialiasing: u32) -> RenderSettings {
        let clamp = |value: u32, (low, high): (u32, u32)| value.clamp(low, high);
        let samples = clamp(samples, SAMPLES_RANGE);
        let antialiasing = clamp(antialiasing, ANTIALIASING_RANGE);
        RenderSettings {
            max_depth: clamp(max_depth, MAX_DEPTH_RANGE),
            samples,
            antialiasing,
            preview_mode: false,
            saved_samples: samples,
            saved_antialiasing: antialiasing,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    IncreaseDepth,
    DecreaseDepth,
    IncreaseSamples,
    DecreaseSamples,
    IncreaseAntialiasing,
    DecreaseAntialiasing,
    TogglePreview,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0:?}")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "depth+" | "up" => Ok(Command::IncreaseDepth),
            "depth-" | "down" => Ok(Command::DecreaseDepth),
            "samples+" | "right" => Ok(Command::IncreaseSamples),
            "samples-" | "left" => Ok(Command::DecreaseSamples),
            "aa+" | "a" => Ok(Command::IncreaseAntialiasing),
            "aa-" | "z" => Ok(Command::DecreaseAntialiasing),
            "preview" | "p" => Ok(Command::TogglePreview),
            "quit" | "esc" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Owns the only writable copy of the settings and tracks whether a new pass is due.
pub struct Controller {
    settings: RenderSettings,
    dirty: bool,
}

impl Controller {
    /// Starts dirty so the first frame gets rendered.
    pub fn new(settings: RenderSettings) -> Controller {
        Controller {
            settings,
            dirty: true,
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Read-only copy for one render pass. The flag stays set until `mark_rendered`.
    pub fn snapshot(&self) -> RenderSettings {
        self.settings.clone()
    }

    /// Called once the pass has joined.
    pub fn mark_rendered(&mut self) {
        self.dirty = false;
    }

    /// Applies a settings command. `Quit` leaves the settings untouched.
    pub fn apply(&mut self, command: Command) {
        let settings = &mut self.settings;
        match command {
            Command::IncreaseDepth | Command::DecreaseDepth => {
                settings.change_depth(command == Command::IncreaseDepth);
                log::info!("Recursion depth: {}", settings.max_depth);
            }
            Command::IncreaseSamples | Command::DecreaseSamples => {
                settings.change_samples(command == Command::IncreaseSamples);
                log::info!("Samples: {}", settings.samples);
            }
            Command::IncreaseAntialiasing | Command::DecreaseAntialiasing => {
                settings.change_antialiasing(command == Command::IncreaseAntialiasing);
                log::info!("Antialiasing: {}x", settings.antialiasing);
            }
            Command::TogglePreview => {
                settings.toggle_preview();
                if settings.preview_mode {
                    log::info!("Preview mode");
                } else {
                    log::info!("Full quality");
                }
            }
            Command::Quit => return,
        }
        self.dirty = true;
    }
}
