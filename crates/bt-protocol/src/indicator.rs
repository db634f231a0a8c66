//! Activity indicator shown while the module works

/// Iterations between two indicator updates
pub const UPDATE_EVERY: u32 = 25;
/// Number of animation phases
pub const PHASES: u32 = 6;

/// Symbol used to animate the indicator, one per kind of activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    /// Inquiry and client connect
    Dot,
    /// Service lookup
    Dash,
    /// Waiting for a client, filtering services
    Star,
}

impl Glyph {
    pub fn as_char(self) -> char {
        match self {
            Glyph::Dot => '.',
            Glyph::Dash => '-',
            Glyph::Star => '*',
        }
    }

    /// Three-cell frame for `phase`: empty, filling up, then draining
    pub fn frame(self, phase: u32) -> String {
        let c = self.as_char();
        let cells: [bool; 3] = match phase % PHASES {
            0 => [false, false, false],
            1 => [true, false, false],
            2 => [true, true, false],
            3 => [true, true, true],
            4 => [false, true, true],
            _ => [false, false, true],
        };
        cells.iter().map(|&on| if on { c } else { ' ' }).collect()
    }
}

/// Display collaborator refreshed from polling loops
pub trait ActivityIndicator: Send {
    fn show(&mut self, frame: &str);

    /// Remove the indicator once the activity ends
    fn clear(&mut self) {}
}

/// Indicator that draws nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndicator;

impl ActivityIndicator for NoIndicator {
    fn show(&mut self, _frame: &str) {}
}

/// Iteration counter driving an [`ActivityIndicator`]
#[derive(Debug, Default, Clone)]
pub struct Spinner {
    count: u32,
}

impl Spinner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one polling iteration, returning the frame due on this one
    pub fn tick(&mut self, glyph: Glyph) -> Option<String> {
        let count = self.count;
        self.count = (self.count + 1) % (UPDATE_EVERY * PHASES);
        (count % UPDATE_EVERY == 0).then(|| glyph.frame(count / UPDATE_EVERY))
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}
