//! Progress reporter (C8, spec §2/§6 `--display`).
//!
//! Grounded in `original_source/visualizer.h`/`visualizer.cpp`'s
//! `ProgressReporter` abstract base and its two implementations
//! (`ProgressBar`'s plain counter, `ProgressDisplay`'s ~100ms poll loop that
//! rebuilds the master canvas and marks in-flight tile corners), reimagined
//! without SDL: the teacher's `src/renderer.rs` terminal-rendering helpers
//! (`display_halfblock`, the braille/ASCII ramps) are reused near-verbatim
//! for the actual pixel-to-terminal conversion.

use crate::canvas::Canvas;
use crate::engine::RenderEngine;
use crossterm::style::{self, Stylize};
use crossterm::{cursor, terminal, QueueableCommand};
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Common interface for anything that watches a `RenderEngine` to completion
/// (spec §6 "`--display` toggles the live image preview").
pub trait ProgressReporter {
    fn run_to_completion(&mut self, engine: &RenderEngine);
}

/// Formats a duration as `[h:]mm:ss`, matching
/// `original_source/utils.cpp::format_seconds_as_hms`.
fn format_hms(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let total = seconds.ceil() as u64;
    let (hours, rem) = (total / 3600, total % 3600);
    let (minutes, secs) = (rem / 60, rem % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// A single-line progress bar polling `total_passes_completed` (spec §6,
/// `original_source/visualizer.h::ProgressBar`). No image preview; this is
/// the default reporter when `--display` is not passed.
pub struct TextProgressBar {
    total: u64,
    start: Instant,
    poll_interval: Duration,
}

impl TextProgressBar {
    pub fn new(total_passes: u64) -> Self {
        Self {
            total: total_passes.max(1),
            start: Instant::now(),
            poll_interval: Duration::from_millis(100),
        }
    }

    fn render_line(&self, done: u64) {
        let pct = ((done * 100) / self.total).min(100);
        let elapsed = self.start.elapsed().as_secs_f64();
        let rate = done as f64 / elapsed.max(1e-6);
        let remaining = if rate > 0.0 {
            (self.total - done) as f64 / rate
        } else {
            0.0
        };
        let bar_width = 30usize;
        let filled = (pct as usize * bar_width) / 100;
        let bar = format!("{}{}", "█".repeat(filled), "░".repeat(bar_width - filled));
        eprint!(
            "\r  Rendering │{bar}│ {pct:3}%  {done}/{} passes  ETA {}   ",
            self.total,
            format_hms(remaining)
        );
        let _ = io::stderr().flush();
    }
}

impl ProgressReporter for TextProgressBar {
    fn run_to_completion(&mut self, engine: &RenderEngine) {
        loop {
            let done = engine.total_passes_completed();
            self.render_line(done);
            if done >= self.total {
                break;
            }
            std::thread::sleep(self.poll_interval);
        }
        eprintln!();
    }
}

/// Periodically rebuilds the master canvas and redraws it in the terminal as
/// half-block characters, with red corner marks over tiles currently being
/// processed (spec §6 "`--display` toggles the live image preview"; marker
/// geometry follows `original_source/visualizer.cpp`'s `TILE_CORNER_SIZE`
/// scheme, minus the SDL framebuffer it originally drew into).
pub struct LiveDisplay {
    total: u64,
    poll_interval: Duration,
    start: Instant,
}

const TILE_CORNER_SIZE: usize = 2;

impl LiveDisplay {
    pub fn new(total_passes: u64) -> Self {
        Self {
            total: total_passes.max(1),
            poll_interval: Duration::from_millis(100),
            start: Instant::now(),
        }
    }

    fn draw(&self, out: &mut impl Write, canvas: &Canvas, marks: &[(usize, usize, usize, usize)]) {
        let rows = canvas.height / 2;
        let mut marked = vec![false; canvas.width * canvas.height];
        for &(sx, sy, w, h) in marks {
            let corner = TILE_CORNER_SIZE.min(w).min(h);
            let mut mark = |x: usize, y: usize| {
                if x < canvas.width && y < canvas.height {
                    marked[x + y * canvas.width] = true;
                }
            };
            for i in 0..corner {
                mark(sx + i, sy);
                mark(sx, sy + i);
                mark(sx + w.saturating_sub(1 + i), sy);
                mark(sx + w.saturating_sub(1), sy + i);
                mark(sx + i, sy + h.saturating_sub(1));
                mark(sx, sy + h.saturating_sub(1 + i));
                mark(sx + w.saturating_sub(1 + i), sy + h.saturating_sub(1));
                mark(sx + w.saturating_sub(1), sy + h.saturating_sub(1 + i));
            }
        }

        let _ = out.queue(cursor::MoveTo(0, 0));
        for row in 0..rows {
            for x in 0..canvas.width {
                let top = row * 2;
                let bottom = row * 2 + 1;
                let (tr, tg, tb) = pixel_rgb8(canvas, x, top, &marked);
                let (br, bg, bb) = pixel_rgb8(canvas, x, bottom, &marked);
                let _ = write!(
                    out,
                    "{}",
                    "▀"
                        .with(style::Color::Rgb { r: tr, g: tg, b: tb })
                        .on(style::Color::Rgb { r: br, g: bg, b: bb })
                );
            }
            let _ = out.queue(terminal::Clear(terminal::ClearType::UntilNewLine));
            let _ = writeln!(out);
        }
        let _ = out.flush();
    }
}

fn pixel_rgb8(canvas: &Canvas, x: usize, y: usize, marked: &[bool]) -> (u8, u8, u8) {
    if y >= canvas.height {
        return (0, 0, 0);
    }
    if marked[x + y * canvas.width] {
        return (255, 40, 40);
    }
    let [r, g, b] = canvas.get_pixel(x, y);
    (r, g, b)
}

impl ProgressReporter for LiveDisplay {
    fn run_to_completion(&mut self, engine: &RenderEngine) {
        let mut out = io::stdout();
        let _ = out.queue(terminal::Clear(terminal::ClearType::All));
        loop {
            engine.rebuild_master_canvas();
            let done = engine.total_passes_completed();
            let marks: Vec<_> = engine
                .currently_processing()
                .into_iter()
                .flatten()
                .map(|d| {
                    let (x, y, w, h) = d.clamp_bounds(engine.width, engine.height);
                    (x, y, w, h)
                })
                .collect();
            {
                let canvas = engine.master_canvas();
                self.draw(&mut out, &canvas, &marks);
            }
            eprint!(
                "\r  {done}/{} passes  elapsed {}   ",
                self.total,
                format_hms(self.start.elapsed().as_secs_f64())
            );
            let _ = io::stderr().flush();
            if done >= self.total {
                break;
            }
            std::thread::sleep(self.poll_interval);
        }
        engine.rebuild_master_canvas();
        eprintln!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hms_formats_without_hours_under_an_hour() {
        assert_eq!(format_hms(65.0), "1:05");
    }

    #[test]
    fn hms_formats_with_hours_over_an_hour() {
        assert_eq!(format_hms(3725.0), "1:02:05");
    }
}
