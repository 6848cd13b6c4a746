use crate::access::{LinkState, Presenter, StopSignal, Verdict};
use crate::common::Result;
use crate::core::{BoundingBox, Frame};
use image::DynamicImage;
use std::io::{self, Write};
use std::time::Duration;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    terminal::{self, ClearType},
    cursor,
    execute,
};

const ASCII_RAMP: &str = " .·:;+=xX#@";
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;

pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        Self::with_size(
            width.unwrap_or(term_width.min(DEFAULT_WIDTH)),
            height.unwrap_or(term_height.saturating_sub(3).min(DEFAULT_HEIGHT)),
        )
    }

    pub fn with_size(width: usize, height: usize) -> Self {
        Self { width: width.max(4), height: height.max(4) }
    }

    /// Renders the frame with a labelled box per face and a status line.
    pub fn render_frame(&self, image: &DynamicImage, verdicts: &[Verdict], link: LinkState) -> String {
        let mut grid = self.image_to_ascii(image);
        let img_width = image.width().max(1) as f32;
        let img_height = image.height().max(1) as f32;

        for verdict in verdicts {
            let bbox = &verdict.detection.bounding_box;
            self.draw_face_box(&mut grid, bbox, img_width, img_height);

            let mark = if verdict.decision.is_grant() { "✓" } else { "✗" };
            let label = format!("{} {}", verdict.detection.identity, mark);
            let x = ((bbox.left as f32 / img_width) * self.width as f32) as usize;
            let y = ((bbox.top as f32 / img_height) * self.height as f32) as usize;
            self.overlay_text(&mut grid, &label, x, y.saturating_sub(1));
        }

        let mut out = self.grid_to_string(&grid);
        out.push_str("\r\n");
        out.push_str(&status_line(verdicts, link));
        out
    }

    fn image_to_ascii(&self, image: &DynamicImage) -> Vec<Vec<char>> {
        let ramp: Vec<char> = ASCII_RAMP.chars().collect();
        let mut grid = vec![vec![' '; self.width]; self.height];

        let gray = image.to_luma8();
        let (img_width, img_height) = gray.dimensions();

        for (term_y, row) in grid.iter_mut().enumerate() {
            for (term_x, cell) in row.iter_mut().enumerate() {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;

                if img_x < img_width && img_y < img_height {
                    let brightness = gray.get_pixel(img_x, img_y)[0] as usize;
                    *cell = ramp[brightness * (ramp.len() - 1) / 255];
                }
            }
        }

        grid
    }

    /// Writes `text` starting at column `x`, clipped to the grid.
    fn overlay_text(&self, grid: &mut [Vec<char>], text: &str, x: usize, y: usize) {
        if y >= self.height {
            return;
        }

        for (i, ch) in text.chars().enumerate() {
            if x + i < self.width {
                grid[y][x + i] = ch;
            }
        }
    }

    fn draw_face_box(&self, grid: &mut [Vec<char>], bbox: &BoundingBox, img_width: f32, img_height: f32) {
        let scale_x = |v: u32| (((v as f32 / img_width) * self.width as f32) as usize).min(self.width - 1);
        let scale_y = |v: u32| (((v as f32 / img_height) * self.height as f32) as usize).min(self.height - 1);

        let (x1, x2) = (scale_x(bbox.left), scale_x(bbox.right));
        let (y1, y2) = (scale_y(bbox.top), scale_y(bbox.bottom));
        if x2 <= x1 || y2 <= y1 {
            return;
        }

        for x in (x1 + 1)..x2 {
            grid[y1][x] = '─';
            grid[y2][x] = '─';
        }
        for row in grid.iter_mut().take(y2).skip(y1 + 1) {
            row[x1] = '│';
            row[x2] = '│';
        }

        grid[y1][x1] = '┌';
        grid[y1][x2] = '┐';
        grid[y2][x1] = '└';
        grid[y2][x2] = '┘';
    }

    fn grid_to_string(&self, grid: &[Vec<char>]) -> String {
        grid.iter()
            .map(|row| row.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

fn status_line(verdicts: &[Verdict], link: LinkState) -> String {
    let faces = match verdicts.len() {
        0 => "no face".to_string(),
        1 => "1 face".to_string(),
        n => format!("{} faces", n),
    };
    let link = match link {
        LinkState::Healthy => "link ok",
        LinkState::Degraded => "!! ACTUATOR LINK DEGRADED !!",
    };
    format!("{} | {} | Esc to quit", faces, link)
}

pub fn clear_screen() -> io::Result<()> {
    execute!(
        io::stdout(),
        terminal::Clear(ClearType::All),
        cursor::MoveTo(0, 0)
    )?;
    io::stdout().flush()
}

/// Non-blocking check for Esc, `q` or Ctrl+C.
pub fn check_for_escape() -> io::Result<bool> {
    if event::poll(Duration::from_millis(0))? {
        if let Event::Key(KeyEvent { code, modifiers, .. }) = event::read()? {
            return Ok(is_stop_key(code, modifiers));
        }
    }
    Ok(false)
}

fn is_stop_key(code: KeyCode, modifiers: KeyModifiers) -> bool {
    match code {
        KeyCode::Esc | KeyCode::Char('q') => true,
        KeyCode::Char('c') => modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Live terminal preview. Raw mode swallows SIGINT, so stop keys raise the
/// stop signal directly.
pub struct AsciiPreview {
    renderer: AsciiRenderer,
    stop: StopSignal,
    raw_mode: bool,
}

impl AsciiPreview {
    pub fn new(renderer: AsciiRenderer, stop: StopSignal) -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self { renderer, stop, raw_mode: true })
    }
}

impl Presenter for AsciiPreview {
    fn present(&mut self, frame: &Frame, verdicts: &[Verdict], link: LinkState) -> Result<()> {
        clear_screen()?;
        let mut stdout = io::stdout();
        write!(stdout, "{}", self.renderer.render_frame(frame, verdicts, link))?;
        stdout.flush()?;

        if check_for_escape()? {
            self.stop.raise();
        }
        Ok(())
    }

    fn finish(&mut self) {
        if self.raw_mode {
            let _ = terminal::disable_raw_mode();
            self.raw_mode = false;
            println!();
        }
    }
}

impl Drop for AsciiPreview {
    fn drop(&mut self) {
        self.finish();
    }
}
