// SPDX-License-Identifier: GPL-3.0-only

//! Terminal story recorder
//!
//! Renders the mirrored preview with Unicode half-block characters, a status
//! line with countdown and microphone level, and blocking modals for the
//! intro and for save results.

use crate::app::recorder::RecorderStatus;
use crate::app::{AppNotice, PickerFactory, StoryApp};
use crate::backends::camera::{MediaKind, PreviewFrame, list_devices};
use crate::config::{Config, PersistedState};
use crate::media::encoders::log_available_encoders;
use crate::storage::{DestinationPicker, SaveDialog};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};
use std::io::{self, stdout};
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

const INTRO: &str = "Record a vertical story of up to one minute.\n\n\
    r / space  start or stop recording\n\
    c          next camera\n\
    m          next microphone\n\
    q          quit\n\n\
    When a recording ends it is exported to 1080x1920 and you choose where to save it.";

/// Run the terminal recorder
pub fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;
    if !log_available_encoders().can_export() {
        return Err("No H.264 encoder installed; stories cannot be exported".into());
    }
    let runtime = tokio::runtime::Runtime::new()?;

    let picker: PickerFactory = Box::new(|| Arc::new(SaveDialog::new()) as Arc<dyn DestinationPicker>);
    let (app, notices) = {
        let _guard = runtime.enter();
        StoryApp::with_gstreamer(config, picker)
    };

    let devices = list_devices();
    info!(cameras = devices.video.len(), microphones = devices.audio.len(), "Found devices");
    runtime.block_on(app.open(devices))?;

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &runtime, &app, notices);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    runtime.block_on(app.shutdown());
    result
}

/// Modal currently covering the preview
enum Modal {
    Intro,
    Notice(AppNotice),
    Message(String),
}

impl Modal {
    fn title(&self) -> &'static str {
        match self {
            Modal::Intro => " storycam ",
            Modal::Notice(AppNotice::Saved(_)) => " Saved ",
            Modal::Notice(AppNotice::SaveCancelled) => " Not saved ",
            Modal::Notice(AppNotice::Error(_)) | Modal::Message(_) => " Error ",
        }
    }

    fn body(&self) -> String {
        match self {
            Modal::Intro => INTRO.to_string(),
            Modal::Notice(AppNotice::Saved(path)) => format!("Story saved to\n{}", path.display()),
            Modal::Notice(AppNotice::SaveCancelled) => "The story was discarded.".to_string(),
            Modal::Notice(AppNotice::Error(message)) | Modal::Message(message) => message.clone(),
        }
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    runtime: &tokio::runtime::Runtime,
    app: &Arc<StoryApp>,
    mut notices: mpsc::UnboundedReceiver<AppNotice>,
) -> Result<(), Box<dyn std::error::Error>> {
    let preview = app.subscribe_preview();
    let status = app.subscribe_status();
    let saving = app.subscribe_saving();

    let mut state = PersistedState::load();
    let mut modal = (!state.has_shown_onboarding).then_some(Modal::Intro);

    // Results of actions running off the UI thread
    let (action_tx, action_rx) = std_mpsc::channel::<String>();

    loop {
        if modal.is_none() {
            if let Ok(notice) = notices.try_recv() {
                modal = Some(Modal::Notice(notice));
            } else if let Ok(message) = action_rx.try_recv() {
                modal = Some(Modal::Message(message));
            }
        }

        let (frame, devices_label) = match preview.borrow().as_ref() {
            Some(handle) => (
                handle.frames.borrow().clone(),
                format!("{} / {}", handle.camera, handle.microphone),
            ),
            None => (None, "switching...".to_string()),
        };
        let status_now = *status.borrow();
        let saving_now = *saving.borrow();

        terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let camera_area = Rect {
                height: area.height.saturating_sub(1),
                ..area
            };
            f.render_widget(FrameWidget { frame: frame.as_deref() }, camera_area);

            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };
            f.render_widget(
                StatusBar {
                    status: status_now,
                    saving: saving_now,
                    devices: &devices_label,
                },
                status_area,
            );

            if let Some(modal) = &modal {
                let rect = centered(area, 60, 12);
                f.render_widget(Clear, rect);
                f.render_widget(
                    Paragraph::new(format!("{}\n\n(press any key)", modal.body()))
                        .wrap(Wrap { trim: false })
                        .block(Block::default().borders(Borders::ALL).title(modal.title())),
                    rect,
                );
            }
        })?;

        // Poll with timeout so frames keep updating
        if !event::poll(Duration::from_millis(16))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        // Ctrl+C abandons everything, including a running export
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            if app.cancel_export() {
                info!("Export cancelled on quit");
            }
            break;
        }

        if let Some(open) = modal.take() {
            if matches!(open, Modal::Intro) {
                state.has_shown_onboarding = true;
                if let Err(e) = state.save() {
                    error!(error = %e, "Failed to store onboarding state");
                }
            }
            continue;
        }

        match key.code {
            KeyCode::Char('r') | KeyCode::Char(' ') => {
                if let Err(e) = runtime.block_on(app.toggle_recording()) {
                    error!(error = %e, "Recording toggle failed");
                    modal = Some(Modal::Message(e.user_message()));
                }
            }
            KeyCode::Char('c') => spawn_cycle(runtime, app, MediaKind::Video, &action_tx),
            KeyCode::Char('m') => spawn_cycle(runtime, app, MediaKind::Audio, &action_tx),
            KeyCode::Char('q') => {
                if saving_now {
                    modal = Some(Modal::Message(
                        "A story is being exported. Wait for it, or press Ctrl+C to abandon it.".into(),
                    ));
                } else {
                    break;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Device swaps run on the runtime so the UI keeps drawing
fn spawn_cycle(
    runtime: &tokio::runtime::Runtime,
    app: &Arc<StoryApp>,
    kind: MediaKind,
    results: &std_mpsc::Sender<String>,
) {
    let app = Arc::clone(app);
    let results = results.clone();
    runtime.spawn(async move {
        if let Err(e) = app.cycle_device(kind).await {
            error!(kind = %kind, error = %e, "Device switch failed");
            let _ = results.send(e.user_message());
        }
    });
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// Countdown as `m:ss`
fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Ten-step level bar
fn level_bar(level: f32) -> String {
    let filled = (level.clamp(0.0, 1.0) * 10.0).round() as usize;
    format!("{}{}", "▮".repeat(filled), "▯".repeat(10 - filled))
}

/// Widget that renders a preview frame using half-block characters
struct FrameWidget<'a> {
    frame: Option<&'a PreviewFrame>,
}

impl Widget for FrameWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.frame.filter(|f| f.width > 0 && f.height > 0) else {
            let msg = "Waiting for camera...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, Style::default());
            }
            return;
        };

        // Each terminal cell displays 2 vertical pixels
        let frame_aspect = frame.width as f64 / frame.height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            let h = term_height;
            let w = h * frame_aspect;
            (w as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            let h = w / frame_aspect;
            (w as u16, (h / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = frame.width as f64 / display_width as f64;
        let y_scale = frame.height as f64 / (display_height * 2) as f64;

        for ty in 0..display_height {
            for tx in 0..display_width {
                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) else {
                    continue;
                };
                cell.set_char('▀');
                cell.set_fg(sample_pixel(frame, src_x, src_y_top));
                cell.set_bg(sample_pixel(frame, src_x, src_y_bottom));
            }
        }
    }
}

fn sample_pixel(frame: &PreviewFrame, x: u32, y: u32) -> Color {
    let x = x.min(frame.width - 1);
    let y = y.min(frame.height - 1);
    match frame.pixel(x, y) {
        Some([r, g, b, _]) => Color::Rgb(r, g, b),
        None => Color::Black,
    }
}

/// Status bar widget
struct StatusBar<'a> {
    status: RecorderStatus,
    saving: bool,
    devices: &'a str,
}

impl StatusBar<'_> {
    fn message(&self) -> String {
        let state = if self.status.is_recording {
            format!(
                "● REC {} | mic {}",
                format_remaining(self.status.time_remaining),
                level_bar(self.status.audio_level)
            )
        } else if self.saving {
            "Saving...".to_string()
        } else {
            format!("Ready {}", format_remaining(self.status.time_remaining))
        };
        format!("{} | {} | r record | c camera | m mic | q quit", state, self.devices)
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bg = if self.status.is_recording {
            Color::Red
        } else {
            Color::DarkGray
        };
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(bg);
            }
        }

        let message = self.message();
        let text: String = message.chars().take(area.width as usize).collect();
        buf.set_string(area.x, area.y, text, Style::default().fg(Color::White).bg(bg));
    }
}
