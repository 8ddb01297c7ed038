use std::path::PathBuf;

use ratatui::layout::Rect;
use tracing::warn;

use crate::export;
use crate::session::QuerySession;
use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// One-line feedback shown in the footer (export results)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub is_error: bool,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    pub session: QuerySession,
    pub backend_url: String,
    pub export_dir: PathBuf,

    // Reset confirmation modal
    pub show_reset_confirm: bool,
    pub status: Option<StatusLine>,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16, // Inner height of the chat area, set during render
    pub chat_width: u16,  // Inner width of the chat area, set during render
    pub chat_area: Option<Rect>,

    pub animation_frame: u8, // 0-2 for ellipsis animation

    // What the chat view last followed, to detect new messages
    seen_messages: usize,
    seen_busy: bool,
    pinned_to_bottom: bool,
}

impl App {
    pub fn new(session: QuerySession, backend_url: String, export_dir: PathBuf) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            session,
            backend_url,
            export_dir,

            show_reset_confirm: false,
            status: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,

            animation_frame: 0,

            seen_messages: 0,
            seen_busy: false,
            pinned_to_bottom: true,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_busy()
    }

    pub fn submit(&mut self) {
        if self.session.submit_input() {
            self.status = None;
        }
    }

    pub fn stop(&mut self) {
        self.session.cancel();
    }

    pub fn request_reset(&mut self) {
        self.show_reset_confirm = true;
    }

    /// Answer the reset confirmation modal
    pub fn answer_reset(&mut self, confirmed: bool) {
        self.show_reset_confirm = false;
        if self.session.reset(|_| confirmed) {
            self.status = None;
            self.chat_scroll = 0;
            self.pinned_to_bottom = true;
        }
    }

    pub fn export(&mut self) {
        self.status = Some(match export::export_history(self.session.transcript(), &self.export_dir) {
            Ok(path) => StatusLine {
                text: format!("Saved history to {}", path.display()),
                is_error: false,
            },
            Err(e) => {
                warn!(target: "raglab::app", error = %format!("{:#}", e), "Export failed");
                StatusLine {
                    text: format!("Export failed: {:#}", e),
                    is_error: true,
                }
            }
        });
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Keep the latest message in view whenever the transcript or busy state
    /// changes. Called on every render, once the chat area size is known.
    pub fn follow_transcript(&mut self) {
        let messages = self.session.transcript().len();
        let busy = self.is_busy();
        if messages != self.seen_messages || busy != self.seen_busy {
            self.seen_messages = messages;
            self.seen_busy = busy;
            self.pinned_to_bottom = true;
        }

        let max_scroll = self.max_scroll();
        self.chat_scroll = if self.pinned_to_bottom {
            max_scroll
        } else {
            self.chat_scroll.min(max_scroll)
        };
    }

    pub fn scroll_down(&mut self) {
        let max_scroll = self.max_scroll();
        self.chat_scroll = self.chat_scroll.saturating_add(1).min(max_scroll);
        self.pinned_to_bottom = self.chat_scroll >= max_scroll;
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
        self.pinned_to_bottom = false;
    }

    pub fn scroll_half_page_down(&mut self) {
        let half_page = self.visible_height() / 2;
        let max_scroll = self.max_scroll();
        self.chat_scroll = self.chat_scroll.saturating_add(half_page).min(max_scroll);
        self.pinned_to_bottom = self.chat_scroll >= max_scroll;
    }

    pub fn scroll_half_page_up(&mut self) {
        let half_page = self.visible_height() / 2;
        self.chat_scroll = self.chat_scroll.saturating_sub(half_page);
        self.pinned_to_bottom = false;
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
        self.pinned_to_bottom = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
        self.pinned_to_bottom = true;
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    fn max_scroll(&self) -> u16 {
        self.total_chat_lines().saturating_sub(self.visible_height())
    }

    /// Wrapped height of the transcript, measured the way `ui` renders it.
    /// Paragraph scrolling is u16, so taller transcripts clamp to the limit.
    fn total_chat_lines(&self) -> u16 {
        // Default to 50 columns until the first render reports the real width
        let wrap_width = if self.chat_width > 0 { self.chat_width } else { 50 };
        u16::try_from(ui::chat_line_count(self, wrap_width)).unwrap_or(u16::MAX)
    }
}
