use crossterm::style::{Color, Stylize};

use crate::types::Severity;

/// Colors used for one severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityStyle {
    pub primary: Color,
    pub secondary: Color,
    pub key: Color,
}

/// Immutable color configuration, built once at startup and shared by every receiver.
#[derive(Debug, Clone)]
pub struct Theme {
    enabled: bool,
    target_colors: Vec<Color>,
    info: SeverityStyle,
    warning: SeverityStyle,
    error: SeverityStyle,
}

impl Theme {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            target_colors: vec![
                Color::Blue,
                Color::Cyan,
                Color::Magenta,
                Color::DarkYellow,
                Color::DarkBlue,
                Color::DarkCyan,
                Color::DarkMagenta,
            ],
            info: SeverityStyle {
                primary: Color::Green,
                secondary: Color::DarkGreen,
                key: Color::Green,
            },
            warning: SeverityStyle {
                primary: Color::Yellow,
                secondary: Color::DarkGreen,
                key: Color::Green,
            },
            error: SeverityStyle {
                primary: Color::Red,
                secondary: Color::DarkGreen,
                key: Color::Green,
            },
        }
    }

    /// Theme that emits no escape sequences.
    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn palette_len(&self) -> usize {
        self.target_colors.len()
    }

    /// Tag color for a target; indexes wrap around the palette.
    pub fn target_color(&self, index: usize) -> Color {
        self.target_colors[index % self.palette_len()]
    }

    pub fn severity(&self, severity: Severity) -> SeverityStyle {
        match severity {
            Severity::Info => self.info,
            Severity::Warning => self.warning,
            Severity::Error => self.error,
        }
    }

    pub fn paint(&self, text: &str, color: Color) -> String {
        if self.enabled {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn paint_bold(&self, text: &str, color: Color) -> String {
        if self.enabled {
            text.with(color).bold().to_string()
        } else {
            text.to_string()
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::new(true)
    }
}
