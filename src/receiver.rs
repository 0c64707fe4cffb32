use std::fmt::Write as _;
use std::sync::Arc;

use chrono::SecondsFormat;
use crossterm::style::Color;

use crate::console::Console;
use crate::error::ParseError;
use crate::parser::Parser;
use crate::theme::Theme;
use crate::types::{Message, Target};

const SEPARATOR: &str = "----------------------------------------";

/// Renders the lines of one target.
pub struct Receiver {
    tag: String,
    tag_color: Color,
    fields_order: Vec<Vec<String>>,
    show_all: bool,
    parser: Parser,
    theme: Arc<Theme>,
    console: Console,
}

impl Receiver {
    pub fn new(
        target: &Target,
        color_index: usize,
        parser: Parser,
        theme: Arc<Theme>,
        console: Console,
    ) -> Self {
        let rule = target.rule.clone().unwrap_or_default();
        Self {
            tag: format!("{}:{}", target.pod_name, target.container_name),
            tag_color: theme.target_color(color_index),
            fields_order: rule.fields_order,
            show_all: rule.show_all,
            parser,
            theme,
            console,
        }
    }

    pub fn receive(&self, line: &str) {
        let block = match self.parser.parse_line(line) {
            Ok(msg) => self.render_message(msg),
            Err(ParseError::NotJson) => self.render_raw(line),
            Err(e) => format!("-> {}\n", e),
        };
        self.console.write_block(&block);
    }

    pub fn connected(&self) {
        self.console.write_block(&self.render_raw("connected"));
    }

    /// End-of-stream notice for this target.
    pub fn close(&self) {
        let block = format!(
            "{} {}\n{}\n",
            self.theme.paint_bold(&self.tag, self.tag_color),
            self.theme.paint("closed", self.tag_color),
            SEPARATOR
        );
        self.console.write_block(&block);
    }

    fn render_raw(&self, line: &str) -> String {
        format!(
            "{} {}\n{}\n",
            self.theme.paint_bold(&self.tag, self.tag_color),
            line,
            SEPARATOR
        )
    }

    fn render_message(&self, mut msg: Message) -> String {
        let style = self.theme.severity(msg.severity);
        let mut out = String::new();

        let headline = match msg.timestamp {
            Some(ts) => format!(
                "{} {}",
                ts.to_rfc3339_opts(SecondsFormat::Millis, true),
                msg.text
            ),
            None => msg.text.clone(),
        };
        let _ = writeln!(
            out,
            "{} {}",
            self.theme.paint_bold(&self.tag, self.tag_color),
            self.theme.paint(&headline, style.primary)
        );

        for group in &self.fields_order {
            let mut pairs = Vec::new();
            for key in group {
                if let Some(value) = msg.data.remove(key) {
                    pairs.push(self.pair(key, value.trim(), style.key, style.secondary));
                }
            }
            if !pairs.is_empty() {
                let _ = writeln!(out, "{}", pairs.join(" "));
            }
        }

        if self.show_all {
            let rest: Vec<_> = msg
                .data
                .iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(k, v)| self.pair(k, v.trim(), style.key, style.secondary))
                .collect();
            if !rest.is_empty() {
                let _ = writeln!(out, "{}", rest.join(" "));
            }
        }

        out.push_str(SEPARATOR);
        out.push('\n');
        out
    }

    fn pair(&self, key: &str, value: &str, key_color: Color, value_color: Color) -> String {
        format!(
            "{} {}",
            self.theme.paint(&format!("{}:", key), key_color),
            self.theme.paint(value, value_color)
        )
    }
}
