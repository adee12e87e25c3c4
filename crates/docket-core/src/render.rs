use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::activity::{Activity, Status};
use crate::config::Config;
use crate::datetime::format_due_date;
use crate::store::{KanbanView, Stats};
use crate::tools::{ManualItem, Tool};

const NOTE_PREVIEW_CHARS: usize = 60;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.get_bool("color").unwrap_or(true),
        }
    }

    #[tracing::instrument(skip(self, activities))]
    pub fn print_activity_table(&mut self, activities: &[&Activity]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if activities.is_empty() {
            writeln!(out, "No activities to show.")?;
            return Ok(());
        }

        let headers: Vec<String> = ["ID", "Sheet", "Status", "Activity", "Owner", "Due", "Workdays", "Total", "Note"]
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::with_capacity(activities.len());
        for activity in activities {
            let overdue = activity.is_pending() && activity.workdays_until_due.is_some_and(|days| days < 0);
            let due = activity.due_date.map(format_due_date).unwrap_or_default();
            let due = if overdue { self.paint(&due, "31") } else { due };
            let workdays = activity
                .workdays_until_due
                .map(|days| days.to_string())
                .unwrap_or_default();
            let workdays = if activity.workdays_until_due.is_some_and(|days| days < 0) {
                self.paint(&workdays, "31")
            } else {
                workdays
            };
            let status = match activity.status {
                Status::Pending => self.paint(activity.status.label(), "33"),
                Status::Done => self.paint(activity.status.label(), "32"),
            };

            rows.push(vec![
                activity.id.clone(),
                activity.source_sheet.clone(),
                status,
                activity.title.clone(),
                activity.owner.clone(),
                due,
                workdays,
                activity.total_time.clone(),
                preview(&activity.note),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_stats(&mut self, stats: &Stats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "total     {}", stats.total)?;
        writeln!(out, "owners    {}", stats.owner_count)?;
        writeln!(out, "pending   {}", stats.status.pending)?;
        writeln!(out, "done      {}", stats.status.done)?;
        writeln!(out, "notes     {} with, {} without", stats.with_note, stats.without_note)?;

        if stats.by_owner.is_empty() {
            return Ok(());
        }
        writeln!(out)?;
        let rows = stats
            .by_owner
            .iter()
            .map(|(owner, counts)| vec![owner.clone(), counts.pending.to_string(), counts.done.to_string()])
            .collect();
        write_table(
            &mut out,
            vec!["Owner".to_string(), "Pending".to_string(), "Done".to_string()],
            rows,
        )
    }

    pub fn print_kanban(&mut self, view: &KanbanView<'_>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for (title, items) in [("To do", &view.todo), ("In progress", &view.in_progress), ("Done", &view.done)] {
            writeln!(out, "{} ({})", self.paint(title, "1"), items.len())?;
            for activity in items.iter() {
                writeln!(out, "  [{}] {}  {}", activity.id, activity.title, activity.owner)?;
            }
        }
        Ok(())
    }

    pub fn print_tool(&mut self, tool: Tool, view: &[(&str, &str, &[ManualItem])]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint(tool.title(), "1"))?;
        for (key, label, items) in view {
            writeln!(out, "{label} <{key}> ({})", items.len())?;
            for item in items.iter() {
                writeln!(out, "  [{}] {}", item.id, item.text)?;
            }
        }
        Ok(())
    }

    pub fn print_lines<I, T>(&mut self, lines: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = T>,
        T: std::fmt::Display,
    {
        let mut out = io::stdout().lock();
        for line in lines {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn preview(note: &str) -> String {
    let flat = note.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > NOTE_PREVIEW_CHARS {
        let cut: String = flat.chars().take(NOTE_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

fn write_table<W: Write>(mut writer: W, headers: Vec<String>, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{Renderer, preview, strip_ansi, write_table};
    use crate::config::Config;

    #[test]
    fn color_follows_config_bool() {
        let mut cfg = Config::default();
        assert!(Renderer::new(&cfg).color);

        cfg.apply_overrides(vec![("rc.color".to_string(), "off".to_string())]);
        let renderer = Renderer::new(&cfg);
        assert!(!renderer.color);
        assert_eq!(renderer.paint("late", "31"), "late");

        cfg.apply_overrides(vec![("color".to_string(), "yes".to_string())]);
        assert!(Renderer::new(&cfg).color);
    }

    #[test]
    fn pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["Owner".to_string(), "N".to_string()],
            vec![vec!["\x1b[31mJoão\x1b[0m".to_string(), "1".to_string()]],
        )
        .expect("table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Owner N ");
        assert_eq!(strip_ansi(lines[2]), "João  1 ");
    }

    #[test]
    fn previews_long_notes() {
        let long = "x".repeat(80);
        assert_eq!(preview(&long).chars().count(), 63);
        assert_eq!(preview("a\nb"), "a b");
    }
}
