//! Box-drawing table renderer for list output (backups, files, memories).

use colored::Colorize;

/// Column alignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Collects headers and rows, then renders them inside box-drawing borders.
pub struct Table {
    headers: Vec<String>,
    alignments: Vec<Align>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// A table with the given headers, every column left-aligned.
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            alignments: vec![Align::Left; headers.len()],
            rows: Vec::new(),
        }
    }

    /// Right-align column `col`. Out-of-range indices are ignored.
    pub fn right(mut self, col: usize) -> Self {
        if let Some(a) = self.alignments.get_mut(col) {
            *a = Align::Right;
        }
        self
    }

    /// Add a row. Extra cells are dropped; missing cells render empty.
    pub fn add_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| display_width(h)).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(display_width(cell));
            }
        }
        widths
    }

    fn pad(text: &str, width: usize, alignment: Align) -> String {
        let fill = " ".repeat(width.saturating_sub(display_width(text)));
        match alignment {
            Align::Left => format!("{text}{fill}"),
            Align::Right => format!("{fill}{text}"),
        }
    }

    fn border(widths: &[usize], left: char, mid: char, right: char) -> String {
        let segments: Vec<String> = widths.iter().map(|w| "\u{2500}".repeat(w + 2)).collect();
        format!("{left}{}{right}", segments.join(&mid.to_string()))
    }

    /// Render to a string; the header row is bold.
    pub fn render(&self) -> String {
        let widths = self.widths();
        let line = |cells: Vec<String>| format!("\u{2502}{}\u{2502}", cells.join("\u{2502}"));

        let mut lines = vec![Self::border(&widths, '\u{250c}', '\u{252c}', '\u{2510}')];
        lines.push(line(
            self.headers
                .iter()
                .enumerate()
                .map(|(i, h)| format!(" {} ", Self::pad(h, widths[i], self.alignments[i]).bold()))
                .collect(),
        ));
        lines.push(Self::border(&widths, '\u{251c}', '\u{253c}', '\u{2524}'));
        for row in &self.rows {
            lines.push(line(
                row.iter()
                    .enumerate()
                    .map(|(i, cell)| format!(" {} ", Self::pad(cell, widths[i], self.alignments[i])))
                    .collect(),
            ));
        }
        lines.push(Self::border(&widths, '\u{2514}', '\u{2534}', '\u{2518}'));
        lines.join("\n")
    }

    pub fn print(&self) {
        println!("{}", self.render());
    }
}

fn display_width(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_layout() {
        let mut t = Table::new(&["Name", "Type", "Size"]).right(2);
        t.add_row(["auto_backup_20240101_000000_000", "automatic", "12 B"]);
        t.add_row(["nightly", "manual", "1.5 KiB"]);

        let rendered = t.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with('\u{250c}') && lines[0].ends_with('\u{2510}'));
        assert!(lines[5].starts_with('\u{2514}') && lines[5].ends_with('\u{2518}'));
        assert!(lines[1].contains("Name"));
        assert!(lines[4].contains("nightly"));
        assert!(lines[3].contains("   12 B"));
    }

    #[test]
    fn test_missing_cells_filled() {
        let mut t = Table::new(&["X", "Y", "Z"]);
        t.add_row(["only-one"]);
        let rendered = t.render();
        let data_line = rendered.lines().nth(3).unwrap();
        assert_eq!(data_line.matches('\u{2502}').count(), 4);
    }

    #[test]
    fn test_width_counts_chars() {
        assert_eq!(Table::pad("\u{e9}t\u{e9}", 5, Align::Left), "\u{e9}t\u{e9}  ");
    }
}
