//! Table rendering.
//!
//! Converts an HTML `<table>` into a Markdown-style pipe grid: the first row is
//! the header, followed by a dash separator row. Every column is padded to its
//! widest cell, with a minimum width of three.

use scraper::{ElementRef, Selector};

use crate::collapsed_text;

/// Minimum rendered column width (wide enough for the `---` separator).
const MIN_COLUMN_WIDTH: usize = 3;

/// Render a table element as a pipe grid. Tables without cells render empty.
pub fn render_table(table: &ElementRef) -> String {
    let tr_sel = Selector::parse("tr").expect("valid selector");
    let cell_sel = Selector::parse("th, td").expect("valid selector");

    let rows: Vec<Vec<String>> = table
        .select(&tr_sel)
        .map(|tr| {
            tr.select(&cell_sel)
                .map(|cell| collapsed_text(&cell))
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    render_rows(&rows)
}

/// Lay out rows as a grid; the header row fixes the column count.
fn render_rows(rows: &[Vec<String>]) -> String {
    let Some((header, body)) = rows.split_first() else {
        return String::new();
    };

    // Data rows are padded with empty cells or cut to the header's width.
    let body: Vec<Vec<&str>> = body
        .iter()
        .map(|row| {
            (0..header.len())
                .map(|idx| row.get(idx).map(String::as_str).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|idx| {
            body.iter()
                .map(|row| row[idx].chars().count())
                .chain(std::iter::once(header[idx].chars().count()))
                .max()
                .unwrap_or(0)
                .max(MIN_COLUMN_WIDTH)
        })
        .collect();

    let header: Vec<&str> = header.iter().map(String::as_str).collect();
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let separator: Vec<&str> = separator.iter().map(String::as_str).collect();

    let mut lines = Vec::with_capacity(body.len() + 2);
    lines.push(format_row(&header, &widths));
    lines.push(format_row(&separator, &widths));
    lines.extend(body.iter().map(|row| format_row(row, &widths)));
    lines.join("\n")
}

fn format_row(cells: &[&str], widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    format!("| {} |", padded.join(" | "))
}
