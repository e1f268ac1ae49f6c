//! Fixed-width text layout for the receipt grid.
//!
//! Every function here returns lines no wider than the width it was given,
//! measured in characters. Text is wrapped, never truncated: a word longer
//! than a line is split across lines rather than cut off.

/// Narrowest item-name column before the numeric cells move to their own line.
pub const MIN_NAME_WIDTH: usize = 8;

/// Width of `text` in grid cells.
pub fn width(text: &str) -> usize {
    text.chars().count()
}

/// Word-wrap `text` to `max` columns.
///
/// Runs of whitespace collapse to one space. Words longer than `max` are
/// split. Empty input yields no lines.
pub fn wrap(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_width = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        // Start a new line if the word does not fit after a space.
        if line_width > 0 && line_width + 1 + word.len() > max {
            lines.push(std::mem::take(&mut line));
            line_width = 0;
        }
        if line_width > 0 {
            line.push(' ');
            line_width += 1;
        }
        while line_width + word.len() > max {
            let room = max - line_width;
            line.extend(word.drain(..room));
            lines.push(std::mem::take(&mut line));
            line_width = 0;
        }
        line_width += word.len();
        line.extend(word);
    }
    if line_width > 0 {
        lines.push(line);
    }
    lines
}

/// Left-justify `text` in `cells` columns.
pub fn pad_right(text: &str, cells: usize) -> String {
    format!("{:<cells$}", text)
}

/// Right-justify `text` in `cells` columns.
pub fn pad_left(text: &str, cells: usize) -> String {
    format!("{:>cells$}", text)
}

/// A full-width rule.
pub fn rule(ch: char, cells: usize) -> String {
    std::iter::repeat_n(ch, cells).collect()
}

/// A label on the left and a value flush right, e.g. `Subtotal   120.00`.
///
/// The label wraps if the value leaves too little room; the value stays on
/// the first line. A value wider than the line goes on lines of its own.
pub fn label_value(label: &str, value: &str, cells: usize) -> Vec<String> {
    let value_width = width(value);
    if value_width + 1 + MIN_NAME_WIDTH > cells {
        let mut lines = wrap(label, cells);
        lines.extend(wrap(value, cells).iter().map(|v| pad_left(v, cells)));
        return lines;
    }
    let label_cells = cells - value_width - 1;
    let mut label_lines = wrap(label, label_cells);
    if label_lines.is_empty() {
        label_lines.push(String::new());
    }
    let mut lines = Vec::with_capacity(label_lines.len());
    let mut rest = label_lines.into_iter();
    if let Some(first) = rest.next() {
        lines.push(format!("{} {}", pad_right(&first, label_cells), value));
    }
    lines.extend(rest);
    lines
}

/// An item table: a left-justified name column followed by right-justified
/// numeric cells.
///
/// Cell widths start at the given minimums and widen to fit every row passed
/// to [`fit`](Self::fit), so all rows of one table share the same columns.
#[derive(Debug, Clone)]
pub struct Table {
    cells: usize,
    columns: Vec<usize>,
}

impl Table {
    /// A table `cells` wide with numeric columns of at least `min_widths`.
    pub fn new(cells: usize, min_widths: &[usize]) -> Self {
        Self {
            cells,
            columns: min_widths.to_vec(),
        }
    }

    /// Widen numeric columns so `row` fits.
    #[must_use]
    pub fn fit<S: AsRef<str>>(mut self, row: &[S]) -> Self {
        for (column, cell) in self.columns.iter_mut().zip(row) {
            *column = (*column).max(width(cell.as_ref()));
        }
        self
    }

    /// Width left for the name column, or `None` if it would be too narrow.
    pub fn name_width(&self) -> Option<usize> {
        let numeric: usize = self.columns.iter().map(|w| w + 1).sum();
        self.cells
            .checked_sub(numeric)
            .filter(|&w| w >= MIN_NAME_WIDTH)
    }

    /// Lay out one row. Long names wrap under themselves.
    pub fn row<S: AsRef<str>>(&self, name: &str, values: &[S]) -> Vec<String> {
        let Some(name_width) = self.name_width() else {
            return self.stacked_row(name, values);
        };
        let mut numeric = String::new();
        for (i, column) in self.columns.iter().enumerate() {
            let value = values.get(i).map(|v| v.as_ref()).unwrap_or("");
            numeric.push(' ');
            numeric.push_str(&pad_left(value, *column));
        }

        let mut names = wrap(name, name_width).into_iter();
        let first = names.next().unwrap_or_default();
        let mut lines = vec![format!("{}{}", pad_right(&first, name_width), numeric)];
        lines.extend(names);
        lines
    }

    /// Fallback when the numbers leave no room for the name: the name on its
    /// own lines, then the numbers right-justified below it.
    fn stacked_row<S: AsRef<str>>(&self, name: &str, values: &[S]) -> Vec<String> {
        let mut lines = wrap(name, self.cells);
        let joined = values
            .iter()
            .map(|v| v.as_ref())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if width(&joined) <= self.cells {
            lines.push(pad_left(&joined, self.cells));
        } else {
            for value in values {
                lines.extend(
                    wrap(value.as_ref(), self.cells)
                        .iter()
                        .map(|v| pad_left(v, self.cells)),
                );
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wrap_words() {
        assert_eq!(
            wrap("Paneer Tikka Masala Special", 12),
            vec!["Paneer Tikka", "Masala", "Special"]
        );
        assert!(wrap("", 10).is_empty());
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn test_wrap_splits_long_word() {
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("ab abcdefgh", 4), vec!["ab", "abcd", "efgh"]);
    }

    #[test]
    fn test_label_value() {
        assert_eq!(
            label_value("Subtotal", "120.00", 20),
            vec!["Subtotal      120.00"]
        );
        let lines = label_value("Service charge on large parties", "99.00", 20);
        assert_eq!(lines[0], "Service charge 99.00");
        assert!(lines.iter().all(|l| width(l) <= 20));
    }

    #[test]
    fn test_table_alignment() {
        let table = Table::new(32, &[3, 7, 8]).fit(&["Qty", "Rate", "Amount"]);
        assert_eq!(table.name_width(), Some(11));
        let lines = table.row("Naan", &["4", "40.00", "160.00"]);
        assert_eq!(lines, vec!["Naan          4   40.00   160.00"]);
        assert_eq!(width(&lines[0]), 32);
    }

    #[test]
    fn test_table_wraps_long_name() {
        let table = Table::new(32, &[3]);
        let lines = table.row("Chicken Biryani Family Pack Extra Raita", &["2"]);
        assert!(lines.len() > 1);
        assert!(lines[0].ends_with("  2"));
        assert!(lines.iter().all(|l| width(l) <= 32));
    }

    #[test]
    fn test_table_widens_for_large_amounts() {
        let table = Table::new(32, &[3, 7, 8]).fit(&["1", "1234567.00", "1234567.00"]);
        assert_eq!(table.name_width(), None);
        let lines = table.row("Catering", &["1", "1234567.00", "1234567.00"]);
        assert_eq!(lines[0], "Catering");
        assert!(lines.iter().all(|l| width(l) <= 32));
    }

    proptest! {
        #[test]
        fn prop_wrap_respects_width_and_keeps_text(
            text in "[a-zA-Z0-9 ]{0,120}",
            max in 1usize..60,
        ) {
            let lines = wrap(&text, max);
            for line in &lines {
                prop_assert!(width(line) <= max);
            }
            let original: String = text.split_whitespace().collect();
            let wrapped: String = lines.iter().flat_map(|l| l.split_whitespace()).collect();
            prop_assert_eq!(original, wrapped);
        }

        #[test]
        fn prop_table_rows_fit(
            name in "[a-zA-Z ]{0,80}",
            qty in 0u32..100_000,
            amount in 0i64..10_000_000_000,
            cells in 24usize..64,
        ) {
            let values = [qty.to_string(), format!("{}.00", amount)];
            let table = Table::new(cells, &[3, 8]).fit(&values);
            for line in table.row(&name, &values) {
                prop_assert!(width(&line) <= cells);
            }
        }
    }
}
