use indicatif::{ProgressBar, ProgressStyle};

/// Counters behind one status line.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub page: u32,
    /// 1-based position of `page` in the run's range.
    pub page_index: u32,
    pub pages_planned: u32,
    /// Cards handled so far on this page, including skipped ones.
    pub processed: usize,
    pub on_page: usize,
    pub accepted: usize,
    pub average_price: f64,
}

impl Snapshot {
    pub fn page_percent(&self) -> u64 {
        percent(self.processed, self.on_page)
    }

    /// Rough: assumes every page holds as many cards as the current one.
    pub fn completion_percent(&self) -> u64 {
        percent(self.accepted, self.pages_planned as usize * self.on_page)
    }

    pub fn render(&self) -> String {
        let done = self.processed.min(self.on_page);
        format!(
            "{} | {} page with list: [{}{}] {}% | Count of all parsed: {}. Progress ratio: {} %. Average price: {} rub",
            self.page_index,
            self.page,
            "=>".repeat(done),
            "  ".repeat(self.on_page - done),
            self.page_percent(),
            self.accepted,
            self.completion_percent(),
            group_thousands(self.average_price as u64),
        )
    }
}

fn percent(part: usize, whole: usize) -> u64 {
    if whole == 0 {
        return 0;
    }
    (part as u64 * 100).div_ceil(whole as u64)
}

/// `1234567` → `"1 234 567"`.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

/// Single status line redrawn in place.
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn report(&self, snapshot: &Snapshot) {
        self.bar.set_message(snapshot.render());
        self.bar.tick();
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
