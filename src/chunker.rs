/// Separator cascade, most preferred first. Paragraphs, then lines, then
/// sentence boundaries, then words; the empty separator is a character-level
/// last resort.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Splits document text into bounded-size chunks, preferring sentence and
/// paragraph boundaries. Guarantees: no chunk exceeds `max_chars`, no chunk
/// is empty or whitespace-only.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(max_chars: usize, overlap: usize) -> Self {
        let max_chars = max_chars.max(1);
        Self {
            max_chars,
            overlap: overlap.min(max_chars - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return vec![];
        }

        let mut raw = Vec::new();
        if trimmed.len() <= self.max_chars {
            raw.push(trimmed.to_string());
        } else {
            self.split_with(trimmed, &SEPARATORS, &mut raw);
        }

        raw.iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        if text.len() <= self.max_chars {
            out.push(text.to_string());
            return;
        }
        let (sep, rest) = match separators.split_first() {
            Some((sep, rest)) if !sep.is_empty() => (*sep, rest),
            _ => {
                self.hard_split(text, out);
                return;
            }
        };

        let mut current = String::new();
        for part in text.split(sep) {
            // A single part larger than the budget gets sub-split with the
            // next separator in the cascade.
            if part.len() > self.max_chars {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                self.split_with(part, rest, out);
                continue;
            }

            let extra = if current.is_empty() {
                part.len()
            } else {
                sep.len() + part.len()
            };
            if !current.is_empty() && current.len() + extra > self.max_chars {
                let tail = self.overlap_tail(&current);
                out.push(std::mem::take(&mut current));
                // Seed the next chunk with the overlap, unless that would
                // itself blow the budget.
                if tail.len() + sep.len() + part.len() <= self.max_chars {
                    current = tail;
                }
            }

            if !current.is_empty() {
                current.push_str(sep);
            }
            current.push_str(part);
        }

        if !current.is_empty() {
            out.push(current);
        }
    }

    /// Character-level fallback for text with no usable separators.
    fn hard_split(&self, text: &str, out: &mut Vec<String>) {
        let mut start = 0;
        while start < text.len() {
            let mut end = (start + self.max_chars).min(text.len());
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            out.push(text[start..end].to_string());
            if end >= text.len() {
                break;
            }
            let mut next = end.saturating_sub(self.overlap).max(start + 1);
            while next < text.len() && !text.is_char_boundary(next) {
                next += 1;
            }
            start = next;
        }
    }

    fn overlap_tail(&self, chunk: &str) -> String {
        if self.overlap == 0 {
            return String::new();
        }
        let mut start = chunk.len().saturating_sub(self.overlap);
        while !chunk.is_char_boundary(start) {
            start += 1;
        }
        chunk[start..].to_string()
    }
}
