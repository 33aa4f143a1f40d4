//! Boundary-aware splitting of fetched text into bounded segments.

use unicode_segmentation::UnicodeSegmentation;

/// Splits text into non-overlapping segments of at most `max_chars`
/// characters.
///
/// Split points prefer paragraph boundaries (newlines from the markup
/// stripper), fall back to sentence boundaries for oversized paragraphs, and
/// hard-truncate at character boundaries as a last resort. Concatenating the
/// returned segments preserves every non-whitespace character of the input.
#[derive(Clone, Copy, Debug)]
pub struct TextChunker {
    max_chars: usize,
}

impl TextChunker {
    pub fn new(max_chars: usize) -> Self {
        assert!(max_chars > 0, "chunk length bound must be positive");
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Splits `text` into segments. Whitespace-only input yields no segments.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut current_chars = 0usize;

        for paragraph in text.split('\n').map(str::trim).filter(|p| !p.is_empty()) {
            let para_chars = paragraph.chars().count();

            if para_chars > self.max_chars {
                // Oversized paragraph: flush what we have and fall back to
                // sentence-level accumulation.
                self.flush(&mut segments, &mut current, &mut current_chars);
                self.chunk_sentences(paragraph, &mut segments, &mut current, &mut current_chars);
                continue;
            }

            // +1 for the joining newline when current is non-empty.
            let joined = if current.is_empty() {
                para_chars
            } else {
                current_chars + 1 + para_chars
            };
            if joined > self.max_chars {
                self.flush(&mut segments, &mut current, &mut current_chars);
                current.push_str(paragraph);
                current_chars = para_chars;
            } else {
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(paragraph);
                current_chars = joined;
            }
        }

        self.flush(&mut segments, &mut current, &mut current_chars);
        segments
    }

    fn chunk_sentences(
        &self,
        paragraph: &str,
        segments: &mut Vec<String>,
        current: &mut String,
        current_chars: &mut usize,
    ) {
        for sentence in paragraph.split_sentence_bounds() {
            let sentence_chars = sentence.chars().count();

            if sentence_chars > self.max_chars {
                self.flush(segments, current, current_chars);
                hard_split(sentence, self.max_chars, segments);
                continue;
            }

            if *current_chars + sentence_chars > self.max_chars {
                self.flush(segments, current, current_chars);
            }
            current.push_str(sentence);
            *current_chars += sentence_chars;
        }
    }

    fn flush(&self, segments: &mut Vec<String>, current: &mut String, current_chars: &mut usize) {
        if !current.trim().is_empty() {
            segments.push(std::mem::take(current));
        } else {
            current.clear();
        }
        *current_chars = 0;
    }
}

/// Last-resort split at character boundaries, never exceeding `max_chars`.
fn hard_split(text: &str, max_chars: usize, segments: &mut Vec<String>) {
    let mut piece = String::new();
    let mut count = 0usize;
    for ch in text.chars() {
        piece.push(ch);
        count += 1;
        if count == max_chars {
            segments.push(std::mem::take(&mut piece));
            count = 0;
        }
    }
    if !piece.trim().is_empty() {
        segments.push(piece);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn whitespace_only_input_yields_no_chunks() {
        let chunker = TextChunker::new(100);
        assert!(chunker.chunk("   \n\t  \n").is_empty());
        assert!(chunker.chunk("").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = TextChunker::new(100);
        let chunks = chunker.chunk("A short paragraph.");
        assert_eq!(chunks, vec!["A short paragraph.".to_string()]);
    }

    #[test]
    fn every_chunk_respects_the_length_bound() {
        let chunker = TextChunker::new(40);
        let text = "First paragraph with some words.\nSecond paragraph, also with words.\n\
                    A third one that is quite a bit longer than the bound allows, \
                    so it must be divided across several segments without loss.";
        let chunks = chunker.chunk(text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(
                chunk.chars().count() <= 40,
                "chunk exceeded bound: {chunk:?}"
            );
        }
    }

    #[test]
    fn concatenation_preserves_non_whitespace_characters() {
        let chunker = TextChunker::new(25);
        let text = "Alpha beta gamma delta.\nEpsilon zeta eta theta iota kappa lambda.\n\
                    Mu nu xi omicron pi rho sigma tau upsilon phi chi psi omega.";
        let chunks = chunker.chunk(text);
        assert_eq!(
            non_whitespace(&chunks.concat()),
            non_whitespace(text),
            "no silent data loss beyond whitespace"
        );
    }

    #[test]
    fn paragraph_boundaries_are_preferred() {
        let chunker = TextChunker::new(30);
        let chunks = chunker.chunk("First short paragraph.\nSecond short paragraph.");
        // Each paragraph fits alone but not joined, so the split lands on the
        // paragraph boundary.
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "First short paragraph.");
        assert_eq!(chunks[1], "Second short paragraph.");
    }

    #[test]
    fn oversized_sentence_is_hard_truncated() {
        let chunker = TextChunker::new(10);
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks, vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let chunker = TextChunker::new(4);
        let chunks = chunker.chunk("ααββγγδδεε");
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 4);
        }
        assert_eq!(non_whitespace(&chunks.concat()), "ααββγγδδεε");
    }
}
