//! Cleanup for text that went through PDF extraction.
//!
//! Extraction of some PDFs yields words with a space between every glyph
//! ("n e t   p r o f i t"). [`repair_spaced_letters`] glues such runs back
//! together and [`collapse_whitespace`] then folds what is left. The repair is
//! a heuristic: two genuine one-character words separated by a single space
//! ("a b") are merged too.
//!
//! `normalize` is not idempotent on every input. The repair runs before the
//! collapse, so `"a  b"` becomes `"a b"` and a second pass turns that into
//! `"ab"`. Text that has already been repaired is stable.

enum Piece<'a> {
    Token(&'a str),
    Gap(&'a str),
}

fn is_single_char(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some() && chars.next().is_none()
}

/// Splits `text` into alternating runs of non-whitespace and whitespace.
fn pieces(text: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_gap: Option<bool> = None;

    for (index, c) in text.char_indices() {
        let is_gap = c.is_whitespace();
        match in_gap {
            Some(previous) if previous != is_gap => {
                let run = &text[start..index];
                out.push(if previous { Piece::Gap(run) } else { Piece::Token(run) });
                start = index;
                in_gap = Some(is_gap);
            }
            Some(_) => {}
            None => in_gap = Some(is_gap),
        }
    }
    if let Some(previous) = in_gap {
        let run = &text[start..];
        out.push(if previous { Piece::Gap(run) } else { Piece::Token(run) });
    }
    out
}

/// Joins runs of one-character tokens separated by single whitespace
/// characters, provided the run contains at least one letter.
///
/// Gaps of two or more whitespace characters end a run, which is what keeps
/// the repaired words apart in `"n e t   p r o f i t"`. Runs made only of
/// digits and symbols (`"1 2 3"`) are left alone.
pub fn repair_spaced_letters(text: &str) -> String {
    let pieces = pieces(text);
    let mut repaired = String::with_capacity(text.len());
    let mut index = 0;

    while index < pieces.len() {
        let token = match pieces[index] {
            Piece::Gap(gap) => {
                repaired.push_str(gap);
                index += 1;
                continue;
            }
            Piece::Token(token) => token,
        };

        let mut end = index;
        if is_single_char(token) {
            while let (Some(Piece::Gap(gap)), Some(Piece::Token(next))) =
                (pieces.get(end + 1), pieces.get(end + 2))
            {
                if !is_single_char(gap) || !is_single_char(next) {
                    break;
                }
                end += 2;
            }
        }

        let run = &pieces[index..=end];
        let has_letter = run.iter().any(|piece| match piece {
            Piece::Token(token) => token.chars().any(char::is_alphabetic),
            Piece::Gap(_) => false,
        });
        for piece in run {
            match piece {
                Piece::Token(token) => repaired.push_str(token),
                Piece::Gap(gap) if !has_letter => repaired.push_str(gap),
                Piece::Gap(_) => {}
            }
        }
        index = end + 1;
    }

    repaired
}

/// Replaces every whitespace run with one space and trims both ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Repairs spaced-out glyphs, then collapses whitespace. The order matters:
/// the repair only fires on single-character gaps, which the collapse would
/// otherwise manufacture out of wider ones.
pub fn normalize(text: &str) -> String {
    collapse_whitespace(&repair_spaced_letters(text))
}
