//! Sentence boundary detection for generated prose.
//!
//! Boundaries are `.`, `!` or `?` followed by whitespace and a capital letter
//! (optionally behind a closing quote), or the end of a line. Common
//! abbreviations, decimals and ellipses never end a sentence. Line breaks
//! always do.

/// Abbreviations whose trailing period is not a sentence boundary.
const ABBREVIATIONS: &[&str] = &[
    "Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Sr.", "Jr.", "St.", "Ave.", "Blvd.", "Rd.", "vs.",
    "etc.", "i.e.", "e.g.", "Corp.", "Inc.", "Ltd.", "Co.", "Vol.", "Rev.", "Gen.", "Capt.",
    "Lt.", "Sgt.", "No.", "Nos.",
];

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | '”' | '’' | ')')
}

/// Split text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for line in text.lines() {
        split_line(line, &mut sentences);
    }
    sentences
}

fn split_line(line: &str, out: &mut Vec<String>) {
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        if !is_terminal(c) {
            i += 1;
            continue;
        }

        let mut j = i;
        while j < chars.len() && is_terminal(chars[j].1) {
            j += 1;
        }
        let run: String = chars[i..j].iter().map(|&(_, c)| c).collect();

        let mut k = j;
        while k < chars.len() && is_closing(chars[k].1) {
            k += 1;
        }
        let end = chars.get(k).map(|&(b, _)| b).unwrap_or(line.len());

        let splits = !is_ellipsis(&run)
            && !(run == "." && (is_abbreviation(line, pos) || is_decimal(&chars, i)))
            && followed_by_sentence_start(&chars, k);

        if splits {
            push_trimmed(&line[start..end], out);
            start = end;
            i = k;
        } else {
            i = j;
        }
    }

    push_trimmed(&line[start..], out);
}

fn push_trimmed(fragment: &str, out: &mut Vec<String>) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn is_ellipsis(run: &str) -> bool {
    run == "…" || (run.len() >= 3 && run.chars().all(|c| c == '.'))
}

/// Check whether the period at byte `pos` closes a known abbreviation.
fn is_abbreviation(line: &str, pos: usize) -> bool {
    let word_start = line[..pos]
        .rfind(|c: char| c.is_whitespace() || c == '(' || c == '"')
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let word = &line[word_start..=pos];
    ABBREVIATIONS.contains(&word)
}

fn is_decimal(chars: &[(usize, char)], i: usize) -> bool {
    let before = i.checked_sub(1).map(|b| chars[b].1);
    let after = chars.get(i + 1).map(|&(_, c)| c);
    matches!((before, after), (Some(b), Some(a)) if b.is_ascii_digit() && a.is_ascii_digit())
}

fn followed_by_sentence_start(chars: &[(usize, char)], k: usize) -> bool {
    let Some(&(_, next)) = chars.get(k) else {
        return true;
    };
    if !next.is_whitespace() {
        return false;
    }
    chars[k..]
        .iter()
        .map(|&(_, c)| c)
        .find(|c| !c.is_whitespace())
        .map(|c| c.is_uppercase() || c.is_ascii_digit() || matches!(c, '"' | '“' | '\''))
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_split() {
        let sentences = split_sentences("The king fell. The queen wept! Who ruled next?");
        assert_eq!(
            sentences,
            vec!["The king fell.", "The queen wept!", "Who ruled next?"]
        );
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        let sentences =
            split_sentences("Dr. Mira Vance arrived with Gen. Kael. They spoke at dawn.");
        assert_eq!(
            sentences,
            vec!["Dr. Mira Vance arrived with Gen. Kael.", "They spoke at dawn."]
        );
    }

    #[test]
    fn test_ellipsis_and_decimals() {
        let sentences = split_sentences("He waited... Then nothing. The tax rose to 3.5 percent.");
        assert_eq!(
            sentences,
            vec!["He waited... Then nothing.", "The tax rose to 3.5 percent."]
        );
    }

    #[test]
    fn test_quotes_and_lowercase_continuation() {
        let sentences = split_sentences("\"Stop!\" she cried. \"Run.\" He ran.");
        assert_eq!(sentences, vec!["\"Stop!\" she cried.", "\"Run.\"", "He ran."]);
    }

    #[test]
    fn test_line_breaks_are_boundaries() {
        let sentences = split_sentences("## Event 2\n\nKing Alaric was slain\nThe end.");
        assert_eq!(sentences, vec!["## Event 2", "King Alaric was slain", "The end."]);
    }

    #[test]
    fn test_empty() {
        assert!(split_sentences("   \n  ").is_empty());
    }
}
