//! Splitting of stream deltas into reveal tokens.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Word,
    Space,
    Newline,
}

fn classify(ch: char) -> Class {
    if ch == '\n' {
        Class::Newline
    } else if ch.is_whitespace() {
        Class::Space
    } else {
        Class::Word
    }
}

/// Split a fragment into reveal tokens.
///
/// A maximal run of non-whitespace is one token, a maximal run of whitespace
/// other than `\n` is one token, and every `\n` is a token of its own.
/// Concatenating the result always reproduces `fragment`.
pub fn split_fragment(fragment: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_class: Option<Class> = None;

    for ch in fragment.chars() {
        let class = classify(ch);
        let continues = current_class == Some(class) && class != Class::Newline;
        if !continues && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        current.push(ch);
        current_class = Some(class);
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
