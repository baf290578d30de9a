//! Post-processing of a finished message's HTML: copy controls on code
//! blocks and on the message itself. Both passes are idempotent.

const PRE_OPEN: &str = "<pre>";
const CODE_LANG_PREFIX: &str = "<code class=\"language-";
const COPY_BUTTON: &str =
    "<button class=\"copy-button\" aria-label=\"Copy code\" title=\"Copy to clipboard\"></button>";
const DIAGRAM_BUTTON: &str =
    "<button class=\"diagram-button\" title=\"Open diagram in a new window\"></button>";
const MESSAGE_COPY_BUTTON: &str =
    "<button class=\"message-copy-button\" aria-label=\"Copy response\" title=\"Copy response\"></button>";

/// Language of the code element that directly follows a `<pre>` tag.
fn code_language(after_pre: &str) -> Option<&str> {
    let rest = after_pre.strip_prefix(CODE_LANG_PREFIX)?;
    let end = rest.find(|c: char| c == '"' || c.is_whitespace())?;
    Some(&rest[..end]).filter(|lang| !lang.is_empty())
}

/// Add a copy button to every `<pre>` block, a language label when the code
/// element carries a `language-*` class, and a diagram button for blocks in
/// `diagram_language`. Blocks that already have controls are left alone.
pub fn add_code_block_controls(html: &str, diagram_language: &str) -> String {
    let mut out = String::with_capacity(html.len() + 256);
    let mut rest = html;

    while let Some(pos) = rest.find(PRE_OPEN) {
        let (head, tail) = rest.split_at(pos + PRE_OPEN.len());
        out.push_str(head);
        rest = tail;

        if rest.starts_with(COPY_BUTTON) {
            continue;
        }
        out.push_str(COPY_BUTTON);
        if let Some(lang) = code_language(rest) {
            out.push_str("<div class=\"language-label\">");
            out.push_str(lang);
            out.push_str("</div>");
            if lang == diagram_language {
                out.push_str(DIAGRAM_BUTTON);
            }
        }
    }

    out.push_str(rest);
    out
}

/// Append one message-level copy button.
pub fn add_message_copy_button(html: &str) -> String {
    if html.contains(MESSAGE_COPY_BUTTON) {
        return html.to_string();
    }
    format!("{html}{MESSAGE_COPY_BUTTON}")
}

/// Both decoration passes, in the order the terminal render applies them.
pub fn decorate(html: &str, diagram_language: &str) -> String {
    add_message_copy_button(&add_code_block_controls(html, diagram_language))
}
