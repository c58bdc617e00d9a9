//! Recognition of pdb's own output ("chrome") so it is never forwarded as program output.

use once_cell::sync::Lazy;
use regex::Regex;

static PROMPT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\s*\(Pdb\)\s?)+").expect("valid prompt regex"));

const PROMPT: &str = "(Pdb) ";

static CHROME_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^\s*$
        | ^>\s.*\(\d+\)\S*\(\)           # frame marker:  > /tmp/x.py(3)<module>()
        | ^->\s                          # current line marker
        | ^--(?:Return|Call)--$
        | ^Uncaught\ exception\.\ Entering\ post\ mortem\ debugging
        | ^Running\ 'cont'\ or\ 'step'\ will\ restart\ the\ program
        | ^Post\ mortem\ debugger\ finished
        | ^The\ program\ finished\ and\ will\ be\ restarted
        | ^Restarting\ .*\ with\ arguments:
        ",
    )
    .expect("valid chrome regex")
});

static EXCEPTION_SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z_][\w.]*)?(?:Error|Exception|Interrupt|Exit)(?::\s.*)?$")
        .expect("valid exception regex")
});

/// Remove any number of leading `(Pdb) ` prompts.
pub fn strip_prompts(line: &str) -> &str {
    match PROMPT_PREFIX.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

/// True for debugger prompts, frame markers, return markers and restart notices.
pub fn is_chrome(line: &str) -> bool {
    CHROME_LINE.is_match(strip_prompts(line).trim_end_matches('\r'))
}

/// `ValueError: bad input` style summary lines printed when the program raises.
pub fn exception_summary(line: &str) -> Option<&str> {
    let line = strip_prompts(line).trim();
    EXCEPTION_SUMMARY.is_match(line).then_some(line)
}

/// Text written before a trailing `(Pdb) ` prompt, or `None` when `pending` does not end in one.
///
/// pdb prints its prompt without a newline, so the reader checks its unterminated tail with this.
pub fn before_prompt(pending: &str) -> Option<&str> {
    let mut rest = pending.strip_suffix(PROMPT)?;
    while let Some(shorter) = rest.strip_suffix(PROMPT) {
        rest = shorter;
    }
    Some(rest)
}
