//! Assistant text → speakable plain text.
//!
//! LLM replies arrive as markdown, often with emoji. Synthesizers read that
//! out literally ("astérisque astérisque…"), so everything routed to TTS
//! goes through [`clean_for_speech`] first.

/// Flatten markdown to plain text suitable for speech synthesis.
///
/// Structure markers (headings, emphasis, bullets, quotes) are dropped and
/// block boundaries become sentence breaks; link text survives, URLs do not.
/// Emoji and exotic whitespace are removed. Never errors; empty in, empty out.
pub fn clean_for_speech(input: &str) -> String {
    use pulldown_cmark::{Event, Options, Parser, TagEnd};

    let options =
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(input, options);

    let mut out = String::new();
    // A closed block waiting for more text; only then does the sentence
    // break materialize, so a final block never grows a stray period.
    let mut gap = false;
    for event in parser {
        match event {
            Event::Text(text) | Event::Code(text) => {
                if gap {
                    sentence_break(&mut out);
                    gap = false;
                }
                out.push_str(&text);
            }
            Event::SoftBreak | Event::HardBreak => {
                if !gap {
                    out.push(' ');
                }
            }
            // List items read as sentences even when last.
            Event::End(TagEnd::Item) => {
                close_sentence(&mut out);
                gap = true;
            }
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote(_)
                | TagEnd::TableRow,
            )
            | Event::Rule => gap = true,
            Event::End(TagEnd::TableCell) => out.push(' '),
            // Start tags, HTML, footnotes, task markers: nothing to speak.
            _ => {}
        }
    }

    tidy_whitespace(&out)
}

/// Ensure the text so far ends with terminal punctuation.
fn close_sentence(out: &mut String) {
    while out.ends_with(char::is_whitespace) {
        out.pop();
    }
    match out.chars().last() {
        None | Some('.' | '!' | '?' | ':' | ';') => {}
        Some(_) => out.push('.'),
    }
}

/// Close the current sentence and open a gap before the next one.
fn sentence_break(out: &mut String) {
    close_sentence(out);
    if !out.is_empty() {
        out.push(' ');
    }
}

/// Drop emoji, map exotic whitespace to plain spaces, collapse runs.
fn tidy_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;

    for ch in input.chars() {
        if is_pictographic(ch) {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }

    out
}

/// Emoji and pictographic symbols synthesizers should never read aloud.
fn is_pictographic(ch: char) -> bool {
    matches!(u32::from(ch),
        0x1F000..=0x1FAFF   // emoji, symbols, pictographs
        | 0x2600..=0x27BF   // misc symbols, dingbats
        | 0x2B00..=0x2BFF   // arrows and symbols
        | 0xFE00..=0xFE0F   // variation selectors
        | 0x200D            // zero-width joiner
        | 0x20E3            // combining enclosing keycap
    )
}
