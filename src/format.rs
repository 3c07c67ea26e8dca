use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

/// A rendered chat message: markdown parsed into typed blocks the view
/// can lay out. Raw HTML in the input is carried as literal text and is
/// never interpreted as markup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageDocument {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(String),
    Heading { level: u8, text: String },
    /// Fenced or indented code. `language` defaults to "plain" when the
    /// fence carries no label.
    Code { language: String, source: String },
    Bullets(Vec<String>),
    Quote(String),
}

impl MessageDocument {
    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Concatenated text content, code included.
    #[allow(dead_code)]
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Paragraph(text) | Block::Quote(text) => out.push_str(text),
                Block::Heading { text, .. } => out.push_str(text),
                Block::Code { source, .. } => out.push_str(source),
                Block::Bullets(items) => {
                    for item in items {
                        out.push_str(item);
                        out.push('\n');
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Parse markdown into a `MessageDocument`.
///
/// Inline code is kept backtick-delimited inside its surrounding text run.
/// Emphasis markers are consumed. HTML events (block or inline) become
/// literal text, which is the whole sanitization story: nothing downstream
/// ever parses message content as markup.
pub fn render(text: &str) -> MessageDocument {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    let parser = Parser::new_ext(text, options);

    let mut blocks = Vec::new();
    let mut buffer = String::new();
    let mut in_code_block = false;
    let mut code_language = String::new();
    let mut code_buffer = String::new();
    let mut quote_depth = 0usize;
    let mut list_stack: Vec<Vec<String>> = Vec::new();
    let mut heading: Option<u8> = None;

    fn flush_text(
        buffer: &mut String,
        blocks: &mut Vec<Block>,
        quote_depth: usize,
        heading: &mut Option<u8>,
    ) {
        if buffer.trim().is_empty() {
            buffer.clear();
            return;
        }
        let text = std::mem::take(buffer);
        if let Some(level) = heading.take() {
            blocks.push(Block::Heading { level, text });
        } else if quote_depth > 0 {
            blocks.push(Block::Quote(text));
        } else {
            blocks.push(Block::Paragraph(text));
        }
    }

    for event in parser {
        match event {
            Event::Text(text) => {
                if in_code_block {
                    code_buffer.push_str(&text);
                } else {
                    buffer.push_str(&text);
                }
            }
            Event::Code(code) => {
                buffer.push_str(&format!("`{}`", code));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                // Literal text, never markup.
                buffer.push_str(&html);
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                in_code_block = true;
                code_language = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.trim().is_empty() => {
                        lang.trim().to_string()
                    }
                    _ => "plain".to_string(),
                };
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                let mut source = std::mem::take(&mut code_buffer);
                if source.ends_with('\n') {
                    source.pop();
                }
                blocks.push(Block::Code {
                    language: std::mem::take(&mut code_language),
                    source,
                });
            }
            Event::Start(Tag::Heading { level, .. }) => {
                heading = Some(heading_level(level));
            }
            Event::End(TagEnd::Heading(_)) => {
                flush_text(&mut buffer, &mut blocks, quote_depth, &mut heading);
            }
            Event::Start(Tag::List(_)) => {
                list_stack.push(Vec::new());
            }
            Event::End(TagEnd::List(_)) => {
                if let Some(items) = list_stack.pop() {
                    if let Some(parent) = list_stack.last_mut() {
                        // Nested lists flatten into the enclosing one.
                        parent.extend(items);
                    } else if !items.is_empty() {
                        blocks.push(Block::Bullets(items));
                    }
                }
            }
            Event::Start(Tag::Item) => {
                buffer.clear();
            }
            Event::End(TagEnd::Item) => {
                let item = std::mem::take(&mut buffer);
                if let Some(items) = list_stack.last_mut() {
                    if !item.trim().is_empty() {
                        items.push(item.trim().to_string());
                    }
                }
            }
            Event::TaskListMarker(checked) => {
                buffer.push_str(if checked { "[x] " } else { "[ ] " });
            }
            Event::Start(Tag::BlockQuote) => {
                quote_depth += 1;
            }
            Event::End(TagEnd::BlockQuote) => {
                quote_depth = quote_depth.saturating_sub(1);
            }
            Event::End(TagEnd::Paragraph) => {
                // Inside a list item the paragraph folds into the item.
                if list_stack.is_empty() {
                    flush_text(&mut buffer, &mut blocks, quote_depth, &mut heading);
                } else if !buffer.is_empty() && !buffer.ends_with('\n') {
                    buffer.push('\n');
                }
            }
            Event::SoftBreak => {
                buffer.push(' ');
            }
            Event::HardBreak => {
                buffer.push('\n');
            }
            _ => {}
        }
    }

    flush_text(&mut buffer, &mut blocks, quote_depth, &mut heading);

    MessageDocument { blocks }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_html_stays_literal_text() {
        let doc = render("<script>alert('x')</script>");
        assert_eq!(doc.blocks.len(), 1);
        match &doc.blocks[0] {
            Block::Paragraph(text) => assert!(text.contains("<script>alert('x')</script>")),
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn inline_html_stays_literal_text() {
        let doc = render("before <img src=x onerror=alert(1)> after");
        let flat = doc.plain_text();
        assert!(flat.contains("<img src=x onerror=alert(1)>"));
        assert!(doc
            .blocks
            .iter()
            .all(|b| matches!(b, Block::Paragraph(_))));
    }

    #[test]
    fn fenced_block_carries_language() {
        let doc = render("```python\nprint('hi')\n```");
        assert_eq!(
            doc.blocks,
            vec![Block::Code {
                language: "python".to_string(),
                source: "print('hi')".to_string(),
            }]
        );
    }

    #[test]
    fn unlabeled_fence_defaults_to_plain() {
        let doc = render("```\nlet x = 1;\n```");
        match &doc.blocks[0] {
            Block::Code { language, source } => {
                assert_eq!(language, "plain");
                assert_eq!(source, "let x = 1;");
            }
            other => panic!("expected code block, got {:?}", other),
        }
    }

    #[test]
    fn inline_code_keeps_backticks() {
        let doc = render("use `Vec::new` here");
        assert_eq!(
            doc.blocks,
            vec![Block::Paragraph("use `Vec::new` here".to_string())]
        );
    }

    #[test]
    fn paragraph_structure_is_preserved() {
        let doc = render("first paragraph\n\nsecond paragraph");
        assert_eq!(
            doc.blocks,
            vec![
                Block::Paragraph("first paragraph".to_string()),
                Block::Paragraph("second paragraph".to_string()),
            ]
        );
    }

    #[test]
    fn hard_break_survives_inside_paragraph() {
        let doc = render("line one  \nline two");
        assert_eq!(
            doc.blocks,
            vec![Block::Paragraph("line one\nline two".to_string())]
        );
    }

    #[test]
    fn headings_and_bullets() {
        let doc = render("# Setup\n\n- install\n- configure\n");
        assert_eq!(
            doc.blocks,
            vec![
                Block::Heading {
                    level: 1,
                    text: "Setup".to_string()
                },
                Block::Bullets(vec!["install".to_string(), "configure".to_string()]),
            ]
        );
    }

    #[test]
    fn block_quote_is_typed() {
        let doc = render("> quoted advice");
        assert_eq!(doc.blocks, vec![Block::Quote("quoted advice".to_string())]);
    }

    #[test]
    fn mixed_document() {
        let doc = render(
            "Here is how:\n\n```rust\nfn main() {}\n```\n\nDone. See `cargo doc`.",
        );
        assert_eq!(doc.blocks.len(), 3);
        assert!(matches!(&doc.blocks[1], Block::Code { language, .. } if language == "rust"));
        assert!(
            matches!(&doc.blocks[2], Block::Paragraph(t) if t.contains("`cargo doc`"))
        );
    }

    #[test]
    fn empty_input_renders_empty_document() {
        assert!(render("").is_empty());
        assert!(render("   \n").is_empty());
    }
}
