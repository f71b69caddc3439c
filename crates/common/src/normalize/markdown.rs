// Markdown blob → canonical blocks, for documents stored before block content.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag, TagEnd};
use serde_json::Value;

use crate::types::{Block, BlockKind};

/// Container currently collecting text.
#[derive(Debug)]
enum Open {
    Heading { level: u8 },
    Paragraph,
    Quote,
    Code { language: String },
    List { ordered: bool, items: Vec<String> },
}

#[derive(Debug, Default)]
struct Builder {
    blocks: Vec<Block>,
    open: Option<Open>,
    text: String,
    list_depth: usize,
    quote_depth: usize,
    image: Option<(String, String)>,
}

/// Split a Markdown document into canonical blocks.
///
/// Block metadata is filled the same way the normalizer fills it, so the
/// result is already canonical.
pub fn blocks_from_markdown(markdown: &str) -> Vec<Block> {
    let mut builder = Builder::default();

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { level, .. }) if builder.is_top_level() => {
                builder.open(Open::Heading { level: level_to_u8(level) });
            }
            Event::End(TagEnd::Heading(_)) if builder.is_top_level() => builder.close(),

            Event::Start(Tag::Paragraph) if builder.is_top_level() => builder.open(Open::Paragraph),
            Event::End(TagEnd::Paragraph) if builder.is_top_level() => builder.close(),
            Event::End(TagEnd::Paragraph) if builder.quote_depth > 0 => builder.text.push('\n'),

            Event::Start(Tag::BlockQuote(_)) => {
                if builder.is_top_level() {
                    builder.open(Open::Quote);
                }
                builder.quote_depth += 1;
            }
            Event::End(TagEnd::BlockQuote(_)) => {
                builder.quote_depth = builder.quote_depth.saturating_sub(1);
                if builder.is_top_level() {
                    builder.close();
                }
            }

            Event::Start(Tag::CodeBlock(kind)) if builder.is_top_level() => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                builder.open(Open::Code { language });
            }
            Event::End(TagEnd::CodeBlock) if matches!(builder.open, Some(Open::Code { .. })) => {
                builder.close();
            }

            Event::Start(Tag::List(first_item)) => {
                if builder.is_top_level() {
                    builder.open(Open::List { ordered: first_item.is_some(), items: Vec::new() });
                }
                builder.list_depth += 1;
            }
            Event::End(TagEnd::List(_)) => {
                builder.list_depth = builder.list_depth.saturating_sub(1);
                if builder.is_top_level() {
                    builder.close();
                }
            }
            Event::Start(Tag::Item) => builder.finish_item(),
            Event::End(TagEnd::Item) => builder.finish_item(),

            Event::Start(Tag::Image { dest_url, .. }) if builder.is_top_level() => {
                builder.flush_paragraph();
                builder.image = Some((dest_url.to_string(), String::new()));
            }
            Event::End(TagEnd::Image) if builder.image.is_some() => builder.finish_image(),

            Event::Rule if builder.is_top_level() => {
                let id = builder.next_id();
                builder.blocks.push(Block::new(id, BlockKind::Divider, ""));
            }

            Event::Text(text) | Event::Code(text) => builder.push_text(&text),
            Event::SoftBreak => builder.push_text(" "),
            Event::HardBreak => builder.push_text("\n"),
            _ => {}
        }
    }

    builder.close();
    builder.blocks
}

impl Builder {
    fn is_top_level(&self) -> bool {
        self.list_depth == 0 && self.quote_depth == 0
    }

    fn next_id(&self) -> String {
        format!("block-{}", self.blocks.len())
    }

    fn open(&mut self, open: Open) {
        self.close();
        self.open = Some(open);
    }

    fn push_text(&mut self, text: &str) {
        match self.image.as_mut() {
            Some((_, alt)) => alt.push_str(text),
            None => self.text.push_str(text),
        }
    }

    fn finish_item(&mut self) {
        if let Some(Open::List { items, .. }) = self.open.as_mut() {
            let item = self.text.trim();
            if !item.is_empty() {
                items.push(item.to_string());
            }
            self.text.clear();
        }
    }

    /// Emit text collected so far in the current paragraph, keeping the
    /// paragraph open for text after an inline image.
    fn flush_paragraph(&mut self) {
        if !matches!(self.open, Some(Open::Paragraph)) {
            return;
        }
        let text = self.text.trim();
        if !text.is_empty() {
            let block = Block::paragraph(self.next_id(), text);
            self.blocks.push(block);
        }
        self.text.clear();
    }

    fn finish_image(&mut self) {
        if let Some((url, alt)) = self.image.take() {
            let block = Block::image(self.next_id(), url).with_meta("caption", Value::String(alt));
            self.blocks.push(block);
        }
    }

    fn close(&mut self) {
        let Some(open) = self.open.take() else {
            self.text.clear();
            return;
        };
        let text = std::mem::take(&mut self.text);
        let id = self.next_id();

        let block = match open {
            Open::Heading { level } => Some(Block::heading(id, level, text.trim())),
            Open::Paragraph => {
                let text = text.trim();
                (!text.is_empty()).then(|| Block::paragraph(id, text))
            }
            Open::Quote => {
                let text = text.trim();
                (!text.is_empty()).then(|| {
                    Block::new(id, BlockKind::Quote, text)
                        .with_meta("author", Value::String(String::new()))
                })
            }
            Open::Code { language } => Some(
                Block::new(id, BlockKind::Code, text.trim_end_matches('\n'))
                    .with_meta("language", Value::String(language)),
            ),
            Open::List { ordered, mut items } => {
                let tail = text.trim();
                if !tail.is_empty() {
                    items.push(tail.to_string());
                }
                (!items.is_empty()).then(|| {
                    Block::new(id, BlockKind::List, items.join("\n"))
                        .with_meta("ordered", Value::Bool(ordered))
                })
            }
        };

        if let Some(block) = block {
            self.blocks.push(block);
        }
    }
}

fn level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
