//! Markdown catalog queries
//!
//! Headings, fences and front matter come from the block grammar. Inline
//! links live in the separate inline grammar, so the link query runs over a
//! second parse of the same source with `Syntax::MarkdownInline`.

use std::sync::OnceLock;

use tree_sitter::{Node, Query};

use super::*;

const BLOCK: &str = r#"
(atx_heading (inline) @text) @heading
(fenced_code_block) @fence
(minus_metadata) @front_matter
(link_reference_definition (link_label) @label (link_destination) @dest)
"#;

const INLINE: &str = r#"
(inline_link (link_text) @text (link_destination) @dest)
"#;

pub struct MarkdownQueries {
    block: Query,
    inline: Query,
}

impl MarkdownQueries {
    pub fn get() -> &'static Self {
        static QUERIES: OnceLock<MarkdownQueries> = OnceLock::new();
        QUERIES.get_or_init(|| MarkdownQueries {
            block: compile(&tree_sitter_md::LANGUAGE.into(), "md-block", BLOCK),
            inline: compile(&tree_sitter_md::INLINE_LANGUAGE.into(), "md-link", INLINE),
        })
    }

    pub fn headings(&self, block_root: Node<'_>, source: &str) -> Vec<Hit<MdHeading>> {
        let mut hits = Vec::new();
        for_each_match(&self.block, block_root, source, |m| {
            let Some(heading) = m.node("heading") else { return };
            let Some(text_node) = m.node("text") else { return };
            hits.push(Hit {
                location: location(&heading),
                text: node_text(&text_node, source).trim().to_string(),
                value: MdHeading {
                    level: heading_level(&heading),
                    text: node_text(&text_node, source).trim().to_string(),
                },
            });
        });
        hits
    }

    pub fn code_fences(&self, block_root: Node<'_>, source: &str) -> Vec<Hit<MdCodeFence>> {
        let mut hits = Vec::new();
        for_each_match(&self.block, block_root, source, |m| {
            let Some(fence) = m.node("fence") else { return };
            hits.push(Hit {
                location: location(&fence),
                text: node_text(&fence, source).to_string(),
                value: MdCodeFence {
                    language: fence_language(&fence, source),
                },
            });
        });
        hits
    }

    pub fn front_matter_keys(&self, block_root: Node<'_>, source: &str) -> Vec<Hit<MdFrontMatterKey>> {
        let mut hits = Vec::new();
        for_each_match(&self.block, block_root, source, |m| {
            let Some(block) = m.node("front_matter") else { return };
            let body = node_text(&block, source);
            for line in body.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with("---") || trimmed.starts_with('#') {
                    continue;
                }
                // Top-level keys only; indented lines belong to nested values.
                if line.starts_with(char::is_whitespace) {
                    continue;
                }
                if let Some((key, _)) = trimmed.split_once(':') {
                    hits.push(Hit {
                        location: location(&block),
                        text: trimmed.to_string(),
                        value: MdFrontMatterKey {
                            key: key.trim().to_string(),
                        },
                    });
                }
            }
        });
        hits
    }

    /// Reference-style link definitions from the block tree.
    pub fn reference_links(&self, block_root: Node<'_>, source: &str) -> Vec<Hit<MdLink>> {
        let mut hits = Vec::new();
        for_each_match(&self.block, block_root, source, |m| {
            let Some(label) = m.node("label") else { return };
            let Some(dest) = m.node("dest") else { return };
            hits.push(Hit {
                location: location(&label),
                text: node_text(&label, source).to_string(),
                value: MdLink {
                    text: node_text(&label, source).trim_matches(['[', ']']).to_string(),
                    destination: node_text(&dest, source).to_string(),
                },
            });
        });
        hits
    }

    /// Inline `[text](dest)` links from the inline tree.
    pub fn inline_links(&self, inline_root: Node<'_>, source: &str) -> Vec<Hit<MdLink>> {
        let mut hits = Vec::new();
        for_each_match(&self.inline, inline_root, source, |m| {
            let Some(text_node) = m.node("text") else { return };
            let Some(dest) = m.node("dest") else { return };
            hits.push(Hit {
                location: location(&text_node),
                text: node_text(&text_node, source).to_string(),
                value: MdLink {
                    text: node_text(&text_node, source).to_string(),
                    destination: node_text(&dest, source).to_string(),
                },
            });
        });
        hits
    }
}

fn heading_level(heading: &Node<'_>) -> u8 {
    let mut cursor = heading.walk();
    for child in heading.children(&mut cursor) {
        match child.kind() {
            "atx_h1_marker" => return 1,
            "atx_h2_marker" => return 2,
            "atx_h3_marker" => return 3,
            "atx_h4_marker" => return 4,
            "atx_h5_marker" => return 5,
            "atx_h6_marker" => return 6,
            _ => {}
        }
    }
    1
}

fn fence_language(fence: &Node<'_>, source: &str) -> Option<String> {
    let mut cursor = fence.walk();
    for child in fence.children(&mut cursor) {
        if child.kind() == "info_string" {
            let text = node_text(&child, source).trim();
            if !text.is_empty() {
                return Some(text.split_whitespace().next().unwrap_or(text).to_string());
            }
        }
    }
    None
}
