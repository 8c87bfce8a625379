//! Markdown analyzer
//!
//! Runs the block queries over the parsed tree and re-parses the source
//! with the inline grammar to pick up `[text](dest)` links.

use lattice_core::{Result, Syntax};

use super::{FileAnalysis, LanguageAnalyzer, MarkdownAnalysis};
use crate::parser_pool::{ParseOutcome, ParseRequest, ParserPool};
use crate::queries::markdown::MarkdownQueries;

pub struct MarkdownAnalyzer;

impl LanguageAnalyzer for MarkdownAnalyzer {
    fn analyze(&self, pool: &ParserPool, outcome: &ParseOutcome) -> Result<FileAnalysis> {
        let queries = MarkdownQueries::get();
        let root = outcome.tree.root_node();
        let source = outcome.content.as_str();

        let mut links = queries.reference_links(root, source);

        match pool.parse_blocking(ParseRequest {
            syntax: Syntax::MarkdownInline,
            content: outcome.content.clone(),
            path: outcome.path.clone(),
        }) {
            Ok(inline) => {
                links.extend(queries.inline_links(inline.tree.root_node(), source));
            }
            Err(e) => {
                tracing::warn!(path = %outcome.path.display(), error = %e, "inline link pass failed");
            }
        }

        Ok(FileAnalysis {
            markdown: Some(MarkdownAnalysis {
                headings: queries.headings(root, source),
                links,
                code_fences: queries.code_fences(root, source),
                front_matter_keys: queries.front_matter_keys(root, source),
            }),
            ..Default::default()
        })
    }
}
