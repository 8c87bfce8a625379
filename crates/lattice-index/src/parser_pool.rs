//! Thread-safe parser pool for tree-sitter parsers
//!
//! Tree-sitter parsers are cheap to reuse but not Sync, so parsing runs on
//! dedicated worker threads reached over a channel. Grammar registration is
//! process-wide and lazy: one grammar per syntax, registered once, with a
//! warning (not an error) on duplicate registration.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};

use dashmap::DashMap;
use tree_sitter::{Parser, Tree};

use lattice_core::{Error, Result, Syntax};

/// A parsing request sent to the parser pool.
#[derive(Debug)]
pub struct ParseRequest {
    pub syntax: Syntax,
    pub content: String,
    pub path: PathBuf,
}

/// A parsed file: the concrete syntax tree plus the source it was built
/// from. Queries need both.
#[derive(Debug)]
pub struct ParseOutcome {
    pub tree: Tree,
    pub content: String,
    pub path: PathBuf,
}

struct WorkerRequest {
    request: ParseRequest,
    grammar: tree_sitter::Language,
    response_sender: mpsc::Sender<Result<ParseOutcome>>,
}

/// Process-wide parser pool with per-syntax grammar registration.
pub struct ParserPool {
    grammars: DashMap<Syntax, tree_sitter::Language>,
    sender: mpsc::Sender<WorkerRequest>,
}

impl ParserPool {
    /// Create a pool with the given number of worker threads and no
    /// registered grammars. Most callers want [`ParserPool::global`].
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<WorkerRequest>();
        let receiver = Arc::new(Mutex::new(receiver));

        for i in 0..num_workers {
            let receiver = receiver.clone();
            std::thread::spawn(move || {
                Self::worker_thread(i, receiver);
            });
        }

        ParserPool {
            grammars: DashMap::new(),
            sender,
        }
    }

    /// The shared pool with all builtin grammars registered.
    pub fn global() -> &'static ParserPool {
        static POOL: OnceLock<ParserPool> = OnceLock::new();
        POOL.get_or_init(|| {
            let num_workers = std::thread::available_parallelism()
                .map(|n| n.get().max(2))
                .unwrap_or(2);
            let pool = ParserPool::new(num_workers);
            pool.register_builtin_grammars();
            pool
        })
    }

    /// Register a grammar for `syntax`. Duplicate registration warns and
    /// keeps the first grammar.
    pub fn register(&self, syntax: Syntax, grammar: tree_sitter::Language) {
        if self.grammars.contains_key(&syntax) {
            tracing::warn!(syntax = %syntax.as_str(), "grammar already registered, keeping first");
            return;
        }
        tracing::debug!(syntax = %syntax.as_str(), "registered grammar");
        self.grammars.insert(syntax, grammar);
    }

    pub fn register_builtin_grammars(&self) {
        self.register(Syntax::TypeScript, tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into());
        self.register(Syntax::Tsx, tree_sitter_typescript::LANGUAGE_TSX.into());
        self.register(Syntax::JavaScript, tree_sitter_javascript::LANGUAGE.into());
        self.register(Syntax::Python, tree_sitter_python::LANGUAGE.into());
        self.register(Syntax::Go, tree_sitter_go::LANGUAGE.into());
        self.register(Syntax::Java, tree_sitter_java::LANGUAGE.into());
        self.register(Syntax::Markdown, tree_sitter_md::LANGUAGE.into());
        self.register(Syntax::MarkdownInline, tree_sitter_md::INLINE_LANGUAGE.into());
    }

    fn grammar_for(&self, syntax: Syntax) -> Result<tree_sitter::Language> {
        self.grammars
            .get(&syntax)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::UnsupportedLanguage {
                path: syntax.as_str().to_string(),
            })
    }

    fn worker_thread(worker_id: usize, receiver: Arc<Mutex<mpsc::Receiver<WorkerRequest>>>) {
        tracing::debug!("parser worker {} started", worker_id);

        let mut parser = Parser::new();

        loop {
            let request = match receiver.lock().unwrap().recv() {
                Ok(req) => req,
                Err(_) => {
                    tracing::debug!("parser worker {} shutting down", worker_id);
                    break;
                }
            };

            let WorkerRequest {
                request,
                grammar,
                response_sender,
            } = request;
            let language_tag = request.syntax.language();

            if let Err(e) = parser.set_language(&grammar) {
                let _ = response_sender.send(Err(Error::ParseFailure {
                    language: language_tag.as_str().to_string(),
                    offset: 0,
                    message: format!("failed to set grammar: {e}"),
                }));
                continue;
            }

            let result = match parser.parse(&request.content, None) {
                Some(tree) => match fatal_parse_error(&tree) {
                    Some(offset) => Err(Error::ParseFailure {
                        language: language_tag.as_str().to_string(),
                        offset,
                        message: "source could not be parsed".to_string(),
                    }),
                    None => Ok(ParseOutcome {
                        tree,
                        path: request.path,
                        content: request.content,
                    }),
                },
                None => Err(Error::ParseFailure {
                    language: language_tag.as_str().to_string(),
                    offset: 0,
                    message: "parser returned no tree".to_string(),
                }),
            };

            if response_sender.send(result).is_err() {
                tracing::warn!("failed to send parse result back to caller");
            }
        }
    }

    /// Parse synchronously. Blocks the current thread until a worker picks
    /// the request up and finishes.
    pub fn parse_blocking(&self, request: ParseRequest) -> Result<ParseOutcome> {
        let grammar = self.grammar_for(request.syntax)?;
        let (response_sender, response_receiver) = mpsc::channel();

        self.sender
            .send(WorkerRequest {
                request,
                grammar,
                response_sender,
            })
            .map_err(|_| Error::ParseFailure {
                language: "unknown".to_string(),
                offset: 0,
                message: "parser pool is shut down".to_string(),
            })?;

        response_receiver.recv().map_err(|_| Error::ParseFailure {
            language: "unknown".to_string(),
            offset: 0,
            message: "parser worker died".to_string(),
        })?
    }

    /// Parse without blocking the async runtime.
    pub async fn parse(&self, request: ParseRequest) -> Result<ParseOutcome> {
        let grammar = self.grammar_for(request.syntax)?;
        let sender = self.sender.clone();
        tokio::task::spawn_blocking(move || {
            let (response_sender, response_receiver) = mpsc::channel();

            sender
                .send(WorkerRequest {
                    request,
                    grammar,
                    response_sender,
                })
                .map_err(|_| Error::ParseFailure {
                    language: "unknown".to_string(),
                    offset: 0,
                    message: "parser pool is shut down".to_string(),
                })?;

            response_receiver.recv().map_err(|_| Error::ParseFailure {
                language: "unknown".to_string(),
                offset: 0,
                message: "parser worker died".to_string(),
            })?
        })
        .await
        .map_err(|e| Error::ParseFailure {
            language: "unknown".to_string(),
            offset: 0,
            message: format!("task join error: {e}"),
        })?
    }
}

impl Clone for ParserPool {
    fn clone(&self) -> Self {
        ParserPool {
            grammars: self.grammars.clone(),
            sender: self.sender.clone(),
        }
    }
}

/// A tree whose root is a bare ERROR node carries no usable structure;
/// anything milder (recoverable ERROR subtrees) is left to the queries.
fn fatal_parse_error(tree: &Tree) -> Option<usize> {
    let root = tree.root_node();
    if root.kind() == "ERROR" {
        Some(root.start_byte())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_typescript() {
        let pool = ParserPool::global();
        let request = ParseRequest {
            syntax: Syntax::TypeScript,
            content: "export class UserService {}".to_string(),
            path: PathBuf::from("test.ts"),
        };

        let outcome = pool.parse(request).await.unwrap();
        assert_eq!(outcome.tree.root_node().kind(), "program");
    }

    #[tokio::test]
    async fn parses_markdown() {
        let pool = ParserPool::global();
        let request = ParseRequest {
            syntax: Syntax::Markdown,
            content: "# Heading\n\nSome text.\n".to_string(),
            path: PathBuf::from("README.md"),
        };

        let outcome = pool.parse(request).await.unwrap();
        assert_eq!(outcome.tree.root_node().kind(), "document");
    }

    #[test]
    fn unregistered_syntax_is_unsupported() {
        let pool = ParserPool::new(1);
        let request = ParseRequest {
            syntax: Syntax::Python,
            content: "x = 1".to_string(),
            path: PathBuf::from("a.py"),
        };
        let err = pool.parse_blocking(request).unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage { .. }));
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let pool = ParserPool::new(1);
        pool.register(Syntax::Python, tree_sitter_python::LANGUAGE.into());
        pool.register(Syntax::Python, tree_sitter_javascript::LANGUAGE.into());

        let outcome = pool
            .parse_blocking(ParseRequest {
                syntax: Syntax::Python,
                content: "def f():\n    pass\n".to_string(),
                path: PathBuf::from("a.py"),
            })
            .unwrap();
        assert_eq!(outcome.tree.root_node().kind(), "module");
    }
}
