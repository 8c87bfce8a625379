//! Language-specific analysis records → graph records
//!
//! Drives the parser pool and the query catalog for one file, classifies
//! import specs, and emits node records and edge drafts in source order:
//! the file node first, then declarations, then import/export edges whose
//! targets are known files, synthetic packages, or unknown placeholders.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use lattice_core::model::dependency_kind;
use lattice_core::registry::edge_types;
use lattice_core::{
    EdgeDraft, Error, Language, Metadata, NodeIdentifier, NodeKind, NodeRecord, Result,
    SourceLocation, Syntax, UnknownSymbolRecord,
};

use crate::languages::{FileAnalysis, analyzer_for};
use crate::parser_pool::{ParseRequest, ParserPool};
use crate::queries::{ExportKind, ImportMechanism, ReferenceContext};

/// Default cap on analyzable file size. Generated bundles are the only
/// common sources above this.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// Node.js builtin modules, classified as `builtin` packages.
const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "cluster", "console", "crypto", "dns", "events", "fs",
    "http", "http2", "https", "module", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "stream", "string_decoder", "timers", "tls", "tty", "url", "util",
    "v8", "vm", "worker_threads", "zlib",
];

/// Import spec classification per the ingestion contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportClass {
    Local,
    Package { library: String, builtin: bool },
}

/// Classify an import spec. `./`-, `../`- and repository-rooted specs are
/// local; scoped packages keep their first two path segments.
pub fn classify_import(spec: &str) -> ImportClass {
    if spec.starts_with("./") || spec.starts_with("../") || spec.starts_with('/') {
        return ImportClass::Local;
    }
    // The node: scheme names builtins explicitly; canonicalize it away.
    let spec = spec.strip_prefix("node:").unwrap_or(spec);
    let library = if spec.starts_with('@') {
        spec.splitn(3, '/').take(2).collect::<Vec<_>>().join("/")
    } else {
        spec.split('/').next().unwrap_or(spec).to_string()
    };
    let builtin = NODE_BUILTINS.contains(&library.as_str());
    ImportClass::Package { library, builtin }
}

/// Resolves a local import spec to a repository-relative file path. The
/// coordinator backs this with the store and the filesystem.
pub trait ImportTargetResolver: Send + Sync {
    fn resolve(&self, from_file: &str, spec: &str) -> Option<String>;
}

/// Everything extraction produced for one file, ready for `replace_file`.
#[derive(Debug, Default)]
pub struct Extraction {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeDraft>,
    pub unknowns: Vec<UnknownSymbolRecord>,
    /// Constructs that failed to map; extraction continues past them.
    pub warnings: Vec<String>,
}

pub struct Extractor {
    pool: &'static ParserPool,
    project: String,
    max_file_bytes: u64,
}

impl Extractor {
    pub fn new(project: impl Into<String>) -> Self {
        Extractor {
            pool: ParserPool::global(),
            project: project.into(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn with_max_file_bytes(mut self, limit: u64) -> Self {
        self.max_file_bytes = limit;
        self
    }

    /// Parse and extract one file. `path` is repository-relative.
    pub fn extract(
        &self,
        path: &str,
        content: &str,
        resolver: &dyn ImportTargetResolver,
    ) -> Result<Extraction> {
        if content.len() as u64 > self.max_file_bytes {
            return Err(Error::OversizeFile {
                path: path.to_string(),
                size: content.len() as u64,
                limit: self.max_file_bytes,
            });
        }

        let syntax = Syntax::detect(std::path::Path::new(path))?;
        let language = syntax.language();

        let outcome = self.pool.parse_blocking(ParseRequest {
            syntax,
            content: content.to_string(),
            path: PathBuf::from(path),
        })?;

        let analysis = analyzer_for(syntax).analyze(self.pool, &outcome)?;

        let mut builder = ExtractionBuilder::new(&self.project, path, language, resolver);
        builder.file_node();
        builder.collect_import_bindings(&analysis);
        builder.declarations(&analysis);
        builder.imports(&analysis);
        builder.exports(&analysis);
        if let Some(markdown) = &analysis.markdown {
            builder.markdown(markdown);
        }
        builder.unknown_references(&analysis);
        Ok(builder.finish())
    }
}

/// `:`/`/`/`#` are forbidden in identifier names; display names keep the
/// original spelling.
fn sanitize_name(name: &str) -> String {
    name.replace(['#', ':'], "-").replace('/', "__")
}

struct ExtractionBuilder<'a> {
    project: &'a str,
    path: &'a str,
    language: Language,
    resolver: &'a dyn ImportTargetResolver,
    out: Extraction,
    /// Identifiers already emitted, to keep node emission idempotent.
    seen_nodes: HashSet<String>,
    /// Local names declared in this file, with their kinds.
    declared: Vec<(String, NodeKind)>,
    /// Classes and interfaces of this file, known before emission so
    /// heritage edges can point forward.
    forward_declared: HashMap<String, NodeKind>,
    /// Local names bound by imports.
    imported: HashSet<String>,
}

impl<'a> ExtractionBuilder<'a> {
    fn new(
        project: &'a str,
        path: &'a str,
        language: Language,
        resolver: &'a dyn ImportTargetResolver,
    ) -> Self {
        ExtractionBuilder {
            project,
            path,
            language,
            resolver,
            out: Extraction::default(),
            seen_nodes: HashSet::new(),
            declared: Vec::new(),
            forward_declared: HashMap::new(),
            imported: HashSet::new(),
        }
    }

    fn file_identifier(&self) -> NodeIdentifier {
        NodeIdentifier::file(self.project, self.path).expect("file names have no forbidden chars")
    }

    fn push_node(&mut self, record: NodeRecord) {
        if self.seen_nodes.insert(record.identifier.to_string()) {
            self.out.nodes.push(record);
        }
    }

    fn file_node(&mut self) {
        let identifier = self.file_identifier();
        let name = identifier.name.clone();
        let record = NodeRecord::new(identifier, NodeKind::File, name)
            .with_source_file(self.path)
            .with_language(self.language);
        self.push_node(record);
    }

    fn member(&mut self, kind: NodeKind, name: &str, location: SourceLocation, metadata: Metadata) {
        let identifier = match NodeIdentifier::member(self.project, self.path, kind, &sanitize_name(name)) {
            Ok(id) => id,
            Err(e) => {
                self.out.warnings.push(format!("{name}: {e}"));
                return;
            }
        };
        let mut record = NodeRecord::new(identifier.clone(), kind, name)
            .with_source_file(self.path)
            .with_language(self.language)
            .with_location(location);
        record.metadata = metadata;
        self.push_node(record);
        self.declared.push((name.to_string(), kind));

        self.out.edges.push(
            EdgeDraft::explicit(self.file_identifier(), identifier, edge_types::CONTAINS)
                .with_metadata("line", location.line.to_string()),
        );
    }

    fn declarations(&mut self, analysis: &FileAnalysis) {
        // Ordered emission: collect everything, then sort by source offset.
        enum Decl {
            Class(usize),
            Interface(usize),
            Function(usize),
            Method(usize),
            Variable(usize),
        }
        let decls = &analysis.declarations;

        // Heritage targets may be declared later in the file; know every
        // name before any edge is drafted.
        for hit in &decls.classes {
            self.forward_declared.insert(hit.value.name.clone(), NodeKind::Class);
        }
        for hit in &decls.interfaces {
            self.forward_declared.insert(hit.value.name.clone(), NodeKind::Interface);
        }

        let mut ordered: Vec<(u32, Decl)> = Vec::new();
        for (i, hit) in decls.classes.iter().enumerate() {
            ordered.push((hit.location.start_offset, Decl::Class(i)));
        }
        for (i, hit) in decls.interfaces.iter().enumerate() {
            ordered.push((hit.location.start_offset, Decl::Interface(i)));
        }
        for (i, hit) in decls.functions.iter().enumerate() {
            ordered.push((hit.location.start_offset, Decl::Function(i)));
        }
        for (i, hit) in decls.methods.iter().enumerate() {
            ordered.push((hit.location.start_offset, Decl::Method(i)));
        }
        for (i, hit) in decls.variables.iter().enumerate() {
            ordered.push((hit.location.start_offset, Decl::Variable(i)));
        }
        ordered.sort_by_key(|(offset, _)| *offset);

        for (_, decl) in ordered {
            match decl {
                Decl::Class(i) => {
                    let hit = decls.classes[i].clone();
                    let mut metadata = Metadata::new();
                    if hit.value.is_abstract {
                        metadata.insert("abstract".into(), "true".into());
                    }
                    self.member(NodeKind::Class, &hit.value.name, hit.location, metadata);
                    if let Some(base) = &hit.value.extends {
                        self.heritage_edge(&hit.value.name, NodeKind::Class, base, edge_types::EXTENDS, hit.location);
                    }
                    for iface in &hit.value.implements {
                        self.heritage_edge(&hit.value.name, NodeKind::Class, iface, edge_types::IMPLEMENTS, hit.location);
                    }
                }
                Decl::Interface(i) => {
                    let hit = decls.interfaces[i].clone();
                    self.member(NodeKind::Interface, &hit.value.name, hit.location, Metadata::new());
                    for base in &hit.value.extends {
                        self.heritage_edge(&hit.value.name, NodeKind::Interface, base, edge_types::EXTENDS, hit.location);
                    }
                }
                Decl::Function(i) => {
                    let hit = decls.functions[i].clone();
                    self.member(NodeKind::Function, &hit.value.name, hit.location, Metadata::new());
                }
                Decl::Method(i) => {
                    let hit = decls.methods[i].clone();
                    let qualified = match &hit.value.owner {
                        Some(owner) => format!("{owner}.{}", hit.value.name),
                        None => hit.value.name.clone(),
                    };
                    let mut metadata = Metadata::new();
                    if let Some(owner) = &hit.value.owner {
                        metadata.insert("owner".into(), owner.clone());
                    }
                    self.member(NodeKind::Method, &qualified, hit.location, metadata);
                }
                Decl::Variable(i) => {
                    let hit = decls.variables[i].clone();
                    self.member(NodeKind::Variable, &hit.value.name, hit.location, Metadata::new());
                }
            }
        }
    }

    /// `extends`/`implements` edge when the named base is declared in this
    /// file; otherwise the name joins the unknown symbols.
    fn heritage_edge(
        &mut self,
        from_name: &str,
        from_kind: NodeKind,
        target_name: &str,
        edge_type: &str,
        location: SourceLocation,
    ) {
        let target_kind = self.forward_declared.get(target_name).copied();
        let Ok(source) =
            NodeIdentifier::member(self.project, self.path, from_kind, &sanitize_name(from_name))
        else {
            return;
        };
        match target_kind {
            Some(kind) => {
                if let Ok(target) =
                    NodeIdentifier::member(self.project, self.path, kind, &sanitize_name(target_name))
                {
                    self.out.edges.push(
                        EdgeDraft::explicit(source, target, edge_type)
                            .with_metadata("line", location.line.to_string()),
                    );
                }
            }
            None => {
                self.out.unknowns.push(UnknownSymbolRecord {
                    name: target_name.to_string(),
                    kind: NodeKind::Class,
                    source_file: self.path.to_string(),
                    line: location.line,
                    column: location.column,
                    is_imported: self.imported.contains(target_name),
                    is_alias: false,
                    confidence: 0.7,
                });
            }
        }
    }

    /// Local names bound by imports; needed before declarations are walked
    /// so heritage targets can tell imported bases from unknowns.
    fn collect_import_bindings(&mut self, analysis: &FileAnalysis) {
        for hit in &analysis.imports.named {
            self.imported.insert(hit.value.name.clone());
        }
        for hit in &analysis.imports.defaults {
            self.imported.insert(hit.value.name.clone());
        }
        for hit in &analysis.imports.namespaces {
            self.imported.insert(hit.value.alias.clone());
        }
        for hit in &analysis.imports.types {
            self.imported
                .insert(hit.value.alias.clone().unwrap_or_else(|| hit.value.type_name.clone()));
        }
    }

    fn imports(&mut self, analysis: &FileAnalysis) {
        let type_sources: HashSet<&str> = analysis
            .imports
            .types
            .iter()
            .map(|h| h.value.source.as_str())
            .collect();

        for hit in &analysis.imports.sources {
            let dependency = if hit.value.mechanism == ImportMechanism::Import
                && type_sources.contains(hit.value.source.as_str())
            {
                dependency_kind::TYPE
            } else {
                match hit.value.mechanism {
                    ImportMechanism::Import => dependency_kind::IMPORT,
                    ImportMechanism::Require => dependency_kind::REQUIRE,
                    ImportMechanism::Dynamic => dependency_kind::DYNAMIC,
                }
            };
            self.import_edge(&hit.value.source, hit.location, dependency, false);
        }
    }

    /// Edge for one import spec: to the resolved file node, a package node,
    /// or an unknown placeholder.
    fn import_edge(
        &mut self,
        spec: &str,
        location: SourceLocation,
        dependency: &str,
        re_export: bool,
    ) {
        let edge_type = if re_export {
            edge_types::RE_EXPORTS
        } else {
            match classify_import(spec) {
                ImportClass::Local => edge_types::IMPORTS_FILE,
                ImportClass::Package { .. } => edge_types::IMPORTS_PACKAGE,
            }
        };

        let target = match classify_import(spec) {
            ImportClass::Local => match self.resolver.resolve(self.path, spec) {
                Some(target_path) => {
                    let identifier = NodeIdentifier::file(self.project, &target_path)
                        .expect("file names have no forbidden chars");
                    let name = identifier.name.clone();
                    self.push_node(
                        NodeRecord::new(identifier.clone(), NodeKind::File, name)
                            .with_source_file(&target_path),
                    );
                    identifier
                }
                None => {
                    let Ok(identifier) = NodeIdentifier::new(
                        self.project,
                        "",
                        NodeKind::Unknown,
                        sanitize_name(spec),
                    ) else {
                        self.out.warnings.push(format!("unmappable import spec '{spec}'"));
                        return;
                    };
                    self.push_node(
                        NodeRecord::new(identifier.clone(), NodeKind::Unknown, spec)
                            .with_metadata("original-import-spec", spec),
                    );
                    identifier
                }
            },
            ImportClass::Package { library, builtin } => {
                let Ok(identifier) = NodeIdentifier::package(self.project, &library) else {
                    self.out.warnings.push(format!("unmappable package '{library}'"));
                    return;
                };
                let mut record = NodeRecord::new(identifier.clone(), NodeKind::Package, &library)
                    .with_metadata("library", &library);
                if builtin {
                    record = record.with_metadata("builtin", "true");
                }
                self.push_node(record);
                identifier
            }
        };

        self.out.edges.push(
            EdgeDraft::explicit(self.file_identifier(), target, edge_type)
                .with_metadata("dependency", dependency)
                .with_metadata("line", location.line.to_string())
                .with_metadata("column", location.column.to_string()),
        );
    }

    fn exports(&mut self, analysis: &FileAnalysis) {
        for hit in &analysis.exports {
            match hit.value.kind {
                ExportKind::ReExport => {
                    if let Some(source) = &hit.value.source {
                        self.import_edge(source, hit.location, dependency_kind::RE_EXPORT, true);
                    }
                }
                ExportKind::Named | ExportKind::Default => {
                    // Mark the exported declaration; the file node records
                    // the default export name.
                    if hit.value.kind == ExportKind::Default {
                        if let Some(file) = self
                            .out
                            .nodes
                            .iter_mut()
                            .find(|n| n.kind == NodeKind::File && n.source_file.as_deref() == Some(self.path))
                        {
                            file.metadata.insert("default-export".into(), hit.value.name.clone());
                        }
                    }
                    for node in &mut self.out.nodes {
                        if node.name == hit.value.name && node.kind != NodeKind::File {
                            node.metadata.insert("exported".into(), "true".into());
                        }
                    }
                }
            }
        }
    }

    fn markdown(&mut self, markdown: &crate::languages::MarkdownAnalysis) {
        for hit in &markdown.headings {
            let mut metadata = Metadata::new();
            metadata.insert("level".into(), hit.value.level.to_string());
            self.member(NodeKind::Heading, &hit.value.text, hit.location, metadata);
        }

        for hit in &markdown.links {
            let dest = hit.value.destination.as_str();
            if dest.starts_with("http://") || dest.starts_with("https://") || dest.starts_with('#') {
                continue;
            }
            let dest = dest.split('#').next().unwrap_or(dest);
            if dest.is_empty() {
                continue;
            }
            if let Some(target_path) = self.resolver.resolve(self.path, dest) {
                let identifier = NodeIdentifier::file(self.project, &target_path)
                    .expect("file names have no forbidden chars");
                let name = identifier.name.clone();
                self.push_node(
                    NodeRecord::new(identifier.clone(), NodeKind::File, name)
                        .with_source_file(&target_path),
                );
                self.out.edges.push(
                    EdgeDraft::explicit(self.file_identifier(), identifier, edge_types::DOC_LINKS_TO)
                        .with_metadata("line", hit.location.line.to_string()),
                );
            }
        }
    }

    fn unknown_references(&mut self, analysis: &FileAnalysis) {
        let declared: HashSet<&str> = self.declared.iter().map(|(name, _)| name.as_str()).collect();
        let mut seen: HashSet<&str> = HashSet::new();

        for hit in &analysis.references {
            let name = hit.value.name.as_str();
            if declared.contains(name) || self.imported.contains(name) || !seen.insert(name) {
                continue;
            }
            // Method names of this file's classes resolve locally too.
            if self.declared.iter().any(|(declared_name, kind)| {
                *kind == NodeKind::Method && declared_name.ends_with(&format!(".{name}"))
            }) {
                continue;
            }
            let (kind, confidence) = match hit.value.context {
                ReferenceContext::Construction => (NodeKind::Class, 0.8),
                ReferenceContext::Call => (NodeKind::Function, 0.7),
                ReferenceContext::TypePosition => (NodeKind::Class, 0.6),
            };
            self.out.unknowns.push(UnknownSymbolRecord {
                name: name.to_string(),
                kind,
                source_file: self.path.to_string(),
                line: hit.location.line,
                column: hit.location.column,
                is_imported: false,
                is_alias: false,
                confidence,
            });
        }
    }

    fn finish(self) -> Extraction {
        self.out
    }
}
