//! Loads the DOT files written by the path extractor: the `# key: value`
//! metadata header and one [`PathGraph`] per path.

mod graph;

pub use graph::{PathGraph, PathNode};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::{debug, warn};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Parser)]
#[grammar = "dot.pest"]
pub struct DotParser;

/// Upper bound on the paths enumerated from a graph without subgraphs.
pub const MAX_ENUMERATED_PATHS: usize = 10_000;

/// Metadata keys, in output spelling, with the spellings accepted on input.
const METADATA_KEYS: &[(&str, &[&str])] = &[
    ("package", &["package"]),
    ("activity", &["activity"]),
    ("action", &["action"]),
    ("source-file", &["source-file", "apkFile"]),
    ("platform-version", &["platform-version", "sdkVersion"]),
];

lazy_static! {
    /// One `# key: value` header line.
    static ref METADATA_LINE: Regex = Regex::new(r"^\s*#\s*([A-Za-z][\w-]*)\s*:\s*(.*?)\s*$").unwrap();
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed graph: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),

    #[error("graph contains no paths")]
    Empty,
}

/// A parsed input file.
#[derive(Debug, Clone)]
pub struct GraphDocument {
    pub name: Option<String>,
    /// Recognised header entries, in input order.
    pub metadata: IndexMap<String, String>,
    pub paths: Vec<PathGraph>,
}

pub fn load(path: &Path) -> Result<GraphDocument, GraphError> {
    let source = std::fs::read_to_string(path).map_err(|source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&source)
}

pub fn parse_document(source: &str) -> Result<GraphDocument, GraphError> {
    let metadata = parse_metadata(source);
    let root = DotParser::parse(Rule::graph, source)
        .map_err(Box::new)?
        .next()
        .ok_or(GraphError::Empty)?;

    let mut name = None;
    let mut top = Scope::default();
    let mut subgraphs: Vec<(Option<String>, Scope)> = Vec::new();
    for pair in root.into_inner() {
        match pair.as_rule() {
            Rule::id => name = Some(id_text(&pair)),
            Rule::stmt_list => {
                for stmt in pair.into_inner() {
                    if stmt.as_rule() == Rule::subgraph {
                        let mut scope = Scope::default();
                        let sub_name = scope.subgraph(stmt);
                        subgraphs.push((sub_name, scope));
                    } else {
                        top.statement(stmt);
                    }
                }
            }
            _ => (),
        }
    }

    let paths: Vec<PathGraph> = if subgraphs.is_empty() {
        let cfg = top.into_graph(name.as_deref().unwrap_or("graph"));
        debug!("no subgraphs; enumerating the paths of {} nodes", cfg.len());
        cfg.enumerate_paths(MAX_ENUMERATED_PATHS)
    } else {
        if !top.nodes.is_empty() {
            debug!("ignoring {} nodes declared outside any path", top.nodes.len());
        }
        subgraphs
            .into_iter()
            .enumerate()
            .map(|(i, (sub_name, scope))| {
                let sub_name = sub_name.unwrap_or_else(|| format!("path_{}", i + 1));
                scope.into_graph(&sub_name)
            })
            .collect()
    };

    if paths.is_empty() {
        return Err(GraphError::Empty);
    }
    Ok(GraphDocument { name, metadata, paths })
}

/// Reads the `# key: value` lines heading the file.
pub fn parse_metadata(source: &str) -> IndexMap<String, String> {
    let mut metadata = IndexMap::new();
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('#') {
            break;
        }
        let Some(caps) = METADATA_LINE.captures(trimmed) else {
            continue;
        };
        match canonical_key(&caps[1]) {
            Some(key) => {
                metadata.insert(key.to_string(), caps[2].to_string());
            }
            None => debug!("ignoring metadata key {}", &caps[1]),
        }
    }
    metadata
}

fn canonical_key(key: &str) -> Option<&'static str> {
    METADATA_KEYS
        .iter()
        .find(|(_, spellings)| spellings.contains(&key))
        .map(|(canonical, _)| *canonical)
}

// ***************** Collecting statements *****************

#[derive(Debug, Default)]
struct NodeAttrs {
    label: Option<String>,
    color: Option<String>,
}

/// Nodes and edges gathered for one path; nested subgraphs are flattened in.
#[derive(Debug, Default)]
struct Scope {
    nodes: IndexMap<String, NodeAttrs>,
    edges: Vec<(String, String, Option<bool>)>,
}

impl Scope {
    /// Collects a subgraph; returns its name.
    fn subgraph(&mut self, pair: Pair<Rule>) -> Option<String> {
        let mut name = None;
        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::id => name = Some(id_text(&child)),
                Rule::stmt_list => {
                    self.statements(child);
                }
                _ => (),
            }
        }
        name
    }

    /// Collects a statement list; returns the nodes it mentions.
    fn statements(&mut self, pair: Pair<Rule>) -> Vec<String> {
        let mut mentioned = Vec::new();
        for stmt in pair.into_inner() {
            mentioned.extend(self.statement(stmt));
        }
        mentioned
    }

    fn statement(&mut self, pair: Pair<Rule>) -> Vec<String> {
        match pair.as_rule() {
            Rule::node_stmt => {
                let mut inner = pair.into_inner();
                let Some(node) = inner.next().and_then(|p| node_name(&p)) else {
                    return vec![];
                };
                let attrs = inner.next().map(attributes).unwrap_or_default();
                let entry = self.nodes.entry(node.clone()).or_default();
                if let Some(label) = attrs.get("label") {
                    entry.label = Some(label.clone());
                }
                if let Some(color) = attrs.get("color") {
                    entry.color = Some(color.clone());
                }
                vec![node]
            }
            Rule::edge_stmt => {
                let mut groups: Vec<Vec<String>> = Vec::new();
                let mut attrs = IndexMap::new();
                for child in pair.into_inner() {
                    match child.as_rule() {
                        Rule::node_id => {
                            if let Some(node) = node_name(&child) {
                                self.nodes.entry(node.clone()).or_default();
                                groups.push(vec![node]);
                            }
                        }
                        Rule::subgraph => {
                            let mut inner = Scope::default();
                            inner.subgraph(child);
                            groups.push(inner.nodes.keys().cloned().collect());
                            self.absorb(inner);
                        }
                        Rule::attr_list => attrs = attributes(child),
                        _ => (),
                    }
                }
                let label = match attrs.get("label").map(String::as_str) {
                    Some("true") => Some(true),
                    Some("false") => Some(false),
                    _ => None,
                };
                for pair in groups.windows(2) {
                    for from in &pair[0] {
                        for to in &pair[1] {
                            self.edges.push((from.clone(), to.clone(), label));
                        }
                    }
                }
                groups.into_iter().flatten().collect()
            }
            Rule::subgraph => {
                let mut inner = Scope::default();
                inner.subgraph(pair);
                let mentioned = inner.nodes.keys().cloned().collect();
                self.absorb(inner);
                mentioned
            }
            // graph/node/edge defaults and assignments carry nothing we use
            _ => vec![],
        }
    }

    fn absorb(&mut self, other: Scope) {
        for (name, attrs) in other.nodes {
            let entry = self.nodes.entry(name).or_default();
            if attrs.label.is_some() {
                entry.label = attrs.label;
            }
            if attrs.color.is_some() {
                entry.color = attrs.color;
            }
        }
        self.edges.extend(other.edges);
    }

    fn into_graph(self, name: &str) -> PathGraph {
        let mut graph = PathGraph::new(name);
        for (node, attrs) in &self.nodes {
            let relevant = attrs.color.as_deref().map(|c| c.eq_ignore_ascii_case("blue"));
            graph.add_node(node, Some(attrs.label.as_deref().unwrap_or("")), relevant);
        }
        for (from, to, label) in &self.edges {
            graph.add_edge(from, to, *label);
        }
        if graph.is_empty() {
            warn!("path {} has no nodes", name);
        }
        graph
    }
}

fn node_name(pair: &Pair<Rule>) -> Option<String> {
    pair.clone().into_inner().next().map(|id| id_text(&id))
}

fn attributes(pair: Pair<Rule>) -> IndexMap<String, String> {
    let mut attrs = IndexMap::new();
    for a_list in pair.into_inner() {
        for attr in a_list.into_inner() {
            let mut kv = attr.into_inner();
            if let (Some(k), Some(v)) = (kv.next(), kv.next()) {
                attrs.insert(id_text(&k), id_text(&v));
            }
        }
    }
    attrs
}

/// The text of an `id`, with quotes removed and escapes resolved.
fn id_text(pair: &Pair<Rule>) -> String {
    let inner = pair.clone().into_inner().next();
    match inner {
        Some(p) if p.as_rule() == Rule::quoted => {
            let raw = p.into_inner().next().map(|q| q.as_str()).unwrap_or("");
            unescape(raw)
        }
        Some(p) => p.as_str().to_string(),
        None => pair.as_str().to_string(),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') | Some('l') | Some('r') => out.push('\n'),
            Some('\n') => (),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ***************** Testing *****************
#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PATHS: &str = r#"# package: com.example.calculator
# activity: com.example.calculator.Calculator
# apkFile: calc.apk
# sdkVersion: 33
# owner: nobody
digraph paths {
    subgraph path_1 {
        node0_1 [label="$r2 (java.lang.String) = (android.content.Intent) $r1.getStringExtra(\"op\")", color=blue];
        node1_1 [label="if $r2 == \"+\" goto return", color=blue];
        node2_1 [label="return"];
        node0_1 -> node1_1;
        node1_1 -> node2_1 [label="false"];
    }
    /* second path */
    subgraph path_2 {
        node0_2 [label="i0 (int) = (android.content.Intent) $r1.getIntExtra(\"n\", 0)", color="blue"];
        node0_2 -> node1_2;  // edge-only node
    }
}
"#;

    #[test]
    fn test_metadata_aliases() {
        let doc = parse_document(TWO_PATHS).unwrap();
        let entries: Vec<(&str, &str)> = doc.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            entries,
            vec![
                ("package", "com.example.calculator"),
                ("activity", "com.example.calculator.Calculator"),
                ("source-file", "calc.apk"),
                ("platform-version", "33"),
            ]
        );
        assert_eq!(doc.name.as_deref(), Some("paths"));
    }

    #[test]
    fn test_metadata_header() {
        let source = "# package: a.b\n#free text\n# colour: blue\n\n# sdkVersion : 30 \ndigraph { }\n# activity: late";
        for _ in 0..2 {
            let metadata = parse_metadata(source);
            let entries: Vec<(&str, &str)> = metadata.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            assert_eq!(entries, vec![("package", "a.b"), ("platform-version", "30")]);
        }
    }

    #[test]
    fn test_subgraphs_are_paths() {
        let doc = parse_document(TWO_PATHS).unwrap();
        assert_eq!(doc.paths.len(), 2);
        let first = &doc.paths[0];
        assert_eq!(first.name, "path_1");
        let order: Vec<&PathNode> = first.node_order().into_iter().map(|i| first.node(i)).collect();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0].label, "$r2 (java.lang.String) = (android.content.Intent) $r1.getStringExtra(\"op\")");
        assert!(order[1].relevant);
        assert!(!order[2].relevant);
        let branch = first.find("node1_1").unwrap();
        assert_eq!(first.successors(branch)[0].1, Some(false));

        let second = &doc.paths[1];
        assert!(second.node(second.find("node0_2").unwrap()).relevant);
        assert_eq!(second.node(second.find("node1_2").unwrap()).label, "");
    }

    #[test]
    fn test_nested_subgraph_is_flattened() {
        let source = r#"digraph g {
            subgraph p {
                a [label="x = 1"];
                subgraph inner { b [label="y = 2", color=blue]; }
                a -> b;
            }
        }"#;
        let doc = parse_document(source).unwrap();
        assert_eq!(doc.paths.len(), 1);
        assert_eq!(doc.paths[0].len(), 2);
        assert!(doc.paths[0].node(doc.paths[0].find("b").unwrap()).relevant);
    }

    #[test]
    fn test_graph_without_subgraphs_is_enumerated() {
        let source = r#"digraph cfg {
            node [shape=box];
            rankdir = TB;
            s [label="if i0 > 1 goto t"];
            s -> t [label="true"];
            s -> f [label="false"];
        }"#;
        let doc = parse_document(source).unwrap();
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.paths.len(), 2);
        let names: Vec<&str> = doc.paths.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["path_1", "path_2"]);
        assert!(doc.paths[0].find("t").is_some());
        assert!(doc.paths[1].find("f").is_some());
    }

    #[test]
    fn test_edge_chain_and_escapes() {
        let source = "digraph { subgraph p { a -> b -> c [label=\"true\"]; a [label=\"say \\\"hi\\\" \\\\ now\"]; } }";
        let doc = parse_document(source).unwrap();
        let p = &doc.paths[0];
        assert_eq!(p.node(p.find("a").unwrap()).label, "say \"hi\" \\ now");
        let b = p.find("b").unwrap();
        assert_eq!(p.successors(b)[0].1, Some(true));
        assert_eq!(p.successors(p.find("a").unwrap())[0].1, Some(true));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_document("digraph { a -> }"), Err(GraphError::Syntax(_))));
        assert!(matches!(parse_document("not a graph"), Err(GraphError::Syntax(_))));
        assert!(matches!(parse_document("digraph g { }"), Err(GraphError::Empty)));
        let missing = load(Path::new("/nonexistent/dir/file.dot"));
        assert!(matches!(missing, Err(GraphError::Io { .. })));
    }
}
