//! Runs every path of a decompiled component through constraint building and
//! solving, and renders the per-file report.

use anyhow::{bail, Context};
use encoder::{solve, Outcome, Solution, SolverConfig};
use indexmap::IndexMap;
use log::{debug, info};
use parser::{GraphDocument, GraphError, PathGraph};
use path_conditions::build_path_state;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    pub solver: SolverConfig,
    /// Precede each path's results with its constraint list.
    pub show_constraints: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathReport {
    pub name: String,
    pub constraints: Vec<String>,
    pub outcome: Outcome,
}

impl PathReport {
    pub fn solutions(&self) -> &[Solution] {
        match &self.outcome {
            Outcome::Solved(solutions) => solutions,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub metadata: IndexMap<String, String>,
    pub paths: Vec<PathReport>,
}

/// Builds and solves one path from a fresh state.
pub fn analyze_path(graph: &PathGraph, config: &AnalysisConfig) -> PathReport {
    let state = build_path_state(graph);
    let constraints: Vec<String> = state.constraints().iter().map(|c| c.to_string()).collect();
    let outcome = solve(&state, &config.solver);
    match &outcome {
        Outcome::Solved(solutions) => info!("{}: {} solution(s)", graph.name, solutions.len()),
        Outcome::Unsatisfiable => info!("{}: no solution", graph.name),
        Outcome::Unknown(reason) => info!("{}: no solution ({})", graph.name, reason),
    }
    PathReport {
        name: graph.name.clone(),
        constraints,
        outcome,
    }
}

pub fn analyze_document(document: &GraphDocument, config: &AnalysisConfig) -> FileReport {
    FileReport {
        metadata: document.metadata.clone(),
        paths: document.paths.iter().map(|p| analyze_path(p, config)).collect(),
    }
}

pub fn analyze_file(path: &Path, config: &AnalysisConfig) -> Result<FileReport, GraphError> {
    let document = parser::load(path)?;
    debug!("{}: {} path(s)", path.display(), document.paths.len());
    Ok(analyze_document(&document, config))
}

impl FileReport {
    /// The text consumed by the intent dispatcher: the metadata header, then
    /// one line per solution of every satisfiable path.
    pub fn render(&self, show_constraints: bool) -> String {
        let mut out = String::new();
        for (key, value) in &self.metadata {
            let _ = writeln!(out, "{}: {}", key, value);
        }
        for path in &self.paths {
            if show_constraints {
                let _ = writeln!(out, "# path {}", path.name);
                for constraint in &path.constraints {
                    let _ = writeln!(out, "#   {}", constraint);
                }
            }
            match &path.outcome {
                Outcome::Solved(solutions) => {
                    for solution in solutions {
                        let _ = writeln!(out, "{}", solution);
                    }
                }
                _ if show_constraints => {
                    let _ = writeln!(out, "#   no solution");
                }
                _ => (),
            }
        }
        out
    }
}

/// Expands directories to their `*.dot` files, sorted by name.
pub fn collect_inputs(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(input)
                .with_context(|| format!("reading directory {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().map_or(false, |ext| ext == "dot"))
                .collect();
            found.sort();
            files.extend(found);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            bail!("input {} does not exist", input.display());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoder::Value;

    const CALCULATOR: &str = r#"# package: com.example.calc
# action: com.example.CALC
digraph paths {
    subgraph path_1 {
        a [label="i0 (int) = (android.content.Intent) $r1.getIntExtra(\"n1\", 0)", color=blue];
        b [label="i1 (int) = (android.content.Intent) $r1.getIntExtra(\"n2\", 0)", color=blue];
        c [label="if i0 > 10 goto d", color=blue];
        d [label="if i1 == i0 goto e", color=blue];
        e [label="return", color=blue];
        a -> b; b -> c;
        c -> d [label="true"];
        d -> e [label="true"];
    }
    subgraph path_2 {
        f [label="i0 (int) = (android.content.Intent) $r1.getIntExtra(\"x\", 0)", color=blue];
        g [label="if i0 > 5 goto h", color=blue];
        h [label="if i0 < 3 goto k", color=blue];
        k [label="return", color=blue];
        f -> g;
        g -> h [label="true"];
        h -> k [label="true"];
    }
    subgraph path_3 {
        m [label="$r2 (java.lang.String) = (android.content.Intent) $r1.getStringExtra(\"op\")", color=blue];
        p [label="if $r2 == \"+\" goto q", color=blue];
        q [label="$r3 = \"minus\"", color=blue];
        m -> p;
        p -> q [label="false"];
    }
    subgraph path_4 {
        s [label="r3 (java.io.Serializable) = (android.os.Bundle) $r5.getSerializable(\"obj\")", color=blue];
        t [label="if r3 == null goto u", color=blue];
        u [label="return", color=blue];
        s -> t;
        t -> u [label="true"];
    }
}
"#;

    fn report() -> FileReport {
        let document = parser::parse_document(CALCULATOR).unwrap();
        analyze_document(&document, &AnalysisConfig::default())
    }

    #[test]
    fn test_integer_path() {
        let report = report();
        let solutions = report.paths[0].solutions();
        assert_eq!(solutions.len(), 1);
        let n1 = match solutions[0].get("i0").map(|a| &a.value) {
            Some(Value::Int(n)) => *n,
            other => panic!("unexpected {:?}", other),
        };
        assert!(n1 >= 11);
        assert_eq!(
            solutions[0].to_string(),
            format!("n1 (integer) : {} | n2 (integer) : {}", n1, n1)
        );
    }

    #[test]
    fn test_contradiction_has_no_line() {
        let report = report();
        assert_eq!(report.paths[1].outcome, Outcome::Unsatisfiable);
        let text = report.render(false);
        assert!(!text.contains("x (integer)"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "package: com.example.calc");
        assert_eq!(lines[1], "action: com.example.CALC");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_false_edge_and_null() {
        let report = report();
        match report.paths[2].solutions()[0].get("r2").map(|a| &a.value) {
            Some(Value::Str(s)) => assert_ne!(s, "\"+\""),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            report.paths[3].solutions()[0].to_string(),
            "obj (serializable) : [null]"
        );
    }

    #[test]
    fn test_show_constraints() {
        let text = report().render(true);
        assert!(text.contains("# path path_2\n#   i0 > 5\n#   i0 < 3\n#   no solution\n"));
        assert!(text.contains("# path path_3\n#   not(r2 == \"+\")\n"));
    }

    #[test]
    fn test_rerun_is_identical() {
        let document = parser::parse_document(CALCULATOR).unwrap();
        let config = AnalysisConfig::default();
        let first = analyze_document(&document, &config);
        let second = analyze_document(&document, &config);
        assert_eq!(first.render(true), second.render(true));
    }

    #[test]
    fn test_path_alone_matches_batch() {
        let document = parser::parse_document(CALCULATOR).unwrap();
        let config = AnalysisConfig::default();
        let alone = analyze_path(&document.paths[3], &config);
        assert_eq!(alone, report().paths[3]);
    }

    #[test]
    fn test_collect_inputs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.dot", "a.dot", "notes.txt"] {
            fs::write(dir.path().join(name), CALCULATOR).unwrap();
        }
        let single = dir.path().join("notes.txt");
        let files = collect_inputs(&[dir.path().to_path_buf(), single.clone()]).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.dot"), dir.path().join("b.dot"), single]
        );
        assert!(collect_inputs(&[dir.path().join("missing.dot")]).is_err());
    }

    #[test]
    fn test_analyze_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.dot");
        fs::write(&bad, "digraph {").unwrap();
        assert!(analyze_file(&bad, &AnalysisConfig::default()).is_err());
        assert!(analyze_file(&dir.path().join("none.dot"), &AnalysisConfig::default()).is_err());

        let good = dir.path().join("good.dot");
        fs::write(&good, CALCULATOR).unwrap();
        let report = analyze_file(&good, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.paths.len(), 4);
    }
}
