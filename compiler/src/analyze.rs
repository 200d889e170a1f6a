// analyze.rs — Front-end driver
//
// Runs the phases in order: parse, analyze (declare, analyze, unify), build
// the flow graph, stratify. Every phase appends to one diagnostic sink.
// Parse errors stop the run; analysis errors do not, so a failing file
// still yields a partial IR for tooling.
//
// Preconditions: none.
// Postconditions: `Compilation::diagnostics` holds every diagnostic in phase
//                 order; `ir` is present whenever parsing produced a program.
// Failure modes: none; failures are diagnostics.
// Side effects: emits `tracing` events per phase.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info_span};

use crate::analyzer::{analyze_program, Analysis};
use crate::ast::{Program, Span};
use crate::diag::{codes, Diagnostic, Diagnostics};
use crate::graph::build_graph;
use crate::ir::IR;
use crate::parser;
use crate::stratify::{self, LongestPath, Stratifier};
use crate::symbol::Resolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parse,
    Analyze,
    Graph,
    Stratify,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Parse => "parse",
            Phase::Analyze => "analyze",
            Phase::Graph => "graph",
            Phase::Stratify => "stratify",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything one run of the front end produced.
pub struct Compilation {
    pub program: Option<Program>,
    pub analysis: Option<Analysis>,
    pub ir: Option<IR>,
    pub diagnostics: Diagnostics,
    pub timings: Vec<(Phase, Duration)>,
}

impl Compilation {
    pub fn ok(&self) -> bool {
        self.diagnostics.ok()
    }
}

/// Compile `source` with the default stratifier.
pub fn compile(source: &str, resolver: Option<Arc<dyn Resolver>>) -> Compilation {
    compile_with(source, resolver, &LongestPath)
}

pub fn compile_with(
    source: &str,
    resolver: Option<Arc<dyn Resolver>>,
    stratifier: &dyn Stratifier,
) -> Compilation {
    let mut out = Compilation {
        program: None,
        analysis: None,
        ir: None,
        diagnostics: Diagnostics::new(),
        timings: Vec::new(),
    };

    let program = {
        let _span = info_span!("parse").entered();
        let start = Instant::now();
        let parsed = parser::parse(source);
        for err in &parsed.errors {
            out.diagnostics.add(
                Diagnostic::error(*err.span(), err.to_string()).with_code(codes::E_SYNTAX),
            );
        }
        out.timings.push((Phase::Parse, start.elapsed()));
        if !parsed.errors.is_empty() {
            debug!(errors = parsed.errors.len(), "parse failed");
            return out;
        }
        match parsed.program {
            Some(program) => program,
            None => return out,
        }
    };

    let analysis = {
        let _span = info_span!("analyze").entered();
        let start = Instant::now();
        let analysis = analyze_program(source, &program, resolver);
        out.diagnostics.extend(analysis.diagnostics.clone());
        out.timings.push((Phase::Analyze, start.elapsed()));
        analysis
    };

    let mut ir = {
        let _span = info_span!("graph").entered();
        let start = Instant::now();
        let result = build_graph(&program, &analysis, source);
        for diag in result.diagnostics {
            // The builder re-checks config literals the analyzer already saw.
            if !out.diagnostics.iter().any(|d| *d == diag) {
                out.diagnostics.add(diag);
            }
        }
        out.timings.push((Phase::Graph, start.elapsed()));
        result.ir
    };

    {
        let _span = info_span!("stratify").entered();
        let start = Instant::now();
        if let Err(err) = stratify::stratify(&mut ir, stratifier) {
            out.diagnostics
                .add(Diagnostic::error(program.span, err.to_string()).with_code(codes::E_CYCLE));
        }
        out.timings.push((Phase::Stratify, start.elapsed()));
    }

    debug!(
        diagnostics = out.diagnostics.len(),
        ok = out.diagnostics.ok(),
        "compilation finished"
    );
    out.program = Some(program);
    out.analysis = Some(analysis);
    out.ir = Some(ir);
    out
}

/// `line:col` of a span start, 1-based line and column.
pub fn position(source: &str, span: Span) -> (usize, usize) {
    let (line, col) = crate::diag::LineIndex::new(source).line_col(span.start);
    (line, col + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{EdgeKind, Nodes, Edges, Sequence};
    use crate::stratify::{Levels, StratifyError};
    use crate::symbol::MapResolver;
    use crate::types::Type;

    fn resolver() -> Option<Arc<dyn Resolver>> {
        Some(Arc::new(MapResolver::new().channel("sensor", 1, Type::F64)))
    }

    #[test]
    fn parse_errors_stop_the_run() {
        let out = compile("func (", resolver());
        assert!(!out.ok());
        assert!(out.ir.is_none());
        assert_eq!(out.diagnostics.first().and_then(|d| d.code), Some(codes::E_SYNTAX));
        assert_eq!(out.timings.len(), 1);
    }

    #[test]
    fn analysis_errors_keep_a_partial_ir() {
        let out = compile("func f() { return y }\nsensor > 1 => f{}", resolver());
        assert!(!out.ok());
        let ir = out.ir.expect("partial ir");
        assert!(ir.nodes.get("on_sensor_0").is_some());
    }

    #[test]
    fn clean_program_is_stratified() {
        let out = compile("func f(v f64) f64 { return v }\nsensor -> f{}", resolver());
        assert!(out.ok(), "{:?}", out.diagnostics.iter().map(|d| &d.message).collect::<Vec<_>>());
        let ir = out.ir.expect("ir");
        assert_eq!(ir.strata.get("on_sensor_0"), Some(0));
        assert_eq!(ir.strata.get("f_0"), Some(1));
        assert_eq!(ir.edges.by_kind(EdgeKind::Continuous).count(), 1);
        let phases: Vec<Phase> = out.timings.iter().map(|(p, _)| *p).collect();
        assert_eq!(phases, [Phase::Parse, Phase::Analyze, Phase::Graph, Phase::Stratify]);
    }

    struct AlwaysCyclic;

    impl Stratifier for AlwaysCyclic {
        fn stratify(&self, _: &Nodes, _: &Edges, _: &[Sequence]) -> Result<Levels, StratifyError> {
            Err(StratifyError::Cycle {
                nodes: vec!["a".into(), "b".into()],
            })
        }
    }

    #[test]
    fn stratifier_errors_become_diagnostics() {
        let out = compile_with("sensor -> sensor", resolver(), &AlwaysCyclic);
        let messages: Vec<&str> = out.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["cycle detected involving nodes: a, b"]);
        assert!(out.ir.is_some());
    }

    #[test]
    fn positions_are_one_based() {
        let source = "a\n  bc";
        assert_eq!(position(source, Span::from(4..5)), (2, 3));
    }
}
