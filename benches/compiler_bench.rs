use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use arcc::symbol::{MapResolver, Resolver};
use arcc::types::Type;
use arcc::*;
use std::sync::Arc;

// Representative control programs. All compile cleanly against `channels()`.

const SIMPLE_FLOW: &str = r#"
ox_pt_1 -> press_out
"#;

const FUNCTION_CHAIN: &str = r#"
func scale{factor f64} (v f64) f64 {
    return v * factor
}

func clamp{lo f64, hi f64} (v f64) f64 {
    if v < lo {
        return lo
    }
    if v > hi {
        return hi
    }
    return v
}

ox_pt_1 -> scale{factor=1.5} -> clamp{lo=0.0, hi=900.0} -> press_out
"#;

const SEQUENCE: &str = r#"
limit := 500.0

func vent() {
    press_vlv = 1
}

sequence main {
    stage precheck {
        ox_pt_1 > 10 => next
    }
    stage press {
        ox_pt_1 -> press_out
        ox_pt_1 > limit => vent{}
        ox_pt_1 > limit => next
    }
    stage safe {
        vent{}
    }
}
"#;

const ROUTING: &str = r#"
func split(v f64) (hi f64, lo f64) {
    hi = v * 2
    lo = v / 2
}

func mix(a f64, b f64) f64 {
    return a + b
}

ox_pt_1 -> split{} -> {hi: press_out, lo: ox_pt_2}
{ox_pt_1: a, ox_pt_2: b} -> mix{} -> press_out
"#;

fn scenarios() -> [(&'static str, &'static str); 4] {
    [
        ("simple", SIMPLE_FLOW),
        ("functions", FUNCTION_CHAIN),
        ("sequence", SEQUENCE),
        ("routing", ROUTING),
    ]
}

fn channels() -> Arc<dyn Resolver> {
    Arc::new(
        MapResolver::new()
            .channel("ox_pt_1", 12, Type::F64)
            .channel("ox_pt_2", 13, Type::F64)
            .channel("press_out", 14, Type::F64)
            .channel("press_vlv", 20, Type::U8),
    )
}

/// Flow-scaling generator: `n` functions, each fed by the previous one's
/// output channel.
fn generate_scaling_program(n_funcs: usize) -> String {
    let mut src = String::new();
    for i in 0..n_funcs {
        src.push_str(&format!(
            "func step_{i}(v f64) f64 {{\n    return v * {}.0 + 1\n}}\n\n",
            i + 1
        ));
    }
    let chain: Vec<String> = (0..n_funcs).map(|i| format!("step_{i}{{}}")).collect();
    src.push_str(&format!("ox_pt_1 -> {} -> press_out\n", chain.join(" -> ")));
    src
}

// KPI: parser latency for representative scenarios.
fn bench_kpi_parse_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/parse_latency");

    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| {
                let result = parser::parse(black_box(source));
                black_box(&result.program);
            });
        });
    }

    group.finish();
}

// KPI: full compile latency (parse -> analyze -> graph -> stratify).
fn bench_kpi_full_compile_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/full_compile_latency");
    let resolver = channels();

    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| {
                let out = analyze::compile(black_box(source), Some(resolver.clone()));
                assert!(out.ok());
                black_box(out.ir);
            });
        });
    }

    group.finish();
}

// KPI: phase-level latency on a non-trivial program.
fn bench_kpi_phase_latency(c: &mut Criterion) {
    let resolver = channels();
    let program = parser::parse(SEQUENCE)
        .program
        .expect("benchmark scenario must parse");
    let analysis = analyzer::analyze_program(SEQUENCE, &program, Some(resolver.clone()));
    assert!(analysis.diagnostics.ok());
    let built = graph::build_graph(&program, &analysis, SEQUENCE);
    assert!(built.diagnostics.is_empty());

    let mut group = c.benchmark_group("kpi/phase_latency");

    group.bench_function("analyze", |b| {
        b.iter(|| {
            let analysis =
                analyzer::analyze_program(SEQUENCE, black_box(&program), Some(resolver.clone()));
            black_box(analysis.diagnostics.len());
        });
    });

    group.bench_function("graph", |b| {
        b.iter(|| {
            let result = graph::build_graph(black_box(&program), &analysis, SEQUENCE);
            black_box(result.ir.nodes.len());
        });
    });

    group.bench_function("stratify", |b| {
        b.iter_batched(
            || built.ir.clone(),
            |mut ir| {
                stratify::stratify(&mut ir, &stratify::LongestPath)
                    .expect("scenario is acyclic");
                black_box(ir.strata.len());
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

// KPI: compile scaling vs chain length.
fn bench_kpi_compile_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("kpi/compile_scaling");
    let resolver = channels();

    for n_funcs in [1_usize, 5, 10, 20, 40] {
        let source = generate_scaling_program(n_funcs);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}funcs", n_funcs)),
            &source,
            |b, source| {
                b.iter(|| {
                    let out = analyze::compile(black_box(source.as_str()), Some(resolver.clone()));
                    black_box(out.diagnostics.len());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_kpi_parse_latency,
    bench_kpi_full_compile_latency,
    bench_kpi_phase_latency,
    bench_kpi_compile_scaling,
);
criterion_main!(benches);
