use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use reflex::run_source;

const FACTOR_FINDER: &str = r#"
factor = { f = 2
  next = @[f = ^.f.add[y=1].result].result
  result = x.mod[y=^.f].result.select[false=^.f, true=^.next].result }
result = factor[x=533].result
"#;

const FIBONACCI: &str = r#"
fib = { n = 0, a = 0, b = 1
  result = n.eq[y=0].result.select[
    true = ^.a,
    false = ^[n=^.^.n.sub[y=1].result, a=^.^.b, b=^.^.a.add[y=^.^.^.b].result].result
  ].result }
result = fib[n=25].result
"#;

fn bench_arithmetic(c: &mut Criterion) {
    c.bench_function("arithmetic_call", |b| {
        b.iter(|| run_source(black_box("result = 2.add[y=3].result")).unwrap());
    });
}

fn bench_factor_finder(c: &mut Criterion) {
    c.bench_function("factor_finder_recursion", |b| {
        b.iter(|| run_source(black_box(FACTOR_FINDER)).unwrap());
    });
}

fn bench_fibonacci(c: &mut Criterion) {
    c.bench_function("fibonacci_override_recursion", |b| {
        b.iter(|| run_source(black_box(FIBONACCI)).unwrap());
    });
}

criterion_group!(benches, bench_arithmetic, bench_factor_finder, bench_fibonacci);
criterion_main!(benches);
