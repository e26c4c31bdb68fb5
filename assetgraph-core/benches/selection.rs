use assetgraph_core::graph::{GraphIndex, NodeDescriptor};
use assetgraph_core::query::select;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Layers of `width` assets, each depending on every asset of the layer
/// above.
fn layered(depth: usize, width: usize) -> Vec<NodeDescriptor> {
    let mut nodes = Vec::with_capacity(depth * width);
    for layer in 0..depth {
        for i in 0..width {
            let mut node = NodeDescriptor::new(format!("l{layer}/n{i}").as_str()).with_group(format!("g{}", layer % 3));
            if layer > 0 {
                for j in 0..width {
                    node = node.with_upstream(format!("l{}/n{j}", layer - 1).as_str());
                }
            }
            if layer + 1 < depth {
                for j in 0..width {
                    node = node.with_downstream(format!("l{}/n{j}", layer + 1).as_str());
                }
            }
            nodes.push(node);
        }
    }
    nodes
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph.build");
    for (depth, width) in [(10, 10), (50, 20)] {
        let nodes = layered(depth, width);
        group.bench_with_input(BenchmarkId::from_parameter(nodes.len()), &nodes, |b, nodes| {
            b.iter(|| GraphIndex::build(black_box(nodes.clone())));
        });
    }
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let index = GraphIndex::build(layered(50, 20));

    c.bench_function("query.select.downstream_unbounded", |b| {
        b.iter(|| select(black_box(&index), "l0/n0*"));
    });
    c.bench_function("query.select.pattern_two_layers", |b| {
        b.iter(|| select(black_box(&index), "++l25/*1++"));
    });
}

criterion_group!(benches, bench_build, bench_select);
criterion_main!(benches);
