use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use llmux::core::builtin_models::default_models;
use llmux::core::message::RequestMessage;
use llmux::core::model_table::{build_model_table, ModelDescriptor, ProviderRef};
use llmux::core::shaping::repair_alternation;
use std::sync::Arc;

fn make_catalogue(n_providers: usize, models_per_provider: usize) -> Vec<ModelDescriptor> {
    let mut models = default_models();
    for p in 0..n_providers {
        let provider = Arc::new(ProviderRef::new(
            format!("provider{p}"),
            format!("Provider {p}"),
            "openai",
        ));
        for m in 0..models_per_provider {
            models.push(ModelDescriptor::new(format!("model-{m}"), Some(provider.clone())));
        }
    }
    models
}

fn make_directives(n: usize) -> String {
    let mut parts = vec!["-all".to_string(), "+*provider1".to_string()];
    for i in 0..n {
        parts.push(format!("+model-{i}@provider{}=Model {i}<bench entry>", i % 4));
        parts.push(format!("brand-new-{i}"));
    }
    parts.join(",")
}

fn bench_model_table(c: &mut Criterion) {
    for &(providers, per_provider) in &[(4usize, 25usize), (16, 100)] {
        let catalogue = make_catalogue(providers, per_provider);
        let directives = make_directives(per_provider);

        let mut group = c.benchmark_group(format!("model_table_{}x{}", providers, per_provider));
        group.throughput(Throughput::Elements(catalogue.len() as u64));

        group.bench_function(BenchmarkId::new("defaults_only", catalogue.len()), |b| {
            b.iter(|| build_model_table(&catalogue, ""))
        });
        group.bench_function(BenchmarkId::new("with_directives", catalogue.len()), |b| {
            b.iter(|| build_model_table(&catalogue, &directives))
        });

        group.finish();
    }

    // Pathological history: long same-role runs.
    let history: Vec<RequestMessage> = (0..400)
        .map(|i| {
            if (i / 3) % 2 == 0 {
                RequestMessage::user(format!("u{i}"))
            } else {
                RequestMessage::assistant(format!("a{i}"))
            }
        })
        .collect();
    c.bench_function("repair_alternation_400", |b| {
        b.iter(|| repair_alternation(history.clone()))
    });
}

criterion_group!(benches, bench_model_table);
criterion_main!(benches);
