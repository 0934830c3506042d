use criterion::{black_box, criterion_group, criterion_main, Criterion};
use marginalia::cursor::{changed_region_end, insert_cursor_marker};
use marginalia::prompt::{build_bootstrap_prompt, build_followup_prompt, PromptRequest, PromptTemplate};

fn synthetic_document(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("Paragraph {i}: the quick brown fox jumps over the lazy dog, again and again."))
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_prompts(c: &mut Criterion) {
    let content = synthetic_document(20_000);
    let cursor = content.chars().count() / 2;
    let request = PromptRequest {
        content: content.clone(),
        cursor,
        file_path: "book/chapter-01.md".to_string(),
    };
    let template = PromptTemplate::default();

    c.bench_function("bootstrap_prompt_20k_lines", |b| {
        b.iter(|| black_box(build_bootstrap_prompt(&template, black_box(&request))));
    });

    c.bench_function("followup_prompt_20k_lines", |b| {
        b.iter(|| black_box(build_followup_prompt(black_box(&request))));
    });

    c.bench_function("insert_cursor_marker_20k_lines", |b| {
        b.iter(|| black_box(insert_cursor_marker(black_box(&content), cursor)));
    });
}

fn bench_change_detection(c: &mut Criterion) {
    let previous = synthetic_document(20_000);
    let mut current = previous.clone();
    current.insert_str(previous.len() / 2, " an inserted sentence.");

    c.bench_function("changed_region_end_20k_lines", |b| {
        b.iter(|| black_box(changed_region_end(black_box(&previous), black_box(&current))));
    });
}

criterion_group!(benches, bench_prompts, bench_change_detection);
criterion_main!(benches);
