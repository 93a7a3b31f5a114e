use archive_vault::{denormalize, normalize, remove_entity, update_entity, RemoveOptions};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};

/// A collection of `manifests` manifests with `canvases` painted canvases each
fn archive(manifests: usize, canvases: usize) -> Value {
    let items: Vec<Value> = (0..manifests)
        .map(|m| {
            let canvas_items: Vec<Value> = (0..canvases)
                .map(|c| {
                    json!({
                        "id": format!("m{m}/c{c}"),
                        "type": "Canvas",
                        "height": 4000,
                        "width": 3000,
                        "items": [{
                            "id": format!("m{m}/c{c}/page"),
                            "type": "AnnotationPage",
                            "items": [{
                                "id": format!("m{m}/c{c}/image"),
                                "type": "Annotation",
                                "motivation": "painting",
                                "body": {"id": format!("m{m}/c{c}.jpg"), "type": "Image"},
                                "target": format!("m{m}/c{c}")
                            }]
                        }]
                    })
                })
                .collect();
            json!({
                "id": format!("m{m}"),
                "type": "Manifest",
                "label": {"en": [format!("Volume {m}")]},
                "x-archive:box": m,
                "items": canvas_items
            })
        })
        .collect();

    json!({"id": "top", "type": "Collection", "items": items})
}

fn normalize_archive(c: &mut Criterion) {
    let doc = archive(50, 40);

    c.bench_function("normalize_8k_entities", |b| {
        b.iter(|| normalize(black_box(&doc)))
    });
}

fn denormalize_archive(c: &mut Criterion) {
    let state = normalize(&archive(50, 40)).unwrap();

    c.bench_function("denormalize_8k_entities", |b| {
        b.iter(|| denormalize(black_box(&state)))
    });
}

fn single_update(c: &mut Criterion) {
    let state = normalize(&archive(50, 40)).unwrap();
    let patch = json!({"label": {"en": ["Recto"]}});
    let patch = patch.as_object().unwrap();

    c.bench_function("update_single_canvas", |b| {
        b.iter(|| update_entity(black_box(&state), "m25/c20", patch))
    });
}

fn cascading_delete(c: &mut Criterion) {
    let state = normalize(&archive(50, 40)).unwrap();

    c.bench_function("permanent_delete_manifest", |b| {
        b.iter(|| remove_entity(black_box(&state), "m25", RemoveOptions::permanent()))
    });

    c.bench_function("trash_manifest", |b| {
        b.iter(|| remove_entity(black_box(&state), "m25", RemoveOptions::default()))
    });
}

criterion_group!(
    benches,
    normalize_archive,
    denormalize_archive,
    single_update,
    cascading_delete
);
criterion_main!(benches);
