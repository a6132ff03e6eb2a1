use criterion::{criterion_group, criterion_main, Criterion};
use roast_vault_core::codec::{canonical_bytes, digest};
use roast_vault_core::{
    Category, ExportSnapshot, Preferences, RoastItem, SnapshotMetadata, Statistics,
    CURRENT_DATA_VERSION,
};
use time::OffsetDateTime;

fn mk_snapshot(count: usize) -> ExportSnapshot {
    let items: Vec<RoastItem> = (0..count)
        .map(|index| {
            RoastItem::new(
                format!("Deadline dời lên sáng mai, bản số {index}"),
                Category::ALL[index % Category::ALL.len()],
                i32::try_from(index % 5).unwrap_or(0) + 1,
            )
        })
        .collect();
    ExportSnapshot {
        metadata: SnapshotMetadata {
            app_version: "bench".to_string(),
            data_version: CURRENT_DATA_VERSION,
            export_date: OffsetDateTime::UNIX_EPOCH,
            total_roasts: items.len(),
            total_favorites: 0,
            device_info: None,
        },
        user_preferences: Preferences::default(),
        statistics: Some(Statistics::from_items(&items)),
        roast_history: items,
        favorites: Vec::new(),
        checksum: None,
    }
}

fn bench_canonical_digest(c: &mut Criterion) {
    for count in [100_usize, 1_000] {
        let snapshot = mk_snapshot(count);
        c.bench_function(&format!("canonical_digest_{count}_roasts"), |b| {
            b.iter(|| {
                let bytes = canonical_bytes(&snapshot).unwrap_or_default();
                digest(&bytes)
            });
        });
    }
}

criterion_group!(benches, bench_canonical_digest);
criterion_main!(benches);
