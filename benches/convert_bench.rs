use criterion::{black_box, criterion_group, criterion_main, Criterion};
use legacyconv::convert::{convert, ConvertOptions};
use legacyconv::crypto::NoEncryption;
use legacyconv::envelope::seal;
use legacyconv::meta::{Meta, BACKUP_TYPE, FORMAT_VERSION};
use legacyconv::section::{SectionArchive, SectionWriter};
use serde_json::json;

fn legacy_backup(channels: usize, per_channel: usize) -> Vec<u8> {
    let ids: Vec<String> = (0..channels).map(|i| format!("{}", 100_000 + i)).collect();
    let mut writer = SectionWriter::new();
    writer.write_section("meta", &Meta::new(BACKUP_TYPE, FORMAT_VERSION).to_bytes().unwrap()).unwrap();
    let opts = json!({ "Channels": ids, "BackupGuildAssets": ["guildIcon"] });
    writer.write_section("backup_opts", &rmp_serde::to_vec_named(&opts).unwrap()).unwrap();
    let guild = json!({
        "id":       "1",
        "name":     "bench",
        "channels": ids.iter().map(|id| json!({ "id": id, "name": "chan" })).collect::<Vec<_>>(),
    });
    writer.write_section("core/guild", &rmp_serde::to_vec_named(&guild).unwrap()).unwrap();
    for id in &ids {
        let messages: Vec<_> = (0..per_channel)
            .map(|n| json!({ "message": {
                "id":          format!("{id}-{n}"),
                "content":     "the quick brown fox jumps over the lazy dog",
                "attachments": [{ "id": "a", "url": "https://cdn.invalid/a.png" }],
            }}))
            .collect();
        let name = format!("messages/{id}");
        writer.write_section(&name, &rmp_serde::to_vec_named(&messages).unwrap()).unwrap();
    }
    writer.write_section("assets/guildIcon", &vec![0xAB; 64 * 1024]).unwrap();
    seal(&NoEncryption, &writer.finish().unwrap()).unwrap()
}

fn bench_convert(c: &mut Criterion) {
    let opts  = ConvertOptions::default();
    let small = legacy_backup(4, 50);
    let large = legacy_backup(32, 500);

    c.bench_function("convert_4ch_50msg", |b| b.iter(|| convert(black_box(&small), &opts).unwrap()));
    c.bench_function("convert_32ch_500msg", |b| b.iter(|| convert(black_box(&large), &opts).unwrap()));
}

fn bench_extract(c: &mut Criterion) {
    let raw = {
        let mut writer = SectionWriter::new();
        for i in 0..256 {
            writer.write_section(&format!("messages/{i}"), &vec![i as u8; 4096]).unwrap();
        }
        writer.finish().unwrap()
    };

    c.bench_function("extract_256_sections", |b| {
        b.iter(|| SectionArchive::new(black_box(raw.clone())).sections().unwrap().len())
    });
}

criterion_group!(benches, bench_convert, bench_extract);
criterion_main!(benches);
