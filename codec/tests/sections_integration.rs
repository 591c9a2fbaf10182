use codec::{
    read_table, write_table, CodecError, EncryptedSection, ReadOptions, RecordMeta, Row,
    TableTemplate, Value, WriteOptions,
};
use schema::{ColumnDescriptor, TableSchema, ValueType};
use wire::{DecodeError, Generation, LimitKind, Limits, TableFlags};

const TACT_KEY: u64 = 0xDEAD_BEEF_0000_0001;

fn quest_schema() -> TableSchema {
    TableSchema::new(
        "Quest",
        vec![
            ColumnDescriptor::scalar("ID", ValueType::U32).index(),
            ColumnDescriptor::scalar("Title", ValueType::String),
            ColumnDescriptor::scalar("Reward", ValueType::U32),
        ],
    )
    .unwrap()
}

fn quest(id: u32, title: &str, reward: u32) -> Row {
    Row::new(id, vec![Value::U32(id), Value::from(title), Value::U32(reward)])
}

/// A two-section template with ids 10 and 11 placed in the second section.
fn two_sections(second_tact: u64) -> TableTemplate {
    let mut template = TableTemplate::builder(Generation::Wdc3, &quest_schema())
        .flags(TableFlags::from_raw(TableFlags::INDEX))
        .section(0)
        .section(second_tact)
        .build()
        .unwrap();
    for id in [10, 11] {
        template.records.insert(
            id,
            RecordMeta {
                section: 1,
                secondary_key: 0,
            },
        );
    }
    template
}

#[test]
fn strings_resolve_across_sections() {
    let schema = quest_schema();
    let rows = vec![
        quest(1, "Into the Wilds", 5),
        quest(2, "Return", 6),
        quest(10, "Second Wave", 7),
        quest(11, "Into the Wilds", 8),
    ];
    let bytes = write_table(&two_sections(0), &schema, &rows, &WriteOptions::default()).unwrap();
    let set = read_table(bytes, &ReadOptions::default()).unwrap();

    assert_eq!(set.sections().len(), 2);
    assert_eq!(set.sections()[0].header.record_count, 2);
    assert_eq!(set.sections()[1].header.record_count, 2);
    // Every written string lives in the first section's table.
    assert_eq!(set.sections()[1].header.string_table_size, 0);
    assert!(set.encrypted_sections().is_empty());
    assert_eq!(set.rows(&schema).unwrap(), rows);
}

#[test]
fn wdc2_sections_round_trip() {
    let schema = quest_schema();
    let mut template = TableTemplate::builder(Generation::Wdc2, &schema)
        .section(0)
        .section(0)
        .build()
        .unwrap();
    template.records.insert(
        3,
        RecordMeta {
            section: 1,
            secondary_key: 0,
        },
    );
    let rows = vec![quest(1, "a", 1), quest(3, "b", 2), quest(4, "a", 3)];
    let bytes = write_table(&template, &schema, &rows, &WriteOptions::default()).unwrap();
    let set = read_table(bytes, &ReadOptions::default()).unwrap();

    assert_eq!(set.sections()[1].header.record_count, 1);
    let read = set.rows(&schema).unwrap();
    assert_eq!(read, vec![rows[0].clone(), rows[2].clone(), rows[1].clone()]);
}

/// Rows 10 and 11 have all-zero records, so a keyed section holding them
/// reads back as encrypted. Copies stay off so both remain records.
fn encrypted_table() -> Vec<u8> {
    let rows = vec![
        quest(1, "Visible", 5),
        quest(2, "Also visible", 6),
        quest(10, "", 0),
        quest(11, "", 0),
    ];
    write_table(
        &two_sections(TACT_KEY),
        &quest_schema(),
        &rows,
        &WriteOptions::without_copies(),
    )
    .unwrap()
}

#[test]
fn encrypted_sections_are_skipped_and_reported() {
    let schema = quest_schema();
    let set = read_table(encrypted_table(), &ReadOptions::default()).unwrap();

    assert_eq!(
        set.encrypted_sections(),
        vec![EncryptedSection {
            index: 1,
            tact_key_hash: TACT_KEY,
            record_count: 2,
        }]
    );
    assert_eq!(set.sections()[1].id_list, vec![10, 11]);
    let rows = set.rows(&schema).unwrap();
    assert_eq!(rows, vec![quest(1, "Visible", 5), quest(2, "Also visible", 6)]);
}

#[test]
fn encrypted_sections_survive_a_rewrite() {
    let schema = quest_schema();
    let set = read_table(encrypted_table(), &ReadOptions::default()).unwrap();
    let template = set.template();
    assert!(template.sections[1].preserved.is_some());

    let mut rows = set.rows(&schema).unwrap();
    rows.push(quest(3, "New", 9));
    let bytes = write_table(&template, &schema, &rows, &WriteOptions::default()).unwrap();
    let again = read_table(bytes, &ReadOptions::default()).unwrap();

    assert_eq!(again.encrypted_sections(), set.encrypted_sections());
    assert_eq!(again.sections()[1].id_list, vec![10, 11]);
    assert_eq!(again.header().min_id, 1);
    assert_eq!(again.header().max_id, 11);
    assert_eq!(again.rows(&schema).unwrap(), rows);
}

#[test]
fn section_count_over_the_limit_is_rejected() {
    let schema = quest_schema();
    let template = TableTemplate::builder(Generation::Wdc3, &schema)
        .section(0)
        .section(0)
        .section(0)
        .build()
        .unwrap();
    let bytes = write_table(&template, &schema, &[], &WriteOptions::default()).unwrap();

    let options = ReadOptions {
        limits: Limits {
            max_sections: 2,
            ..Limits::default()
        },
        ..ReadOptions::default()
    };
    let err = read_table(bytes.clone(), &options).unwrap_err();
    assert!(matches!(
        err,
        CodecError::Wire(DecodeError::LimitsExceeded {
            kind: LimitKind::SectionCount,
            limit: 2,
            actual: 3,
        })
    ));
    assert!(read_table(bytes, &ReadOptions::default()).is_ok());
}

#[test]
fn rows_without_a_plain_section_are_rejected() {
    let schema = quest_schema();
    let set = read_table(encrypted_table(), &ReadOptions::default()).unwrap();
    let mut template = set.template();
    // Mark the visible section as preserved too.
    let preserved = template.sections[1].preserved.clone();
    template.sections[0].preserved = preserved;
    let err = write_table(
        &template,
        &schema,
        &[quest(5, "x", 1)],
        &WriteOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CodecError::RoundTripMismatch { .. }));
}

#[test]
fn rewriting_sections_is_byte_identical() {
    let schema = quest_schema();
    let rows = vec![
        quest(1, "Into the Wilds", 5),
        quest(2, "Return", 6),
        quest(10, "Second Wave", 7),
        quest(11, "Into the Wilds", 8),
    ];
    let first = write_table(&two_sections(0), &schema, &rows, &WriteOptions::default()).unwrap();
    let set = read_table(first.clone(), &ReadOptions::default()).unwrap();
    let again = write_table(
        &set.template(),
        &schema,
        &set.rows(&schema).unwrap(),
        &WriteOptions::default(),
    )
    .unwrap();
    assert_eq!(first, again);
}

#[test]
fn rewriting_an_encrypted_table_is_byte_identical() {
    let schema = quest_schema();
    let first = encrypted_table();
    let set = read_table(first.clone(), &ReadOptions::default()).unwrap();
    let again = write_table(
        &set.template(),
        &schema,
        &set.rows(&schema).unwrap(),
        &WriteOptions::without_copies(),
    )
    .unwrap();
    assert_eq!(first, again);
}
