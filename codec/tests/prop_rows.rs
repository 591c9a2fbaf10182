use codec::{read_table, write_table, ReadOptions, Row, TableTemplate, Value, WriteOptions};
use proptest::prelude::*;
use schema::{ColumnDescriptor, TableSchema, ValueType};
use wire::{ColumnCompression, Generation, TableFlags};

fn schema() -> TableSchema {
    TableSchema::new(
        "Creature",
        vec![
            ColumnDescriptor::scalar("ID", ValueType::U32).index(),
            ColumnDescriptor::scalar("Name", ValueType::String),
            ColumnDescriptor::scalar("Health", ValueType::I32),
            ColumnDescriptor::scalar("Family", ValueType::U8),
            ColumnDescriptor::array("Spells", ValueType::U32, 2),
        ],
    )
    .unwrap()
}

fn row_strategy() -> impl Strategy<Value = (String, i32, u8, [u32; 2])> {
    (
        "[a-z ]{0,12}",
        any::<i32>(),
        0u8..8,
        prop::array::uniform2(0u32..50),
    )
}

fn rows_strategy() -> impl Strategy<Value = Vec<Row>> {
    prop::collection::btree_map(1u32..5000, row_strategy(), 0..40).prop_map(|rows| {
        rows.into_iter()
            .map(|(id, (name, health, family, spells))| {
                Row::new(
                    id,
                    vec![
                        Value::U32(id),
                        Value::String(name),
                        Value::I32(health),
                        Value::U8(family),
                        Value::Array(spells.iter().map(|s| Value::U32(*s)).collect()),
                    ],
                )
            })
            .collect()
    })
}

fn generation_strategy() -> impl Strategy<Value = Generation> {
    prop::sample::select(vec![
        Generation::Wdbc,
        Generation::Wdb2,
        Generation::Wdb5,
        Generation::Wdb6,
        Generation::Wdc1,
        Generation::Wdc2,
        Generation::Wdc3,
    ])
}

proptest! {
    #[test]
    fn prop_rows_roundtrip(
        generation in generation_strategy(),
        rows in rows_strategy(),
        collapse in any::<bool>(),
    ) {
        let schema = schema();
        let template = TableTemplate::builder(generation, &schema).build().unwrap();
        let options = WriteOptions { collapse_copies: collapse, ..WriteOptions::default() };
        let bytes = write_table(&template, &schema, &rows, &options).unwrap();
        let set = read_table(bytes, &ReadOptions::default()).unwrap();
        let mut read = set.rows(&schema).unwrap();
        // Collapsed copies come back after the records.
        read.sort_by_key(|row| row.id);
        prop_assert_eq!(read, rows);
    }

    #[test]
    fn prop_compressed_rows_roundtrip(rows in rows_strategy()) {
        let schema = schema();
        let template = TableTemplate::builder(Generation::Wdc3, &schema)
            .flags(TableFlags::from_raw(TableFlags::INDEX))
            .compression(
                "Health",
                ColumnCompression::SignedImmediate { bit_offset: 0, bit_width: 0, flags: 0 },
            )
            .compression(
                "Family",
                ColumnCompression::Pallet { bit_offset: 0, bit_width: 0, cardinality: 0 },
            )
            .compression(
                "Spells",
                ColumnCompression::PalletArray { bit_offset: 0, bit_width: 0, cardinality: 0 },
            )
            .build()
            .unwrap();
        let bytes = write_table(&template, &schema, &rows, &WriteOptions::default()).unwrap();
        let set = read_table(bytes, &ReadOptions::default()).unwrap();
        let mut read = set.rows(&schema).unwrap();
        read.sort_by_key(|row| row.id);
        prop_assert_eq!(read, rows);
    }

    #[test]
    fn prop_sparse_rows_roundtrip(
        generation in prop::sample::select(vec![
            Generation::Wdb5,
            Generation::Wdc1,
            Generation::Wdc2,
            Generation::Wdc3,
        ]),
        rows in rows_strategy(),
    ) {
        let schema = schema();
        let template = TableTemplate::builder(generation, &schema)
            .flags(TableFlags::from_raw(TableFlags::SPARSE))
            .build()
            .unwrap();
        let bytes = write_table(&template, &schema, &rows, &WriteOptions::default()).unwrap();
        let set = read_table(bytes, &ReadOptions::default()).unwrap();
        let ids: Vec<u32> = set.records().iter().map(|r| r.id).collect();
        let expected: Vec<u32> = rows.iter().map(|r| r.id).collect();
        prop_assert_eq!(ids, expected);
        prop_assert_eq!(set.rows(&schema).unwrap(), rows);
    }
}
