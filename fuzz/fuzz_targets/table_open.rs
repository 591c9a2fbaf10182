#![no_main]

use codec::{read_table, ReadOptions};
use libfuzzer_sys::fuzz_target;
use schema::{ColumnDescriptor, TableSchema, ValueType};

fn schema() -> TableSchema {
    TableSchema::new(
        "Fuzz",
        vec![
            ColumnDescriptor::scalar("ID", ValueType::U32).index(),
            ColumnDescriptor::scalar("Name", ValueType::String),
            ColumnDescriptor::array("Values", ValueType::U16, 2),
        ],
    )
    .expect("fuzz schema is valid")
}

fuzz_target!(|data: &[u8]| {
    let options = ReadOptions::for_testing();
    let Ok(set) = read_table(data.to_vec(), &options) else {
        return;
    };

    // Records are located; decoding against a mismatched schema must fail cleanly.
    let _ = set.rows(&schema());
    let _ = set.encrypted_sections();
    for record in set.records() {
        let _ = set.record_bytes(record);
    }
    let _ = set.template();
});
