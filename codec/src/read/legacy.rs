//! WDBC and WDB2 readers.

use tracing::trace;
use wire::{Generation, LimitKind, Limits, Region, SectionHeader};

use super::{fixed_records, id_span, Parts, Regions};
use crate::error::CodecResult;
use crate::record::{SectionInfo, TableMeta};
use crate::strings::StringBlock;

pub(super) fn read(data: &[u8], meta: &TableMeta, limits: &Limits) -> CodecResult<Parts> {
    let header = &meta.header;
    let mut regions = Regions::new(data, header.generation.header_size());

    if header.generation == Generation::Wdb2 && header.max_id != 0 {
        // Id-to-row index and per-row string lengths; rebuilt on write.
        let span = id_span(header, limits)?;
        regions.skip(span.saturating_mul(4), Region::IdIndex)?;
        regions.skip(span.saturating_mul(2), Region::IdIndex)?;
        trace!(span, "skipped id index");
    }

    let count = header.record_count as usize;
    let record_size = header.record_size as usize;
    limits.check(LimitKind::RecordCount, count)?;
    let start = regions.position();
    let records_len = count.saturating_mul(record_size);
    regions.skip(records_len, Region::Records)?;
    let strings = regions.take(header.string_table_size as usize, Region::StringTable)?;

    let section = SectionInfo {
        header: SectionHeader {
            file_offset: start as u32,
            record_count: header.record_count,
            string_table_size: header.string_table_size,
            ..SectionHeader::default()
        },
        records_len,
        string_table_len: strings.len(),
        ..SectionInfo::default()
    };

    Ok(Parts {
        strings: StringBlock::new(strings.to_vec()),
        records_len,
        sections: vec![section],
        records: fixed_records(start, count, record_size, 0, 0),
        ..Parts::default()
    })
}
