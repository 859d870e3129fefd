mod common;

use common::{simple_fixture, Fixture, SIMPLE_LAYOUT};
use db2_engine::{read_header, write_header, Db2Error, Db2Version};

fn expect_malformed(bytes: &[u8], context: &str) {
    match read_header(bytes) {
        Err(Db2Error::MalformedHeader(_)) => {}
        other => panic!("{}: expected MalformedHeader, got {:?}", context, other),
    }
}

#[test]
fn reads_every_header_field() {
    let mut fixture = simple_fixture();
    fixture.locale = 0x2;
    fixture.flags = 0x10;
    let bytes = fixture.build();

    let header = read_header(&bytes).expect("valid header");
    assert_eq!(header.version, Db2Version::Wdc2);
    assert_eq!(header.record_count, 2);
    assert_eq!(header.field_count, 2);
    assert_eq!(header.record_size, 8);
    assert_eq!(header.string_table_size, 0);
    assert_eq!(header.table_hash, 0xAABB_CCDD);
    assert_eq!(header.layout_hash, SIMPLE_LAYOUT);
    assert_eq!((header.min_id, header.max_id), (100, 101));
    assert_eq!(header.locale, 0x2);
    assert_eq!(header.flags.0, 0x10, "unknown flag bits must be kept");
    assert_eq!(header.id_field_index, 0);
    assert_eq!(header.id_field(), Some(0));
    assert_eq!(header.field_storage_info_size, 0);
}

#[test]
fn written_header_reads_back_identically() {
    let bytes = simple_fixture().build();
    let header = read_header(&bytes).expect("valid header");

    let mut out = Vec::new();
    write_header(&header, &mut out);
    assert_eq!(out, &bytes[..72], "header bytes must be reproduced exactly");
}

#[test]
fn rejects_unknown_magic() {
    let mut fixture = simple_fixture();
    fixture.magic = *b"WDB5";
    expect_malformed(&fixture.build(), "magic WDB5");
}

#[test]
fn rejects_input_shorter_than_header() {
    let bytes = simple_fixture().build();
    expect_malformed(&bytes[..40], "40-byte input");
    expect_malformed(&[], "empty input");
}

#[test]
fn rejects_zero_record_size_with_records() {
    let mut fixture = simple_fixture();
    fixture.record_size = 0;
    expect_malformed(&fixture.build(), "record_size 0");
}

#[test]
fn rejects_blocks_past_end_of_input() {
    let bytes = simple_fixture().build();
    // The record block declares 16 bytes; drop the last four.
    expect_malformed(&bytes[..bytes.len() - 4], "truncated record block");

    let mut fixture = simple_fixture();
    fixture.strings = b"abc\0".to_vec();
    let mut bytes = fixture.build();
    bytes.truncate(bytes.len() - 1);
    expect_malformed(&bytes, "truncated string block");
}

#[test]
fn rejects_id_field_index_outside_fields() {
    let mut fixture = simple_fixture();
    fixture.id_field_index = 2;
    expect_malformed(&fixture.build(), "id index 2 of 2 fields");

    fixture.id_field_index = -2;
    expect_malformed(&fixture.build(), "id index -2");
}

#[test]
fn rejects_field_info_of_wrong_size() {
    let mut fixture = simple_fixture();
    fixture.field_info(0, 32, 0, 0, [0; 3]);
    expect_malformed(&fixture.build(), "one field info entry for two fields");
}

#[test]
fn accepts_empty_table() {
    let fixture = Fixture::new(SIMPLE_LAYOUT, 2, 0);
    let header = read_header(&fixture.build()).expect("empty table header");
    assert_eq!(header.record_count, 0);
    assert_eq!(header.record_size, 0);
}
