mod common;

use common::{named_schema, registry_with, simple_fixture, simple_schema, text};
use db2_engine::{Db2Error, Table, Value};

fn simple_table() -> Table {
    let bytes = simple_fixture().build();
    Table::decode(&bytes, &registry_with(&[&simple_schema()])).expect("decode fixture")
}

#[test]
fn get_reports_unknown_field_and_missing_record() {
    let table = simple_table();
    assert!(matches!(table.get(100, "nope"), Err(Db2Error::UnknownField(name)) if name == "nope"));
    assert!(matches!(table.get(7, "value"), Err(Db2Error::RecordNotFound(7))));
}

#[test]
fn set_replaces_a_value() {
    let mut table = simple_table();
    table.set(100, "value", -40i64).unwrap();
    assert_eq!(table.get(100, "value").unwrap(), &Value::Int(-40));
    assert_eq!(table.get(101, "value").unwrap(), &Value::Int(9), "other records untouched");
}

#[test]
fn set_accepts_integers_of_either_signedness_in_range() {
    let mut table = simple_table();
    table.set(100, "value", 12u64).unwrap();
    assert_eq!(table.get(100, "value").unwrap(), &Value::Int(12));
}

#[test]
fn set_rejects_values_the_field_cannot_hold() {
    let mut table = simple_table();
    let cases: &[(&str, Value)] = &[
        ("value", Value::Int(i64::from(i32::MAX) + 1)),
        ("value", text("five")),
        ("value", Value::Float(1.0)),
        ("ID", Value::Int(-1)),
    ];
    for (field, value) in cases {
        match table.set(100, field, value.clone()) {
            Err(Db2Error::UnencodableValue { field: f, .. }) => assert_eq!(&f, field),
            other => panic!("set({}, {}) should be unencodable, got {:?}", field, value, other),
        }
    }
    assert_eq!(table.get(100, "value").unwrap(), &Value::Int(5), "failed sets change nothing");
}

#[test]
fn setting_the_id_column_rekeys_the_record() {
    let mut table = simple_table();
    table.set(100, "ID", 200u64).unwrap();
    assert_eq!(table.ids().collect::<Vec<_>>(), vec![101, 200]);
    assert_eq!(table.get(200, "value").unwrap(), &Value::Int(5));
    assert!(!table.contains(100));

    assert!(matches!(table.set(101, "ID", 200u64), Err(Db2Error::DuplicateId(200))));
}

#[test]
fn add_record_copies_the_template() {
    let mut table = simple_table();
    table.add_record(102, 101).unwrap();
    assert_eq!(table.ids().collect::<Vec<_>>(), vec![100, 101, 102]);
    assert_eq!(table.get(102, "value").unwrap(), &Value::Int(9));
    assert_eq!(table.get(102, "ID").unwrap(), &Value::UInt(102));

    table.add_record(50, 100).unwrap();
    assert_eq!(table.ids().next(), Some(50), "ids stay ascending");
}

#[test]
fn add_record_rejects_existing_id_and_missing_template() {
    let mut table = simple_table();
    assert!(matches!(table.add_record(100, 101), Err(Db2Error::DuplicateId(100))));
    assert!(matches!(table.add_record(300, 999), Err(Db2Error::RecordNotFound(999))));
    assert_eq!(table.len(), 2);
}

#[test]
fn add_default_record_uses_zero_values() {
    let mut table = Table::new(named_schema());
    table.add_default_record(4).unwrap();
    assert_eq!(table.get(4, "ID").unwrap(), &Value::UInt(4));
    assert_eq!(table.get(4, "Name").unwrap(), &text(""));
}

#[test]
fn append_record_copies_the_last_row() {
    let mut table = simple_table();
    assert_eq!(table.append_record().unwrap(), 102);
    assert_eq!(table.get(102, "value").unwrap(), &Value::Int(9));

    let mut empty = Table::new(simple_schema());
    assert_eq!(empty.append_record().unwrap(), 1);
    assert_eq!(empty.get(1, "value").unwrap(), &Value::Int(0));
}

#[test]
fn remove_record_returns_the_row() {
    let mut table = simple_table();
    let removed = table.remove_record(100).unwrap();
    assert_eq!(removed.id(), 100);
    assert_eq!(removed.values(), &[Value::UInt(100), Value::Int(5)]);
    assert_eq!(table.ids().collect::<Vec<_>>(), vec![101]);

    assert!(matches!(table.remove_record(100), Err(Db2Error::RecordNotFound(100))));
}

#[test]
fn tables_compare_by_records_not_header() {
    let decoded = simple_table();
    let mut built = Table::new(simple_schema());
    built.add_default_record(100).unwrap();
    built.set(100, "value", 5i64).unwrap();
    built.add_record(101, 100).unwrap();
    built.set(101, "value", 9i64).unwrap();

    assert_ne!(decoded.header(), built.header());
    assert_eq!(decoded, built);
}
