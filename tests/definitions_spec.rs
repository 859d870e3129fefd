mod common;

use common::{simple_fixture, SIMPLE_LAYOUT};
use db2_engine::{Db2Error, FieldType, SchemaRegistry, StorageKind, Table, Value};

const DEFINITIONS: &str = r#"
<definitions>
  <table name="Simple" layoutHash="0x12345678" idField="ID">
    <field name="ID" type="uint" bits="32" storage="inline" offset="0"/>
    <field name="value" type="int" bits="32" offset="32"/>
  </table>
  <table name="Spell" layoutHash="0x00C0FFEE" tableHash="0x9" idField="ID">
    <field name="ID" type="uint" storage="inline" offset="0"/>
    <field name="Name" type="string" storage="inline" offset="32"/>
    <field name="Flags" type="int" bits="16" storage="bitpacked"/>
    <field name="School" type="uint" bits="8" storage="common" default="3"/>
    <field name="Icon" type="uint" storage="pallet" arity="2"/>
  </table>
</definitions>
"#;

fn expect_invalid(xml: &str, context: &str) {
    match SchemaRegistry::from_xml(xml) {
        Err(Db2Error::InvalidDefinition(_)) => {}
        other => panic!("{}: expected InvalidDefinition, got {:?}", context, other),
    }
}

#[test]
fn parses_tables_and_fields() {
    let registry = SchemaRegistry::from_xml(DEFINITIONS).expect("definitions");
    assert_eq!(registry.len(), 2);

    let spell = registry.get(0x00C0_FFEE).expect("Spell schema");
    assert_eq!(spell.name, "Spell");
    assert_eq!(spell.table_hash, Some(9));
    assert_eq!(spell.id_field(), Some(0));
    assert_eq!(
        spell.field_names().collect::<Vec<_>>(),
        vec!["ID", "Name", "Flags", "School", "Icon"]
    );

    let name = spell.field("Name").unwrap();
    assert_eq!(name.value_type, FieldType::Text);
    assert_eq!(name.storage, StorageKind::Inline { bit_offset: 32 });

    let school = spell.field("School").unwrap();
    assert_eq!(school.bit_width, 8);
    assert_eq!(school.storage, StorageKind::CommonData { default: Value::UInt(3) });

    let icon = spell.field("Icon").unwrap();
    assert_eq!(icon.arity, 2);
    assert_eq!(icon.bit_width, 32, "bits defaults to 32");
    assert_eq!(icon.storage, StorageKind::Pallet);
}

#[test]
fn loaded_definitions_decode_matching_file() {
    let registry = SchemaRegistry::from_xml(DEFINITIONS).unwrap();
    let bytes = simple_fixture().build();
    let table = Table::decode(&bytes, &registry).expect("decode with loaded schema");
    assert_eq!(table.schema().layout_hash, SIMPLE_LAYOUT);
    assert_eq!(table.get(101, "value").unwrap(), &Value::Int(9));
}

#[test]
fn loads_definitions_from_disk() {
    let path = std::env::temp_dir().join(format!("db2-engine-defs-{}.xml", std::process::id()));
    std::fs::write(&path, DEFINITIONS).unwrap();
    let registry = SchemaRegistry::load(&path);
    let _ = std::fs::remove_file(&path);
    assert_eq!(registry.unwrap().len(), 2);

    assert!(matches!(
        SchemaRegistry::load("/definitely/not/here.xml"),
        Err(Db2Error::Io(_))
    ));
}

#[test]
fn rejects_malformed_definitions() {
    let cases: &[(&str, &str)] = &[
        (
            r#"<table name="T" layoutHash="1"><field name="a" type="bool" offset="0"/></table>"#,
            "unknown type",
        ),
        (
            r#"<table name="T" layoutHash="1"><field name="a" type="int" storage="sparse"/></table>"#,
            "unknown storage",
        ),
        (
            r#"<table name="T"><field name="a" type="int" offset="0"/></table>"#,
            "missing layout hash",
        ),
        (
            r#"<table name="T" layoutHash="zz"><field name="a" type="int" offset="0"/></table>"#,
            "bad layout hash",
        ),
        (
            r#"<table name="T" layoutHash="1"><field name="a" type="int"/></table>"#,
            "inline field without offset",
        ),
        (
            r#"<table name="T" layoutHash="1">
                 <field name="a" type="int" offset="0"/>
                 <field name="b" type="int" offset="16"/>
               </table>"#,
            "overlapping inline fields",
        ),
        (
            r#"<table name="T" layoutHash="1">
                 <field name="a" type="int" offset="0"/>
                 <field name="a" type="int" offset="32"/>
               </table>"#,
            "duplicate field name",
        ),
        (
            r#"<table name="T" layoutHash="1" idField="s">
                 <field name="s" type="string" offset="0"/>
               </table>"#,
            "string id column",
        ),
        (
            r#"<table name="T" layoutHash="1" idField="i">
                 <field name="i" type="int" offset="0"/>
               </table>"#,
            "signed id column",
        ),
        (
            r#"<table name="T" layoutHash="1">
                 <field name="f" type="float" bits="16" storage="bitpacked"/>
               </table>"#,
            "bit-packed float",
        ),
        (r#"<field name="a" type="int" offset="0"/>"#, "field outside table"),
        (r#"<table name="T" layoutHash="1">"#, "unterminated table"),
        (r#"<table name="T" layoutHash="1"></table>"#, "table without fields"),
    ];
    for (xml, context) in cases {
        expect_invalid(xml, context);
    }
}

#[test]
fn idfield_must_name_an_existing_field() {
    let xml = r#"<table name="T" layoutHash="1" idField="missing">
                   <field name="a" type="uint" offset="0"/>
                 </table>"#;
    assert!(matches!(
        SchemaRegistry::from_xml(xml),
        Err(Db2Error::UnknownField(name)) if name == "missing"
    ));
}
