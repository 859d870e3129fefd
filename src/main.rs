use db2_engine::{read_header, SchemaRegistry, Table};
use std::env;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "Usage: {} <path-to-db2-file> [--schema <DEFINITIONS_XML>] [--roundtrip <OUTPUT_DB2>]",
            args[0]
        );
        std::process::exit(1);
    }

    let db2_path = &args[1];
    let schema_path = flag_value(&args, "--schema");
    let roundtrip_path = flag_value(&args, "--roundtrip");
    if roundtrip_path.is_some() && schema_path.is_none() {
        eprintln!("ERROR: --roundtrip requires --schema.");
        std::process::exit(1);
    }

    let bytes = match std::fs::read(db2_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("ERROR: Failed to read {}: {}", db2_path, e);
            std::process::exit(1);
        }
    };

    println!("Reading DB2 file: {}", db2_path);
    println!("{}", "=".repeat(60));

    let header = match read_header(&bytes) {
        Ok(header) => header,
        Err(e) => {
            eprintln!("\nERROR: Failed to read DB2 header");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("\nHeader Information:");
    println!("  Version: {:?}", header.version);
    println!("  RecordsCount: {}", header.record_count);
    println!("  FieldsCount: {}", header.field_count);
    println!("  RecordSize: {}", header.record_size);
    println!("  StringTableSize: {}", header.string_table_size);
    println!("  TableHash: {:#010x}", header.table_hash);
    println!("  LayoutHash: {:#010x}", header.layout_hash);
    println!("  MinId: {}", header.min_id);
    println!("  MaxId: {}", header.max_id);
    println!("  Locale: {:#x}", header.locale);
    println!("  TotalFieldCount: {}", header.total_field_count);
    println!("  BitpackedDataOffset: {}", header.bitpacked_data_offset);
    println!("  LookupColumnCount: {}", header.lookup_column_count);
    println!("  FieldInfoSize: {}", header.field_storage_info_size);
    println!("  CommonDataSize: {}", header.common_data_size);
    println!("  PalletDataSize: {}", header.pallet_data_size);
    println!("  IdFieldIndex: {}", header.id_field_index);
    println!("  Flags: {}", header.flags);

    let Some(schema_path) = schema_path else {
        return;
    };

    let registry = match SchemaRegistry::load(schema_path) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("\nERROR: Failed to load definitions");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let table = match Table::decode(&bytes, &registry) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("\nERROR: Failed to decode DB2 file");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("\nTable '{}': {} records", table.schema().name, table.len());
    println!("  Fields: {}", table.field_names().collect::<Vec<_>>().join(", "));

    println!("\nSample Records (first 10):");
    for record in table.records().iter().take(10) {
        let cells: Vec<String> = table
            .field_names()
            .zip(record.values())
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        println!("  [{}] {}", record.id(), cells.join(" "));
    }
    if table.len() > 10 {
        println!("  ... and {} more", table.len() - 10);
    }

    if let Some(out_path) = roundtrip_path {
        match table.save(out_path) {
            Ok(()) => println!("\nRe-encoded table written to {}", out_path),
            Err(e) => {
                eprintln!("\nERROR: Failed to re-encode table");
                eprintln!("  {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Returns the argument following `flag`, if present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let idx = args.iter().position(|arg| arg == flag)?;
    match args.get(idx + 1) {
        Some(value) => Some(value.as_str()),
        None => {
            eprintln!("ERROR: {} flag requires an argument.", flag);
            std::process::exit(1);
        }
    }
}
