//! CLI command implementations
//!
//! Each command loads the config, applies its log level, opens the store
//! and returns the JSON document `run_command` prints. `verify` and
//! `inspect` never open a write transaction.

use std::path::Path;

use serde_json::{json, Value};

use crate::config::RealmConfig;
use crate::errors::SchemaDiscrepancy;
use crate::migration::aligner;
use crate::realm::Realm;
use crate::schema::{load_schema, table_name_for_type, type_for_table_name, Schema, NOT_VERSIONED};
use crate::store::{MemoryStore, TableStore};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Verify { config } => {
            let report = verify(&config)?;
            let count = report["discrepancies"].as_array().map_or(0, Vec::len)
                + report["missing_tables"].as_array().map_or(0, Vec::len);
            write_response(report)?;
            if count > 0 {
                return Err(CliError::schema_mismatch(count));
            }
            Ok(())
        }
        Command::Migrate { config } => write_response(migrate(&config)?),
        Command::Inspect { config } => write_response(inspect(&config)?),
    }
}

fn load_config(config_path: &Path) -> CliResult<RealmConfig> {
    let config = RealmConfig::load(config_path)?;
    config.apply_logging();
    Ok(config)
}

fn load_declared_schema(config: &RealmConfig) -> CliResult<Schema> {
    let path = config
        .schema_path
        .as_ref()
        .ok_or_else(|| CliError::config_error("schema_path is required for this command"))?;
    Ok(load_schema(path)?)
}

fn open_store(config: &RealmConfig) -> CliResult<MemoryStore> {
    match &config.path {
        Some(path) => Ok(MemoryStore::open(path)?),
        None => Ok(MemoryStore::in_memory()),
    }
}

fn version_json(version: u64) -> Value {
    if version == NOT_VERSIONED {
        Value::Null
    } else {
        json!(version)
    }
}

/// Compares the stored layout with the declared schema.
///
/// Reports every discrepancy of every type plus the declared types that
/// have no table yet. A version mismatch is reported, not treated as an
/// error.
pub fn verify(config_path: &Path) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let schema = load_declared_schema(&config)?;
    let store = open_store(&config)?;

    let mut discrepancies: Vec<SchemaDiscrepancy> = Vec::new();
    let mut missing_tables = Vec::new();
    for declared in &schema.object_schemas {
        if !store.has_table(&table_name_for_type(&declared.name)) {
            missing_tables.push(declared.name.clone());
            continue;
        }
        let stored = aligner::table_schema(&store, &declared.name)?;
        discrepancies.extend(aligner::verify(&stored, declared));
    }

    let persisted = store.schema_version();
    Ok(json!({
        "persisted_version": version_json(persisted),
        "requested_version": config.schema_version,
        "version_matches": persisted == config.schema_version,
        "missing_tables": missing_tables,
        "discrepancies": serde_json::to_value(&discrepancies)?,
    }))
}

/// Reconciles the store without a migration callback.
pub fn migrate(config_path: &Path) -> CliResult<Value> {
    let config = load_config(config_path)?;
    config.validate()?;
    let schema = load_declared_schema(&config)?;
    let store = open_store(&config)?;

    let mut realm = Realm::new(store).with_relaxation_copy(config.relaxation_copy);
    let outcome = realm.reconcile(schema, config.schema_version)?;

    Ok(json!({
        "outcome": outcome.as_str(),
        "schema_version": version_json(realm.schema_version()),
        "types": realm.schema().type_names().collect::<Vec<_>>(),
    }))
}

/// Dumps version, tables, columns, search indexes, primary keys and row
/// counts of the stored layout.
pub fn inspect(config_path: &Path) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    let mut tables = Vec::new();
    for table in store.table_names() {
        let mut columns = Vec::new();
        for (index, spec) in store.columns(&table)?.iter().enumerate() {
            columns.push(json!({
                "name": spec.name,
                "type": spec.column_type.type_name(),
                "nullable": spec.nullable,
                "link_target": spec.link_target,
                "indexed": store.has_search_index(&table, index)?,
            }));
        }
        tables.push(json!({
            "name": table,
            "type": type_for_table_name(&table),
            "primary_key": store.primary_key(&table)?,
            "rows": store.row_count(&table)?,
            "columns": columns,
        }));
    }

    Ok(json!({
        "path": config.path.as_ref().map(|p| p.display().to_string()),
        "schema_version": version_json(store.schema_version()),
        "tables": tables,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_fixture(temp_dir: &TempDir, version: u64, schema: Value) -> std::path::PathBuf {
        let config_path = temp_dir.path().join("realmkit.json");
        let schema_path = temp_dir.path().join("schema.json");
        let store_path = temp_dir.path().join("store.json");

        fs::write(&schema_path, schema.to_string()).unwrap();
        let config = json!({
            "path": store_path.to_string_lossy(),
            "schema_path": schema_path.to_string_lossy(),
            "schema_version": version,
            "log_level": "FATAL"
        });
        fs::write(&config_path, config.to_string()).unwrap();
        config_path
    }

    fn dog_schema(age_type: &str) -> Value {
        json!({
            "object_schemas": [{
                "name": "Dog",
                "primary_key": "name",
                "properties": [
                    {"name": "name", "type": "string"},
                    {"name": "age", "type": age_type}
                ]
            }]
        })
    }

    #[test]
    fn test_migrate_then_verify_clean() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_fixture(&temp_dir, 1, dog_schema("int"));

        let result = migrate(&config_path).unwrap();
        assert_eq!(result["outcome"], "committed");
        assert_eq!(result["schema_version"], 1);

        let report = verify(&config_path).unwrap();
        assert_eq!(report["version_matches"], true);
        assert_eq!(report["discrepancies"].as_array().unwrap().len(), 0);
        assert_eq!(report["missing_tables"].as_array().unwrap().len(), 0);

        let again = migrate(&config_path).unwrap();
        assert_eq!(again["outcome"], "verified");
    }

    #[test]
    fn test_verify_reports_discrepancies() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_fixture(&temp_dir, 1, dog_schema("int"));
        migrate(&config_path).unwrap();

        let config_path = write_fixture(&temp_dir, 1, dog_schema("string"));
        let report = verify(&config_path).unwrap();
        let discrepancies = report["discrepancies"].as_array().unwrap();
        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0]["property"], "age");
        assert_eq!(discrepancies[0]["kind"], "type_changed");
    }

    #[test]
    fn test_verify_fresh_store_lists_missing_tables() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_fixture(&temp_dir, 1, dog_schema("int"));

        let report = verify(&config_path).unwrap();
        assert_eq!(report["persisted_version"], Value::Null);
        assert_eq!(report["missing_tables"][0], "Dog");
    }

    #[test]
    fn test_inspect_dumps_layout() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_fixture(&temp_dir, 2, dog_schema("int"));
        migrate(&config_path).unwrap();

        let dump = inspect(&config_path).unwrap();
        assert_eq!(dump["schema_version"], 2);
        let table = &dump["tables"][0];
        assert_eq!(table["name"], "class_Dog");
        assert_eq!(table["type"], "Dog");
        assert_eq!(table["primary_key"], "name");
        assert_eq!(table["rows"], 0);
        assert_eq!(table["columns"][0]["indexed"], true);
        assert_eq!(table["columns"][1]["type"], "int");
    }

    #[test]
    fn test_migrate_requires_schema_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("realmkit.json");
        fs::write(&config_path, json!({"schema_version": 1}).to_string()).unwrap();

        let err = migrate(&config_path).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_migrate_refuses_regression() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = write_fixture(&temp_dir, 5, dog_schema("int"));
        migrate(&config_path).unwrap();

        let config_path = write_fixture(&temp_dir, 3, dog_schema("int"));
        let err = migrate(&config_path).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::OperationFailed);
        assert!(err.message().contains("REALM_VERSION_REGRESSION"));
    }
}
