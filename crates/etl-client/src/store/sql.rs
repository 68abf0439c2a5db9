//! PostgreSQL INSERT statements from NGSI entities
//!
//! Each entity type gets its own table and one multi-row INSERT per batch.
//! Columns are the sorted union of the attribute names found for that type,
//! after the fixed `entityid, entitytype, fiwareservicepath, recvtime` ones.

use crate::error::Result;
use etl_common::json::to_canonical_string;
use etl_common::Entity;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Table name overrides by entity type. `None` or an empty name skips the type.
pub type TableNames = HashMap<String, Option<String>>;

const FIXED_COLUMNS: &str = "entityid,entitytype,fiwareservicepath,recvtime";

/// Quote `text` as a PostgreSQL string literal.
///
/// Text containing backslashes uses the `E'...'` escape string syntax.
pub fn sql_quote(text: &str) -> String {
    let quoted = text.replace('\'', "''");
    if quoted.contains('\\') {
        format!("E'{}'", quoted.replace('\\', "\\\\"))
    } else {
        format!("'{}'", quoted)
    }
}

/// Render a JSON value as a PostgreSQL literal.
pub fn sql_escape(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            let rendered = n.to_string();
            // "x - -1" must never render as the comment "x --1"
            if rendered.starts_with('-') {
                format!(" {}", rendered)
            } else {
                rendered
            }
        }
        Value::String(s) => sql_quote(s),
        Value::Array(items) if items.is_empty() => "'{}'".to_string(),
        Value::Array(items) => {
            let rendered = items.iter().map(sql_escape).collect::<Result<Vec<_>>>()?;
            format!("ARRAY[{}]", rendered.join(","))
        }
        Value::Object(_) => sql_quote(&to_canonical_string(value)?),
    })
}

/// One `(...)` row for `entity`, with a value per column in `fields`.
pub fn sqlfile_values(subservice: &str, entity: &Entity, fields: &[&str]) -> Result<String> {
    let mut sql = vec![
        sql_quote(&entity.id),
        sql_quote(&entity.entity_type),
        sql_quote(subservice),
        "NOW()".to_string(),
    ];

    for field in fields {
        let value = match entity.attribute(field) {
            None => "NULL".to_string(),
            Some(attr) if attr.value.is_null() => "NULL".to_string(),
            Some(attr) if attr.attr_type.contains("json") => {
                let escaped = sql_quote(&to_canonical_string(&attr.value)?);
                if attr.attr_type.contains("geo") {
                    format!("ST_GeomFromGeoJSON({})", escaped)
                } else {
                    escaped
                }
            }
            Some(attr) => sql_escape(&attr.value)?,
        };
        sql.push(value);
    }

    Ok(format!("({})", sql.join(",")))
}

/// Multi-row INSERT of `entities` into `table_name`.
pub fn sqlfile_insert(
    subservice: &str,
    table_name: &str,
    fields: &[&str],
    entities: &[&Entity],
) -> Result<String> {
    let columns = if fields.is_empty() {
        FIXED_COLUMNS.to_string()
    } else {
        format!("{},{}", FIXED_COLUMNS, fields.join(","))
    };

    let rows = entities
        .iter()
        .map(|entity| sqlfile_values(subservice, entity, fields))
        .collect::<Result<Vec<_>>>()?;

    Ok(format!(
        "INSERT INTO {} ({}) VALUES\n{};",
        table_name,
        columns,
        rows.join(",\n")
    ))
}

/// Qualified table name for `entity_type`, or `None` if the type is skipped.
pub fn sql_table_name(
    schema: &str,
    namespace: &str,
    entity_type: &str,
    table_names: &TableNames,
) -> Option<String> {
    let name = match table_names.get(entity_type) {
        Some(mapped) => mapped.clone().filter(|name| !name.is_empty())?,
        None if namespace.is_empty() => entity_type.to_lowercase(),
        None => format!("{}_{}", namespace, entity_type.to_lowercase()),
    };
    Some(format!("{}.{}", schema, name))
}

/// INSERT statements for `entities`, one per entity type, ordered by type.
pub fn sqlfile_batch(
    schema: &str,
    namespace: &str,
    table_names: &TableNames,
    subservice: &str,
    entities: &[Entity],
) -> Result<String> {
    let mut by_type: BTreeMap<&str, Vec<&Entity>> = BTreeMap::new();
    for entity in entities {
        by_type.entry(entity.entity_type.as_str()).or_default().push(entity);
    }

    let mut statements = Vec::with_capacity(by_type.len());
    for (entity_type, typed) in &by_type {
        let Some(table_name) = sql_table_name(schema, namespace, entity_type, table_names) else {
            continue;
        };

        let fields: BTreeSet<&str> = typed
            .iter()
            .flat_map(|entity| entity.attributes.keys().map(String::as_str))
            .collect();
        let fields: Vec<&str> = fields.into_iter().collect();

        statements.push(sqlfile_insert(subservice, &table_name, &fields, typed)?);
    }

    Ok(statements.join("\n"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    pub(crate) fn test_entities() -> Vec<Entity> {
        let point = |x: i64, y: i64| json!({"type": "Point", "coordinates": [x, y]});
        let type_a = |id: &str, municipality: &str, location: Value| {
            json!({
                "id": id,
                "type": "type_A",
                "municipality": {"type": "Text", "value": municipality},
                "location": {"type": "geo:json", "value": location}
            })
        };
        let type_b = |id: &str, instant: &str, temperature: i64| {
            json!({
                "id": id,
                "type": "type_B",
                "TimeInstant": {"type": "DateTime", "value": instant},
                "temperature": {"type": "Number", "value": temperature}
            })
        };

        [
            type_a("id_1", "NA", point(1, 2)),
            type_b("id_2", "2022-12-15T18:00:00Z", 20),
            type_a("id_3", "NA", point(3, 4)),
            type_b("id_4", "2022-12-15T18:01:00Z", 21),
            type_a("id_5", "Alcobendas", point(5, 6)),
        ]
        .into_iter()
        .map(|value| serde_json::from_value(value).unwrap())
        .collect()
    }

    #[test]
    fn test_escape_scalars() {
        assert_eq!(sql_escape(&json!(null)).unwrap(), "NULL");
        assert_eq!(sql_escape(&json!(true)).unwrap(), "true");
        assert_eq!(sql_escape(&json!(20)).unwrap(), "20");
        assert_eq!(sql_escape(&json!(20.5)).unwrap(), "20.5");
        assert_eq!(sql_escape(&json!(-3)).unwrap(), " -3");
        assert_eq!(sql_escape(&json!("O'Donnell")).unwrap(), "'O''Donnell'");
        assert_eq!(sql_escape(&json!(r"C:\data")).unwrap(), r"E'C:\\data'");
    }

    #[test]
    fn test_escape_collections() {
        assert_eq!(sql_escape(&json!([1, "a", null])).unwrap(), "ARRAY[1,'a',NULL]");
        assert_eq!(sql_escape(&json!([])).unwrap(), "'{}'");
        assert_eq!(
            sql_escape(&json!({"name": "it's"})).unwrap(),
            r#"'{"name": "it''s"}'"#
        );
    }

    #[test]
    fn test_table_names() {
        let mut overrides = TableNames::new();
        overrides.insert("type_A".to_string(), Some("renamed".to_string()));
        overrides.insert("type_B".to_string(), None);
        overrides.insert("type_C".to_string(), Some(String::new()));

        assert_eq!(
            sql_table_name(":target_schema", "", "Type_D", &overrides).as_deref(),
            Some(":target_schema.type_d")
        );
        assert_eq!(
            sql_table_name("s", "ns", "Type_D", &overrides).as_deref(),
            Some("s.ns_type_d")
        );
        assert_eq!(
            sql_table_name("s", "ns", "type_A", &overrides).as_deref(),
            Some("s.renamed")
        );
        assert_eq!(sql_table_name("s", "ns", "type_B", &overrides), None);
        assert_eq!(sql_table_name("s", "ns", "type_C", &overrides), None);
    }

    #[test]
    fn test_batch_groups_by_type() {
        let sql = sqlfile_batch(":target_schema", "", &TableNames::new(), "/testsrv", &test_entities())
            .unwrap();

        let expected = r#"INSERT INTO :target_schema.type_a (entityid,entitytype,fiwareservicepath,recvtime,location,municipality) VALUES
('id_1','type_A','/testsrv',NOW(),ST_GeomFromGeoJSON('{"type": "Point", "coordinates": [1, 2]}'),'NA'),
('id_3','type_A','/testsrv',NOW(),ST_GeomFromGeoJSON('{"type": "Point", "coordinates": [3, 4]}'),'NA'),
('id_5','type_A','/testsrv',NOW(),ST_GeomFromGeoJSON('{"type": "Point", "coordinates": [5, 6]}'),'Alcobendas');
INSERT INTO :target_schema.type_b (entityid,entitytype,fiwareservicepath,recvtime,TimeInstant,temperature) VALUES
('id_2','type_B','/testsrv',NOW(),'2022-12-15T18:00:00Z',20),
('id_4','type_B','/testsrv',NOW(),'2022-12-15T18:01:00Z',21);"#;
        assert_eq!(sql, expected);
    }

    #[test]
    fn test_missing_attribute_is_null() {
        let entities: Vec<Entity> = vec![
            Entity::new("r1", "Room").with_attribute("temperature", "Number", 21),
            Entity::new("r2", "Room").with_attribute("humidity", "Number", 40),
            Entity::new("r3", "Room").with_attribute("humidity", "Number", Value::Null),
        ];
        let sql = sqlfile_batch("s", "", &TableNames::new(), "/", &entities).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO s.room (entityid,entitytype,fiwareservicepath,recvtime,humidity,temperature) VALUES\n\
             ('r1','Room','/',NOW(),NULL,21),\n\
             ('r2','Room','/',NOW(),40,NULL),\n\
             ('r3','Room','/',NOW(),NULL,NULL);"
        );
    }

    #[test]
    fn test_plain_json_attribute() {
        let entity = Entity::new("r1", "Room").with_attribute(
            "config",
            "StructuredValue:json",
            json!({"mode": "eco", "level": 2}),
        );
        let row = sqlfile_values("/", &entity, &["config"]).unwrap();
        assert_eq!(row, r#"('r1','Room','/',NOW(),'{"mode": "eco", "level": 2}')"#);
    }

    #[test]
    fn test_type_without_attributes() {
        let entities = vec![Entity::new("r1", "Room")];
        let sql = sqlfile_batch("s", "", &TableNames::new(), "/", &entities).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO s.room (entityid,entitytype,fiwareservicepath,recvtime) VALUES\n('r1','Room','/',NOW());"
        );
    }

    #[test]
    fn test_empty_batch() {
        assert_eq!(sqlfile_batch("s", "", &TableNames::new(), "/", &[]).unwrap(), "");
    }
}
