use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, ToSql};
use serde::Serialize;
use tracing::info;

use crate::{
    db::{fmt_ts, parse_ts},
    error::ApiError,
    extract::derive_zipcode,
    models::{
        BulkCreateOutcome, ContactDetails, CreateResourceRequest, ImportCandidate, ImportItemError,
        Note, Resource, ResourcePage, Status,
    },
};

const RESOURCE_COLS: &str =
    "id, name, category, status, contact_details, notes, zipcode, created_at, last_updated, version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    LastUpdated,
    Name,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "lastUpdated" => Some(SortKey::LastUpdated),
            "name" => Some(SortKey::Name),
            _ => None,
        }
    }

    fn order_clause(&self) -> &'static str {
        match self {
            SortKey::LastUpdated => "last_updated DESC",
            SortKey::Name => "name ASC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub category: Option<String>,
    pub status: Option<Status>,
    pub zipcode: Option<String>,
    pub sort: Option<SortKey>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeOutcome {
    pub renamed: BTreeMap<String, String>,
    pub categories: Vec<String>,
}

pub(crate) fn resource_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Resource> {
    let status_raw: String = row.get(3)?;
    let contact_raw: String = row.get(4)?;
    let notes_raw: String = row.get(5)?;
    let created_raw: String = row.get(7)?;
    let updated_raw: String = row.get(8)?;
    Ok(Resource {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        status: Status::parse(&status_raw).unwrap_or_default(),
        // Rows written before the shape was normalized may hold partial or
        // stringly JSON; collapse anything unreadable to empty values.
        contact_details: serde_json::from_str(&contact_raw).unwrap_or_default(),
        notes: serde_json::from_str(&notes_raw).unwrap_or_default(),
        zipcode: row.get(6)?,
        created_at: parse_ts(&created_raw),
        last_updated: parse_ts(&updated_raw),
        version: row.get(9)?,
    })
}

pub fn list(
    conn: &Connection,
    filters: &ListFilters,
    page: u32,
    limit: u32,
) -> Result<ResourcePage, ApiError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(category) = &filters.category {
        clauses.push("instr(lower(category), lower(?)) > 0");
        args.push(Box::new(category.clone()));
    }
    if let Some(status) = filters.status {
        clauses.push("status = ?");
        args.push(Box::new(status.as_str()));
    }
    if let Some(zipcode) = &filters.zipcode {
        clauses.push("zipcode = ?");
        args.push(Box::new(zipcode.clone()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let order = filters.sort.unwrap_or(SortKey::LastUpdated).order_clause();

    paginate(conn, &where_sql, order, args, page, limit)
}

pub fn search(
    conn: &Connection,
    query: &str,
    page: u32,
    limit: u32,
) -> Result<ResourcePage, ApiError> {
    let where_sql = " WHERE instr(lower(name), lower(?)) > 0 \
         OR instr(lower(category), lower(?)) > 0 \
         OR instr(zipcode, ?) > 0";
    let args: Vec<Box<dyn ToSql>> = vec![
        Box::new(query.to_string()),
        Box::new(query.to_string()),
        Box::new(query.to_string()),
    ];
    paginate(
        conn,
        where_sql,
        SortKey::LastUpdated.order_clause(),
        args,
        page,
        limit,
    )
}

fn paginate(
    conn: &Connection,
    where_sql: &str,
    order: &str,
    mut args: Vec<Box<dyn ToSql>>,
    page: u32,
    limit: u32,
) -> Result<ResourcePage, ApiError> {
    let count_sql = format!("SELECT COUNT(*) FROM resources{where_sql}");
    let total_count: i64 = conn.query_row(
        &count_sql,
        params_from_iter(args.iter().map(|a| a.as_ref())),
        |row| row.get(0),
    )?;

    let skip = (page as i64 - 1) * limit as i64;
    let sql = format!(
        "SELECT {RESOURCE_COLS} FROM resources{where_sql} ORDER BY {order} LIMIT ? OFFSET ?"
    );
    args.push(Box::new(limit as i64));
    args.push(Box::new(skip));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(args.iter().map(|a| a.as_ref())),
        resource_from_row,
    )?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }

    let total_pages = if total_count == 0 {
        0
    } else {
        ((total_count + limit as i64 - 1) / limit as i64) as u32
    };

    Ok(ResourcePage {
        items,
        page,
        total_pages,
        total_count: total_count as u64,
    })
}

pub fn get_by_id(conn: &Connection, id: i64) -> Result<Resource, ApiError> {
    let sql = format!("SELECT {RESOURCE_COLS} FROM resources WHERE id = ?1");
    conn.query_row(&sql, params![id], resource_from_row)
        .map_err(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => ApiError::not_found("Resource not found"),
            other => other.into(),
        })
}

/// Resources whose `lastUpdated` is strictly after `since`, newest first.
pub fn list_updated_since(
    conn: &Connection,
    since: DateTime<Utc>,
) -> Result<Vec<Resource>, ApiError> {
    let sql = format!(
        "SELECT {RESOURCE_COLS} FROM resources WHERE last_updated > ?1 ORDER BY last_updated DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fmt_ts(since)], resource_from_row)?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

pub fn create(conn: &Connection, req: &CreateResourceRequest) -> Result<Resource, ApiError> {
    let name = req.name.trim();
    let category = req.category.trim();
    let zipcode = req.zipcode.trim();
    if name.is_empty() || category.is_empty() || zipcode.is_empty() {
        return Err(ApiError::validation(
            "Required fields missing: name, category, and zipcode are required",
        ));
    }

    let contact_details = resolve_contact_details(req.contact_details.as_ref());
    let status = req.status.unwrap_or_default();

    insert_resource(
        conn,
        name,
        category,
        status,
        &contact_details,
        &[],
        zipcode,
    )
}

/// Per-record validation; a bad record is reported and skipped, never aborts
/// the batch.
pub fn bulk_create(
    conn: &Connection,
    records: &[ImportCandidate],
) -> Result<BulkCreateOutcome, ApiError> {
    let mut created_count = 0usize;
    let mut errors = Vec::new();

    for (index, record) in records.iter().enumerate() {
        if record.name.trim().is_empty() || record.category.trim().is_empty() {
            errors.push(ImportItemError {
                index,
                message: "Required fields missing: name and category are required".to_string(),
                record: record.clone(),
            });
            continue;
        }

        let contact_details = ContactDetails {
            address: record.address.clone(),
            phone: record.phone.clone(),
            website: record.website.clone(),
            description: record.description.clone(),
            ..Default::default()
        };
        let zipcode = derive_zipcode(&record.address, &record.city);

        match insert_resource(
            conn,
            record.name.trim(),
            record.category.trim(),
            record.status.unwrap_or_default(),
            &contact_details,
            &[],
            &zipcode,
        ) {
            Ok(_) => created_count += 1,
            Err(err) => errors.push(ImportItemError {
                index,
                message: err.to_string(),
                record: record.clone(),
            }),
        }
    }

    info!(
        created = created_count,
        failed = errors.len(),
        "Bulk create finished"
    );

    Ok(BulkCreateOutcome {
        created_count,
        errors,
    })
}

fn insert_resource(
    conn: &Connection,
    name: &str,
    category: &str,
    status: Status,
    contact_details: &ContactDetails,
    notes: &[Note],
    zipcode: &str,
) -> Result<Resource, ApiError> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO resources (name, category, status, contact_details, notes, zipcode, created_at, last_updated, version) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)",
        params![
            name,
            category,
            status.as_str(),
            serde_json::to_string(contact_details)?,
            serde_json::to_string(notes)?,
            zipcode,
            fmt_ts(now),
            fmt_ts(now),
        ],
    )?;
    let id = conn.last_insert_rowid();

    Ok(Resource {
        id,
        name: name.to_string(),
        category: category.to_string(),
        status,
        contact_details: contact_details.clone(),
        notes: notes.to_vec(),
        zipcode: zipcode.to_string(),
        created_at: now,
        last_updated: now,
        version: 1,
    })
}

/// Conditional write for the update path. Returns false when the row's
/// version moved underneath the caller.
pub fn write_back(
    conn: &Connection,
    resource: &Resource,
    prev_version: i64,
) -> Result<bool, ApiError> {
    let rows = conn.execute(
        "UPDATE resources SET status = ?1, contact_details = ?2, notes = ?3, last_updated = ?4, version = ?5 \
         WHERE id = ?6 AND version = ?7",
        params![
            resource.status.as_str(),
            serde_json::to_string(&resource.contact_details)?,
            serde_json::to_string(&resource.notes)?,
            fmt_ts(resource.last_updated),
            resource.version,
            resource.id,
            prev_version,
        ],
    )?;
    Ok(rows == 1)
}

fn resolve_contact_details(raw: Option<&serde_json::Value>) -> ContactDetails {
    match raw {
        Some(value @ serde_json::Value::Object(_)) => {
            serde_json::from_value(value.clone()).unwrap_or_default()
        }
        Some(serde_json::Value::String(encoded)) => {
            serde_json::from_str(encoded).unwrap_or_default()
        }
        _ => ContactDetails::default(),
    }
}

/// Housekeeping: title-case every category (hyphens treated as spaces) and
/// report what changed plus the distinct set left behind.
pub fn normalize_categories(conn: &Connection) -> Result<NormalizeOutcome, ApiError> {
    let mut stmt = conn.prepare("SELECT id, category FROM resources")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut renamed = BTreeMap::new();
    let mut categories = BTreeSet::new();
    let mut pending = Vec::new();
    for row in rows {
        let (id, category) = row?;
        let normalized = capitalize_words(&category);
        categories.insert(normalized.clone());
        if normalized != category {
            pending.push((id, category, normalized));
        }
    }
    drop(stmt);

    for (id, original, normalized) in pending {
        conn.execute(
            "UPDATE resources SET category = ?1 WHERE id = ?2",
            params![normalized, id],
        )?;
        renamed.entry(original).or_insert(normalized);
    }

    Ok(NormalizeOutcome {
        renamed,
        categories: categories.into_iter().collect(),
    })
}

fn capitalize_words(raw: &str) -> String {
    raw.replace('-', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
