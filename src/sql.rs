use chrono::NaiveDate;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertReservation {
        id: Ulid,
        resource_id: Ulid,
        slot_id: Ulid,
        date: NaiveDate,
        purpose: String,
        participants: u32,
    },
    /// `DELETE FROM reservations` cancels; history is never removed.
    CancelReservation {
        id: Ulid,
    },
    Approve {
        reservation_id: Ulid,
        notes: Option<String>,
    },
    Reject {
        reservation_id: Ulid,
        notes: Option<String>,
    },
    Complete {
        reservation_id: Ulid,
    },
    SelectReservations {
        filter: ReservationFilter,
    },
    SelectEvents {
        reservation_id: Ulid,
    },
    SelectAvailableSlots {
        resource_id: Ulid,
        date: NaiveDate,
    },
    SelectStats,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// INSERT values keyed by column. Without a column list the table's
/// documented column order applies.
struct Row {
    table: &'static str,
    cells: Vec<(String, Expr)>,
}

impl Row {
    fn new(table: &'static str, order: &[&str], columns: &[ast::Ident], values: Vec<Expr>) -> Result<Self, SqlError> {
        let names: Vec<String> = if columns.is_empty() {
            order.iter().map(|c| c.to_string()).collect()
        } else {
            columns.iter().map(|c| c.value.to_lowercase()).collect()
        };
        if values.len() > names.len() {
            return Err(SqlError::WrongArity(table, names.len(), values.len()));
        }
        for name in &names {
            if !order.contains(&name.as_str()) {
                return Err(SqlError::UnknownColumn(table, name.clone()));
            }
        }
        Ok(Self {
            table,
            cells: names.into_iter().zip(values).collect(),
        })
    }

    fn get(&self, column: &str) -> Option<&Expr> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, e)| e)
    }

    fn require(&self, column: &'static str) -> Result<&Expr, SqlError> {
        self.get(column).ok_or(SqlError::MissingColumn(self.table, column))
    }
}

const RESERVATION_COLUMNS: &[&str] = &["id", "resource_id", "slot_id", "date", "purpose", "participants"];
const REVIEW_COLUMNS: &[&str] = &["reservation_id", "notes"];
const COMPLETION_COLUMNS: &[&str] = &["reservation_id"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "reservations" => {
            let row = Row::new("reservations", RESERVATION_COLUMNS, &insert.columns, values)?;
            Ok(Command::InsertReservation {
                id: parse_ulid(row.require("id")?)?,
                resource_id: parse_ulid(row.require("resource_id")?)?,
                slot_id: parse_ulid(row.require("slot_id")?)?,
                date: parse_date(row.require("date")?)?,
                purpose: row.get("purpose").map(parse_text_or_null).transpose()?.flatten().unwrap_or_default(),
                participants: row.get("participants").map(parse_u32).transpose()?.unwrap_or(1),
            })
        }
        "approvals" => {
            let row = Row::new("approvals", REVIEW_COLUMNS, &insert.columns, values)?;
            Ok(Command::Approve {
                reservation_id: parse_ulid(row.require("reservation_id")?)?,
                notes: row.get("notes").map(parse_text_or_null).transpose()?.flatten(),
            })
        }
        "rejections" => {
            let row = Row::new("rejections", REVIEW_COLUMNS, &insert.columns, values)?;
            Ok(Command::Reject {
                reservation_id: parse_ulid(row.require("reservation_id")?)?,
                notes: row.get("notes").map(parse_text_or_null).transpose()?.flatten(),
            })
        }
        "completions" => {
            let row = Row::new("completions", COMPLETION_COLUMNS, &insert.columns, values)?;
            Ok(Command::Complete {
                reservation_id: parse_ulid(row.require("reservation_id")?)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "reservations" => Ok(Command::CancelReservation { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut filters)?;
    }

    match table.as_str() {
        "reservations" => {
            let mut filter = ReservationFilter::default();
            for (col, value) in &filters {
                match col.as_str() {
                    "id" => filter.id = Some(parse_ulid(value)?),
                    "status" => filter.status = Some(parse_status(value)?),
                    "resource_id" => filter.resource_id = Some(parse_ulid(value)?),
                    "date" => filter.date = Some(parse_date(value)?),
                    _ => return Err(SqlError::UnknownColumn("reservations", col.clone())),
                }
            }
            Ok(Command::SelectReservations { filter })
        }
        "reservation_events" => Ok(Command::SelectEvents {
            reservation_id: parse_ulid(find_filter(&filters, "reservation_id")?)?,
        }),
        "available_slots" => Ok(Command::SelectAvailableSlots {
            resource_id: parse_ulid(find_filter(&filters, "resource_id")?)?,
            date: parse_date(find_filter(&filters, "date")?)?,
        }),
        "reservation_stats" => Ok(Command::SelectStats),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = x AND b = y ...` into `(column, value)` pairs.
fn collect_eq_filters(expr: &Expr, out: &mut Vec<(String, Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_eq_filters(left, out)?;
            collect_eq_filters(right, out)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
            out.push((col, right.as_ref().clone()));
            Ok(())
        }
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

fn find_filter<'a>(filters: &'a [(String, Expr)], column: &'static str) -> Result<&'a Expr, SqlError> {
    filters
        .iter()
        .find(|(c, _)| c == column)
        .map(|(_, e)| e)
        .ok_or(SqlError::MissingFilter(column))
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_text(expr: &Expr) -> Result<&str, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.as_str()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_text_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_text(expr).map(|s| Some(s.to_string())),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_text(expr)?;
    Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_text(expr)?;
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| SqlError::Parse(format!("bad date {s:?}: {e}")))
}

fn parse_status(expr: &Expr) -> Result<ReservationStatus, SqlError> {
    parse_text(expr)?.parse().map_err(SqlError::Parse)
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: unknown column {1}")]
    UnknownColumn(&'static str, String),
    #[error("{0}: expected at most {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("{0}: missing column {1}")]
    MissingColumn(&'static str, &'static str),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const ROOM: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";
    const SLOT: &str = "01BX5ZZKBKACTAV9WEVGEMMVS0";

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parse_insert_reservation_defaults() {
        let sql = format!(
            r#"INSERT INTO reservations (id, resource_id, slot_id, "date") VALUES ('{ID}', '{ROOM}', '{SLOT}', '2030-05-01')"#
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertReservation {
                id,
                resource_id,
                slot_id,
                date: d,
                purpose,
                participants,
            } => {
                assert_eq!(id.to_string(), ID);
                assert_eq!(resource_id.to_string(), ROOM);
                assert_eq!(slot_id.to_string(), SLOT);
                assert_eq!(d, date("2030-05-01"));
                assert_eq!(purpose, "");
                assert_eq!(participants, 1);
            }
            _ => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation_full_and_reordered() {
        let sql = format!(
            r#"INSERT INTO reservations (participants, purpose, "date", slot_id, resource_id, id) VALUES (12, 'thesis defense', '2030-05-01', '{SLOT}', '{ROOM}', '{ID}')"#
        );
        let Command::InsertReservation { id, purpose, participants, .. } = parse_sql(&sql).unwrap() else {
            panic!("expected InsertReservation");
        };
        assert_eq!(participants, 12);
        assert_eq!(purpose, "thesis defense");
        assert_eq!(id.to_string(), ID);
    }

    #[test]
    fn parse_insert_reservation_positional() {
        let sql = format!(
            "INSERT INTO reservations VALUES ('{ID}', '{ROOM}', '{SLOT}', '2030-05-01', NULL, 3)"
        );
        let Command::InsertReservation { purpose, participants, .. } = parse_sql(&sql).unwrap() else {
            panic!("expected InsertReservation");
        };
        assert_eq!(purpose, "");
        assert_eq!(participants, 3);
    }

    #[test]
    fn parse_insert_reservation_missing_column() {
        let sql = format!("INSERT INTO reservations (id, resource_id) VALUES ('{ID}', '{ROOM}')");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::MissingColumn("reservations", "slot_id"))
        ));
    }

    #[test]
    fn parse_insert_reservation_bad_date() {
        let sql = format!(
            r#"INSERT INTO reservations (id, resource_id, slot_id, "date") VALUES ('{ID}', '{ROOM}', '{SLOT}', '2030-13-40')"#
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_insert_reservation_negative_participants() {
        let sql = format!(
            r#"INSERT INTO reservations (id, resource_id, slot_id, "date", participants) VALUES ('{ID}', '{ROOM}', '{SLOT}', '2030-05-01', -2)"#
        );
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_unknown_column_errors() {
        let sql = format!("INSERT INTO approvals (reservation_id, colour) VALUES ('{ID}', 'red')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn("approvals", _))));
    }

    #[test]
    fn parse_approval_and_rejection() {
        let sql = format!("INSERT INTO approvals (reservation_id, notes) VALUES ('{ID}', 'enjoy')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::Approve {
                reservation_id: Ulid::from_string(ID).unwrap(),
                notes: Some("enjoy".into()),
            }
        );

        let sql = format!("INSERT INTO rejections (reservation_id) VALUES ('{ID}')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::Reject {
                reservation_id: Ulid::from_string(ID).unwrap(),
                notes: None,
            }
        );
    }

    #[test]
    fn parse_completion() {
        let sql = format!("INSERT INTO completions (reservation_id) VALUES ('{ID}')");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::Complete { .. }));
    }

    #[test]
    fn parse_cancel() {
        let sql = format!("DELETE FROM reservations WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::CancelReservation {
                id: Ulid::from_string(ID).unwrap()
            }
        );
    }

    #[test]
    fn parse_delete_requires_id() {
        let sql = "DELETE FROM reservations WHERE status = 'pending'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_select_reservations_unfiltered() {
        let cmd = parse_sql("SELECT * FROM reservations").unwrap();
        assert_eq!(
            cmd,
            Command::SelectReservations {
                filter: ReservationFilter::default()
            }
        );
    }

    #[test]
    fn parse_select_reservations_with_filters() {
        let sql = format!(
            r#"SELECT * FROM reservations WHERE status = 'CONFIRMED' AND resource_id = '{ROOM}' AND "date" = '2030-05-01'"#
        );
        let Command::SelectReservations { filter } = parse_sql(&sql).unwrap() else {
            panic!("expected SelectReservations");
        };
        assert_eq!(filter.status, Some(ReservationStatus::Confirmed));
        assert_eq!(filter.resource_id.unwrap().to_string(), ROOM);
        assert_eq!(filter.date, Some(date("2030-05-01")));
        assert_eq!(filter.id, None);
    }

    #[test]
    fn parse_select_reservations_bad_status() {
        let sql = "SELECT * FROM reservations WHERE status = 'maybe'";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_select_events() {
        let sql = format!("SELECT * FROM reservation_events WHERE reservation_id = '{ID}'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::SelectEvents { .. }));
        assert!(matches!(
            parse_sql("SELECT * FROM reservation_events"),
            Err(SqlError::MissingFilter("reservation_id"))
        ));
    }

    #[test]
    fn parse_select_available_slots() {
        let sql = format!(r#"SELECT * FROM available_slots WHERE resource_id = '{ROOM}' AND "date" = '2030-05-01'"#);
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectAvailableSlots {
                resource_id: Ulid::from_string(ROOM).unwrap(),
                date: date("2030-05-01"),
            }
        );
        let sql = format!("SELECT * FROM available_slots WHERE resource_id = '{ROOM}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("date"))));
    }

    #[test]
    fn parse_select_stats() {
        assert_eq!(parse_sql("SELECT * FROM reservation_stats").unwrap(), Command::SelectStats);
    }

    #[test]
    fn parse_range_filters_unsupported() {
        let sql = r#"SELECT * FROM reservations WHERE "date" >= '2030-01-01'"#;
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO rooms (id) VALUES ('{ID}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_multi_row_insert_unsupported() {
        let sql = format!("INSERT INTO completions (reservation_id) VALUES ('{ID}'), ('{ID}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
