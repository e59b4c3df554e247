//! [`DbClient`] over a MySQL server.
//!
//! The persistence layer is synchronous; [`MysqlClient`] drives
//! `mysql_async` on a private current-thread tokio runtime and blocks on
//! every call.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Timelike};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, DriverError, OptsBuilder, Params, Row, Value};
use rowbind_dict::ConnectionConfig;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::classify::{CR_SERVER_GONE_ERROR, CR_SERVER_LOST, CR_UNKNOWN_ERROR};
use crate::client::{ClientError, DbClient, Execution, PreparedInfo, QueryResult, StatementHandle, WireValue};
use crate::error::Result;

/// Blocking MySQL client.
///
/// ```no_run
/// use rowbind_dict::ConnectionConfig;
/// use rowbind_mysql::{Connection, MysqlClient};
///
/// let config = ConnectionConfig::new("epg").with_credentials("epg", "secret");
/// let conn = Connection::new(config, MysqlClient::new().unwrap());
/// conn.connect().unwrap();
/// ```
pub struct MysqlClient {
    runtime: Runtime,
    conn: Option<Conn>,
    statements: HashMap<StatementHandle, mysql_async::Statement>,
    next_handle: u64,
}

impl MysqlClient {
    /// Creates an unconnected client and its runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::IoError`](crate::PersistError::IoError) if the
    /// runtime cannot be started.
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime,
            conn: None,
            statements: HashMap::new(),
            next_handle: 0,
        })
    }
}

fn session(conn: &mut Option<Conn>) -> std::result::Result<&mut Conn, ClientError> {
    conn.as_mut()
        .ok_or_else(|| ClientError::new(CR_SERVER_GONE_ERROR, "MySQL server has gone away"))
}

fn map_error(err: mysql_async::Error) -> ClientError {
    match err {
        mysql_async::Error::Server(server) => ClientError::new(u32::from(server.code), server.message),
        mysql_async::Error::Io(io) => ClientError::new(CR_SERVER_LOST, io.to_string()),
        mysql_async::Error::Driver(DriverError::ConnectionClosed) => {
            ClientError::new(CR_SERVER_GONE_ERROR, "MySQL server has gone away")
        }
        other => ClientError::new(CR_UNKNOWN_ERROR, other.to_string()),
    }
}

fn to_wire(value: Value) -> WireValue {
    match value {
        Value::NULL => WireValue::Null,
        Value::Bytes(bytes) => WireValue::Bytes(bytes),
        Value::Int(v) => WireValue::Int(v),
        Value::UInt(v) => WireValue::UInt(v),
        Value::Float(v) => WireValue::Double(f64::from(v)),
        Value::Double(v) => WireValue::Double(v),
        Value::Date(year, month, day, hour, minute, second, micros) => NaiveDate::from_ymd_opt(
            i32::from(year),
            u32::from(month),
            u32::from(day),
        )
        .and_then(|date| date.and_hms_micro_opt(u32::from(hour), u32::from(minute), u32::from(second), micros))
        .map_or(WireValue::Null, WireValue::DateTime),
        time @ Value::Time(..) => WireValue::Bytes(time.as_sql(true).trim_matches('\'').as_bytes().to_vec()),
    }
}

/// Server code for a datetime outside the representable range.
const ER_TRUNCATED_WRONG_VALUE: u32 = 1292;

fn to_value(value: &WireValue) -> std::result::Result<Value, ClientError> {
    Ok(match value {
        WireValue::Null => Value::NULL,
        WireValue::Bytes(bytes) => Value::Bytes(bytes.clone()),
        WireValue::Int(v) => Value::Int(*v),
        WireValue::UInt(v) => Value::UInt(*v),
        WireValue::Double(v) => Value::Double(*v),
        WireValue::DateTime(v) => {
            let year = u16::try_from(v.year())
                .ok()
                .filter(|year| *year <= 9999)
                .ok_or_else(|| ClientError::new(ER_TRUNCATED_WRONG_VALUE, format!("Incorrect datetime value: '{v}'")))?;
            Value::Date(
                year,
                v.month() as u8,
                v.day() as u8,
                v.hour() as u8,
                v.minute() as u8,
                v.second() as u8,
                v.nanosecond() / 1_000,
            )
        }
    })
}

fn to_cells(row: Row) -> Vec<WireValue> {
    row.unwrap_raw()
        .into_iter()
        .map(|cell| cell.map_or(WireValue::Null, to_wire))
        .collect()
}

impl DbClient for MysqlClient {
    fn connect(&mut self, config: &ConnectionConfig) -> std::result::Result<(), ClientError> {
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()))
            .client_found_rows(true);

        let encoding = config.encoding.clone();
        let conn = self.runtime.block_on(async move {
            let mut conn = Conn::new(opts).await?;
            if let Some(encoding) = encoding {
                conn.query_drop(format!("SET NAMES {encoding}")).await?;
            }
            Ok::<_, mysql_async::Error>(conn)
        });

        self.statements.clear();
        self.conn = Some(conn.map_err(map_error)?);
        debug!(host = %config.host, port = config.port, "MySQL session established");
        Ok(())
    }

    fn close(&mut self) {
        self.statements.clear();
        if let Some(conn) = self.conn.take() {
            if let Err(err) = self.runtime.block_on(conn.disconnect()) {
                warn!(%err, "error while disconnecting");
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn query(&mut self, sql: &str) -> std::result::Result<QueryResult, ClientError> {
        let runtime = &self.runtime;
        let conn = session(&mut self.conn)?;

        runtime
            .block_on(async {
                let mut result = conn.query_iter(sql).await?;
                let columns: Vec<String> = result
                    .columns()
                    .map(|columns| columns.iter().map(|c| c.name_str().into_owned()).collect())
                    .unwrap_or_default();
                let rows: Vec<Row> = result.collect().await?;
                let affected_rows = if columns.is_empty() {
                    result.affected_rows()
                } else {
                    rows.len() as u64
                };
                Ok::<_, mysql_async::Error>(QueryResult {
                    columns,
                    rows: rows
                        .into_iter()
                        .map(|row| to_cells(row).iter().map(WireValue::to_text).collect())
                        .collect(),
                    affected_rows,
                })
            })
            .map_err(map_error)
    }

    fn prepare(&mut self, sql: &str) -> std::result::Result<PreparedInfo, ClientError> {
        let runtime = &self.runtime;
        let conn = session(&mut self.conn)?;
        let statement = runtime.block_on(conn.prep(sql)).map_err(map_error)?;

        self.next_handle += 1;
        let handle = StatementHandle(self.next_handle);
        let info = PreparedInfo {
            handle,
            param_count: usize::from(statement.num_params()),
            column_count: usize::from(statement.num_columns()),
        };
        self.statements.insert(handle, statement);
        Ok(info)
    }

    fn execute(&mut self, handle: StatementHandle, params: &[WireValue]) -> std::result::Result<Execution, ClientError> {
        let statement = self
            .statements
            .get(&handle)
            .cloned()
            .ok_or_else(|| ClientError::new(CR_UNKNOWN_ERROR, format!("unknown statement handle {}", handle.0)))?;
        let params = if params.is_empty() {
            Params::Empty
        } else {
            Params::Positional(params.iter().map(to_value).collect::<std::result::Result<_, _>>()?)
        };
        let has_columns = statement.num_columns() > 0;

        let runtime = &self.runtime;
        let conn = session(&mut self.conn)?;
        runtime
            .block_on(async {
                let mut result = conn.exec_iter(&statement, params).await?;
                let rows: Vec<Row> = result.collect().await?;
                let affected_rows = result.affected_rows();
                let last_insert_id = result.last_insert_id().filter(|&id| id != 0);
                Ok::<_, mysql_async::Error>(Execution {
                    affected_rows: if has_columns { rows.len() as u64 } else { affected_rows },
                    rows: rows.into_iter().map(to_cells).collect(),
                    last_insert_id,
                })
            })
            .map_err(map_error)
    }

    fn close_statement(&mut self, handle: StatementHandle) {
        let Some(statement) = self.statements.remove(&handle) else {
            return;
        };
        let runtime = &self.runtime;
        if let Some(conn) = self.conn.as_mut() {
            if let Err(err) = runtime.block_on(conn.close(statement)) {
                warn!(%err, "error while closing statement");
            }
        }
    }

    fn list_tables(&mut self, pattern: &str) -> std::result::Result<Vec<String>, ClientError> {
        let sql = format!("SHOW TABLES LIKE '{}'", pattern.replace('\'', "''"));
        let result = self.query(&sql)?;
        Ok(result.rows.into_iter().filter_map(|row| row.into_iter().next().flatten()).collect())
    }
}

impl Drop for MysqlClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn test_to_wire_dates() {
        let value = to_wire(Value::Date(2024, 3, 1, 20, 15, 0, 0));
        let expected = NaiveDateTime::parse_from_str("2024-03-01 20:15:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(value, WireValue::DateTime(expected));

        // zero dates have no calendar representation
        assert_eq!(to_wire(Value::Date(0, 0, 0, 0, 0, 0, 0)), WireValue::Null);
    }

    #[test]
    fn test_to_value_roundtrip_of_scalars() {
        assert_eq!(to_value(&WireValue::Int(-3)).unwrap(), Value::Int(-3));
        assert_eq!(to_value(&WireValue::UInt(3)).unwrap(), Value::UInt(3));
        assert_eq!(to_value(&WireValue::Null).unwrap(), Value::NULL);
        assert_eq!(to_wire(Value::Float(1.5)), WireValue::Double(1.5));
    }

    #[test]
    fn test_to_value_rejects_out_of_range_year() {
        let date = |year| {
            NaiveDate::from_ymd_opt(year, 3, 1)
                .and_then(|date| date.and_hms_opt(20, 15, 0))
                .unwrap()
        };
        assert_eq!(
            to_value(&WireValue::DateTime(date(2024))).unwrap(),
            Value::Date(2024, 3, 1, 20, 15, 0, 0)
        );
        for year in [-1, 10_000] {
            let err = to_value(&WireValue::DateTime(date(year))).unwrap_err();
            assert_eq!(err.code, ER_TRUNCATED_WRONG_VALUE);
            assert_eq!(crate::classify::classify(err.code), Some(crate::ErrorClass::Generic));
        }
    }

    #[test]
    fn test_map_error() {
        let err = map_error(mysql_async::Error::Driver(DriverError::ConnectionClosed));
        assert_eq!(err.code, CR_SERVER_GONE_ERROR);
    }

    #[test]
    fn test_unconnected_client() {
        let mut client = MysqlClient::new().unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.query("select 1").unwrap_err().code, CR_SERVER_GONE_ERROR);
    }
}
